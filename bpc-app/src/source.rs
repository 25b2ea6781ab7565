//! File-backed authorization and resource source.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bpc_core::BpcError;
use serde_json::Value;
use tracing::debug;

use crate::orchestrator::{Authorizer, ClinicalSource, Session};

/// Serves a launch context and two FHIR documents from disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    launch_context: Option<PathBuf>,
    demographics: PathBuf,
    vitals: PathBuf,
}

impl FileSource {
    pub fn new(demographics: impl Into<PathBuf>, vitals: impl Into<PathBuf>) -> Self {
        Self {
            launch_context: None,
            demographics: demographics.into(),
            vitals: vitals.into(),
        }
    }

    /// Read the session from a launch-context JSON file instead of using an empty one.
    pub fn with_launch_context(mut self, path: impl Into<PathBuf>) -> Self {
        self.launch_context = Some(path.into());
        self
    }
}

async fn read_json(path: &Path) -> Result<Value, String> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| format!("{}: {err}", path.display()))?;
    serde_json::from_str(&text).map_err(|err| format!("{}: {err}", path.display()))
}

#[async_trait]
impl Authorizer for FileSource {
    async fn authorize(&self) -> Result<Session, BpcError> {
        let Some(path) = self.launch_context.as_deref() else {
            return Ok(Session::default());
        };
        let value = read_json(path).await.map_err(BpcError::Auth)?;
        let session: Session = serde_json::from_value(value)
            .map_err(|err| BpcError::Auth(format!("malformed launch context: {err}")))?;
        debug!(?session, "launch context read");
        Ok(session)
    }
}

#[async_trait]
impl ClinicalSource for FileSource {
    async fn fetch_demographics(&self, _session: &Session) -> Result<Value, BpcError> {
        read_json(&self.demographics).await.map_err(BpcError::Fetch)
    }

    async fn fetch_vitals(&self, _session: &Session) -> Result<Value, BpcError> {
        read_json(&self.vitals).await.map_err(BpcError::Fetch)
    }
}
