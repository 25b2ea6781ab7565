//! Application context shared by the orchestrator and the calculator UI.

use std::sync::OnceLock;

use bpc_core::{AppSettings, BpcError, PatientRecord};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::orchestrator::Session;

/// The patient the application started with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentPatient {
    pub record: PatientRecord,
    pub is_sample: bool,
}

/// Constructed once at startup and handed out by `Arc`. Settings are
/// read-only; the session and current patient are written at most once.
#[derive(Debug)]
pub struct AppContext {
    settings: AppSettings,
    session: OnceLock<Session>,
    current: OnceLock<CurrentPatient>,
}

impl AppContext {
    pub fn new(settings: AppSettings) -> Self {
        Self {
            settings,
            session: OnceLock::new(),
            current: OnceLock::new(),
        }
    }

    /// Settings with the session's banner preference applied.
    pub fn settings(&self) -> AppSettings {
        let mut settings = self.settings.clone();
        if self
            .session
            .get()
            .is_some_and(|session| session.need_patient_banner == Some(false))
        {
            settings.hide_patient_header = true;
        }
        settings
    }

    /// Remember the authorized session. Returns `false` if one was already recorded.
    pub fn record_session(&self, session: &Session) -> bool {
        self.session.set(session.clone()).is_ok()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.get()
    }

    /// One-shot transition into the started state.
    pub fn start(&self, current: CurrentPatient) -> Result<&CurrentPatient, BpcError> {
        let is_sample = current.is_sample;
        if self.current.set(current).is_err() {
            warn!(is_sample, "refusing to start the application a second time");
            return Err(BpcError::AlreadyStarted);
        }
        self.current.get().ok_or(BpcError::NoPatient)
    }

    pub fn current(&self) -> Option<&CurrentPatient> {
        self.current.get()
    }

    pub fn is_started(&self) -> bool {
        self.current.get().is_some()
    }
}
