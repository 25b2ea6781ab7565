//! Acquisition orchestrator: authorize, fetch demographics and vitals
//! concurrently, normalize, and start the application exactly once, falling
//! back to the sample patient after a fixed delay when anything fails.
//!
//! ```text
//! Authorizing ──ok──► Fetching ──ok──► Normalizing ──ok──► Started(live)
//!      │                 │                  │
//!      └──────err────────┴───────err────────┴──► Degrading ──delay──► Started(sample)
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bpc_core::{BpcError, Normalizer, PatientRecord, SampleDataProvider};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tracing::{error, info};

use crate::context::AppContext;

/// Authorized session returned by the handshake.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// `Some(false)` asks the app to suppress its own patient banner.
    #[serde(default)]
    pub need_patient_banner: Option<bool>,
    #[serde(default)]
    pub patient_id: Option<String>,
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self) -> Result<Session, BpcError>;
}

/// Remote source of raw clinical resources.
#[async_trait]
pub trait ClinicalSource: Send + Sync {
    async fn fetch_demographics(&self, session: &Session) -> Result<Value, BpcError>;
    async fn fetch_vitals(&self, session: &Session) -> Result<Value, BpcError>;
}

/// Receiver of the resolved patient; implemented by the application.
pub trait Launcher {
    fn init_app(&mut self, record: PatientRecord, is_sample: bool) -> Result<(), BpcError>;
    fn display_error(&mut self, message: &str);
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    Authorizing,
    Fetching,
    Normalizing,
    Degrading,
    Started { sample: bool },
}

/// How the application ended up starting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Live,
    Sample { cause: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Wait between the error banner and the sample-patient start.
    pub fallback_delay_secs: u64,
    /// Upper bound for each of the two resource requests.
    pub fetch_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fallback_delay_secs: 10,
            fetch_timeout_secs: 30,
        }
    }
}

impl OrchestratorConfig {
    pub fn fallback_delay(&self) -> Duration {
        Duration::from_secs(self.fallback_delay_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

pub struct AcquisitionOrchestrator {
    authorizer: Arc<dyn Authorizer>,
    source: Arc<dyn ClinicalSource>,
    normalizer: Arc<dyn Normalizer>,
    sample: Arc<dyn SampleDataProvider>,
    context: Arc<AppContext>,
    config: OrchestratorConfig,
    state: watch::Sender<AcquisitionState>,
    transitions: broadcast::Sender<AcquisitionState>,
}

impl AcquisitionOrchestrator {
    pub fn new(
        authorizer: Arc<dyn Authorizer>,
        source: Arc<dyn ClinicalSource>,
        normalizer: Arc<dyn Normalizer>,
        sample: Arc<dyn SampleDataProvider>,
        context: Arc<AppContext>,
    ) -> Self {
        let (state, _) = watch::channel(AcquisitionState::Authorizing);
        let (transitions, _) = broadcast::channel(16);
        Self {
            authorizer,
            source,
            normalizer,
            sample,
            context,
            config: OrchestratorConfig::default(),
            state,
            transitions,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Every transition made after this call, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<AcquisitionState> {
        self.transitions.subscribe()
    }

    pub fn state(&self) -> AcquisitionState {
        *self.state.borrow()
    }

    /// Run the acquisition sequence and start `launcher` with live or sample data.
    ///
    /// Acquisition failures never escape; they degrade to the sample patient.
    /// An error is returned only when the launcher refuses to start; the
    /// state then stays where it was and never reports `Started`.
    pub async fn run<L>(&self, launcher: &mut L) -> Result<LaunchOutcome, BpcError>
    where
        L: Launcher + ?Sized,
    {
        match self.acquire().await {
            Ok(record) => {
                info!("patient data loaded, starting application");
                launcher.init_app(record, false)?;
                self.transition(AcquisitionState::Started { sample: false });
                Ok(LaunchOutcome::Live)
            }
            Err(err) => {
                error!(error = %err, "patient data acquisition failed");
                self.transition(AcquisitionState::Degrading);
                launcher.display_error(&self.fallback_message());

                tokio::time::sleep(self.config.fallback_delay()).await;

                info!("starting application with the sample patient");
                launcher.init_app(self.sample.sample(), true)?;
                self.transition(AcquisitionState::Started { sample: true });
                Ok(LaunchOutcome::Sample {
                    cause: err.to_string(),
                })
            }
        }
    }

    async fn acquire(&self) -> Result<PatientRecord, BpcError> {
        self.transition(AcquisitionState::Authorizing);
        let session = self.authorizer.authorize().await?;
        self.context.record_session(&session);

        self.transition(AcquisitionState::Fetching);
        let (demographics, vitals) = tokio::try_join!(
            self.bounded("demographics", self.source.fetch_demographics(&session)),
            self.bounded("vitals", self.source.fetch_vitals(&session)),
        )?;

        self.transition(AcquisitionState::Normalizing);
        self.normalizer.normalize(&demographics, &vitals)
    }

    async fn bounded<F>(&self, what: &str, request: F) -> Result<Value, BpcError>
    where
        F: Future<Output = Result<Value, BpcError>>,
    {
        tokio::time::timeout(self.config.fetch_timeout(), request)
            .await
            .map_err(|_| BpcError::Fetch(format!("{what} request timed out")))?
    }

    fn transition(&self, next: AcquisitionState) {
        info!(state = ?next, "acquisition state");
        self.state.send_replace(next);
        // No subscribers is fine.
        let _ = self.transitions.send(next);
    }

    fn fallback_message(&self) -> String {
        format!(
            "An error prevented the app from launching properly. \
             For details see the log. \
             Proceeding with a sample patient in {} seconds...",
            self.config.fallback_delay_secs
        )
    }
}

#[cfg(test)]
mod tests {
    use bpc_core::{AppSettings, CannedSample};
    use bpc_fhir::FhirNormalizer;
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    struct Denied;

    #[async_trait]
    impl Authorizer for Denied {
        async fn authorize(&self) -> Result<Session, BpcError> {
            Err(BpcError::Auth("launch context rejected".to_string()))
        }
    }

    struct Unused;

    #[async_trait]
    impl ClinicalSource for Unused {
        async fn fetch_demographics(&self, _session: &Session) -> Result<Value, BpcError> {
            Ok(json!({}))
        }

        async fn fetch_vitals(&self, _session: &Session) -> Result<Value, BpcError> {
            Ok(json!([]))
        }
    }

    struct Granted;

    #[async_trait]
    impl Authorizer for Granted {
        async fn authorize(&self) -> Result<Session, BpcError> {
            Ok(Session::default())
        }
    }

    struct Canned;

    #[async_trait]
    impl ClinicalSource for Canned {
        async fn fetch_demographics(&self, _session: &Session) -> Result<Value, BpcError> {
            Ok(json!({
                "resourceType": "Patient",
                "id": "p1",
                "gender": "female",
                "birthDate": "2015-06-01"
            }))
        }

        async fn fetch_vitals(&self, _session: &Session) -> Result<Value, BpcError> {
            Ok(json!([
                {
                    "resourceType": "Observation",
                    "status": "final",
                    "code": { "coding": [{ "system": "http://loinc.org", "code": "8302-2" }] },
                    "effectiveDateTime": "2024-01-10",
                    "valueQuantity": { "value": 125, "unit": "cm" }
                },
                {
                    "resourceType": "Observation",
                    "status": "final",
                    "code": { "coding": [{ "system": "http://loinc.org", "code": "55284-4" }] },
                    "effectiveDateTime": "2024-01-10",
                    "component": [
                        {
                            "code": { "coding": [{ "system": "http://loinc.org", "code": "8480-6" }] },
                            "valueQuantity": { "value": 104, "unit": "mm[Hg]" }
                        },
                        {
                            "code": { "coding": [{ "system": "http://loinc.org", "code": "8462-4" }] },
                            "valueQuantity": { "value": 62, "unit": "mm[Hg]" }
                        }
                    ]
                }
            ]))
        }
    }

    struct Refusing {
        attempts: usize,
    }

    impl Launcher for Refusing {
        fn init_app(&mut self, _record: PatientRecord, _is_sample: bool) -> Result<(), BpcError> {
            self.attempts += 1;
            Err(BpcError::AlreadyStarted)
        }

        fn display_error(&mut self, _message: &str) {}
    }

    fn drain(receiver: &mut broadcast::Receiver<AcquisitionState>) -> Vec<AcquisitionState> {
        let mut seen = Vec::new();
        loop {
            match receiver.try_recv() {
                Ok(state) => seen.push(state),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return seen,
                Err(TryRecvError::Lagged(n)) => panic!("lagged by {n}"),
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        starts: Vec<bool>,
        errors: Vec<String>,
    }

    impl Launcher for Recorder {
        fn init_app(&mut self, _record: PatientRecord, is_sample: bool) -> Result<(), BpcError> {
            self.starts.push(is_sample);
            Ok(())
        }

        fn display_error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
    }

    fn orchestrator(config: OrchestratorConfig) -> AcquisitionOrchestrator {
        AcquisitionOrchestrator::new(
            Arc::new(Denied),
            Arc::new(Unused),
            Arc::new(FhirNormalizer),
            Arc::new(CannedSample),
            Arc::new(AppContext::new(AppSettings::default())),
        )
        .with_config(config)
    }

    #[test]
    fn default_config_waits_ten_seconds() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.fallback_delay(), Duration::from_secs(10));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_degrades_to_sample() {
        let orchestrator = orchestrator(OrchestratorConfig::default());
        let mut launcher = Recorder::default();

        let outcome = orchestrator.run(&mut launcher).await.unwrap();

        assert!(matches!(outcome, LaunchOutcome::Sample { cause } if cause.contains("rejected")));
        assert_eq!(launcher.starts, vec![true]);
        assert_eq!(launcher.errors.len(), 1);
        assert!(launcher.errors[0].contains("sample patient in 10 seconds"));
        assert_eq!(
            orchestrator.state(),
            AcquisitionState::Started { sample: true }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_message_reflects_configured_delay() {
        let orchestrator = orchestrator(OrchestratorConfig {
            fallback_delay_secs: 3,
            ..OrchestratorConfig::default()
        });
        let mut launcher = Recorder::default();
        orchestrator.run(&mut launcher).await.unwrap();
        assert!(launcher.errors[0].ends_with("in 3 seconds..."));
    }

    #[tokio::test(start_paused = true)]
    async fn subscriber_sees_live_transitions_in_order() {
        let orchestrator = AcquisitionOrchestrator::new(
            Arc::new(Granted),
            Arc::new(Canned),
            Arc::new(FhirNormalizer),
            Arc::new(CannedSample),
            Arc::new(AppContext::new(AppSettings::default())),
        );
        let mut receiver = orchestrator.subscribe();
        let mut launcher = Recorder::default();

        let outcome = orchestrator.run(&mut launcher).await.unwrap();

        assert_eq!(outcome, LaunchOutcome::Live);
        assert_eq!(
            drain(&mut receiver),
            vec![
                AcquisitionState::Authorizing,
                AcquisitionState::Fetching,
                AcquisitionState::Normalizing,
                AcquisitionState::Started { sample: false },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn subscriber_sees_degraded_transitions_in_order() {
        let orchestrator = orchestrator(OrchestratorConfig::default());
        let mut receiver = orchestrator.subscribe();
        let mut launcher = Recorder::default();

        orchestrator.run(&mut launcher).await.unwrap();

        assert_eq!(
            drain(&mut receiver),
            vec![
                AcquisitionState::Authorizing,
                AcquisitionState::Degrading,
                AcquisitionState::Started { sample: true },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn refused_start_never_reports_started() {
        let orchestrator = orchestrator(OrchestratorConfig::default());
        let mut receiver = orchestrator.subscribe();
        let mut launcher = Refusing { attempts: 0 };

        let result = orchestrator.run(&mut launcher).await;

        assert!(matches!(result, Err(BpcError::AlreadyStarted)));
        assert_eq!(launcher.attempts, 1);
        assert_eq!(orchestrator.state(), AcquisitionState::Degrading);
        assert!(!drain(&mut receiver)
            .iter()
            .any(|state| matches!(state, AcquisitionState::Started { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn refused_live_start_stays_normalizing() {
        let orchestrator = AcquisitionOrchestrator::new(
            Arc::new(Granted),
            Arc::new(Canned),
            Arc::new(FhirNormalizer),
            Arc::new(CannedSample),
            Arc::new(AppContext::new(AppSettings::default())),
        );
        let mut launcher = Refusing { attempts: 0 };

        assert!(orchestrator.run(&mut launcher).await.is_err());
        assert_eq!(orchestrator.state(), AcquisitionState::Normalizing);
    }
}
