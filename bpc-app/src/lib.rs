//! Startup orchestration and application shell for the blood pressure calculator.

pub mod app;
pub mod context;
pub mod display;
pub mod orchestrator;
pub mod source;

pub use app::Application;
pub use context::{AppContext, CurrentPatient};
pub use display::{DisplayAdapter, UiControls};
pub use orchestrator::{
    AcquisitionOrchestrator, AcquisitionState, Authorizer, ClinicalSource, LaunchOutcome,
    Launcher, OrchestratorConfig, Session,
};
pub use source::FileSource;
