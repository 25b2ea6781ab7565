//! Core model and calculation logic for the pediatric blood pressure calculator.

pub mod calculator;
pub mod lookup;
pub mod model;
pub mod sample;
pub mod settings;
pub mod strings;

pub use calculator::{
    CalculatorEngine, CalculatorForm, CalculatorInput, CalculatorView, FormField, ResultPayload,
    ThresholdRow, TARGET_PERCENTILES,
};
pub use lookup::{
    BpReading, PercentileResult, ReferenceLookup, ReferenceRow, ReferenceTable, Subject,
    ThresholdValues,
};
pub use model::{
    AgeSpan, Encounter, Normalizer, Patient, PatientRecord, Sex, VitalsObservation,
};
pub use sample::{CannedSample, SampleDataProvider};
pub use settings::{AppSettings, FilterButtonSetting, View, Zone};
pub use strings::StringTable;

/// Errors raised across the calculator workspace.
#[derive(Debug, thiserror::Error)]
pub enum BpcError {
    #[error("authorization failed: {0}")]
    Auth(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("could not normalize clinical resources: {0}")]
    Normalize(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("could not read data: {0}")]
    Parse(String),
    #[error("application already started")]
    AlreadyStarted,
    #[error("no patient data loaded")]
    NoPatient,
}
