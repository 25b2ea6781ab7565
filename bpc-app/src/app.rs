//! Application shell: starts once with a patient record, then routes form
//! events into the calculator and results out to the display.

use std::sync::Arc;

use bpc_core::{
    BpcError, CalculatorEngine, CalculatorView, FormField, PatientRecord, ReferenceLookup,
    StringTable,
};
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::context::{AppContext, CurrentPatient};
use crate::display::{DisplayAdapter, UiControls};
use crate::orchestrator::Launcher;

pub struct Application {
    context: Arc<AppContext>,
    lookup: Arc<dyn ReferenceLookup>,
    strings: Arc<StringTable>,
    display: Box<dyn DisplayAdapter>,
    controls: Box<dyn UiControls>,
    today: NaiveDate,
    engine: Option<CalculatorEngine>,
}

impl Application {
    /// Build the shell with controls disabled until a patient is loaded.
    ///
    /// `today` is the reference date for the patient's current age.
    pub fn new(
        context: Arc<AppContext>,
        lookup: Arc<dyn ReferenceLookup>,
        strings: Arc<StringTable>,
        display: Box<dyn DisplayAdapter>,
        mut controls: Box<dyn UiControls>,
        today: NaiveDate,
    ) -> Self {
        controls.disable();
        Self {
            context,
            lookup,
            strings,
            display,
            controls,
            today,
            engine: None,
        }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    /// Start the application with `record`. Only the first call succeeds.
    pub fn init_app(&mut self, record: PatientRecord, is_sample: bool) -> Result<(), BpcError> {
        let current = self
            .context
            .start(CurrentPatient { record, is_sample })?
            .clone();
        let settings = self.context.settings();
        info!(
            is_sample,
            view = ?settings.default_view,
            encounter = %current.record.vitals.encounter_date,
            "initializing application"
        );

        self.controls.select_view(settings.default_view);
        for button in &settings.filter_buttons_settings {
            self.display.apply_filter_button(button);
        }
        self.controls.enable();

        if let Some(patient) = current.record.patient.as_ref() {
            if !settings.hide_patient_header {
                self.display.show_patient_banner(patient, is_sample);
            }
        }

        let engine = CalculatorEngine::init(
            Arc::clone(&self.lookup),
            Arc::clone(&self.strings),
            current.record.patient.as_ref(),
            &current.record.vitals,
            self.today,
        );
        self.display.show_calculator(engine.view());
        self.engine = Some(engine);
        Ok(())
    }

    pub fn display_error(&mut self, message: &str) {
        self.display.show_error(&format!("Error: {message}"));
    }

    /// Apply one form edit and re-render. Ignored before the app has started.
    pub fn on_field_changed(&mut self, field: FormField, value: &str) -> Option<&CalculatorView> {
        let Some(engine) = self.engine.as_mut() else {
            debug!(?field, "form event before start ignored");
            return None;
        };
        let view = engine.set_field(field, value);
        self.display.show_calculator(view);
        Some(view)
    }

    /// Latest calculator output, if started.
    pub fn calculator_view(&self) -> Option<&CalculatorView> {
        self.engine.as_ref().map(CalculatorEngine::view)
    }

    /// Record to render in the print view.
    pub fn open_print_view(&self) -> Result<&PatientRecord, BpcError> {
        match self.context.current() {
            Some(current) if current.record.patient.is_some() => Ok(&current.record),
            _ => Err(BpcError::NoPatient),
        }
    }
}

impl Launcher for Application {
    fn init_app(&mut self, record: PatientRecord, is_sample: bool) -> Result<(), BpcError> {
        Application::init_app(self, record, is_sample)
    }

    fn display_error(&mut self, message: &str) {
        Application::display_error(self, message);
    }
}
