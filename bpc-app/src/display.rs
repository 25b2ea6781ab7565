//! Capability interfaces a UI layer implements. The application only talks to
//! widgets through these.

use bpc_core::{CalculatorView, FilterButtonSetting, Patient, View};

/// Renders application output.
pub trait DisplayAdapter: Send {
    fn show_error(&mut self, message: &str);

    /// Render a calculator result or the data-entry prompt.
    fn show_calculator(&mut self, view: &CalculatorView);

    fn show_patient_banner(&mut self, patient: &Patient, is_sample: bool);

    fn apply_filter_button(&mut self, setting: &FilterButtonSetting);
}

/// Enable/disable and view selection for the filter controls and tabs.
pub trait UiControls: Send {
    fn enable(&mut self);
    fn disable(&mut self);
    fn select_view(&mut self, view: View);
}
