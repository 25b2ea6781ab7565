//! Framework-neutral WASM <-> JavaScript bridge for the calculator.

use std::sync::Arc;

use bpc_core::{
    AppSettings, BpcError, CalculatorEngine, CalculatorForm, CannedSample, PatientRecord,
    ReferenceTable, SampleDataProvider, StringTable,
};
use serde::Deserialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[derive(Deserialize)]
struct JsCalculatorRequest {
    record: PatientRecord,
    #[serde(default)]
    form: Option<CalculatorForm>,
    /// `YYYY-MM-DD`; defaults to the local date.
    #[serde(default)]
    today: Option<String>,
    #[serde(default)]
    strings: Option<std::collections::HashMap<String, String>>,
}

/// Normalize FHIR demographics and vitals into a patient record.
#[wasm_bindgen]
pub fn normalize_resources(demographics: JsValue, vitals: JsValue) -> Result<JsValue, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let demographics = from_value::<serde_json::Value>(demographics)
        .map_err(|err| JsValue::from_str(&format!("Could not read demographics JSON: {err}")))?;
    let vitals = from_value::<serde_json::Value>(vitals)
        .map_err(|err| JsValue::from_str(&format!("Could not read vitals JSON: {err}")))?;

    let record = bpc_fhir::normalize_value(&demographics, &vitals).map_err(to_js_error)?;
    to_value(&record).map_err(|err| JsValue::from_str(&format!("Could not serialize record: {err}")))
}

/// The canned record used in degraded mode.
#[wasm_bindgen]
pub fn sample_record() -> Result<JsValue, JsValue> {
    to_value(&CannedSample.sample())
        .map_err(|err| JsValue::from_str(&format!("Could not serialize record: {err}")))
}

/// Run one recompute. Without a `form`, the form is seeded from the record.
#[wasm_bindgen]
pub fn recompute(request: JsValue, reference_table: JsValue) -> Result<JsValue, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let request: JsCalculatorRequest = from_value(request)
        .map_err(|err| JsValue::from_str(&format!("Could not read calculator request: {err}")))?;
    let table: ReferenceTable = from_value(reference_table)
        .map_err(|err| JsValue::from_str(&format!("Could not read reference table: {err}")))?;
    let table = ReferenceTable::new(table.rows().to_vec()).map_err(to_js_error)?;

    let view = run_recompute(request, table).map_err(to_js_error)?;
    to_value(&view).map_err(|err| JsValue::from_str(&format!("Could not serialize result: {err}")))
}

/// Parse a settings document, filling absent keys with defaults.
#[wasm_bindgen]
pub fn load_settings(settings_json: &str) -> Result<JsValue, JsValue> {
    let settings = AppSettings::from_json_str(settings_json).map_err(to_js_error)?;
    to_value(&settings)
        .map_err(|err| JsValue::from_str(&format!("Could not serialize settings: {err}")))
}

fn run_recompute(
    request: JsCalculatorRequest,
    table: ReferenceTable,
) -> Result<bpc_core::CalculatorView, BpcError> {
    let today = match request.today.as_deref() {
        Some(text) => chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map_err(|err| BpcError::Parse(format!("today: {err}")))?,
        None => chrono::Local::now().date_naive(),
    };

    let strings = request
        .strings
        .map(StringTable::with_overrides)
        .unwrap_or_default();

    let mut engine = CalculatorEngine::init(
        Arc::new(table),
        Arc::new(strings),
        request.record.patient.as_ref(),
        &request.record.vitals,
        today,
    );

    if let Some(form) = request.form {
        engine.replace_form(form);
    }
    Ok(engine.view().clone())
}

fn to_js_error(err: BpcError) -> JsValue {
    JsValue::from_str(&format!("Calculator error: {err}"))
}
