use std::fs;
use std::sync::Arc;

use bpc_core::{
    CalculatorEngine, CalculatorView, FormField, ReferenceTable, StringTable, VitalsObservation,
};
use chrono::NaiveDate;
use serde_json::Value;

fn fixture_path(name: &str) -> String {
    format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn table() -> Arc<ReferenceTable> {
    let json = fs::read_to_string(fixture_path("reference_table.json"))
        .expect("reference table fixture missing");
    Arc::new(ReferenceTable::from_json_str(&json).expect("reference table is invalid"))
}

fn seed() -> VitalsObservation {
    VitalsObservation {
        height_cm: 130.0,
        systolic: 110.0,
        diastolic: 70.0,
        encounter_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        age: 8.0,
    }
}

#[test]
fn eight_year_old_boy_matches_golden() {
    let engine = CalculatorEngine::init(
        table(),
        Arc::new(StringTable::default()),
        None,
        &seed(),
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
    );

    let actual = serde_json::to_value(engine.view()).expect("view serializes");
    let expected: Value = serde_json::from_str(
        &fs::read_to_string(fixture_path("calculator_8y_male_130.json"))
            .expect("golden payload missing"),
    )
    .expect("golden is not valid JSON");

    assert_eq!(actual, expected);
}

#[test]
fn unset_height_shows_prompt() {
    let mut engine = CalculatorEngine::init(
        table(),
        Arc::new(StringTable::default()),
        None,
        &seed(),
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
    );

    let view = engine.set_field(FormField::Height, "");
    assert!(matches!(view, CalculatorView::Prompt { message } if message == "Please enter patient data"));
}

#[test]
fn out_of_table_age_omits_percentiles_and_thresholds() {
    let mut engine = CalculatorEngine::init(
        table(),
        Arc::new(StringTable::default()),
        None,
        &seed(),
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
    );

    let payload = engine
        .set_field(FormField::AgeYears, "15")
        .payload()
        .cloned()
        .expect("input is still complete");
    assert_eq!(payload.summary_line, "15y 0m, 130 cm, Male, 110/70 mmHg");
    assert_eq!(payload.systolic_pct_label, "");
    assert_eq!(payload.diastolic_pct_label, "");
    assert!(payload.thresholds.is_empty());
    assert_eq!(payload.threshold_block, "");
}

#[test]
fn localized_sex_label_is_used() {
    let strings = StringTable::from_json_str(r#"{ "STR_GENDER_FEMALE": "Femenino" }"#).unwrap();
    let mut engine = CalculatorEngine::init(
        table(),
        Arc::new(strings),
        None,
        &seed(),
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
    );

    let payload = engine.set_field(FormField::Sex, "female").payload().cloned().unwrap();
    assert_eq!(payload.summary_line, "8y 0m, 130 cm, Femenino, 110/70 mmHg");
    assert_eq!(payload.systolic_pct_label, "86%");
}
