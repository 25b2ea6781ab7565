//! FHIR JSON to `PatientRecord` converter.
//!
//! Reads a `Patient` resource and a set of vital-sign `Observation`s (a
//! `Bundle`, or a bare array of resources/entries), groups the measurements by
//! date and picks the most recent complete blood pressure reading as the
//! calculator seed.

use std::collections::BTreeMap;

use bpc_core::{
    BpcError, Encounter, Normalizer, Patient, PatientRecord, Sex, VitalsObservation,
};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde_json::Value;

const LOINC_HEIGHT: &str = "8302-2";
const LOINC_SYSTOLIC: &str = "8480-6";
const LOINC_DIASTOLIC: &str = "8462-4";
const LOINC_BP_PANELS: [&str; 2] = ["55284-4", "85354-9"];

/// [`Normalizer`] for FHIR R4 JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct FhirNormalizer;

impl Normalizer for FhirNormalizer {
    fn normalize(&self, demographics: &Value, vitals: &Value) -> Result<PatientRecord, BpcError> {
        normalize_value(demographics, vitals)
    }
}

/// Normalize resources given as JSON strings.
pub fn normalize_str(
    demographics_json: &str,
    vitals_json: &str,
) -> Result<PatientRecord, BpcError> {
    let demographics: Value = serde_json::from_str(demographics_json)
        .map_err(|err| BpcError::Parse(format!("demographics: {err}")))?;
    let vitals: Value = serde_json::from_str(vitals_json)
        .map_err(|err| BpcError::Parse(format!("vitals: {err}")))?;
    normalize_value(&demographics, &vitals)
}

/// Normalize resources given as `serde_json::Value`s.
pub fn normalize_value(demographics: &Value, vitals: &Value) -> Result<PatientRecord, BpcError> {
    let patient = parse_patient(demographics)?;

    let mut by_date: BTreeMap<NaiveDate, Encounter> = BTreeMap::new();
    for resource in observation_resources(vitals)? {
        if !is_usable_observation(resource) {
            continue;
        }
        if !is_tracked_vital(resource) {
            continue;
        }
        let Some(date) = extract_observation_date(resource) else {
            continue;
        };
        let encounter = by_date.entry(date).or_insert_with(|| Encounter {
            date,
            age: patient.fractional_age_on(date),
            height_cm: None,
            systolic: None,
            diastolic: None,
        });
        absorb_observation(encounter, resource);
    }

    let history: Vec<Encounter> = by_date.into_values().collect();
    let vitals = seed_vitals(&patient, &history)?;

    Ok(PatientRecord {
        patient: Some(patient),
        vitals,
        history,
    })
}

fn parse_patient(resource: &Value) -> Result<Patient, BpcError> {
    let resource_type = resource
        .get("resourceType")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if resource_type != "Patient" {
        return Err(BpcError::Normalize(format!(
            "expected resourceType Patient, received {resource_type:?}"
        )));
    }

    let birthdate = resource
        .get("birthDate")
        .and_then(Value::as_str)
        .and_then(parse_date)
        .ok_or_else(|| BpcError::Normalize("patient birthDate missing or invalid".to_string()))?;

    let sex = resource
        .get("gender")
        .and_then(Value::as_str)
        .and_then(Sex::from_code)
        .ok_or_else(|| BpcError::Normalize("patient gender must be male or female".to_string()))?;

    Ok(Patient {
        id: resource.get("id").and_then(Value::as_str).map(str::to_string),
        name: extract_patient_name(resource),
        birthdate,
        sex,
    })
}

fn observation_resources(vitals: &Value) -> Result<Vec<&Value>, BpcError> {
    let items = if let Some(items) = vitals.as_array() {
        items
    } else if vitals.get("resourceType").and_then(Value::as_str) == Some("Bundle") {
        match vitals.get("entry").and_then(Value::as_array) {
            Some(entries) => entries,
            None => return Ok(Vec::new()),
        }
    } else {
        return Err(BpcError::Normalize(
            "vitals must be a Bundle or an array of resources".to_string(),
        ));
    };

    Ok(items
        .iter()
        .map(|item| item.get("resource").unwrap_or(item))
        .filter(|resource| {
            resource.get("resourceType").and_then(Value::as_str) == Some("Observation")
        })
        .collect())
}

fn is_usable_observation(resource: &Value) -> bool {
    !matches!(
        resource.get("status").and_then(Value::as_str),
        Some("entered-in-error" | "cancelled")
    )
}

fn is_tracked_vital(resource: &Value) -> bool {
    let codes = loinc_codes(resource.get("code"));
    codes.iter().any(|code| {
        [LOINC_HEIGHT, LOINC_SYSTOLIC, LOINC_DIASTOLIC]
            .iter()
            .chain(LOINC_BP_PANELS.iter())
            .any(|tracked| tracked == code)
    })
}

fn absorb_observation(encounter: &mut Encounter, resource: &Value) {
    let codes = loinc_codes(resource.get("code"));

    if codes.contains(&LOINC_HEIGHT) {
        if encounter.height_cm.is_none() {
            encounter.height_cm = resource.get("valueQuantity").and_then(height_in_cm);
        }
        return;
    }

    if codes
        .iter()
        .any(|code| LOINC_BP_PANELS.iter().any(|panel| panel == code))
    {
        let components = resource
            .get("component")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for component in components {
            let component_codes = loinc_codes(component.get("code"));
            let value = component.get("valueQuantity").and_then(quantity_value);
            record_pressure(encounter, &component_codes, value);
        }
        return;
    }

    let value = resource.get("valueQuantity").and_then(quantity_value);
    record_pressure(encounter, &codes, value);
}

fn record_pressure(encounter: &mut Encounter, codes: &[&str], value: Option<f64>) {
    if codes.contains(&LOINC_SYSTOLIC) && encounter.systolic.is_none() {
        encounter.systolic = value;
    }
    if codes.contains(&LOINC_DIASTOLIC) && encounter.diastolic.is_none() {
        encounter.diastolic = value;
    }
}

fn seed_vitals(patient: &Patient, history: &[Encounter]) -> Result<VitalsObservation, BpcError> {
    let (index, latest) = history
        .iter()
        .enumerate()
        .rev()
        .find(|(_, encounter)| encounter.has_blood_pressure())
        .ok_or_else(|| BpcError::Normalize("no complete blood pressure reading".to_string()))?;

    let height_cm = history[..=index]
        .iter()
        .rev()
        .find_map(|encounter| encounter.height_cm)
        .ok_or_else(|| {
            BpcError::Normalize(format!("no height recorded on or before {}", latest.date))
        })?;

    let age = latest.age.ok_or_else(|| {
        BpcError::Normalize(format!(
            "encounter {} precedes birth date {}",
            latest.date, patient.birthdate
        ))
    })?;

    Ok(VitalsObservation {
        height_cm,
        systolic: latest.systolic.unwrap_or_default(),
        diastolic: latest.diastolic.unwrap_or_default(),
        encounter_date: latest.date,
        age,
    })
}

fn extract_patient_name(resource: &Value) -> Option<String> {
    let names = resource.get("name")?.as_array()?;
    let name = names.first()?;
    if let Some(text) = name.get("text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return Some(text.trim().to_string());
        }
    }
    let given = name
        .get("given")
        .and_then(Value::as_array)
        .map(|parts| parts.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let family = name.get("family").and_then(Value::as_str).unwrap_or("");
    let full = format!("{given} {family}").trim().to_string();
    if full.is_empty() {
        None
    } else {
        Some(full)
    }
}

fn loinc_codes(concept: Option<&Value>) -> Vec<&str> {
    concept
        .and_then(|concept| concept.get("coding"))
        .and_then(Value::as_array)
        .map(|codings| {
            codings
                .iter()
                .filter(|coding| {
                    coding
                        .get("system")
                        .and_then(Value::as_str)
                        .map_or(true, |system| system.contains("loinc"))
                })
                .filter_map(|coding| coding.get("code").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

fn quantity_value(quantity: &Value) -> Option<f64> {
    quantity
        .get("value")
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
}

fn height_in_cm(quantity: &Value) -> Option<f64> {
    let value = quantity_value(quantity)?;
    let unit = quantity
        .get("code")
        .or_else(|| quantity.get("unit"))
        .and_then(Value::as_str)
        .unwrap_or("cm");
    match unit {
        "cm" => Some(value),
        "m" => Some(value * 100.0),
        "[in_i]" | "in" | "[in_us]" => Some(value * 2.54),
        _ => None,
    }
}

fn extract_observation_date(resource: &Value) -> Option<NaiveDate> {
    for field in ["effectiveDateTime", "effectiveInstant", "effectivePeriod", "issued"] {
        let Some(value) = resource.get(field) else {
            continue;
        };

        if let Some(text) = value.as_str() {
            if let Some(date) = parse_date_or_datetime(text) {
                return Some(date);
            }
        }

        if let Some(start) = value.get("start").and_then(Value::as_str) {
            if let Some(date) = parse_date_or_datetime(start) {
                return Some(date);
            }
        }
    }
    None
}

fn parse_date_or_datetime(value: &str) -> Option<NaiveDate> {
    parse_datetime(value)
        .map(|dt| dt.date_naive())
        .or_else(|| parse_date(value))
}

/// Keeps the recorded offset so the calendar date is the one the reading was taken on.
fn parse_datetime(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).ok()
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}
