//! Interactive calculator: raw form state in, presentable result out.
//!
//! Every input event (keystroke, change, submit) funnels into
//! [`CalculatorEngine::on_field_changed`], which runs a full, synchronous
//! recompute from the current form state. Nothing is carried over between
//! recomputes except the form itself.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::lookup::{BpReading, PercentileResult, ReferenceLookup, Subject, ThresholdValues};
use crate::model::{AgeSpan, Patient, Sex, VitalsObservation};
use crate::strings::StringTable;

/// Target percentiles of the threshold block, highest first.
pub const TARGET_PERCENTILES: [u32; 3] = [99, 95, 90];

/// Inputs a UI can set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    Height,
    Systolic,
    Diastolic,
    AgeYears,
    AgeMonths,
    Sex,
}

/// Raw form state, exactly as typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CalculatorForm {
    pub height: String,
    pub systolic: String,
    pub diastolic: String,
    pub age_years: String,
    pub age_months: String,
    pub sex: Option<Sex>,
}

impl CalculatorForm {
    /// Initial values from a vitals snapshot.
    pub fn seeded(vitals: &VitalsObservation, sex: Option<Sex>) -> Self {
        let age = AgeSpan::from_fractional_years(vitals.age);
        Self {
            height: format!("{}", vitals.height_cm.round()),
            systolic: format!("{}", vitals.systolic.round()),
            diastolic: format!("{}", vitals.diastolic.round()),
            age_years: age.years.to_string(),
            age_months: age.months.to_string(),
            sex: Some(match sex {
                Some(Sex::Female) => Sex::Female,
                _ => Sex::Male,
            }),
        }
    }

    pub fn set(&mut self, field: FormField, value: &str) {
        match field {
            FormField::Height => self.height = value.to_string(),
            FormField::Systolic => self.systolic = value.to_string(),
            FormField::Diastolic => self.diastolic = value.to_string(),
            FormField::AgeYears => self.age_years = value.to_string(),
            FormField::AgeMonths => self.age_months = value.to_string(),
            FormField::Sex => self.sex = Sex::from_code(value),
        }
    }

    /// Parse the raw fields into typed calculator input.
    pub fn read(&self) -> CalculatorInput {
        CalculatorInput {
            age_years: parse_leading_int(&self.age_years).filter(|years| *years >= 0),
            age_months: parse_leading_int(&self.age_months)
                .filter(|months| (0..=11).contains(months)),
            sex: self.sex,
            height_cm: parse_number(&self.height),
            systolic: parse_number(&self.systolic),
            diastolic: parse_number(&self.diastolic),
        }
    }
}

/// Typed calculator parameters rebuilt on every recompute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct CalculatorInput {
    pub age_years: Option<i64>,
    pub age_months: Option<i64>,
    pub sex: Option<Sex>,
    pub height_cm: Option<f64>,
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
}

impl CalculatorInput {
    /// Fractional age, `years + months / 12`.
    pub fn age(&self) -> Option<f64> {
        Some(self.age_years? as f64 + self.age_months? as f64 / 12.0)
    }

    /// Lookup key, present only when age, height and sex are all set and non-zero.
    pub fn subject(&self) -> Option<Subject> {
        let age = self.age().filter(|age| *age > 0.0)?;
        let height_cm = self
            .height_cm
            .filter(|height| height.is_finite() && *height > 0.0)?;
        Some(Subject {
            age_years: age,
            sex: self.sex?,
            height_m: height_cm / 100.0,
        })
    }

    pub fn reading(&self) -> BpReading {
        BpReading {
            systolic: self.systolic,
            diastolic: self.diastolic,
        }
    }
}

/// Pressures at one target percentile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ThresholdRow {
    pub target_pct: u32,
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
}

impl ThresholdRow {
    fn line(&self) -> String {
        format!(
            "{}% - {} / {} mmHg",
            self.target_pct,
            format_optional(self.systolic),
            format_optional(self.diastolic)
        )
    }
}

/// Display payload of a successful recompute. Field names are stable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultPayload {
    pub summary_line: String,
    /// Age reconciliation note; empty when there is nothing to reconcile.
    pub note: String,
    pub systolic_pct_label: String,
    pub diastolic_pct_label: String,
    /// Threshold rows, one per line, highest percentile first.
    pub threshold_block: String,
    pub percentiles: PercentileResult,
    pub thresholds: Vec<ThresholdRow>,
}

/// What the calculator panel shows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalculatorView {
    Prompt { message: String },
    Result(ResultPayload),
}

impl CalculatorView {
    pub fn payload(&self) -> Option<&ResultPayload> {
        match self {
            CalculatorView::Result(payload) => Some(payload),
            CalculatorView::Prompt { .. } => None,
        }
    }
}

pub struct CalculatorEngine {
    lookup: Arc<dyn ReferenceLookup>,
    strings: Arc<StringTable>,
    form: CalculatorForm,
    patient_age: Option<AgeSpan>,
    encounter_date: NaiveDate,
    view: CalculatorView,
}

impl CalculatorEngine {
    /// Seed the form from the snapshot and run the first recompute.
    ///
    /// `today` anchors the patient's current age used for the reconciliation note.
    pub fn init(
        lookup: Arc<dyn ReferenceLookup>,
        strings: Arc<StringTable>,
        patient: Option<&Patient>,
        vitals: &VitalsObservation,
        today: NaiveDate,
    ) -> Self {
        let patient_age = patient.and_then(|patient| patient.age_on(today));
        let form = CalculatorForm::seeded(vitals, patient.map(|patient| patient.sex));
        let mut engine = Self {
            lookup,
            strings,
            form,
            patient_age,
            encounter_date: vitals.encounter_date,
            view: CalculatorView::Prompt {
                message: String::new(),
            },
        };
        engine.on_field_changed();
        engine
    }

    pub fn form(&self) -> &CalculatorForm {
        &self.form
    }

    /// Latest result of [`CalculatorEngine::on_field_changed`].
    pub fn view(&self) -> &CalculatorView {
        &self.view
    }

    /// Update one field and recompute.
    pub fn set_field(&mut self, field: FormField, value: &str) -> &CalculatorView {
        self.form.set(field, value);
        self.on_field_changed()
    }

    /// Replace the whole form, e.g. when restoring UI state, and recompute.
    pub fn replace_form(&mut self, form: CalculatorForm) -> &CalculatorView {
        self.form = form;
        self.on_field_changed()
    }

    /// Single entry point for every input event source.
    pub fn on_field_changed(&mut self) -> &CalculatorView {
        self.view = self.recompute();
        &self.view
    }

    /// Full pass from the current form state to a view.
    pub fn recompute(&self) -> CalculatorView {
        let input = self.form.read();
        let Some(subject) = input.subject() else {
            debug!(?input, "calculator input incomplete");
            return CalculatorView::Prompt {
                message: self.strings.get("STR_ENTER_PATIENT_DATA"),
            };
        };

        let years = input.age_years.unwrap_or_default();
        let months = input.age_months.unwrap_or_default();
        let summary_line = format!(
            "{years}y {months}m, {} cm, {}, {}/{} mmHg",
            format_number((subject.height_m * 100.0).round()),
            self.strings.get(subject.sex.label_key()),
            format_optional(input.systolic),
            format_optional(input.diastolic),
        );

        let note = match self.patient_age {
            Some(age) if i64::from(age.years) != years || i64::from(age.months) != months => {
                format!(
                    "{}: Patient is currently {}y {}m old (initial calculator values based on encounter from {})",
                    self.strings.get("STR_NOTE"),
                    age.years,
                    age.months,
                    self.encounter_date
                )
            }
            _ => String::new(),
        };

        let percentiles = self.lookup.percentile_of(&subject, &input.reading());

        let thresholds: Vec<ThresholdRow> = TARGET_PERCENTILES
            .iter()
            .filter_map(|&target| {
                let values = self.lookup.value_at_percentile(&subject, f64::from(target));
                (!values.is_empty()).then_some(ThresholdRow {
                    target_pct: target,
                    systolic: values.systolic,
                    diastolic: values.diastolic,
                })
            })
            .collect();

        let threshold_block = thresholds
            .iter()
            .map(ThresholdRow::line)
            .collect::<Vec<_>>()
            .join("\n");

        debug!(summary = %summary_line, rows = thresholds.len(), "calculator recomputed");

        CalculatorView::Result(ResultPayload {
            summary_line,
            note,
            systolic_pct_label: percentile_label(percentiles.systolic),
            diastolic_pct_label: percentile_label(percentiles.diastolic),
            threshold_block,
            percentiles,
            thresholds,
        })
    }
}

fn percentile_label(pct: Option<f64>) -> String {
    match pct {
        Some(value) if value != 0.0 && value.is_finite() => format!("{}%", format_number(value)),
        _ => String::new(),
    }
}

fn format_optional(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_else(|| "-".to_string())
}

fn format_number(value: f64) -> String {
    // Folds -0 into 0.
    let value = value + 0.0;
    if value.fract().abs() < f64::EPSILON {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

/// Leading-integer parse: optional whitespace and sign, then digits; the rest is ignored.
fn parse_leading_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|value| sign * value)
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}
