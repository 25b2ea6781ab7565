//! Patient demographics, vitals snapshots and age arithmetic.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::BpcError;

/// Administrative sex as used by the reference tables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    /// Parse a FHIR `gender` code or a form value.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "male" => Some(Sex::Male),
            "female" => Some(Sex::Female),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }

    /// Key of the localized label, e.g. `STR_GENDER_MALE`.
    pub fn label_key(self) -> &'static str {
        match self {
            Sex::Male => "STR_GENDER_MALE",
            Sex::Female => "STR_GENDER_FEMALE",
        }
    }
}

/// Age split into whole years and remaining whole months.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AgeSpan {
    pub years: u32,
    pub months: u32,
}

impl AgeSpan {
    pub fn new(years: u32, months: u32) -> Self {
        Self { years, months }
    }

    /// Split a fractional age in years, e.g. `8.5` becomes `8y 6m`.
    pub fn from_fractional_years(age: f64) -> Self {
        if !age.is_finite() || age <= 0.0 {
            return Self::default();
        }
        let years = age.floor();
        let months = (12.0 * (age - years)).floor().min(11.0);
        Self {
            years: years as u32,
            months: months as u32,
        }
    }

    /// Calendar age between `birth` and `on`. `None` when `on` precedes `birth`.
    pub fn between(birth: NaiveDate, on: NaiveDate) -> Option<Self> {
        if on < birth {
            return None;
        }
        let mut months = (on.year() - birth.year()) * 12 + on.month() as i32 - birth.month() as i32;
        if on.day() < birth.day() {
            months -= 1;
        }
        let months = months.max(0) as u32;
        Some(Self {
            years: months / 12,
            months: months % 12,
        })
    }

    /// Fractional-year encoding expected by the reference lookup.
    pub fn as_years(&self) -> f64 {
        self.years as f64 + self.months as f64 / 12.0
    }
}

/// Demographics of the loaded patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: Option<String>,
    pub name: Option<String>,
    pub birthdate: NaiveDate,
    pub sex: Sex,
}

impl Patient {
    pub fn age_on(&self, date: NaiveDate) -> Option<AgeSpan> {
        AgeSpan::between(self.birthdate, date)
    }

    /// Fractional age in years on `date`, with day precision.
    pub fn fractional_age_on(&self, date: NaiveDate) -> Option<f64> {
        let span = self.age_on(date)?;
        let anniversary = add_months(self.birthdate, span.years * 12 + span.months)?;
        let next = add_months(self.birthdate, span.years * 12 + span.months + 1)?;
        let month_len = (next - anniversary).num_days().max(1) as f64;
        let into_month = (date - anniversary).num_days() as f64;
        Some(span.as_years() + into_month / month_len / 12.0)
    }
}

fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(chrono::Months::new(months))
}

/// Clinical snapshot used to seed the calculator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VitalsObservation {
    pub height_cm: f64,
    pub systolic: f64,
    pub diastolic: f64,
    pub encounter_date: NaiveDate,
    /// Age in fractional years at the encounter.
    pub age: f64,
}

/// One dated set of measurements from the vitals history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Encounter {
    pub date: NaiveDate,
    pub age: Option<f64>,
    pub height_cm: Option<f64>,
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
}

impl Encounter {
    pub fn has_blood_pressure(&self) -> bool {
        self.systolic.is_some() && self.diastolic.is_some()
    }
}

/// Everything the application needs to start: demographics plus the seed vitals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientRecord {
    pub patient: Option<Patient>,
    pub vitals: VitalsObservation,
    #[serde(default)]
    pub history: Vec<Encounter>,
}

/// Turns raw demographics and vitals resources into a [`PatientRecord`].
pub trait Normalizer: Send + Sync {
    fn normalize(&self, demographics: &Value, vitals: &Value) -> Result<PatientRecord, BpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn splits_fractional_age() {
        assert_eq!(AgeSpan::from_fractional_years(8.0), AgeSpan::new(8, 0));
        assert_eq!(AgeSpan::from_fractional_years(8.5), AgeSpan::new(8, 6));
        assert_eq!(AgeSpan::from_fractional_years(3.999), AgeSpan::new(3, 11));
        assert_eq!(AgeSpan::from_fractional_years(f64::NAN), AgeSpan::default());
    }

    #[test]
    fn calendar_age_respects_day_of_month() {
        let birth = date(2015, 3, 20);
        assert_eq!(
            AgeSpan::between(birth, date(2023, 3, 19)),
            Some(AgeSpan::new(7, 11))
        );
        assert_eq!(
            AgeSpan::between(birth, date(2023, 3, 20)),
            Some(AgeSpan::new(8, 0))
        );
        assert_eq!(AgeSpan::between(birth, date(2014, 1, 1)), None);
    }

    #[test]
    fn fractional_age_stays_within_month() {
        let patient = Patient {
            id: None,
            name: None,
            birthdate: date(2016, 1, 1),
            sex: Sex::Female,
        };
        let age = patient.fractional_age_on(date(2024, 7, 16)).unwrap();
        assert!(age > 8.5 && age < 8.5 + 1.0 / 12.0, "age was {age}");
        assert_eq!(AgeSpan::from_fractional_years(age), AgeSpan::new(8, 6));
    }

    #[test]
    fn parses_sex_codes() {
        assert_eq!(Sex::from_code("Female"), Some(Sex::Female));
        assert_eq!(Sex::from_code(" male "), Some(Sex::Male));
        assert_eq!(Sex::from_code("unknown"), None);
    }
}
