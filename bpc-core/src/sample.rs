//! Canned patient used when live data cannot be loaded.

use chrono::NaiveDate;

use crate::model::{Encounter, Patient, PatientRecord, Sex, VitalsObservation};

pub trait SampleDataProvider: Send + Sync {
    fn sample(&self) -> PatientRecord;
}

/// Built-in demonstration patient.
#[derive(Debug, Clone, Copy, Default)]
pub struct CannedSample;

impl SampleDataProvider for CannedSample {
    fn sample(&self) -> PatientRecord {
        let birthdate = ymd(2012, 9, 14);
        let patient = Patient {
            id: Some("sample".to_string()),
            name: Some("Sample Patient".to_string()),
            birthdate,
            sex: Sex::Male,
        };

        let history: Vec<Encounter> = [
            (ymd(2017, 10, 2), 108.0, 96.0, 58.0),
            (ymd(2018, 11, 5), 115.5, 99.0, 61.0),
            (ymd(2019, 9, 30), 121.0, 104.0, 63.0),
            (ymd(2020, 10, 12), 127.5, 108.0, 66.0),
        ]
        .into_iter()
        .map(|(date, height_cm, systolic, diastolic)| Encounter {
            date,
            age: patient.fractional_age_on(date),
            height_cm: Some(height_cm),
            systolic: Some(systolic),
            diastolic: Some(diastolic),
        })
        .collect();

        let vitals = VitalsObservation {
            height_cm: 127.5,
            systolic: 108.0,
            diastolic: 66.0,
            encounter_date: ymd(2020, 10, 12),
            age: patient.fractional_age_on(ymd(2020, 10, 12)).unwrap_or(8.0),
        };

        PatientRecord {
            patient: Some(patient),
            vitals,
            history,
        }
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AgeSpan;

    #[test]
    fn sample_is_stable_and_consistent() {
        let record = CannedSample.sample();
        assert_eq!(record, CannedSample.sample());
        assert_eq!(AgeSpan::from_fractional_years(record.vitals.age), AgeSpan::new(8, 0));
        assert_eq!(record.history.last().map(|e| e.date), Some(record.vitals.encounter_date));
    }
}
