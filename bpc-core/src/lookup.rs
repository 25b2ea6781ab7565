//! Reference lookups: percentile of a blood pressure value and the value at a
//! target percentile, for a given age, sex and height.
//!
//! [`ReferenceTable`] models each demographic cell as a normal distribution
//! (mean and standard deviation in mmHg), the way the pediatric reference
//! tables are derived.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::model::Sex;
use crate::BpcError;

/// Demographic key of a lookup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Subject {
    /// Fractional years, `years + months / 12`.
    pub age_years: f64,
    pub sex: Sex,
    pub height_m: f64,
}

/// Measured pressures in mmHg.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct BpReading {
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct PercentileResult {
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
}

/// Pressures (mmHg) sitting exactly at a target percentile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ThresholdValues {
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
}

impl ThresholdValues {
    pub fn is_empty(&self) -> bool {
        self.systolic.is_none() && self.diastolic.is_none()
    }
}

/// Pure lookup against reference data.
pub trait ReferenceLookup: Send + Sync {
    /// Percentile rank of each measured value.
    fn percentile_of(&self, subject: &Subject, reading: &BpReading) -> PercentileResult;

    /// Pressures corresponding to `target` percent for the subject.
    fn value_at_percentile(&self, subject: &Subject, target: f64) -> ThresholdValues;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Distribution {
    pub mean: f64,
    pub sd: f64,
}

impl Distribution {
    fn percentile(&self, value: f64) -> f64 {
        let rank = normal_cdf((value - self.mean) / self.sd) * 100.0;
        rank.round().clamp(1.0, 99.0)
    }

    fn value_at(&self, target: f64) -> f64 {
        (self.mean + self.sd * normal_quantile(target / 100.0)).round()
    }
}

/// One demographic cell of the reference table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceRow {
    pub sex: Sex,
    pub age_years: u32,
    pub height_cm: f64,
    pub systolic: Distribution,
    pub diastolic: Distribution,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReferenceTable {
    rows: Vec<ReferenceRow>,
}

impl ReferenceTable {
    pub fn new(rows: Vec<ReferenceRow>) -> Result<Self, BpcError> {
        if let Some(row) = rows
            .iter()
            .find(|row| !(row.systolic.sd > 0.0 && row.diastolic.sd > 0.0))
        {
            return Err(BpcError::Config(format!(
                "non-positive standard deviation for {} aged {} at {} cm",
                row.sex.code(),
                row.age_years,
                row.height_cm
            )));
        }
        Ok(Self { rows })
    }

    /// Load a table from `{ "rows": [...] }`.
    pub fn from_json_str(json: &str) -> Result<Self, BpcError> {
        let table: ReferenceTable =
            serde_json::from_str(json).map_err(|err| BpcError::Config(err.to_string()))?;
        Self::new(table.rows)
    }

    pub fn rows(&self) -> &[ReferenceRow] {
        &self.rows
    }

    /// Row for the subject's whole-year age and sex with the nearest height.
    pub fn row_for(&self, subject: &Subject) -> Option<&ReferenceRow> {
        if !subject.age_years.is_finite() || subject.age_years < 0.0 {
            return None;
        }
        let age = subject.age_years.floor() as u32;
        let height_cm = subject.height_m * 100.0;
        self.rows
            .iter()
            .filter(|row| row.sex == subject.sex && row.age_years == age)
            .min_by(|a, b| {
                let da = (a.height_cm - height_cm).abs();
                let db = (b.height_cm - height_cm).abs();
                da.partial_cmp(&db).unwrap_or(Ordering::Equal)
            })
    }
}

impl ReferenceLookup for ReferenceTable {
    fn percentile_of(&self, subject: &Subject, reading: &BpReading) -> PercentileResult {
        let Some(row) = self.row_for(subject) else {
            return PercentileResult::default();
        };
        PercentileResult {
            systolic: reading.systolic.map(|value| row.systolic.percentile(value)),
            diastolic: reading.diastolic.map(|value| row.diastolic.percentile(value)),
        }
    }

    fn value_at_percentile(&self, subject: &Subject, target: f64) -> ThresholdValues {
        if !(target > 0.0 && target < 100.0) {
            return ThresholdValues::default();
        }
        let Some(row) = self.row_for(subject) else {
            return ThresholdValues::default();
        };
        ThresholdValues {
            systolic: Some(row.systolic.value_at(target)),
            diastolic: Some(row.diastolic.value_at(target)),
        }
    }
}

/// Standard normal CDF (Abramowitz & Stegun 26.2.17).
pub fn normal_cdf(x: f64) -> f64 {
    let x_abs = x.abs();
    let t = 1.0 / (1.0 + 0.2316419 * x_abs);
    let density = 0.3989422804014327 * (-x_abs * x_abs / 2.0).exp();
    let poly = t
        * (0.319381530
            + t * (-0.356563782 + t * (1.781477937 + t * (-1.821255978 + t * 1.330274429))));

    if x >= 0.0 {
        1.0 - density * poly
    } else {
        density * poly
    }
}

/// Inverse standard normal CDF (Abramowitz & Stegun 26.2.23) for `p` in (0, 1).
pub fn normal_quantile(p: f64) -> f64 {
    if (p - 0.5).abs() < f64::EPSILON {
        return 0.0;
    }
    let tail = if p > 0.5 { 1.0 - p } else { p };
    let t = (-2.0 * tail.ln()).sqrt();

    let c0 = 2.515517;
    let c1 = 0.802853;
    let c2 = 0.010328;
    let d1 = 1.432788;
    let d2 = 0.189269;
    let d3 = 0.001308;

    let z = t - (c0 + c1 * t + c2 * t * t) / (1.0 + d1 * t + d2 * t * t + d3 * t * t * t);
    if p > 0.5 {
        z
    } else {
        -z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(sex: Sex, age_years: u32, height_cm: f64, sys_mean: f64) -> ReferenceRow {
        ReferenceRow {
            sex,
            age_years,
            height_cm,
            systolic: Distribution {
                mean: sys_mean,
                sd: 10.0,
            },
            diastolic: Distribution {
                mean: 60.0,
                sd: 10.0,
            },
        }
    }

    fn subject(age_years: f64, sex: Sex, height_cm: f64) -> Subject {
        Subject {
            age_years,
            sex,
            height_m: height_cm / 100.0,
        }
    }

    #[test]
    fn normal_helpers_match_known_values() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-6);
        assert!((normal_cdf(1.96) - 0.975).abs() < 0.002);
        assert!((normal_cdf(-1.96) - 0.025).abs() < 0.002);
        assert!((normal_quantile(0.95) - 1.645).abs() < 0.01);
        assert!((normal_quantile(0.99) - 2.326).abs() < 0.01);
        assert!((normal_quantile(0.10) + 1.2816).abs() < 0.01);
    }

    #[test]
    fn picks_nearest_height_for_age_and_sex() {
        let table = ReferenceTable::new(vec![
            row(Sex::Male, 8, 120.0, 95.0),
            row(Sex::Male, 8, 130.0, 100.0),
            row(Sex::Female, 8, 130.0, 97.0),
            row(Sex::Male, 9, 130.0, 102.0),
        ])
        .unwrap();

        let found = table.row_for(&subject(8.9, Sex::Male, 128.0)).unwrap();
        assert_eq!(found.height_cm, 130.0);
        assert_eq!(found.systolic.mean, 100.0);
        assert!(table.row_for(&subject(12.0, Sex::Male, 130.0)).is_none());
    }

    #[test]
    fn percentile_and_reverse_lookup_use_the_same_row() {
        let table = ReferenceTable::new(vec![row(Sex::Male, 8, 130.0, 100.0)]).unwrap();
        let who = subject(8.0, Sex::Male, 130.0);

        let pct = table.percentile_of(
            &who,
            &BpReading {
                systolic: Some(110.0),
                diastolic: Some(60.0),
            },
        );
        assert_eq!(pct.systolic, Some(84.0));
        assert_eq!(pct.diastolic, Some(50.0));

        let at95 = table.value_at_percentile(&who, 95.0);
        assert_eq!(at95.systolic, Some(116.0));
        assert_eq!(at95.diastolic, Some(76.0));
        assert!(table.value_at_percentile(&who, 100.0).is_empty());
    }

    #[test]
    fn extreme_values_are_clamped() {
        let table = ReferenceTable::new(vec![row(Sex::Male, 8, 130.0, 100.0)]).unwrap();
        let pct = table.percentile_of(
            &subject(8.0, Sex::Male, 130.0),
            &BpReading {
                systolic: Some(200.0),
                diastolic: Some(0.0),
            },
        );
        assert_eq!(pct.systolic, Some(99.0));
        assert_eq!(pct.diastolic, Some(1.0));
    }

    #[test]
    fn rejects_degenerate_rows() {
        let mut bad = row(Sex::Female, 5, 110.0, 90.0);
        bad.diastolic.sd = 0.0;
        assert!(matches!(
            ReferenceTable::new(vec![bad]),
            Err(BpcError::Config(_))
        ));
    }
}
