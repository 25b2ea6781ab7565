//! Process-wide application settings.

use serde::{Deserialize, Serialize};

use crate::BpcError;

/// Views a UI layer can select.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum View {
    ShortTerm,
    LongTerm,
    Table,
    Calculator,
}

/// Default state of one history filter toggle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterButtonSetting {
    pub handle: String,
    pub on_by_default: bool,
}

/// Percentile band drawn on the charts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Zone {
    pub label: String,
    /// Width of the band in percentile points, counted from the top.
    pub percentage: f64,
    pub color: String,
}

/// Settings shared read-only by every collaborator once the app starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSettings {
    pub default_view: View,
    pub hide_patient_header: bool,
    pub filter_buttons_settings: Vec<FilterButtonSetting>,
    pub zones: Vec<Zone>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_view: View::Calculator,
            hide_patient_header: false,
            filter_buttons_settings: vec![
                FilterButtonSetting {
                    handle: "chkFilterInpatient".to_string(),
                    on_by_default: true,
                },
                FilterButtonSetting {
                    handle: "chkFilterAmbulatory".to_string(),
                    on_by_default: true,
                },
                FilterButtonSetting {
                    handle: "chkFilterArm".to_string(),
                    on_by_default: true,
                },
                FilterButtonSetting {
                    handle: "chkFilterLeg".to_string(),
                    on_by_default: false,
                },
            ],
            zones: vec![
                Zone {
                    label: "Hypertension".to_string(),
                    percentage: 5.0,
                    color: "#e8a6a6".to_string(),
                },
                Zone {
                    label: "Prehypertension".to_string(),
                    percentage: 5.0,
                    color: "#f4e5a1".to_string(),
                },
                Zone {
                    label: "Normal".to_string(),
                    percentage: 90.0,
                    color: "#c9e4c0".to_string(),
                },
            ],
        }
    }
}

/// Partial settings document; missing keys keep their defaults.
#[derive(Debug, Default, Deserialize)]
struct SettingsOverlay {
    #[serde(default)]
    default_view: Option<View>,
    #[serde(default)]
    hide_patient_header: Option<bool>,
    #[serde(default)]
    filter_buttons_settings: Option<Vec<FilterButtonSetting>>,
    #[serde(default)]
    zones: Option<Vec<Zone>>,
}

impl AppSettings {
    /// Read settings from JSON, filling absent keys from [`AppSettings::default`].
    pub fn from_json_str(json: &str) -> Result<Self, BpcError> {
        let overlay: SettingsOverlay =
            serde_json::from_str(json).map_err(|err| BpcError::Config(err.to_string()))?;
        let settings = Self::default().with_overlay(overlay);
        settings.validate()?;
        Ok(settings)
    }

    fn with_overlay(mut self, overlay: SettingsOverlay) -> Self {
        if let Some(view) = overlay.default_view {
            self.default_view = view;
        }
        if let Some(hide) = overlay.hide_patient_header {
            self.hide_patient_header = hide;
        }
        if let Some(buttons) = overlay.filter_buttons_settings {
            self.filter_buttons_settings = buttons;
        }
        if let Some(zones) = overlay.zones {
            self.zones = zones;
        }
        self
    }

    fn validate(&self) -> Result<(), BpcError> {
        let total: f64 = self.zones.iter().map(|zone| zone.percentage).sum();
        if self.zones.iter().any(|zone| zone.percentage < 0.0) || total > 100.0 + f64::EPSILON {
            return Err(BpcError::Config(format!(
                "zone percentages must be non-negative and sum to at most 100, got {total}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_keeps_defaults() {
        let settings =
            AppSettings::from_json_str(r#"{ "default_view": "long_term" }"#).unwrap();
        assert_eq!(settings.default_view, View::LongTerm);
        assert!(!settings.hide_patient_header);
        assert_eq!(settings.zones, AppSettings::default().zones);
    }

    #[test]
    fn rejects_oversized_zones() {
        let err = AppSettings::from_json_str(
            r#"{ "zones": [{ "label": "All", "percentage": 120, "color": "red" }] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, BpcError::Config(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            AppSettings::from_json_str("{"),
            Err(BpcError::Config(_))
        ));
    }
}
