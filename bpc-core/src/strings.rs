//! Localized string lookup by key.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::BpcError;

/// Key/value table of UI strings. Unknown keys resolve to the key itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StringTable {
    entries: HashMap<String, String>,
}

impl Default for StringTable {
    fn default() -> Self {
        let entries = [
            ("STR_GENDER_MALE", "Male"),
            ("STR_GENDER_FEMALE", "Female"),
            ("STR_ENTER_PATIENT_DATA", "Please enter patient data"),
            ("STR_NOTE", "Note"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
        Self { entries }
    }
}

impl StringTable {
    /// Build a table from a flat JSON object; entries overlay the English defaults.
    pub fn from_json_str(json: &str) -> Result<Self, BpcError> {
        let overrides: HashMap<String, String> =
            serde_json::from_str(json).map_err(|err| BpcError::Config(err.to_string()))?;
        Ok(Self::with_overrides(overrides))
    }

    /// English defaults with `overrides` laid on top.
    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        let mut table = Self::default();
        table.entries.extend(overrides);
        table
    }

    pub fn get(&self, key: &str) -> String {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}
