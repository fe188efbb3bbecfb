// src/settings.rs

use crate::error::Result;
use crate::selection::{ComponentSelection, SelectionState};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::num::NonZeroUsize;

/// Largest number of components a fit is ever asked for.
pub const MAX_COMPONENTS: usize = 100;

/// Keys written by older versions that no longer mean anything.
const DEPRECATED_KEYS: [&str; 4] = ["decomposition_idx", "batch_size", "address", "auto_update"];

/// Persisted controller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaSettings {
    /// Selected component count, 0 for all.
    #[serde(rename = "ncomponents")]
    pub n_components: ComponentSelection,
    /// Covered variance in whole percent, 1..=100.
    pub variance_covered: u8,
    pub auto_commit: bool,
    pub normalize: bool,
    /// Components requested from the decomposition.
    pub max_components: usize,
}

impl Default for PcaSettings {
    fn default() -> Self {
        Self {
            n_components: ComponentSelection::Count(NonZeroUsize::MIN.saturating_add(1)),
            variance_covered: 100,
            auto_commit: true,
            normalize: true,
            max_components: MAX_COMPONENTS,
        }
    }
}

impl PcaSettings {
    /// Loads settings from their JSON form, upgrading older layouts first.
    ///
    /// # Examples
    ///
    /// ```
    /// use pca_select::{ComponentSelection, PcaSettings};
    ///
    /// let settings = PcaSettings::from_json(serde_json::json!({
    ///     "ncomponents": 0,
    ///     "variance_covered": 87.9,
    ///     "batch_size": 500,
    /// })).unwrap();
    /// assert_eq!(settings.n_components, ComponentSelection::All);
    /// assert_eq!(settings.variance_covered, 87);
    /// ```
    pub fn from_json(value: Value) -> Result<Self> {
        let mut value = value;
        if let Value::Object(map) = &mut value {
            migrate_settings(map);
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn selection_state(&self) -> SelectionState {
        SelectionState {
            selection: self.n_components,
            variance_percent: self.variance_covered.clamp(1, 100),
        }
    }
}

/// Rewrites a persisted settings map in place so it deserializes cleanly.
///
/// * `variance_covered`: finite numbers are truncated to an integer and
///   clamped to 1..=100; non-finite values (JSON `null`, or strings such as
///   `"NaN"` left by an old bug) are reset to 100.
/// * `ncomponents` above the configured maximum is clamped to it.
/// * deprecated keys are dropped.
pub fn migrate_settings(settings: &mut Map<String, Value>) {
    if let Some(vc) = settings.get_mut("variance_covered") {
        let numeric = match &*vc {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Null => Some(f64::NAN),
            _ => None,
        };
        if let Some(raw) = numeric {
            let migrated = if raw.is_finite() {
                raw.trunc().clamp(1.0, 100.0) as u64
            } else {
                100
            };
            debug!("Migrated variance_covered {} -> {}.", vc, migrated);
            *vc = Value::from(migrated);
        }
    }

    let max_components = settings
        .get("max_components")
        .and_then(Value::as_u64)
        .map_or(MAX_COMPONENTS as u64, |m| m.clamp(1, MAX_COMPONENTS as u64));
    if let Some(n) = settings.get("ncomponents").and_then(Value::as_u64) {
        if n > max_components {
            debug!("Clamped ncomponents {} to {}.", n, max_components);
            settings.insert("ncomponents".to_string(), Value::from(max_components));
        }
    }

    for key in DEPRECATED_KEYS {
        if settings.remove(key).is_some() {
            debug!("Dropped deprecated setting {:?}.", key);
        }
    }
}
