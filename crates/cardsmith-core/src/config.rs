//! Editor tuning knobs.
//!
//! Every field has a default so a partial JSON document (or none at all)
//! yields a usable configuration.

use crate::preset::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Quiescence window for session autosave, in milliseconds.
pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 1000;
/// Smallest width/height a layer can be resized to, in canvas pixels.
pub const DEFAULT_MIN_LAYER_SIZE: f64 = 20.0;
/// Offset applied to both axes when duplicating a layer.
pub const DEFAULT_DUPLICATE_OFFSET: f64 = 20.0;
/// Largest accepted upload (25 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;
/// Handle hit tolerance in canvas pixels.
pub const DEFAULT_HANDLE_HIT_TOLERANCE: f64 = 12.0;
/// Distance from the top edge to the rotate control.
pub const DEFAULT_ROTATE_HANDLE_OFFSET: f64 = 25.0;
/// Preview regeneration debounce, in milliseconds.
pub const DEFAULT_PREVIEW_DEBOUNCE_MS: u64 = 250;

/// Editor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub autosave_debounce_ms: u64,
    pub min_layer_size: f64,
    pub duplicate_offset: f64,
    pub max_upload_bytes: u64,
    pub handle_hit_tolerance: f64,
    pub rotate_handle_offset: f64,
    pub preview_debounce_ms: u64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            autosave_debounce_ms: DEFAULT_AUTOSAVE_DEBOUNCE_MS,
            min_layer_size: DEFAULT_MIN_LAYER_SIZE,
            duplicate_offset: DEFAULT_DUPLICATE_OFFSET,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            handle_hit_tolerance: DEFAULT_HANDLE_HIT_TOLERANCE,
            rotate_handle_offset: DEFAULT_ROTATE_HANDLE_OFFSET,
            preview_debounce_ms: DEFAULT_PREVIEW_DEBOUNCE_MS,
        }
    }
}

impl EditorConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the editor misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_layer_size.is_finite() && self.min_layer_size > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "min_layer_size must be positive, got {}",
                self.min_layer_size
            )));
        }
        if !self.duplicate_offset.is_finite() {
            return Err(ConfigError::Invalid("duplicate_offset must be finite".into()));
        }
        if !(self.handle_hit_tolerance.is_finite() && self.handle_hit_tolerance >= 0.0) {
            return Err(ConfigError::Invalid(
                "handle_hit_tolerance must be non-negative".into(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("max_upload_bytes must be non-zero".into()));
        }
        Ok(())
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    pub fn preview_debounce(&self) -> Duration {
        Duration::from_millis(self.preview_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EditorConfig::default();
        assert_eq!(config.autosave_debounce(), Duration::from_millis(1000));
        assert_eq!(config.min_layer_size, 20.0);
        assert_eq!(config.max_upload_bytes, 25 * 1024 * 1024);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = EditorConfig::from_json(r#"{"autosave_debounce_ms": 500}"#).unwrap();
        assert_eq!(config.autosave_debounce_ms, 500);
        assert_eq!(config.duplicate_offset, 20.0);
    }

    #[test]
    fn test_rejects_zero_min_size() {
        let result = EditorConfig::from_json(r#"{"min_layer_size": 0}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            EditorConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
