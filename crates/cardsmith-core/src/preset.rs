//! Printable card geometry.

use kurbo::{Rect, RoundedRect};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Configuration errors, reported when a preset or config is loaded.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid card preset: {0}")]
    InvalidPreset(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Configuration parse error: {0}")]
    Parse(String),
}

/// Card orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Landscape => "landscape",
            Orientation::Portrait => "portrait",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Corner treatment of the cut card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardShape {
    #[default]
    Rectangle,
    Rounded,
}

impl CardShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardShape::Rectangle => "rectangle",
            CardShape::Rounded => "rounded",
        }
    }
}

impl fmt::Display for CardShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable canvas description for one product configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPreset {
    /// Canvas width in design pixels.
    pub width: f64,
    /// Canvas height in design pixels.
    pub height: f64,
    pub width_cm: f64,
    pub height_cm: f64,
    /// Inset from every canvas edge to the safe area.
    pub safe_margin: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corner_radius: Option<f64>,
}

impl CardPreset {
    /// Design resolution of the built-in presets.
    pub const PX_PER_CM: f64 = 100.0;
    /// Corner radius used by rounded cards.
    pub const ROUNDED_CORNER_RADIUS: f64 = 24.0;
    /// Default safe margin of the built-in presets.
    pub const DEFAULT_SAFE_MARGIN: f64 = 20.0;

    /// A 9.0 x 5.4 cm business card.
    pub fn business_card(orientation: Orientation, shape: CardShape) -> Self {
        let (width_cm, height_cm) = match orientation {
            Orientation::Landscape => (9.0, 5.4),
            Orientation::Portrait => (5.4, 9.0),
        };
        Self {
            width: width_cm * Self::PX_PER_CM,
            height: height_cm * Self::PX_PER_CM,
            width_cm,
            height_cm,
            safe_margin: Self::DEFAULT_SAFE_MARGIN,
            corner_radius: match shape {
                CardShape::Rectangle => None,
                CardShape::Rounded => Some(Self::ROUNDED_CORNER_RADIUS),
            },
        }
    }

    /// Check the preset invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dims = [self.width, self.height, self.width_cm, self.height_cm];
        if dims.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(ConfigError::InvalidPreset(format!(
                "dimensions must be positive, got {}x{} px / {}x{} cm",
                self.width, self.height, self.width_cm, self.height_cm
            )));
        }
        if !self.safe_margin.is_finite() || self.safe_margin < 0.0 {
            return Err(ConfigError::InvalidPreset(format!(
                "safe margin must be >= 0, got {}",
                self.safe_margin
            )));
        }
        if self.safe_margin * 2.0 >= self.width.min(self.height) {
            return Err(ConfigError::InvalidPreset(format!(
                "safe margin {} leaves no safe area on a {}x{} canvas",
                self.safe_margin, self.width, self.height
            )));
        }
        if let Some(radius) = self.corner_radius {
            if !radius.is_finite() || radius < 0.0 {
                return Err(ConfigError::InvalidPreset(format!(
                    "corner radius must be >= 0, got {radius}"
                )));
            }
        }
        Ok(())
    }

    /// The full canvas rectangle, bleed included.
    pub fn canvas_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }

    /// The canvas inset by the safe margin on all sides.
    pub fn safe_area(&self) -> Rect {
        self.canvas_rect().inset(-self.safe_margin)
    }

    /// Canvas outline used for clipping.
    pub fn clip_shape(&self) -> RoundedRect {
        let radius = self
            .corner_radius
            .unwrap_or(0.0)
            .min(self.width / 2.0)
            .min(self.height / 2.0);
        RoundedRect::from_rect(self.canvas_rect(), radius)
    }
}

impl Default for CardPreset {
    fn default() -> Self {
        Self::business_card(Orientation::Landscape, CardShape::Rectangle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_card_dimensions() {
        let preset = CardPreset::business_card(Orientation::Landscape, CardShape::Rectangle);
        assert_eq!(preset.width, 900.0);
        assert_eq!(preset.height, 540.0);
        assert!(preset.corner_radius.is_none());
        assert!(preset.validate().is_ok());

        let portrait = CardPreset::business_card(Orientation::Portrait, CardShape::Rounded);
        assert_eq!(portrait.width, 540.0);
        assert_eq!(portrait.height, 900.0);
        assert_eq!(portrait.corner_radius, Some(24.0));
    }

    #[test]
    fn test_safe_area() {
        let preset = CardPreset::default();
        let safe = preset.safe_area();
        assert_eq!(safe, Rect::new(20.0, 20.0, 880.0, 520.0));
        assert_eq!(safe.width(), 860.0);
        assert_eq!(safe.height(), 500.0);
    }

    #[test]
    fn test_degenerate_safe_margin_is_config_error() {
        let mut preset = CardPreset::default();
        preset.safe_margin = 270.0;
        assert!(matches!(preset.validate(), Err(ConfigError::InvalidPreset(_))));

        preset.safe_margin = -1.0;
        assert!(preset.validate().is_err());
    }

    #[test]
    fn test_clip_radius_is_clamped() {
        let mut preset = CardPreset::default();
        preset.corner_radius = Some(10_000.0);
        let clip = preset.clip_shape();
        assert!(clip.radii().top_left <= 270.0);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_value(CardPreset::default()).unwrap();
        assert_eq!(json["safeMargin"], 20.0);
        assert_eq!(json["widthCm"], 9.0);
        assert!(json.get("cornerRadius").is_none());
    }
}
