//! Text layers.
//!
//! Text layers are positioned by their TOP-LEFT corner, unlike image layers
//! which are positioned by their center.

use super::{LayerId, parse_hex_color};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Font weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

impl FontWeight {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" | "400" => Some(FontWeight::Normal),
            "bold" | "700" => Some(FontWeight::Bold),
            _ => None,
        }
    }

    /// Numeric CSS weight.
    pub fn value(&self) -> f32 {
        match self {
            FontWeight::Normal => 400.0,
            FontWeight::Bold => 700.0,
        }
    }
}

/// Font style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

impl FontStyle {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(FontStyle::Normal),
            "italic" => Some(FontStyle::Italic),
            _ => None,
        }
    }
}

/// Horizontal alignment inside the text box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

impl TextAlign {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" => Some(TextAlign::Left),
            "center" => Some(TextAlign::Center),
            "right" => Some(TextAlign::Right),
            _ => None,
        }
    }
}

/// Text decoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDecoration {
    #[default]
    None,
    Underline,
}

impl TextDecoration {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(TextDecoration::None),
            "underline" => Some(TextDecoration::Underline),
            _ => None,
        }
    }
}

/// A fully resolved text layer.
///
/// Deserialization is lenient: any JSON object is accepted and resolved
/// through [`normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Value")]
pub struct TextLayer {
    pub id: LayerId,
    pub text: String,
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Degrees, clockwise.
    pub rotation: f64,
    pub font_family: String,
    /// Pixels.
    pub font_size: u32,
    pub font_weight: FontWeight,
    pub font_style: FontStyle,
    pub text_align: TextAlign,
    /// Hex string.
    pub color: String,
    /// Multiple of the font size.
    pub line_height: f64,
    /// Extra pixels between letters.
    pub letter_spacing: f64,
    pub text_decoration: TextDecoration,
}

impl TextLayer {
    pub const DEFAULT_TEXT: &'static str = "Your text";
    pub const DEFAULT_X: f64 = 50.0;
    pub const DEFAULT_Y: f64 = 50.0;
    pub const DEFAULT_WIDTH: f64 = 200.0;
    pub const DEFAULT_HEIGHT: f64 = 40.0;
    pub const DEFAULT_FONT_FAMILY: &'static str = "Arial";
    pub const DEFAULT_FONT_SIZE: u32 = 24;
    pub const DEFAULT_COLOR: &'static str = "#000000";
    pub const DEFAULT_LINE_HEIGHT: f64 = 1.2;
    pub const DEFAULT_LETTER_SPACING: f64 = 0.0;

    /// Bounding box (unrotated).
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    pub fn center(&self) -> Point {
        self.bounds().center()
    }

    /// Whether the layer shows anything.
    pub fn has_visible_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// Merge a partial update. The id is never changed by a patch.
    pub fn apply_patch(&mut self, patch: &TextLayerPatch) {
        if let Some(text) = &patch.text {
            self.text = text.clone();
        }
        if let Some(x) = finite(patch.x) {
            self.x = x;
        }
        if let Some(y) = finite(patch.y) {
            self.y = y;
        }
        if let Some(width) = positive(patch.width) {
            self.width = width;
        }
        if let Some(height) = positive(patch.height) {
            self.height = height;
        }
        if let Some(rotation) = finite(patch.rotation) {
            self.rotation = rotation;
        }
        if let Some(family) = patch.font_family.as_deref().map(str::trim) {
            if !family.is_empty() {
                self.font_family = family.to_string();
            }
        }
        if let Some(size) = font_size(patch.font_size) {
            self.font_size = size;
        }
        if let Some(weight) = patch.font_weight {
            self.font_weight = weight;
        }
        if let Some(style) = patch.font_style {
            self.font_style = style;
        }
        if let Some(align) = patch.text_align {
            self.text_align = align;
        }
        if let Some(color) = &patch.color {
            if parse_hex_color(color).is_some() {
                self.color = color.trim().to_string();
            }
        }
        if let Some(line_height) = positive(patch.line_height) {
            self.line_height = line_height;
        }
        if let Some(spacing) = finite(patch.letter_spacing) {
            self.letter_spacing = spacing;
        }
        if let Some(decoration) = patch.text_decoration {
            self.text_decoration = decoration;
        }
    }
}

impl TryFrom<Value> for TextLayer {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        TextLayerPatch::from_json(&value)
            .map(|patch| normalize(&patch))
            .ok_or_else(|| format!("text layer must be an object, got {value}"))
    }
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|v| v.is_finite())
}

fn positive(v: Option<f64>) -> Option<f64> {
    v.filter(|v| v.is_finite() && *v > 0.0)
}

fn font_size(v: Option<f64>) -> Option<u32> {
    positive(v).map(|v| v.round().clamp(1.0, u32::MAX as f64) as u32)
}

/// A partially specified text layer.
///
/// Used for custom creation, updates and restore. Missing fields are filled
/// by [`normalize`] or left untouched by [`TextLayer::apply_patch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextLayerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<LayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<FontWeight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_style: Option<FontStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_align: Option<TextAlign>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub letter_spacing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_decoration: Option<TextDecoration>,
}

impl TextLayerPatch {
    /// Leniently read a patch from arbitrary JSON.
    ///
    /// Returns `None` when `value` is not an object. Fields of the wrong
    /// type are treated as missing.
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let num = |key: &str| obj.get(key).and_then(Value::as_f64);
        let string = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
        let keyword = |key: &str| string(key).map(|s| s.trim().to_string());

        let id = match obj.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(LayerId::from(s.trim())),
            Some(Value::Number(n)) => Some(LayerId::from(n.to_string())),
            _ => None,
        };
        let font_weight = match obj.get("fontWeight") {
            Some(Value::Number(n)) => n.as_f64().map(|w| {
                if w >= 600.0 {
                    FontWeight::Bold
                } else {
                    FontWeight::Normal
                }
            }),
            Some(Value::String(s)) => FontWeight::parse(s.trim()),
            _ => None,
        };

        Some(Self {
            id,
            text: string("text"),
            x: num("x"),
            y: num("y"),
            width: num("width"),
            height: num("height"),
            rotation: num("rotation"),
            font_family: string("fontFamily"),
            font_size: num("fontSize"),
            font_weight,
            font_style: keyword("fontStyle").and_then(|s| FontStyle::parse(&s)),
            text_align: keyword("textAlign").and_then(|s| TextAlign::parse(&s)),
            color: string("color"),
            line_height: num("lineHeight"),
            letter_spacing: num("letterSpacing"),
            text_decoration: keyword("textDecoration").and_then(|s| TextDecoration::parse(&s)),
        })
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }
}

impl From<&TextLayer> for TextLayerPatch {
    fn from(layer: &TextLayer) -> Self {
        Self {
            id: Some(layer.id.clone()),
            text: Some(layer.text.clone()),
            x: Some(layer.x),
            y: Some(layer.y),
            width: Some(layer.width),
            height: Some(layer.height),
            rotation: Some(layer.rotation),
            font_family: Some(layer.font_family.clone()),
            font_size: Some(layer.font_size as f64),
            font_weight: Some(layer.font_weight),
            font_style: Some(layer.font_style),
            text_align: Some(layer.text_align),
            color: Some(layer.color.clone()),
            line_height: Some(layer.line_height),
            letter_spacing: Some(layer.letter_spacing),
            text_decoration: Some(layer.text_decoration),
        }
    }
}

/// Resolve every field of a partial layer, generating an id when missing.
///
/// This is the only place defaults are applied; creation, duplication and
/// restore all go through it.
pub fn normalize(patch: &TextLayerPatch) -> TextLayer {
    let mut layer = TextLayer {
        id: patch
            .id
            .clone()
            .filter(|id| !id.as_str().trim().is_empty())
            .unwrap_or_else(LayerId::generate),
        text: TextLayer::DEFAULT_TEXT.to_string(),
        x: TextLayer::DEFAULT_X,
        y: TextLayer::DEFAULT_Y,
        width: TextLayer::DEFAULT_WIDTH,
        height: TextLayer::DEFAULT_HEIGHT,
        rotation: 0.0,
        font_family: TextLayer::DEFAULT_FONT_FAMILY.to_string(),
        font_size: TextLayer::DEFAULT_FONT_SIZE,
        font_weight: FontWeight::default(),
        font_style: FontStyle::default(),
        text_align: TextAlign::default(),
        color: TextLayer::DEFAULT_COLOR.to_string(),
        line_height: TextLayer::DEFAULT_LINE_HEIGHT,
        letter_spacing: TextLayer::DEFAULT_LETTER_SPACING,
        text_decoration: TextDecoration::default(),
    };
    layer.apply_patch(patch);
    layer
}

/// A named starting point for "Add Text".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextPreset {
    pub id: &'static str,
    pub label: &'static str,
    pub text: &'static str,
    pub font_size: u32,
    pub font_weight: FontWeight,
    pub font_style: FontStyle,
    pub y: f64,
}

impl TextPreset {
    pub fn to_patch(&self) -> TextLayerPatch {
        TextLayerPatch {
            text: Some(self.text.to_string()),
            y: Some(self.y),
            font_size: Some(self.font_size as f64),
            font_weight: Some(self.font_weight),
            font_style: Some(self.font_style),
            height: Some((self.font_size as f64 * TextLayer::DEFAULT_LINE_HEIGHT).ceil().max(20.0)),
            ..Default::default()
        }
    }
}

/// Built-in text presets.
pub const TEXT_PRESETS: &[TextPreset] = &[
    TextPreset {
        id: "company-name",
        label: "Company name",
        text: "Company Name",
        font_size: 32,
        font_weight: FontWeight::Bold,
        font_style: FontStyle::Normal,
        y: 60.0,
    },
    TextPreset {
        id: "full-name",
        label: "Full name",
        text: "Your Name",
        font_size: 28,
        font_weight: FontWeight::Bold,
        font_style: FontStyle::Normal,
        y: 130.0,
    },
    TextPreset {
        id: "job-title",
        label: "Job title",
        text: "Job Title",
        font_size: 18,
        font_weight: FontWeight::Normal,
        font_style: FontStyle::Italic,
        y: 175.0,
    },
    TextPreset {
        id: "phone",
        label: "Phone",
        text: "+1 555 0100",
        font_size: 16,
        font_weight: FontWeight::Normal,
        font_style: FontStyle::Normal,
        y: 380.0,
    },
    TextPreset {
        id: "email",
        label: "Email",
        text: "name@example.com",
        font_size: 16,
        font_weight: FontWeight::Normal,
        font_style: FontStyle::Normal,
        y: 410.0,
    },
    TextPreset {
        id: "website",
        label: "Website",
        text: "www.example.com",
        font_size: 16,
        font_weight: FontWeight::Normal,
        font_style: FontStyle::Normal,
        y: 440.0,
    },
    TextPreset {
        id: "tagline",
        label: "Tagline",
        text: "Your tagline here",
        font_size: 20,
        font_weight: FontWeight::Normal,
        font_style: FontStyle::Italic,
        y: 240.0,
    },
];

/// Look up a built-in preset by id.
pub fn text_preset(id: &str) -> Option<&'static TextPreset> {
    TEXT_PRESETS.iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_empty_patch_fills_every_field() {
        let layer = normalize(&TextLayerPatch::default());
        assert_eq!(layer.text, "Your text");
        assert_eq!(layer.font_family, "Arial");
        assert_eq!(layer.font_size, 24);
        assert_eq!(layer.color, "#000000");
        assert_eq!(layer.line_height, 1.2);
        assert_eq!(layer.text_decoration, TextDecoration::None);
        assert!(!layer.id.as_str().is_empty());
    }

    #[test]
    fn test_normalize_keeps_supplied_fields() {
        let patch = TextLayerPatch::from_json(&json!({
            "id": "keep-me",
            "text": "Hello",
            "x": 10,
            "fontSize": 31.6,
            "fontWeight": "bold",
            "textAlign": "center",
            "color": "#ff8800",
        }))
        .unwrap();
        let layer = normalize(&patch);
        assert_eq!(layer.id.as_str(), "keep-me");
        assert_eq!(layer.text, "Hello");
        assert_eq!(layer.x, 10.0);
        assert_eq!(layer.y, TextLayer::DEFAULT_Y);
        assert_eq!(layer.font_size, 32);
        assert_eq!(layer.font_weight, FontWeight::Bold);
        assert_eq!(layer.text_align, TextAlign::Center);
        assert_eq!(layer.color, "#ff8800");
    }

    #[test]
    fn test_empty_text_is_allowed() {
        let layer = normalize(&TextLayerPatch::default().with_text(""));
        assert_eq!(layer.text, "");
        assert!(!layer.has_visible_text());
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        assert!(TextLayerPatch::from_json(&json!(42)).is_none());
        assert!(TextLayerPatch::from_json(&json!("text")).is_none());
        assert!(TextLayerPatch::from_json(&json!(null)).is_none());
        assert!(TextLayerPatch::from_json(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_from_json_ignores_wrong_types() {
        let patch = TextLayerPatch::from_json(&json!({
            "x": "ten",
            "fontStyle": 3,
            "textDecoration": "blink",
            "id": 7,
        }))
        .unwrap();
        assert!(patch.x.is_none());
        assert!(patch.font_style.is_none());
        assert!(patch.text_decoration.is_none());
        assert_eq!(patch.id, Some(LayerId::from("7")));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let patch = TextLayerPatch {
            width: Some(-5.0),
            font_size: Some(0.0),
            color: Some("blue".into()),
            line_height: Some(f64::NAN),
            ..Default::default()
        };
        let layer = normalize(&patch);
        assert_eq!(layer.width, TextLayer::DEFAULT_WIDTH);
        assert_eq!(layer.font_size, TextLayer::DEFAULT_FONT_SIZE);
        assert_eq!(layer.color, TextLayer::DEFAULT_COLOR);
        assert_eq!(layer.line_height, TextLayer::DEFAULT_LINE_HEIGHT);
    }

    #[test]
    fn test_patch_never_changes_id() {
        let mut layer = normalize(&TextLayerPatch::default());
        let original = layer.id.clone();
        layer.apply_patch(&TextLayerPatch {
            id: Some(LayerId::from("other")),
            text: Some("X".into()),
            ..Default::default()
        });
        assert_eq!(layer.id, original);
        assert_eq!(layer.text, "X");
    }

    #[test]
    fn test_wire_names_are_camel_case() {
        let layer = normalize(&TextLayerPatch::default());
        let json = serde_json::to_value(&layer).unwrap();
        assert!(json.get("fontFamily").is_some());
        assert!(json.get("letterSpacing").is_some());
        assert_eq!(json["textDecoration"], "none");
    }

    #[test]
    fn test_empty_id_is_replaced() {
        let layer = normalize(&TextLayerPatch {
            id: Some(LayerId::from("  ")),
            ..Default::default()
        });
        assert!(layer.id.as_str().starts_with("text-"));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let layer = normalize(&TextLayerPatch::default().with_text("Once"));
        assert_eq!(normalize(&TextLayerPatch::from(&layer)), layer);
    }

    #[test]
    fn test_presets() {
        let preset = text_preset("company-name").unwrap();
        let layer = normalize(&preset.to_patch());
        assert_eq!(layer.text, "Company Name");
        assert_eq!(layer.font_weight, FontWeight::Bold);
        assert!(text_preset("nope").is_none());
    }

    #[test]
    fn test_text_bounds_are_top_left_anchored() {
        let layer = normalize(&TextLayerPatch::default().with_position(100.0, 40.0));
        let bounds = layer.bounds();
        assert_eq!(bounds.x0, 100.0);
        assert_eq!(bounds.y0, 40.0);
        assert_eq!(bounds.width(), TextLayer::DEFAULT_WIDTH);
    }
}
