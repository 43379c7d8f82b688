//! Image layers.
//!
//! An image layer is positioned by its CENTER. Text layers use the top-left
//! corner instead; the two must not be unified.

use crate::geometry::Placement;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raster formats accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Png,
    Jpeg,
    WebP,
}

impl ImageFormat {
    /// Get MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::WebP => "image/webp",
        }
    }

    /// Detect format from a declared MIME type.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
            "image/webp" => Some(ImageFormat::WebP),
            _ => None,
        }
    }

    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "webp" => Some(ImageFormat::WebP),
            _ => None,
        }
    }

    /// Detect format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Some(ImageFormat::Png);
        }
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageFormat::Jpeg);
        }
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Some(ImageFormat::WebP);
        }
        None
    }
}

/// The (single) image on a card side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Value")]
pub struct ImageLayer {
    /// Raster source reference (URL).
    pub src: String,
    /// Center x.
    pub x: f64,
    /// Center y.
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Degrees, clockwise.
    pub rotation: f64,
    /// Source pixel width, 0 when unknown.
    pub natural_width: f64,
    /// Source pixel height, 0 when unknown.
    pub natural_height: f64,
}

impl ImageLayer {
    /// Fallback box size for restored images without usable dimensions.
    pub const FALLBACK_SIZE: f64 = 100.0;

    /// Create a layer from a geometry placement.
    pub fn placed(src: impl Into<String>, placement: Placement, natural: (f64, f64)) -> Self {
        Self {
            src: src.into(),
            x: placement.x,
            y: placement.y,
            width: placement.width,
            height: placement.height,
            rotation: 0.0,
            natural_width: natural.0,
            natural_height: natural.1,
        }
    }

    /// Bounding box (unrotated), derived from the center.
    pub fn bounds(&self) -> Rect {
        Rect::from_center_size(self.center(), (self.width, self.height))
    }

    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Source size if known, otherwise the displayed size.
    pub fn natural_size(&self) -> (f64, f64) {
        if self.natural_width > 0.0 && self.natural_height > 0.0 {
            (self.natural_width, self.natural_height)
        } else {
            (self.width, self.height)
        }
    }

    /// Replace position and size, keeping source and rotation.
    pub fn apply_placement(&mut self, placement: Placement) {
        self.x = placement.x;
        self.y = placement.y;
        self.width = placement.width;
        self.height = placement.height;
    }

    pub fn apply_patch(&mut self, patch: &ImagePatch) {
        if let Some(src) = &patch.src {
            if !src.trim().is_empty() {
                self.src = src.clone();
            }
        }
        if let Some(x) = patch.x.filter(|v| v.is_finite()) {
            self.x = x;
        }
        if let Some(y) = patch.y.filter(|v| v.is_finite()) {
            self.y = y;
        }
        if let Some(w) = patch.width.filter(|v| v.is_finite() && *v > 0.0) {
            self.width = w;
        }
        if let Some(h) = patch.height.filter(|v| v.is_finite() && *v > 0.0) {
            self.height = h;
        }
        if let Some(r) = patch.rotation.filter(|v| v.is_finite()) {
            self.rotation = r;
        }
    }

    /// Leniently read an image layer from JSON.
    ///
    /// Requires a non-empty `src`; every other field falls back to a default.
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let src = obj.get("src").and_then(Value::as_str)?.trim();
        if src.is_empty() {
            return None;
        }
        let num = |key: &str| obj.get(key).and_then(Value::as_f64).filter(|v| v.is_finite());
        let size = |key: &str| num(key).filter(|v| *v > 0.0);
        Some(Self {
            src: src.to_string(),
            x: num("x").unwrap_or(0.0),
            y: num("y").unwrap_or(0.0),
            width: size("width").unwrap_or(Self::FALLBACK_SIZE),
            height: size("height").unwrap_or(Self::FALLBACK_SIZE),
            rotation: num("rotation").unwrap_or(0.0),
            natural_width: size("naturalWidth").unwrap_or(0.0),
            natural_height: size("naturalHeight").unwrap_or(0.0),
        })
    }
}

impl TryFrom<Value> for ImageLayer {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(&value).ok_or_else(|| "image layer needs an object with a non-empty src".to_string())
    }
}

/// Partial update of an image layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImagePatch {
    pub src: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotation: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layer() -> ImageLayer {
        ImageLayer {
            src: "https://cdn.example.com/a.png".into(),
            x: 100.0,
            y: 50.0,
            width: 80.0,
            height: 40.0,
            rotation: 0.0,
            natural_width: 0.0,
            natural_height: 0.0,
        }
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ImageFormat::from_magic_bytes(&[0x89, 0x50, 0x4E, 0x47, 0x0D]), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_magic_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_magic_bytes(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageFormat::WebP));
        assert_eq!(ImageFormat::from_magic_bytes(b"GIF89a"), None);
        assert_eq!(ImageFormat::from_magic_bytes(&[]), None);
        assert_eq!(ImageFormat::from_extension("JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_mime_type("image/webp"), Some(ImageFormat::WebP));
        assert_eq!(ImageFormat::from_mime_type("image/gif"), None);
    }

    #[test]
    fn test_image_bounds_are_center_anchored() {
        let bounds = layer().bounds();
        assert_eq!(bounds, Rect::new(60.0, 30.0, 140.0, 70.0));
    }

    #[test]
    fn test_natural_size_fallback() {
        let mut img = layer();
        assert_eq!(img.natural_size(), (80.0, 40.0));
        img.natural_width = 1200.0;
        img.natural_height = 600.0;
        assert_eq!(img.natural_size(), (1200.0, 600.0));
    }

    #[test]
    fn test_from_json() {
        let img = ImageLayer::from_json(&json!({"src": "a.png", "x": 5, "width": -3})).unwrap();
        assert_eq!(img.x, 5.0);
        assert_eq!(img.width, ImageLayer::FALLBACK_SIZE);
        assert!(ImageLayer::from_json(&json!({"x": 5})).is_none());
        assert!(ImageLayer::from_json(&json!("a.png")).is_none());
    }

    #[test]
    fn test_patch_rejects_degenerate_size() {
        let mut img = layer();
        img.apply_patch(&ImagePatch {
            width: Some(0.0),
            rotation: Some(45.0),
            ..Default::default()
        });
        assert_eq!(img.width, 80.0);
        assert_eq!(img.rotation, 45.0);
    }
}
