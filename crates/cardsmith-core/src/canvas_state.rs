//! Serialized canvas state exchanged with the browser client and backend.

use crate::layers::{ImageLayer, Side, TextLayer, TextLayerPatch, normalize};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Both sides of a design: text per side, images flattened alongside.
///
/// ```json
/// { "front": [..], "back": [..], "frontImage": {..} | null, "backImage": null }
/// ```
///
/// Deserializing goes through [`CanvasState::from_json`], so partial or
/// malformed layers are normalized or dropped instead of failing the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Value")]
pub struct CanvasState {
    pub front: Vec<TextLayer>,
    pub back: Vec<TextLayer>,
    pub front_image: Option<ImageLayer>,
    pub back_image: Option<ImageLayer>,
}

impl CanvasState {
    pub fn text(&self, side: Side) -> &[TextLayer] {
        match side {
            Side::Front => &self.front,
            Side::Back => &self.back,
        }
    }

    pub fn image(&self, side: Side) -> Option<&ImageLayer> {
        match side {
            Side::Front => self.front_image.as_ref(),
            Side::Back => self.back_image.as_ref(),
        }
    }

    /// Build from two per-side payloads.
    pub fn from_sides(front: SidePayload, back: SidePayload) -> Self {
        Self {
            front: front.text,
            back: back.text,
            front_image: front.image,
            back_image: back.image,
        }
    }

    /// The per-side payload shape used by design resources.
    pub fn side_payload(&self, side: Side) -> SidePayload {
        SidePayload {
            text: self.text(side).to_vec(),
            image: self.image(side).cloned(),
        }
    }

    /// Leniently read a canvas state.
    ///
    /// Text entries go through [`normalize`]; entries that are not objects
    /// are dropped, as are images without a source. A non-object root yields
    /// an empty state.
    pub fn from_json(value: &Value) -> Self {
        Self {
            front: text_entries(value.get("front")),
            back: text_entries(value.get("back")),
            front_image: value.get("frontImage").and_then(ImageLayer::from_json),
            back_image: value.get("backImage").and_then(ImageLayer::from_json),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.front.is_empty()
            && self.back.is_empty()
            && self.front_image.is_none()
            && self.back_image.is_none()
    }
}

impl From<Value> for CanvasState {
    fn from(value: Value) -> Self {
        Self::from_json(&value)
    }
}

fn text_entries(value: Option<&Value>) -> Vec<TextLayer> {
    value
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(TextLayerPatch::from_json)
                .map(|patch| normalize(&patch))
                .collect()
        })
        .unwrap_or_default()
}

/// One side of a design resource: `{ "text": [..], "image": {..} | null }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct SidePayload {
    pub text: Vec<TextLayer>,
    pub image: Option<ImageLayer>,
}

impl SidePayload {
    /// Lenient counterpart of deserialization.
    pub fn from_json(value: &Value) -> Self {
        Self {
            text: text_entries(value.get("text")),
            image: value.get("image").and_then(ImageLayer::from_json),
        }
    }
}

impl From<Value> for SidePayload {
    fn from(value: Value) -> Self {
        Self::from_json(&value)
    }
}
