//! The layer store: single owner of the design.
//!
//! Readers take an `Arc<Design>` snapshot; every committed mutation goes
//! through `Arc::make_mut` and bumps [`LayerStore::version`], so renderers
//! and the autosave can cheaply tell whether anything changed.

use crate::canvas_state::CanvasState;
use crate::config::EditorConfig;
use crate::geometry::{self, Anchoring, GeometryError, GeometryResult, Placement};
use crate::layers::{
    ImageLayer, ImagePatch, LayerId, Side, TextLayer, TextLayerPatch, normalize, text_preset,
};
use crate::preset::{CardPreset, ConfigError};
use crate::templates::Template;
use crate::upload::StoredImage;
use kurbo::Rect;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Layer store errors.
#[derive(Debug, Error, PartialEq)]
pub enum LayerError {
    #[error("Layer not found: {0}")]
    NotFound(LayerId),
    #[error("Unknown text preset: {0}")]
    UnknownPreset(String),
    #[error("No image on the {0} side")]
    NoImage(Side),
    #[error("Unknown template variant: {0}")]
    UnknownVariant(String),
    #[error("No upload pending on the {0} side")]
    NoPendingUpload(Side),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Result type for layer store operations.
pub type LayerResult<T> = Result<T, LayerError>;

/// The layers of one card side. Later text entries draw on top.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideLayers {
    pub image: Option<ImageLayer>,
    pub text: Vec<TextLayer>,
}

impl SideLayers {
    /// An image, or any text layer with non-blank text.
    pub fn has_content(&self) -> bool {
        self.image.is_some() || self.text.iter().any(TextLayer::has_visible_text)
    }

    pub fn find_text(&self, id: &LayerId) -> Option<&TextLayer> {
        self.text.iter().find(|l| &l.id == id)
    }

    fn position(&self, id: &LayerId) -> Option<usize> {
        self.text.iter().position(|l| &l.id == id)
    }
}

/// What is currently selected. At most one item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Selection {
    #[default]
    None,
    Image,
    Text(LayerId),
}

/// Addresses a layer: the side's image or a text layer by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum LayerKey {
    Image,
    Text(LayerId),
}

impl LayerKey {
    pub fn anchoring(&self) -> Anchoring {
        match self {
            LayerKey::Image => Anchoring::Center,
            LayerKey::Text(_) => Anchoring::TopLeft,
        }
    }
}

/// Borrowed view of either layer kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerRef<'a> {
    Image(&'a ImageLayer),
    Text(&'a TextLayer),
}

impl LayerRef<'_> {
    pub fn key(&self) -> LayerKey {
        match self {
            LayerRef::Image(_) => LayerKey::Image,
            LayerRef::Text(t) => LayerKey::Text(t.id.clone()),
        }
    }

    pub fn bounds(&self) -> Rect {
        match self {
            LayerRef::Image(i) => i.bounds(),
            LayerRef::Text(t) => t.bounds(),
        }
    }

    pub fn rotation(&self) -> f64 {
        match self {
            LayerRef::Image(i) => i.rotation,
            LayerRef::Text(t) => t.rotation,
        }
    }
}

/// Where a new text layer comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TextSource {
    /// All defaults.
    Blank,
    /// A built-in preset by id.
    Preset(String),
    /// Caller-supplied fields.
    Custom(TextLayerPatch),
}

/// Stacking change within a side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZOrder {
    ToFront,
    ToBack,
}

/// How an image is sized against the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitMode {
    /// Contained in the safe area.
    #[default]
    Fit,
    /// Covers the safe area.
    Fill,
    /// Covers the whole canvas, bleed included.
    FillCanvas,
}

/// The full editable design.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Design {
    pub front: SideLayers,
    pub back: SideLayers,
    pub active_side: Side,
    pub selection: Selection,
}

impl Design {
    pub fn side(&self, side: Side) -> &SideLayers {
        match side {
            Side::Front => &self.front,
            Side::Back => &self.back,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut SideLayers {
        match side {
            Side::Front => &mut self.front,
            Side::Back => &mut self.back,
        }
    }

    /// Find a text layer on either side.
    pub fn find_text(&self, id: &LayerId) -> Option<(Side, &TextLayer)> {
        Side::all()
            .into_iter()
            .find_map(|side| self.side(side).find_text(id).map(|l| (side, l)))
    }

    fn locate(&self, id: &LayerId) -> Option<(Side, usize)> {
        Side::all()
            .into_iter()
            .find_map(|side| self.side(side).position(id).map(|i| (side, i)))
    }

    /// Resolve a key on `side`. Text ids are looked up on that side only.
    pub fn layer(&self, side: Side, key: &LayerKey) -> Option<LayerRef<'_>> {
        let layers = self.side(side);
        match key {
            LayerKey::Image => layers.image.as_ref().map(LayerRef::Image),
            LayerKey::Text(id) => layers.find_text(id).map(LayerRef::Text),
        }
    }

    pub fn selected(&self) -> Option<LayerRef<'_>> {
        match &self.selection {
            Selection::None => None,
            Selection::Image => self.side(self.active_side).image.as_ref().map(LayerRef::Image),
            Selection::Text(id) => self.find_text(id).map(|(_, l)| LayerRef::Text(l)),
        }
    }

    pub fn to_canvas_state(&self) -> CanvasState {
        CanvasState {
            front: self.front.text.clone(),
            back: self.back.text.clone(),
            front_image: self.front.image.clone(),
            back_image: self.back.image.clone(),
        }
    }
}

fn sanitize_image(image: &ImageLayer) -> Option<ImageLayer> {
    if image.src.trim().is_empty() {
        return None;
    }
    let mut image = image.clone();
    let finite_or = |v: f64, fallback: f64| if v.is_finite() { v } else { fallback };
    let size_or = |v: f64| {
        if v.is_finite() && v > 0.0 {
            v
        } else {
            ImageLayer::FALLBACK_SIZE
        }
    };
    image.x = finite_or(image.x, 0.0);
    image.y = finite_or(image.y, 0.0);
    image.rotation = finite_or(image.rotation, 0.0);
    image.width = size_or(image.width);
    image.height = size_or(image.height);
    Some(image)
}

/// Owner of the design state.
#[derive(Debug, Clone)]
pub struct LayerStore {
    design: Arc<Design>,
    version: u64,
    preset: CardPreset,
    config: EditorConfig,
    pending_uploads: HashSet<Side>,
}

impl Default for LayerStore {
    fn default() -> Self {
        Self::new(CardPreset::default(), EditorConfig::default())
    }
}

impl LayerStore {
    pub fn new(preset: CardPreset, config: EditorConfig) -> Self {
        Self {
            design: Arc::new(Design::default()),
            version: 0,
            preset,
            config,
            pending_uploads: HashSet::new(),
        }
    }

    /// Like [`LayerStore::new`], but rejects a degenerate preset or config
    /// up front instead of failing on the first geometry operation.
    pub fn try_new(preset: CardPreset, config: EditorConfig) -> Result<Self, ConfigError> {
        preset.validate()?;
        config.validate()?;
        Ok(Self::new(preset, config))
    }

    /// Immutable snapshot of the current design.
    pub fn snapshot(&self) -> Arc<Design> {
        Arc::clone(&self.design)
    }

    pub fn design(&self) -> &Design {
        &self.design
    }

    /// Bumped on every committed mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn preset(&self) -> &CardPreset {
        &self.preset
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn active_side(&self) -> Side {
        self.design.active_side
    }

    fn commit(&mut self) -> &mut Design {
        self.version += 1;
        Arc::make_mut(&mut self.design)
    }

    fn fresh_id(&self, id: LayerId) -> LayerId {
        if self.design.find_text(&id).is_some() {
            LayerId::generate()
        } else {
            id
        }
    }

    // --- text layers ---

    /// Create a text layer on `side` and select it.
    pub fn add_text_layer(&mut self, side: Side, source: TextSource) -> LayerResult<TextLayer> {
        let patch = match source {
            TextSource::Blank => TextLayerPatch::default(),
            TextSource::Preset(id) => text_preset(&id)
                .ok_or(LayerError::UnknownPreset(id))?
                .to_patch(),
            TextSource::Custom(patch) => patch,
        };
        let layer = self.add_text_layer_to_side(side, &patch);
        self.commit().selection = Selection::Text(layer.id.clone());
        log::debug!("Added text layer {} on {}", layer.id, side);
        Ok(layer)
    }

    /// Append a normalized text layer without touching the selection.
    pub fn add_text_layer_to_side(&mut self, side: Side, patch: &TextLayerPatch) -> TextLayer {
        let mut layer = normalize(patch);
        layer.id = self.fresh_id(layer.id);
        self.commit().side_mut(side).text.push(layer.clone());
        layer
    }

    /// Merge `patch` into the layer with `id`, on whichever side holds it.
    pub fn update_layer(&mut self, id: &LayerId, patch: &TextLayerPatch) -> LayerResult<TextLayer> {
        let (side, index) = self
            .design
            .locate(id)
            .ok_or_else(|| LayerError::NotFound(id.clone()))?;
        let layer = &mut self.commit().side_mut(side).text[index];
        layer.apply_patch(patch);
        Ok(layer.clone())
    }

    /// Remove the layer with `id` from whichever side holds it.
    pub fn remove_layer(&mut self, id: &LayerId) -> LayerResult<TextLayer> {
        let (side, index) = self
            .design
            .locate(id)
            .ok_or_else(|| LayerError::NotFound(id.clone()))?;
        let design = self.commit();
        let removed = design.side_mut(side).text.remove(index);
        if design.selection == Selection::Text(id.clone()) {
            design.selection = Selection::None;
        }
        log::debug!("Removed text layer {} from {}", id, side);
        Ok(removed)
    }

    /// Copy a layer of the active side, offset it and select the copy.
    pub fn duplicate_layer(&mut self, id: &LayerId) -> LayerResult<TextLayer> {
        let side = self.active_side();
        let mut copy = self
            .design
            .side(side)
            .find_text(id)
            .cloned()
            .ok_or_else(|| LayerError::NotFound(id.clone()))?;
        copy.id = LayerId::generate();
        copy.x += self.config.duplicate_offset;
        copy.y += self.config.duplicate_offset;

        let design = self.commit();
        design.side_mut(side).text.push(copy.clone());
        design.selection = Selection::Text(copy.id.clone());
        Ok(copy)
    }

    /// Move a layer of the active side to the top or bottom of the stack.
    pub fn reorder(&mut self, id: &LayerId, order: ZOrder) -> LayerResult<()> {
        let side = self.active_side();
        let index = self
            .design
            .side(side)
            .position(id)
            .ok_or_else(|| LayerError::NotFound(id.clone()))?;
        let text = &mut self.commit().side_mut(side).text;
        let layer = text.remove(index);
        match order {
            ZOrder::ToFront => text.push(layer),
            ZOrder::ToBack => text.insert(0, layer),
        }
        Ok(())
    }

    /// Replace both sides from a saved state.
    ///
    /// Every text entry is normalized, ids repeated within the payload are
    /// reassigned and the selection is cleared.
    pub fn set_all_layers(&mut self, state: &CanvasState) {
        let mut seen = HashSet::new();
        let mut hydrate = |layers: &[TextLayer]| -> Vec<TextLayer> {
            layers
                .iter()
                .map(|layer| {
                    let mut layer = normalize(&TextLayerPatch::from(layer));
                    while !seen.insert(layer.id.clone()) {
                        layer.id = LayerId::generate();
                    }
                    layer
                })
                .collect()
        };
        let front = hydrate(&state.front);
        let back = hydrate(&state.back);

        self.design = Arc::new(Design {
            front: SideLayers {
                image: state.front_image.as_ref().and_then(sanitize_image),
                text: front,
            },
            back: SideLayers {
                image: state.back_image.as_ref().and_then(sanitize_image),
                text: back,
            },
            active_side: self.design.active_side,
            selection: Selection::None,
        });
        self.version += 1;
        log::info!(
            "Restored design: {} front / {} back text layers",
            self.design.front.text.len(),
            self.design.back.text.len()
        );
    }

    /// [`set_all_layers`](Self::set_all_layers) from untyped JSON.
    pub fn restore_json(&mut self, value: &Value) {
        self.set_all_layers(&CanvasState::from_json(value));
    }

    // --- queries ---

    pub fn current_layers(&self, side: Side) -> &SideLayers {
        self.design.side(side)
    }

    pub fn selected_layer(&self) -> Option<LayerRef<'_>> {
        self.design.selected()
    }

    pub fn has_any_content(&self, side: Side) -> bool {
        self.design.side(side).has_content()
    }

    pub fn is_editing_text(&self) -> bool {
        matches!(self.design.selection, Selection::Text(_))
    }

    pub fn to_canvas_state(&self) -> CanvasState {
        self.design.to_canvas_state()
    }

    // --- images ---

    /// Replace the side's image wholesale.
    pub fn set_image(&mut self, side: Side, image: ImageLayer) {
        self.commit().side_mut(side).image = Some(image);
    }

    pub fn remove_image(&mut self, side: Side) -> LayerResult<ImageLayer> {
        if self.design.side(side).image.is_none() {
            return Err(LayerError::NoImage(side));
        }
        let design = self.commit();
        let removed = design.side_mut(side).image.take().ok_or(LayerError::NoImage(side))?;
        if design.active_side == side && design.selection == Selection::Image {
            design.selection = Selection::None;
        }
        Ok(removed)
    }

    pub fn update_image(&mut self, side: Side, patch: &ImagePatch) -> LayerResult<ImageLayer> {
        if self.design.side(side).image.is_none() {
            return Err(LayerError::NoImage(side));
        }
        let image = self
            .commit()
            .side_mut(side)
            .image
            .as_mut()
            .ok_or(LayerError::NoImage(side))?;
        image.apply_patch(patch);
        Ok(image.clone())
    }

    /// Size a source of `natural` pixels against the card.
    pub fn placement(&self, natural: (f64, f64), mode: FitMode) -> GeometryResult<Placement> {
        let (w, h) = natural;
        match mode {
            FitMode::Fit => geometry::fit_to_area(w, h, self.preset.safe_area()),
            FitMode::Fill => geometry::fill_area(w, h, self.preset.safe_area()),
            FitMode::FillCanvas => geometry::fill_canvas(w, h, &self.preset),
        }
    }

    /// Create the side's image from a source, replacing any previous one.
    pub fn place_image(
        &mut self,
        side: Side,
        src: impl Into<String>,
        natural: (f64, f64),
        mode: FitMode,
    ) -> LayerResult<ImageLayer> {
        let placement = self.placement(natural, mode)?;
        let image = ImageLayer::placed(src, placement, natural);
        self.set_image(side, image.clone());
        Ok(image)
    }

    /// Re-run fit/fill on the existing image, keeping source and rotation.
    pub fn refit_image(&mut self, side: Side, mode: FitMode) -> LayerResult<ImageLayer> {
        let natural = self
            .design
            .side(side)
            .image
            .as_ref()
            .ok_or(LayerError::NoImage(side))?
            .natural_size();
        let placement = self.placement(natural, mode)?;
        let image = self
            .commit()
            .side_mut(side)
            .image
            .as_mut()
            .ok_or(LayerError::NoImage(side))?;
        image.apply_placement(placement);
        Ok(image.clone())
    }

    // --- uploads ---

    /// Mark an upload in flight. Returns `false` if one already was.
    pub fn begin_upload(&mut self, side: Side) -> bool {
        self.pending_uploads.insert(side)
    }

    /// Place a finished upload on `side`, fitted to the safe area.
    pub fn complete_upload(
        &mut self,
        side: Side,
        stored: &StoredImage,
        natural: (f64, f64),
    ) -> LayerResult<ImageLayer> {
        if !self.pending_uploads.remove(&side) {
            return Err(LayerError::NoPendingUpload(side));
        }
        let image = self.place_image(side, stored.file_url.clone(), natural, FitMode::Fit)?;
        if self.active_side() == side {
            self.commit().selection = Selection::Image;
        }
        log::debug!("Upload {} placed on {}", stored.id, side);
        Ok(image)
    }

    /// Forget an in-flight upload. Nothing is placed.
    pub fn abort_upload(&mut self, side: Side) -> bool {
        self.pending_uploads.remove(&side)
    }

    pub fn is_upload_pending(&self, side: Side) -> bool {
        self.pending_uploads.contains(&side)
    }

    // --- side and selection ---

    /// Switch the edited side. Clears the selection when the side changes.
    pub fn set_active_side(&mut self, side: Side) {
        if self.design.active_side == side {
            return;
        }
        let design = self.commit();
        design.active_side = side;
        design.selection = Selection::None;
    }

    pub fn select_image(&mut self) -> LayerResult<()> {
        let side = self.active_side();
        if self.design.side(side).image.is_none() {
            return Err(LayerError::NoImage(side));
        }
        if self.design.selection != Selection::Image {
            self.commit().selection = Selection::Image;
        }
        Ok(())
    }

    pub fn select_text(&mut self, id: &LayerId) -> LayerResult<()> {
        if self.design.find_text(id).is_none() {
            return Err(LayerError::NotFound(id.clone()));
        }
        let selection = Selection::Text(id.clone());
        if self.design.selection != selection {
            self.commit().selection = selection;
        }
        Ok(())
    }

    /// Select by key on the active side.
    pub fn select(&mut self, key: &LayerKey) -> LayerResult<()> {
        match key {
            LayerKey::Image => self.select_image(),
            LayerKey::Text(id) => self.select_text(id),
        }
    }

    pub fn clear_selection(&mut self) {
        if self.design.selection != Selection::None {
            self.commit().selection = Selection::None;
        }
    }

    // --- live transforms ---

    /// Move/resize a layer of the active side to occupy `bounds`.
    pub fn set_layer_bounds(&mut self, key: &LayerKey, bounds: Rect) -> LayerResult<()> {
        let side = self.active_side();
        let position = key.anchoring().position(bounds);
        match key {
            LayerKey::Image => {
                let patch = ImagePatch {
                    x: Some(position.x),
                    y: Some(position.y),
                    width: Some(bounds.width()),
                    height: Some(bounds.height()),
                    ..Default::default()
                };
                self.update_image(side, &patch).map(|_| ())
            }
            LayerKey::Text(id) => {
                let patch = TextLayerPatch {
                    x: Some(position.x),
                    y: Some(position.y),
                    width: Some(bounds.width()),
                    height: Some(bounds.height()),
                    ..Default::default()
                };
                self.update_layer(id, &patch).map(|_| ())
            }
        }
    }

    pub fn set_layer_rotation(&mut self, key: &LayerKey, degrees: f64) -> LayerResult<()> {
        let side = self.active_side();
        match key {
            LayerKey::Image => {
                let patch = ImagePatch {
                    rotation: Some(degrees),
                    ..Default::default()
                };
                self.update_image(side, &patch).map(|_| ())
            }
            LayerKey::Text(id) => {
                let patch = TextLayerPatch {
                    rotation: Some(degrees),
                    ..Default::default()
                };
                self.update_layer(id, &patch).map(|_| ())
            }
        }
    }

    // --- templates ---

    /// Use a template (or one of its color variants) as the active side's image.
    ///
    /// An existing image keeps its geometry and only swaps source; otherwise
    /// a new layer covers the whole canvas.
    pub fn apply_template(
        &mut self,
        template: &Template,
        variant_id: Option<&str>,
        natural: Option<(f64, f64)>,
    ) -> LayerResult<ImageLayer> {
        let src = template
            .preview_for(variant_id)
            .ok_or_else(|| LayerError::UnknownVariant(variant_id.unwrap_or_default().to_string()))?
            .to_string();
        let side = self.active_side();

        if let Some(mut image) = self.design.side(side).image.clone() {
            image.src = src;
            if let Some((w, h)) = natural {
                image.natural_width = w;
                image.natural_height = h;
            }
            self.set_image(side, image.clone());
            return Ok(image);
        }

        let natural = natural.unwrap_or((self.preset.width, self.preset.height));
        self.place_image(side, src, natural, FitMode::FillCanvas)
    }
}
