//! Pointer interaction state machine.
//!
//! Translates pointer input on the active side into layer store mutations.
//! Every move is computed from the pointer and bounds captured when the
//! interaction started, never from the previous frame.

use crate::geometry::{
    HandleId, ResizeConstraints, ResizeHandles, apply_resize, apply_rotation,
    resize_handle_positions, rotate_handle_position, to_layer_space,
};
use crate::layers::Side;
use crate::store::{LayerKey, LayerRef, LayerStore};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Pointers closer than this to the rotation center do not change the angle.
const MIN_ROTATION_RADIUS: f64 = 1.0;

/// What the pointer is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    #[default]
    Idle,
    Dragging,
    Resizing,
    Rotating,
}

/// Serializable interaction state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionState {
    pub mode: InteractionMode,
    pub active_layer: Option<LayerKey>,
    pub handle: Option<HandleId>,
    /// Corner held fixed while resizing.
    pub anchor: Option<Point>,
    pub start_pointer: Option<Point>,
    pub start_bounds: Option<Rect>,
    #[serde(default)]
    pub start_rotation: f64,
}

/// Outcome of a pointer event.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionEvent {
    /// Nothing changed.
    Ignored,
    /// Empty canvas was hit; the selection was cleared.
    Deselected,
    /// A layer was hit and an interaction started.
    Started {
        layer: LayerKey,
        mode: InteractionMode,
    },
    /// The active layer was transformed.
    Updated(LayerKey),
    /// The interaction ended; previews should regenerate.
    Committed(LayerKey),
    /// The interaction was abandoned and the layer restored.
    Aborted(LayerKey),
}

/// Drives drag, resize and rotate on the active side.
#[derive(Debug, Clone, Default)]
pub struct InteractionController {
    state: InteractionState,
}

enum Hit {
    Rotate(LayerKey),
    Handle(LayerKey, HandleId),
    Body(LayerKey),
}

impl Hit {
    fn targets_text(&self) -> bool {
        let (Hit::Rotate(key) | Hit::Handle(key, _) | Hit::Body(key)) = self;
        matches!(key, LayerKey::Text(_))
    }
}

fn contains_rotated(layer: &LayerRef<'_>, point: Point) -> bool {
    let bounds = layer.bounds();
    bounds.contains(to_layer_space(point, bounds.center(), layer.rotation()))
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn mode(&self) -> InteractionMode {
        self.state.mode
    }

    pub fn is_active(&self) -> bool {
        self.state.mode != InteractionMode::Idle
    }

    /// Corner handles of the selected layer on the active side.
    pub fn handles(&self, store: &LayerStore) -> Option<ResizeHandles> {
        let selected = Self::selected_on_active(store)?;
        Some(resize_handle_positions(selected.bounds()))
    }

    fn selected_on_active(store: &LayerStore) -> Option<LayerRef<'_>> {
        let key = store.selected_layer()?.key();
        store.design().layer(store.active_side(), &key)
    }

    fn hit_text(store: &LayerStore, side: Side, point: Point) -> Option<LayerKey> {
        store
            .current_layers(side)
            .text
            .iter()
            .rev()
            .map(LayerRef::Text)
            .find(|layer| contains_rotated(layer, point))
            .map(|layer| layer.key())
    }

    fn hit_test(store: &LayerStore, point: Point) -> Option<Hit> {
        let config = store.config();
        let side = store.active_side();

        if let Some(selected) = Self::selected_on_active(store) {
            let bounds = selected.bounds();
            let rotate = rotate_handle_position(bounds, config.rotate_handle_offset);
            if rotate.distance(point) <= config.handle_hit_tolerance {
                return Some(Hit::Rotate(selected.key()));
            }
            if let Some(handle) =
                resize_handle_positions(bounds).hit_test(point, config.handle_hit_tolerance)
            {
                return Some(Hit::Handle(selected.key(), handle));
            }
        }

        if let Some(key) = Self::hit_text(store, side, point) {
            return Some(Hit::Body(key));
        }

        store
            .current_layers(side)
            .image
            .as_ref()
            .map(LayerRef::Image)
            .filter(|layer| contains_rotated(layer, point))
            .map(|layer| Hit::Body(layer.key()))
    }

    /// Handle a pointer press at `point` (canvas pixels).
    pub fn pointer_down(&mut self, store: &mut LayerStore, point: Point) -> InteractionEvent {
        let side = store.active_side();
        let hit = Self::hit_test(store, point);
        // The image region is not populated until the upload lands.
        if store.is_upload_pending(side) && !hit.as_ref().is_some_and(Hit::targets_text) {
            return InteractionEvent::Ignored;
        }

        let Some(hit) = hit else {
            if self.is_active() {
                self.abort(store);
            }
            store.clear_selection();
            return InteractionEvent::Deselected;
        };

        let (key, mode, handle) = match hit {
            Hit::Rotate(key) => (key, InteractionMode::Rotating, None),
            Hit::Handle(key, handle) => (key, InteractionMode::Resizing, Some(handle)),
            Hit::Body(key) => (key, InteractionMode::Dragging, None),
        };

        let already_selected = store.selected_layer().map(|l| l.key()) == Some(key.clone());
        if !already_selected {
            if self.is_active() {
                self.abort(store);
            }
            if store.select(&key).is_err() {
                return InteractionEvent::Ignored;
            }
        }

        let Some(layer) = store.design().layer(side, &key) else {
            return InteractionEvent::Ignored;
        };
        let bounds = layer.bounds();
        self.state = InteractionState {
            mode,
            active_layer: Some(key.clone()),
            handle,
            anchor: handle.map(|h| h.opposite().corner_of(bounds)),
            start_pointer: Some(point),
            start_bounds: Some(bounds),
            start_rotation: layer.rotation(),
        };
        log::debug!("Interaction {:?} started on {:?}", mode, key);
        InteractionEvent::Started { layer: key, mode }
    }

    /// Handle pointer motion. Applies the transform live.
    pub fn pointer_move(&mut self, store: &mut LayerStore, point: Point) -> InteractionEvent {
        let (Some(key), Some(start), Some(bounds)) = (
            self.state.active_layer.clone(),
            self.state.start_pointer,
            self.state.start_bounds,
        ) else {
            return InteractionEvent::Ignored;
        };
        let delta = point - start;

        let result = match self.state.mode {
            InteractionMode::Idle => return InteractionEvent::Ignored,
            InteractionMode::Dragging => store.set_layer_bounds(&key, bounds + delta),
            InteractionMode::Resizing => {
                let Some(handle) = self.state.handle else {
                    return InteractionEvent::Ignored;
                };
                let constraints = ResizeConstraints::with_min_size(store.config().min_layer_size);
                store.set_layer_bounds(&key, apply_resize(bounds, handle, delta, &constraints))
            }
            InteractionMode::Rotating => {
                let center = bounds.center();
                if center.distance(point) < MIN_ROTATION_RADIUS {
                    return InteractionEvent::Ignored;
                }
                store.set_layer_rotation(&key, apply_rotation(center, point))
            }
        };

        match result {
            Ok(()) => InteractionEvent::Updated(key),
            Err(e) => {
                log::warn!("Interaction target vanished: {}", e);
                self.state = InteractionState::default();
                InteractionEvent::Ignored
            }
        }
    }

    /// Finish the interaction, keeping the last applied transform.
    pub fn pointer_up(&mut self, _store: &mut LayerStore) -> InteractionEvent {
        let state = std::mem::take(&mut self.state);
        match state.active_layer {
            Some(key) if state.mode != InteractionMode::Idle => InteractionEvent::Committed(key),
            _ => InteractionEvent::Ignored,
        }
    }

    /// Pointer left or the platform cancelled it. Same as release.
    pub fn pointer_cancel(&mut self, store: &mut LayerStore) -> InteractionEvent {
        self.pointer_up(store)
    }

    /// Abandon the interaction and put the layer back where it started.
    pub fn abort(&mut self, store: &mut LayerStore) -> InteractionEvent {
        let state = std::mem::take(&mut self.state);
        let (Some(key), Some(bounds)) = (state.active_layer, state.start_bounds) else {
            return InteractionEvent::Ignored;
        };
        if state.mode == InteractionMode::Idle {
            return InteractionEvent::Ignored;
        }
        let restored = store
            .set_layer_bounds(&key, bounds)
            .and_then(|_| store.set_layer_rotation(&key, state.start_rotation));
        if let Err(e) = restored {
            log::warn!("Could not restore layer after abort: {}", e);
        }
        InteractionEvent::Aborted(key)
    }
}
