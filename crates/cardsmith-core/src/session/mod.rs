//! Persistence of the design to a remote work session.

mod clock;
mod debounce;
mod memory;
mod sync;

#[cfg(feature = "http")]
mod http;

pub use clock::{Clock, ManualClock, SystemClock};
pub use debounce::{Debouncer, ScheduledTask, TaskId};
pub use memory::MemoryBackend;
pub use sync::{SessionSync, SyncState, TeardownPolicy};

#[cfg(feature = "http")]
pub use http::HttpBackend;

use crate::canvas_state::{CanvasState, SidePayload};
use crate::layers::Side;
use crate::preset::{CardShape, Orientation};
use crate::templates::{TemplatePage, TemplateQuery};
use crate::upload::{StoredImage, UploadError, UploadFile};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Session and design collaborator errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Session unavailable; working locally")]
    LocalOnly,
    #[error("Session is closed")]
    Closed,
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("Layer error: {0}")]
    Layer(#[from] crate::store::LayerError),
    #[error("Session error: {0}")]
    Other(String),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Boxed future for collaborator calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Product options chosen alongside the design.
pub type SelectedAttributes = BTreeMap<String, Value>;

/// Identifies a work session: one per product configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub product_id: String,
    pub orientation: Orientation,
    pub shape: CardShape,
}

impl SessionKey {
    pub fn new(product_id: impl Into<String>, orientation: Orientation, shape: CardShape) -> Self {
        Self {
            product_id: product_id.into(),
            orientation,
            shape,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.product_id, self.orientation, self.shape)
    }
}

/// `POST /api/work-session/init`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitSessionRequest {
    #[serde(flatten)]
    pub key: SessionKey,
    #[serde(default)]
    pub selected_attributes: SelectedAttributes,
    /// A previously issued id to resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Server-side snapshot of a work session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    #[serde(flatten)]
    pub key: SessionKey,
    #[serde(default)]
    pub selected_attributes: SelectedAttributes,
    #[serde(default)]
    pub canvas_state: Option<CanvasState>,
    #[serde(default)]
    pub front_thumbnail: Option<String>,
    #[serde(default)]
    pub back_thumbnail: Option<String>,
    #[serde(default)]
    pub active_side: Option<Side>,
    #[serde(default)]
    pub design_id: Option<String>,
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>, key: SessionKey) -> Self {
        Self {
            session_id: session_id.into(),
            key,
            selected_attributes: SelectedAttributes::new(),
            canvas_state: None,
            front_thumbnail: None,
            back_thumbnail: None,
            active_side: None,
            design_id: None,
        }
    }

    /// Fold a saved patch into the record.
    pub fn apply(&mut self, patch: SessionPatch) {
        if let Some(attrs) = patch.selected_attributes {
            self.selected_attributes = attrs;
        }
        if patch.canvas_state.is_some() {
            self.canvas_state = patch.canvas_state;
        }
        if patch.front_thumbnail.is_some() {
            self.front_thumbnail = patch.front_thumbnail;
        }
        if patch.back_thumbnail.is_some() {
            self.back_thumbnail = patch.back_thumbnail;
        }
        if patch.active_side.is_some() {
            self.active_side = patch.active_side;
        }
    }
}

/// Fields to persist. `None` means "unchanged".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_attributes: Option<SelectedAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas_state: Option<CanvasState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front_thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back_thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_side: Option<Side>,
}

impl SessionPatch {
    pub fn canvas(state: CanvasState) -> Self {
        Self {
            canvas_state: Some(state),
            ..Default::default()
        }
    }

    pub fn thumbnail(side: Side, reference: impl Into<String>) -> Self {
        let reference = Some(reference.into());
        match side {
            Side::Front => Self {
                front_thumbnail: reference,
                ..Default::default()
            },
            Side::Back => Self {
                back_thumbnail: reference,
                ..Default::default()
            },
        }
    }

    /// Field-wise merge; fields set in `later` win.
    pub fn merge(&mut self, later: SessionPatch) {
        if later.selected_attributes.is_some() {
            self.selected_attributes = later.selected_attributes;
        }
        if later.canvas_state.is_some() {
            self.canvas_state = later.canvas_state;
        }
        if later.front_thumbnail.is_some() {
            self.front_thumbnail = later.front_thumbnail;
        }
        if later.back_thumbnail.is_some() {
            self.back_thumbnail = later.back_thumbnail;
        }
        if later.active_side.is_some() {
            self.active_side = later.active_side;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// `POST /api/work-session/save`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveSessionRequest {
    pub session_id: String,
    #[serde(flatten)]
    pub patch: SessionPatch,
}

/// `POST /api/work-session/link-design`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkDesignRequest {
    pub session_id: String,
    pub design_id: String,
}

/// `POST /api/design`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDesignRequest {
    #[serde(flatten)]
    pub key: SessionKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub front: SidePayload,
    #[serde(default)]
    pub back: SidePayload,
}

/// Response of `POST /api/design`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignCreated {
    pub id: String,
}

/// `GET /api/design/:id/edit`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignState {
    pub front_canvas_state: SidePayload,
    pub back_canvas_state: SidePayload,
    pub front_image_url: Option<String>,
    pub back_image_url: Option<String>,
}

impl DesignState {
    pub fn from_canvas(state: &CanvasState) -> Self {
        Self {
            front_canvas_state: state.side_payload(Side::Front),
            back_canvas_state: state.side_payload(Side::Back),
            front_image_url: state.front_image.as_ref().map(|i| i.src.clone()),
            back_image_url: state.back_image.as_ref().map(|i| i.src.clone()),
        }
    }

    pub fn image_url(&self, side: Side) -> Option<&str> {
        match side {
            Side::Front => self.front_image_url.as_deref(),
            Side::Back => self.back_image_url.as_deref(),
        }
    }
}

/// Response of `POST /api/design/:id/finalize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedDesign {
    pub id: String,
    pub status: String,
}

/// The remote collaborators behind a work session.
pub trait SessionBackend: Send + Sync {
    fn init_session(&self, request: InitSessionRequest) -> BoxFuture<'_, SessionResult<SessionRecord>>;

    fn save_session(&self, request: SaveSessionRequest) -> BoxFuture<'_, SessionResult<()>>;

    fn link_design(&self, request: LinkDesignRequest) -> BoxFuture<'_, SessionResult<()>>;

    fn create_design(&self, request: CreateDesignRequest) -> BoxFuture<'_, SessionResult<DesignCreated>>;

    fn load_design(&self, id: &str) -> BoxFuture<'_, SessionResult<DesignState>>;

    fn finalize_design(&self, id: &str) -> BoxFuture<'_, SessionResult<FinalizedDesign>>;

    fn upload_image(&self, file: UploadFile) -> BoxFuture<'_, SessionResult<StoredImage>>;

    fn list_templates(&self, query: TemplateQuery) -> BoxFuture<'_, SessionResult<TemplatePage>>;
}

#[cfg(test)]
pub(crate) fn block_on<F: Future>(f: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn dummy_raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut f = std::pin::pin!(f);

    loop {
        if let Poll::Ready(result) = f.as_mut().poll(&mut cx) {
            return result;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patch_merge_later_wins() {
        let mut first = SessionPatch::thumbnail(Side::Front, "front-1");
        first.active_side = Some(Side::Front);
        let mut second = SessionPatch::thumbnail(Side::Back, "back-1");
        second.active_side = Some(Side::Back);

        first.merge(second);
        assert_eq!(first.front_thumbnail.as_deref(), Some("front-1"));
        assert_eq!(first.back_thumbnail.as_deref(), Some("back-1"));
        assert_eq!(first.active_side, Some(Side::Back));
    }

    #[test]
    fn test_save_request_is_flat_snake_case() {
        let request = SaveSessionRequest {
            session_id: "s1".into(),
            patch: SessionPatch::thumbnail(Side::Front, "data:image/png;base64,AA=="),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["session_id"], "s1");
        assert_eq!(json["front_thumbnail"], "data:image/png;base64,AA==");
        assert!(json.get("canvas_state").is_none());
    }

    #[test]
    fn test_init_request_flattens_key() {
        let request = InitSessionRequest {
            key: SessionKey::new("bc-1", Orientation::Portrait, CardShape::Rounded),
            selected_attributes: SelectedAttributes::new(),
            session_id: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, json!({
            "product_id": "bc-1",
            "orientation": "portrait",
            "shape": "rounded",
            "selected_attributes": {},
        }));
    }

    #[test]
    fn test_save_request_accepts_partial_layers() {
        let request: SaveSessionRequest = serde_json::from_value(json!({
            "session_id": "s1",
            "canvas_state": {
                "front": [{"text": "hi"}, "junk"],
                "back": [{"id": 5, "fontSize": 30}],
                "frontImage": {"src": "f.png", "x": 450},
            },
        }))
        .unwrap();
        let state = request.patch.canvas_state.unwrap();
        assert_eq!(state.front.len(), 1);
        assert_eq!(state.front[0].text, "hi");
        assert!(!state.front[0].id.as_str().is_empty());
        assert_eq!(state.back[0].id.as_str(), "5");
        assert_eq!(state.back[0].font_size, 30);
        assert_eq!(state.front_image.unwrap().x, 450.0);
    }

    #[test]
    fn test_design_state_accepts_partial_layers() {
        let design: DesignState = serde_json::from_value(json!({
            "front_canvas_state": {"text": [{"id": "a", "text": "hi"}], "image": null},
            "back_canvas_state": {"text": [{}, 3], "image": {"width": 10}},
            "back_image_url": "b.png",
        }))
        .unwrap();
        assert_eq!(design.front_canvas_state.text[0].id.as_str(), "a");
        assert_eq!(design.front_canvas_state.text[0].width, 200.0);
        assert_eq!(design.back_canvas_state.text.len(), 1);
        assert!(design.back_canvas_state.image.is_none());
        assert_eq!(design.image_url(Side::Back), Some("b.png"));
    }

    #[test]
    fn test_design_state_from_canvas() {
        let state = CanvasState::from_json(&json!({"backImage": {"src": "b.png"}}));
        let design = DesignState::from_canvas(&state);
        assert_eq!(design.image_url(Side::Back), Some("b.png"));
        assert_eq!(design.image_url(Side::Front), None);
    }
}
