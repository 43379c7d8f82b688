//! Cardsmith Core Library
//!
//! Platform-agnostic data model and editing logic for the Cardsmith
//! business card editor: placement geometry, the layer store, the pointer
//! interaction state machine and debounced session persistence.

pub mod canvas_state;
pub mod config;
pub mod geometry;
pub mod interaction;
pub mod layers;
pub mod preset;
pub mod session;
pub mod store;
pub mod templates;
pub mod upload;

pub use canvas_state::{CanvasState, SidePayload};
pub use config::EditorConfig;
pub use geometry::{Anchoring, GeometryError, GeometryResult, HandleId, Placement};
pub use interaction::{InteractionController, InteractionEvent, InteractionMode, InteractionState};
pub use layers::{ImageLayer, LayerId, Side, TextLayer, TextLayerPatch};
pub use preset::{CardPreset, CardShape, ConfigError, Orientation};
pub use session::{SessionBackend, SessionError, SessionKey, SessionPatch, SessionResult, SessionSync};
pub use store::{Design, FitMode, LayerError, LayerKey, LayerResult, LayerStore, Selection, TextSource, ZOrder};
pub use templates::{Template, TemplatePage};
pub use upload::{StoredImage, UploadError, UploadFile};
