//! In-memory server state and API errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cardsmith_core::canvas_state::CanvasState;
use cardsmith_core::config::DEFAULT_MAX_UPLOAD_BYTES;
use cardsmith_core::session::{
    CreateDesignRequest, DesignCreated, DesignState, FinalizedDesign, InitSessionRequest,
    LinkDesignRequest, SaveSessionRequest, SessionKey, SessionRecord,
};
use cardsmith_core::templates::{ColorVariant, Template, TemplatePage, TemplateQuery};
use cardsmith_core::upload::{StoredImage, UploadError, UploadRequest};
use dashmap::DashMap;
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Errors returned by the API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upload(UploadError::UnsupportedType(_)) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Upload(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// A saved design.
#[derive(Debug, Clone)]
pub struct StoredDesign {
    pub key: SessionKey,
    pub session_id: Option<String>,
    pub state: DesignState,
    pub finalized: bool,
}

/// An uploaded file and its metadata.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub meta: StoredImage,
    pub data: Vec<u8>,
}

/// Shared application state
pub struct AppState {
    sessions: DashMap<String, SessionRecord>,
    designs: DashMap<String, StoredDesign>,
    uploads: DashMap<String, StoredUpload>,
    templates: Vec<Template>,
    max_upload_bytes: u64,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::with_templates(default_templates())
    }

    pub fn with_templates(templates: Vec<Template>) -> Self {
        Self {
            sessions: DashMap::new(),
            designs: DashMap::new(),
            uploads: DashMap::new(),
            templates,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Resume the session named in the request if it exists for the same
    /// key, otherwise open a new one.
    pub fn init_session(&self, request: InitSessionRequest) -> SessionRecord {
        if let Some(id) = &request.session_id {
            if let Some(mut record) = self.sessions.get_mut(id) {
                if record.key == request.key {
                    record.selected_attributes = request.selected_attributes;
                    return record.clone();
                }
            }
        }
        let mut record = SessionRecord::new(Uuid::new_v4().to_string(), request.key);
        record.selected_attributes = request.selected_attributes;
        info!("Opened session {} for {}", record.session_id, record.key);
        self.sessions.insert(record.session_id.clone(), record.clone());
        record
    }

    pub fn save_session(&self, request: SaveSessionRequest) -> ApiResult<()> {
        let mut record = self
            .sessions
            .get_mut(&request.session_id)
            .ok_or_else(|| ApiError::NotFound(format!("session {}", request.session_id)))?;
        record.apply(request.patch);
        Ok(())
    }

    pub fn link_design(&self, request: LinkDesignRequest) -> ApiResult<()> {
        if !self.designs.contains_key(&request.design_id) {
            return Err(ApiError::NotFound(format!("design {}", request.design_id)));
        }
        let mut record = self
            .sessions
            .get_mut(&request.session_id)
            .ok_or_else(|| ApiError::NotFound(format!("session {}", request.session_id)))?;
        record.design_id = Some(request.design_id);
        Ok(())
    }

    pub fn session(&self, id: &str) -> Option<SessionRecord> {
        self.sessions.get(id).map(|r| r.clone())
    }

    pub fn create_design(&self, request: CreateDesignRequest) -> DesignCreated {
        let id = Uuid::new_v4().to_string();
        let canvas = CanvasState::from_sides(request.front, request.back);
        let design = StoredDesign {
            key: request.key,
            session_id: request.session_id,
            state: DesignState::from_canvas(&canvas),
            finalized: false,
        };
        info!("Created design {} for {}", id, design.key);
        self.designs.insert(id.clone(), design);
        DesignCreated { id }
    }

    pub fn load_design(&self, id: &str) -> ApiResult<DesignState> {
        self.designs
            .get(id)
            .map(|d| d.state.clone())
            .ok_or_else(|| ApiError::NotFound(format!("design {id}")))
    }

    /// Mark a design as final. Finalizing twice is harmless.
    pub fn finalize_design(&self, id: &str) -> ApiResult<FinalizedDesign> {
        let mut design = self
            .designs
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("design {id}")))?;
        if !design.finalized {
            design.finalized = true;
            info!("Finalized design {}", id);
        }
        Ok(FinalizedDesign {
            id: id.to_string(),
            status: "finalized".into(),
        })
    }

    /// Validate and store an upload.
    pub fn upload(&self, request: UploadRequest) -> ApiResult<StoredImage> {
        let file = request.into_file()?;
        let format = file.validate(self.max_upload_bytes).inspect_err(|e| {
            warn!("Rejected upload {}: {}", file.file_name, e);
        })?;
        let id = Uuid::new_v4().to_string();
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let meta = StoredImage {
            file_url: format!("/api/uploads/{id}"),
            thumbnail_url: format!("/api/uploads/{id}"),
            original_name: file.file_name.clone(),
            mime_type: format.mime_type().to_string(),
            file_size: file.size(),
            created_at,
            id: id.clone(),
        };
        info!("Stored upload {} ({} bytes)", id, meta.file_size);
        self.uploads.insert(
            id,
            StoredUpload {
                meta: meta.clone(),
                data: file.data,
            },
        );
        Ok(meta)
    }

    pub fn upload_file(&self, id: &str) -> ApiResult<StoredUpload> {
        self.uploads
            .get(id)
            .map(|u| u.clone())
            .ok_or_else(|| ApiError::NotFound(format!("upload {id}")))
    }

    pub fn list_templates(&self, query: &TemplateQuery) -> TemplatePage {
        TemplatePage::paginate(&self.templates, query)
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }
}

fn default_templates() -> Vec<Template> {
    let variant = |template: &str, id: &str, hex: &str, name: &str| ColorVariant {
        id: id.into(),
        color_hex: hex.into(),
        color_name: name.into(),
        preview_url: format!("/static/templates/{template}-{id}.png"),
    };
    vec![
        Template {
            id: "minimal".into(),
            name: "Minimal".into(),
            preview_url: "/static/templates/minimal.png".into(),
            color_variants: vec![
                variant("minimal", "ivory", "#fffff0", "Ivory"),
                variant("minimal", "slate", "#708090", "Slate"),
            ],
            base_price: 0.0,
        },
        Template {
            id: "stripe".into(),
            name: "Stripe".into(),
            preview_url: "/static/templates/stripe.png".into(),
            color_variants: vec![
                variant("stripe", "navy", "#001f3f", "Navy"),
                variant("stripe", "forest", "#228b22", "Forest"),
            ],
            base_price: 2.5,
        },
        Template {
            id: "gradient".into(),
            name: "Gradient".into(),
            preview_url: "/static/templates/gradient.png".into(),
            color_variants: Vec::new(),
            base_price: 4.0,
        },
    ]
}
