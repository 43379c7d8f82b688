//! In-memory session backend.

use super::{
    BoxFuture, CreateDesignRequest, DesignCreated, DesignState, FinalizedDesign,
    InitSessionRequest, LinkDesignRequest, SaveSessionRequest, SessionBackend, SessionError,
    SessionRecord, SessionResult,
};
use crate::canvas_state::CanvasState;
use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
use crate::templates::{Template, TemplatePage, TemplateQuery};
use crate::upload::{StoredImage, UploadFile};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

fn lock_error(e: impl std::fmt::Display) -> SessionError {
    SessionError::Other(format!("Lock error: {}", e))
}

#[derive(Debug, Clone)]
struct StoredDesign {
    state: DesignState,
    finalized: bool,
}

/// Backend kept entirely in memory, for tests and offline use.
///
/// Records every save it receives so callers can observe debouncing.
#[derive(Debug)]
pub struct MemoryBackend {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    designs: RwLock<HashMap<String, StoredDesign>>,
    uploads: RwLock<HashMap<String, StoredImage>>,
    saves: RwLock<Vec<SaveSessionRequest>>,
    templates: Vec<Template>,
    max_upload_bytes: u64,
    offline: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            designs: RwLock::new(HashMap::new()),
            uploads: RwLock::new(HashMap::new()),
            saves: RwLock::new(Vec::new()),
            templates: Vec::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            offline: AtomicBool::new(false),
        }
    }

    pub fn with_templates(mut self, templates: Vec<Template>) -> Self {
        self.templates = templates;
        self
    }

    /// Make every call fail with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> SessionResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(SessionError::Network("backend offline".into()))
        } else {
            Ok(())
        }
    }

    /// Every save request received, in order.
    pub fn saves(&self) -> Vec<SaveSessionRequest> {
        self.saves.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn session(&self, id: &str) -> Option<SessionRecord> {
        self.sessions.read().ok()?.get(id).cloned()
    }

    pub fn is_finalized(&self, design_id: &str) -> bool {
        self.designs
            .read()
            .ok()
            .and_then(|d| d.get(design_id).map(|d| d.finalized))
            .unwrap_or(false)
    }
}

impl SessionBackend for MemoryBackend {
    fn init_session(&self, request: InitSessionRequest) -> BoxFuture<'_, SessionResult<SessionRecord>> {
        Box::pin(async move {
            self.check_online()?;
            let mut sessions = self.sessions.write().map_err(lock_error)?;
            if let Some(id) = &request.session_id {
                if let Some(record) = sessions.get_mut(id) {
                    if record.key == request.key {
                        record.selected_attributes = request.selected_attributes;
                        return Ok(record.clone());
                    }
                }
            }
            let mut record = SessionRecord::new(Uuid::new_v4().to_string(), request.key);
            record.selected_attributes = request.selected_attributes;
            sessions.insert(record.session_id.clone(), record.clone());
            Ok(record)
        })
    }

    fn save_session(&self, request: SaveSessionRequest) -> BoxFuture<'_, SessionResult<()>> {
        Box::pin(async move {
            self.check_online()?;
            let mut sessions = self.sessions.write().map_err(lock_error)?;
            let record = sessions
                .get_mut(&request.session_id)
                .ok_or_else(|| SessionError::NotFound(request.session_id.clone()))?;
            record.apply(request.patch.clone());
            self.saves.write().map_err(lock_error)?.push(request);
            Ok(())
        })
    }

    fn link_design(&self, request: LinkDesignRequest) -> BoxFuture<'_, SessionResult<()>> {
        Box::pin(async move {
            self.check_online()?;
            let mut sessions = self.sessions.write().map_err(lock_error)?;
            let record = sessions
                .get_mut(&request.session_id)
                .ok_or_else(|| SessionError::NotFound(request.session_id.clone()))?;
            record.design_id = Some(request.design_id);
            Ok(())
        })
    }

    fn create_design(&self, request: CreateDesignRequest) -> BoxFuture<'_, SessionResult<DesignCreated>> {
        Box::pin(async move {
            self.check_online()?;
            let id = Uuid::new_v4().to_string();
            let canvas = CanvasState::from_sides(request.front, request.back);
            let stored = StoredDesign {
                state: DesignState::from_canvas(&canvas),
                finalized: false,
            };
            self.designs.write().map_err(lock_error)?.insert(id.clone(), stored);
            Ok(DesignCreated { id })
        })
    }

    fn load_design(&self, id: &str) -> BoxFuture<'_, SessionResult<DesignState>> {
        let id = id.to_string();
        Box::pin(async move {
            self.check_online()?;
            let designs = self.designs.read().map_err(lock_error)?;
            designs
                .get(&id)
                .map(|d| d.state.clone())
                .ok_or(SessionError::NotFound(id))
        })
    }

    fn finalize_design(&self, id: &str) -> BoxFuture<'_, SessionResult<FinalizedDesign>> {
        let id = id.to_string();
        Box::pin(async move {
            self.check_online()?;
            let mut designs = self.designs.write().map_err(lock_error)?;
            let design = designs
                .get_mut(&id)
                .ok_or_else(|| SessionError::NotFound(id.clone()))?;
            design.finalized = true;
            Ok(FinalizedDesign {
                id,
                status: "finalized".into(),
            })
        })
    }

    fn upload_image(&self, file: UploadFile) -> BoxFuture<'_, SessionResult<StoredImage>> {
        Box::pin(async move {
            self.check_online()?;
            let format = file.validate(self.max_upload_bytes)?;
            let id = Uuid::new_v4().to_string();
            let created_at = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let stored = StoredImage {
                file_url: format!("memory://uploads/{id}"),
                thumbnail_url: format!("memory://uploads/{id}/thumbnail"),
                original_name: file.file_name.clone(),
                mime_type: format.mime_type().to_string(),
                file_size: file.size(),
                created_at,
                id: id.clone(),
            };
            self.uploads.write().map_err(lock_error)?.insert(id, stored.clone());
            Ok(stored)
        })
    }

    fn list_templates(&self, query: TemplateQuery) -> BoxFuture<'_, SessionResult<TemplatePage>> {
        Box::pin(async move {
            self.check_online()?;
            Ok(TemplatePage::paginate(&self.templates, &query))
        })
    }
}
