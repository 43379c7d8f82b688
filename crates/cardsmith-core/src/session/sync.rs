//! Debounced session persistence.
//!
//! `SessionSync` owns the work session for the current product key. Saves
//! are coalesced behind a quiescence window and written by [`SessionSync::tick`]
//! once the injected clock says the window has passed. When the backend is
//! unreachable at init the editor keeps working locally and saves are dropped.

use super::{
    Clock, CreateDesignRequest, Debouncer, DesignState, FinalizedDesign, InitSessionRequest,
    LinkDesignRequest, SaveSessionRequest, SelectedAttributes, SessionBackend, SessionError,
    SessionKey, SessionPatch, SessionRecord, SessionResult, TaskId,
};
use crate::canvas_state::CanvasState;
use crate::config::EditorConfig;
use crate::layers::{ImageLayer, Side};
use crate::store::{FitMode, LayerError, LayerStore};
use crate::templates::{TemplatePage, TemplateQuery};
use crate::upload::UploadFile;
use std::collections::HashMap;
use std::sync::Arc;

/// Connection state of the sync.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Uninitialized,
    Active {
        session_id: String,
    },
    /// Init failed; saves are no-ops.
    LocalOnly,
    /// Shut down; everything is ignored.
    Closed,
}

/// What happens to a pending save on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownPolicy {
    /// Write it now.
    Flush,
    /// Discard it.
    Drop,
}

/// Keeps the remote work session in step with the editor.
pub struct SessionSync {
    backend: Arc<dyn SessionBackend>,
    clock: Arc<dyn Clock>,
    state: SyncState,
    key: Option<SessionKey>,
    known_sessions: HashMap<SessionKey, String>,
    debouncer: Debouncer<SessionPatch>,
    design_id: Option<String>,
    max_upload_bytes: u64,
}

impl SessionSync {
    pub fn new(backend: Arc<dyn SessionBackend>, clock: Arc<dyn Clock>, config: &EditorConfig) -> Self {
        Self {
            backend,
            clock,
            state: SyncState::Uninitialized,
            key: None,
            known_sessions: HashMap::new(),
            debouncer: Debouncer::new(config.autosave_debounce()),
            design_id: None,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    /// Seed session ids issued in an earlier run so [`SessionSync::init`]
    /// resumes them instead of starting fresh.
    pub fn with_known_sessions(mut self, sessions: impl IntoIterator<Item = (SessionKey, String)>) -> Self {
        self.known_sessions.extend(sessions);
        self
    }

    /// Session ids issued so far, per product configuration.
    pub fn known_sessions(&self) -> &HashMap<SessionKey, String> {
        &self.known_sessions
    }

    /// Hydrate `store` from the canvas state of a resumed session.
    ///
    /// Returns `false` and leaves the store alone when the record has no
    /// saved canvas.
    pub fn restore_into(record: &SessionRecord, store: &mut LayerStore) -> bool {
        let Some(state) = &record.canvas_state else {
            return false;
        };
        store.set_all_layers(state);
        if let Some(side) = record.active_side {
            store.set_active_side(side);
        }
        log::debug!("Restored session {} into the editor", record.session_id);
        true
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        match &self.state {
            SyncState::Active { session_id } => Some(session_id),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&SessionKey> {
        self.key.as_ref()
    }

    pub fn design_id(&self) -> Option<&str> {
        self.design_id.as_deref()
    }

    pub fn has_pending_save(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Start or resume the session for `key`.
    ///
    /// A different key supersedes the current session after flushing its
    /// pending save. Returns the server record, or `None` when working
    /// locally.
    pub async fn init(&mut self, key: SessionKey, selected_attributes: SelectedAttributes) -> Option<SessionRecord> {
        if self.state == SyncState::Closed {
            return None;
        }
        if self.key.as_ref().is_some_and(|current| *current != key) {
            self.flush().await;
            log::info!("Superseding session for {}", key);
        }
        self.debouncer.cancel();
        self.key = Some(key.clone());

        let request = InitSessionRequest {
            session_id: self.known_sessions.get(&key).cloned(),
            key: key.clone(),
            selected_attributes,
        };
        match self.backend.init_session(request).await {
            Ok(record) => {
                log::debug!("Session {} active for {}", record.session_id, key);
                self.known_sessions.insert(key, record.session_id.clone());
                self.design_id = record.design_id.clone();
                self.state = SyncState::Active {
                    session_id: record.session_id.clone(),
                };
                Some(record)
            }
            Err(e) => {
                log::warn!("Session init failed, continuing locally: {}", e);
                self.state = SyncState::LocalOnly;
                None
            }
        }
    }

    /// Queue `patch`, merged into any pending one, and restart the window.
    pub fn save(&mut self, patch: SessionPatch) -> Option<TaskId> {
        if !matches!(self.state, SyncState::Active { .. }) {
            return None;
        }
        let now = self.clock.now();
        Some(self.debouncer.schedule_with(now, |previous| {
            let mut merged = previous.unwrap_or_default();
            merged.merge(patch);
            merged
        }))
    }

    /// Write the pending save if its window has passed.
    pub async fn tick(&mut self) -> bool {
        let now = self.clock.now();
        match self.debouncer.take_due(now) {
            Some(patch) => self.write(patch).await,
            None => false,
        }
    }

    /// Write the pending save now.
    pub async fn flush(&mut self) -> bool {
        match self.debouncer.take() {
            Some(patch) => self.write(patch).await,
            None => false,
        }
    }

    async fn write(&mut self, patch: SessionPatch) -> bool {
        let Some(session_id) = self.session_id().map(str::to_string) else {
            return false;
        };
        let request = SaveSessionRequest { session_id, patch };
        match self.backend.save_session(request).await {
            Ok(()) => {
                log::debug!("Session saved");
                true
            }
            Err(e) => {
                log::warn!("Session save failed: {}", e);
                false
            }
        }
    }

    /// Stop syncing. Later calls are ignored.
    pub async fn shutdown(&mut self, policy: TeardownPolicy) {
        if policy == TeardownPolicy::Flush {
            self.flush().await;
        }
        if let Some(task) = self.debouncer.cancel() {
            log::debug!("Dropped pending save {:?}", task.id);
        }
        self.state = SyncState::Closed;
    }

    /// Attach a design to the session, bypassing the debounce.
    pub async fn link_design(&mut self, design_id: impl Into<String>) -> bool {
        let design_id = design_id.into();
        self.design_id = Some(design_id.clone());
        let Some(session_id) = self.session_id().map(str::to_string) else {
            return false;
        };
        let request = LinkDesignRequest {
            session_id,
            design_id,
        };
        match self.backend.link_design(request).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Linking design failed: {}", e);
                false
            }
        }
    }

    /// Create a design resource from the store and link it.
    pub async fn create_design(&mut self, store: &LayerStore) -> SessionResult<String> {
        let key = self
            .key
            .clone()
            .ok_or_else(|| SessionError::Other("no session key; call init first".into()))?;
        let state = store.to_canvas_state();
        let request = CreateDesignRequest {
            key,
            session_id: self.session_id().map(str::to_string),
            front: state.side_payload(Side::Front),
            back: state.side_payload(Side::Back),
        };
        let created = self.backend.create_design(request).await?;
        log::info!("Created design {}", created.id);
        self.link_design(created.id.clone()).await;
        Ok(created.id)
    }

    /// Fetch a design and hydrate `store` from it.
    ///
    /// An image known only by URL is placed to cover the canvas.
    pub async fn load_design(&mut self, id: &str, store: &mut LayerStore) -> SessionResult<DesignState> {
        let design = self.backend.load_design(id).await?;
        let mut state = CanvasState::from_sides(
            design.front_canvas_state.clone(),
            design.back_canvas_state.clone(),
        );
        let canvas = (store.preset().width, store.preset().height);
        for side in Side::all() {
            if state.image(side).is_some() {
                continue;
            }
            if let Some(url) = design.image_url(side) {
                let placement = store
                    .placement(canvas, FitMode::FillCanvas)
                    .map_err(LayerError::from)?;
                let image = Some(ImageLayer::placed(url, placement, canvas));
                match side {
                    Side::Front => state.front_image = image,
                    Side::Back => state.back_image = image,
                }
            }
        }
        store.set_all_layers(&state);
        self.design_id = Some(id.to_string());
        Ok(design)
    }

    /// Flush pending work and finalize the design.
    pub async fn finalize_design(&mut self, id: &str) -> SessionResult<FinalizedDesign> {
        self.flush().await;
        self.backend.finalize_design(id).await
    }

    /// Validate, upload and place an image on `side`.
    ///
    /// The layer appears only once the upload succeeds; a failure leaves the
    /// side untouched.
    pub async fn upload_image(
        &mut self,
        store: &mut LayerStore,
        side: Side,
        file: UploadFile,
        natural: (f64, f64),
    ) -> SessionResult<ImageLayer> {
        file.validate(self.max_upload_bytes)?;
        if !store.begin_upload(side) {
            return Err(SessionError::Other(format!("upload already in progress on {side}")));
        }
        match self.backend.upload_image(file).await {
            Ok(stored) => Ok(store.complete_upload(side, &stored, natural)?),
            Err(e) => {
                store.abort_upload(side);
                log::warn!("Upload failed: {}", e);
                Err(e)
            }
        }
    }

    pub async fn list_templates(&self, query: TemplateQuery) -> SessionResult<TemplatePage> {
        self.backend.list_templates(query).await
    }
}
