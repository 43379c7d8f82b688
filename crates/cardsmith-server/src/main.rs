//! Cardsmith REST Server
//!
//! Keeps work sessions, designs, uploads and the template catalog in memory
//! and serves them over the `/api` endpoints the editor talks to.
//!
//! ## Endpoints
//!
//! ```text
//! POST /api/work-session/init         InitSessionRequest -> SessionRecord
//! POST /api/work-session/save         SaveSessionRequest
//! POST /api/work-session/link-design  LinkDesignRequest
//! POST /api/design                    CreateDesignRequest -> { id }
//! GET  /api/design/{id}/edit          DesignState
//! POST /api/design/{id}/finalize      { id, status }
//! POST /api/upload                    { file_name, mime_type, data (base64) } -> StoredImage
//! GET  /api/uploads/{id}              raw file
//! GET  /api/templates                 ?page&per_page&product_id -> TemplatePage
//! ```

mod state;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
};
use cardsmith_core::session::{
    CreateDesignRequest, DesignCreated, DesignState, FinalizedDesign, InitSessionRequest,
    LinkDesignRequest, SaveSessionRequest, SessionRecord,
};
use cardsmith_core::templates::{TemplatePage, TemplateQuery};
use cardsmith_core::upload::{StoredImage, UploadRequest};
use serde_json::{Value, json};
use state::{ApiResult, AppState};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Default listen address
const DEFAULT_ADDR: &str = "0.0.0.0:3040";

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardsmith_server=info,tower_http=info".into()),
        )
        .init();

    let addr = listen_addr(std::env::var("CARDSMITH_ADDR").ok().as_deref());
    let state = Arc::new(AppState::new());
    let app = router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("Cardsmith server listening on {}", addr);
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}

/// Parse the listen address, falling back to [`DEFAULT_ADDR`].
fn listen_addr(configured: Option<&str>) -> SocketAddr {
    let fallback = || SocketAddr::from(([0, 0, 0, 0], 3040));
    match configured {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            error!("Invalid CARDSMITH_ADDR '{}', using {}", raw, DEFAULT_ADDR);
            fallback()
        }),
        None => fallback(),
    }
}

fn router(state: Arc<AppState>) -> Router {
    // Base64 inflates uploads by a third; leave room for the JSON envelope.
    let body_limit = (state.max_upload_bytes() as usize / 3 + 1) * 4 + 64 * 1024;

    Router::new()
        .route("/health", get(health))
        .route("/api/work-session/init", post(init_session))
        .route("/api/work-session/save", post(save_session))
        .route("/api/work-session/link-design", post(link_design))
        .route("/api/design", post(create_design))
        .route("/api/design/{id}/edit", get(load_design))
        .route("/api/design/{id}/finalize", post(finalize_design))
        .route("/api/upload", post(upload))
        .route("/api/uploads/{id}", get(uploaded_file))
        .route("/api/templates", get(list_templates))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

async fn init_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InitSessionRequest>,
) -> Json<SessionRecord> {
    Json(state.init_session(request))
}

async fn save_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SaveSessionRequest>,
) -> ApiResult<Json<Value>> {
    state.save_session(request)?;
    Ok(Json(json!({ "success": true })))
}

async fn link_design(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LinkDesignRequest>,
) -> ApiResult<Json<Value>> {
    state.link_design(request)?;
    Ok(Json(json!({ "success": true })))
}

async fn create_design(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateDesignRequest>,
) -> Json<DesignCreated> {
    Json(state.create_design(request))
}

async fn load_design(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<DesignState>> {
    state.load_design(&id).map(Json)
}

async fn finalize_design(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<FinalizedDesign>> {
    state.finalize_design(&id).map(Json)
}

async fn upload(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UploadRequest>,
) -> ApiResult<Json<StoredImage>> {
    state.upload(request).map(Json)
}

async fn uploaded_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let file = state.upload_file(&id)?;
    Ok(([(header::CONTENT_TYPE, file.meta.mime_type)], file.data))
}

async fn list_templates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TemplateQuery>,
) -> Json<TemplatePage> {
    Json(state.list_templates(&query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, Bytes};
    use axum::http::{HeaderMap, Request, StatusCode};
    use base64::Engine as _;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, HeaderMap, Bytes) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, bytes)
    }

    async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, _, bytes) = send(app, method, uri, body).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn test_app() -> Router {
        router(Arc::new(AppState::new()))
    }

    #[test]
    fn test_listen_addr() {
        assert_eq!(listen_addr(None).to_string(), DEFAULT_ADDR);
        assert_eq!(listen_addr(Some("127.0.0.1:8080")).port(), 8080);
        assert_eq!(listen_addr(Some("not an address")).to_string(), DEFAULT_ADDR);
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _, body) = send(&test_app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_session_save_accepts_partial_layers() {
        let app = test_app();
        let key = json!({ "product_id": "bc", "orientation": "landscape", "shape": "rectangle" });
        let (status, record) = send_json(&app, "POST", "/api/work-session/init", Some(key.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let session_id = record["session_id"].as_str().unwrap().to_string();

        let save = json!({
            "session_id": session_id,
            "canvas_state": {
                "front": [{ "text": "hi" }, 3],
                "frontImage": { "src": "logo.png" },
            },
            "active_side": "front",
        });
        let (status, body) = send_json(&app, "POST", "/api/work-session/save", Some(save)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));

        let mut resume = key;
        resume["session_id"] = json!(session_id);
        let (_, record) = send_json(&app, "POST", "/api/work-session/init", Some(resume)).await;
        assert_eq!(record["session_id"], json!(session_id));
        let front = record["canvas_state"]["front"].as_array().unwrap();
        assert_eq!(front.len(), 1);
        assert_eq!(front[0]["text"], "hi");
        assert_eq!(front[0]["fontFamily"], "Arial");
        assert_eq!(record["canvas_state"]["frontImage"]["src"], "logo.png");
    }

    #[tokio::test]
    async fn test_save_to_unknown_session_is_not_found() {
        let body = json!({ "session_id": "nope", "front_thumbnail": "x" });
        let (status, body) = send_json(&test_app(), "POST", "/api/work-session/save", Some(body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_design_lifecycle() {
        let app = test_app();
        let create = json!({
            "product_id": "bc",
            "orientation": "portrait",
            "shape": "rounded",
            "front": { "text": [{ "id": "t1", "text": "A" }, null], "image": null },
        });
        let (status, created) = send_json(&app, "POST", "/api/design", Some(create)).await;
        assert_eq!(status, StatusCode::OK);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, design) = send_json(&app, "GET", &format!("/api/design/{id}/edit"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(design["front_canvas_state"]["text"][0]["id"], "t1");
        assert_eq!(design["front_canvas_state"]["text"][0]["x"], 50.0);
        assert!(design["back_canvas_state"]["text"].as_array().unwrap().is_empty());

        for _ in 0..2 {
            let (status, done) = send_json(&app, "POST", &format!("/api/design/{id}/finalize"), None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(done["status"], "finalized");
        }

        let (status, _) = send_json(&app, "GET", "/api/design/missing/edit", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_round_trip_and_statuses() {
        let app = test_app();
        let encode = |bytes: &[u8]| base64::engine::general_purpose::STANDARD.encode(bytes);

        let upload = json!({ "file_name": "logo.png", "mime_type": "image/png", "data": encode(PNG) });
        let (status, stored) = send_json(&app, "POST", "/api/upload", Some(upload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stored["file_size"], PNG.len());

        let (status, headers, body) = send(&app, "GET", stored["file_url"].as_str().unwrap(), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "image/png");
        assert_eq!(&body[..], PNG);

        let gif = json!({ "file_name": "a.gif", "mime_type": "image/gif", "data": encode(b"GIF89a") });
        let (status, _) = send_json(&app, "POST", "/api/upload", Some(gif)).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let mismatch = json!({ "file_name": "a.jpg", "mime_type": "image/jpeg", "data": encode(PNG) });
        let (status, _) = send_json(&app, "POST", "/api/upload", Some(mismatch)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_templates_query() {
        let (status, page) = send_json(&test_app(), "GET", "/api/templates?page=1&per_page=2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["items"].as_array().unwrap().len(), 2);
        assert_eq!(page["total"], 3);
        assert_eq!(page["per_page"], 2);
    }
}
