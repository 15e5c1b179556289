//! Web API
//!
//! JSON endpoints over a [`SessionRegistry`]:
//!
//! - `POST /api/init_tts`   `{tts_type, voice_name?, speaker_wav?}` → `{session_id}`
//! - `POST /api/get_voices` `{tts_type}` → `{voices: [...]}`
//! - `POST /api/speak`      `{session_id, text, volume?}` → `{status: "success"}`
//! - `POST /api/end_session` `{session_id}` → `{status: "success"}`
//!
//! Provider calls block for the length of playback, so they run on the
//! blocking thread pool.

use crate::session::{SessionConfig, SessionRegistry};
use crate::speech::{BackendKind, VoiceRequest};
use crate::{Result, SpeakerError};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use log::{error, info};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

const INDEX_HTML: &str = include_str!("../static/index.html");
const MAIN_JS: &str = include_str!("../static/js/main.js");

/// Shared state for axum handlers
#[derive(Clone)]
struct AppState {
    registry: Arc<SessionRegistry>,
}

#[derive(Debug, Deserialize)]
pub struct InitRequest {
    pub tts_type: String,
    #[serde(default)]
    pub voice_name: Option<String>,
    #[serde(default)]
    pub speaker_wav: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VoicesRequest {
    pub tts_type: String,
}

#[derive(Debug, Deserialize)]
pub struct SpeakRequest {
    pub session_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default = "full_volume")]
    pub volume: f32,
}

#[derive(Debug, Deserialize)]
pub struct EndSessionRequest {
    pub session_id: String,
}

fn full_volume() -> f32 {
    1.0
}

/// Treat empty strings from form fields as absent
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn error_body(message: impl Into<String>) -> Json<Value> {
    Json(json!({ "status": "error", "message": message.into() }))
}

/// HTTP status for a failed init or voice listing
fn status_for(err: &SpeakerError) -> StatusCode {
    match err {
        SpeakerError::UnknownBackend(_) => StatusCode::BAD_REQUEST,
        SpeakerError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Run blocking provider work off the async workers
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SpeakerError::Other(format!("Worker failed: {}", e)))?
}

/// Build the router
pub fn router(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/static/js/main.js", get(handle_main_js))
        .route("/api/init_tts", post(handle_init_tts))
        .route("/api/get_voices", post(handle_get_voices))
        .route("/api/speak", post(handle_speak))
        .route("/api/end_session", post(handle_end_session))
        .with_state(AppState { registry })
}

/// Serve on `address` until Ctrl-C
pub async fn serve(registry: Arc<SessionRegistry>, address: &str) -> Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| SpeakerError::Config(format!("Failed to bind {}: {}", address, e)))?;
    let addr = listener.local_addr()?;
    info!("Web API listening on http://{}", addr);
    println!("Serving on http://{}", addr);

    axum::serve(listener, router(registry))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Web API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn handle_main_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], MAIN_JS)
}

async fn handle_init_tts(
    State(state): State<AppState>,
    Json(req): Json<InitRequest>,
) -> (StatusCode, Json<Value>) {
    let kind = match req.tts_type.parse::<BackendKind>() {
        Ok(kind) => kind,
        Err(e) => return (status_for(&e), error_body(e.to_string())),
    };
    let config = SessionConfig {
        kind,
        request: VoiceRequest {
            voice_name: non_empty(req.voice_name),
            reference_audio: non_empty(req.speaker_wav).map(PathBuf::from),
        },
    };

    let registry = state.registry.clone();
    match blocking(move || registry.init(&config)).await {
        Ok(session_id) => (StatusCode::OK, Json(json!({ "session_id": session_id }))),
        Err(e) => {
            error!("init_tts failed: {}", e);
            (status_for(&e), error_body(e.to_string()))
        }
    }
}

async fn handle_get_voices(
    State(state): State<AppState>,
    Json(req): Json<VoicesRequest>,
) -> (StatusCode, Json<Value>) {
    let kind = match req.tts_type.parse::<BackendKind>() {
        Ok(kind) => kind,
        Err(e) => return (status_for(&e), error_body(e.to_string())),
    };

    let registry = state.registry.clone();
    match blocking(move || registry.voices(kind)).await {
        Ok(voices) => (StatusCode::OK, Json(json!({ "voices": voices }))),
        Err(e) => {
            error!("get_voices failed: {}", e);
            (status_for(&e), error_body(e.to_string()))
        }
    }
}

/// Failures are reported in the body with HTTP 200, never raised
async fn handle_speak(
    State(state): State<AppState>,
    Json(req): Json<SpeakRequest>,
) -> (StatusCode, Json<Value>) {
    let registry = state.registry.clone();
    let SpeakRequest {
        session_id,
        text,
        volume,
    } = req;

    match blocking(move || registry.speak(&session_id, &text, Some(volume))).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "success" }))),
        Err(e) => {
            error!("speak failed: {}", e);
            (StatusCode::OK, error_body(e.to_string()))
        }
    }
}

/// Same error contract as speak
async fn handle_end_session(
    State(state): State<AppState>,
    Json(req): Json<EndSessionRequest>,
) -> (StatusCode, Json<Value>) {
    let registry = state.registry.clone();
    match blocking(move || registry.end(&req.session_id)).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "success" }))),
        Err(e) => {
            error!("end_session failed: {}", e);
            (StatusCode::OK, error_body(e.to_string()))
        }
    }
}
