//! HTTP server for GIFify
//!
//! JSON conversion API, health and metrics endpoints, and static serving of
//! produced artifacts and the optional front-end directory.

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeader;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{Config, DefaultsConfig, ServerConfig};
use crate::encode::VideoFormat;
use crate::job_executor::{ConversionExecutor, ConversionResult, JobError, Rendition, OUTPUT_URL_PREFIX};
use crate::metrics::MetricsSnapshot;
use crate::request::{ConversionRequest, RequestDraft, ValidationError};
use crate::size_target::rounded_mb;

/// Request bodies above this are rejected
pub const BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// Artifacts are named by job id and never rewritten once served
const OUTPUT_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Errors that can occur when running the HTTP server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    executor: Arc<ConversionExecutor>,
    defaults: DefaultsConfig,
    allowed_hosts: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(executor: Arc<ConversionExecutor>, cfg: &Config) -> Self {
        Self {
            executor,
            defaults: cfg.defaults.clone(),
            allowed_hosts: Arc::new(cfg.sources.allowed_hosts.clone()),
        }
    }
}

/// Body of `POST /api/convert`
///
/// Fields stay loosely typed: numbers may arrive as JSON numbers or numeric
/// strings, and flags follow JSON truthiness.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertBody {
    pub url: Option<Value>,
    #[serde(rename = "targetSizeMB")]
    pub target_size_mb: Option<Value>,
    pub max_width: Option<Value>,
    pub fps: Option<Value>,
    pub mute: Option<Value>,
    pub start_time: Option<Value>,
    pub duration: Option<Value>,
    pub remove_watermark: Option<Value>,
    pub export_mp4: Option<Value>,
    pub export_webm: Option<Value>,
}

impl ConvertBody {
    /// Apply defaults and validate
    ///
    /// Absent or non-positive numbers fall back to the configured defaults.
    /// `mute` and both export flags default to true.
    pub fn into_request(
        self,
        defaults: &DefaultsConfig,
        allowed_hosts: &[String],
    ) -> Result<ConversionRequest, ValidationError> {
        let url = self
            .url
            .as_ref()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut formats = std::collections::BTreeSet::new();
        if self.export_mp4.as_ref().map_or(true, truthy) {
            formats.insert(VideoFormat::Mp4);
        }
        if self.export_webm.as_ref().map_or(true, truthy) {
            formats.insert(VideoFormat::Webm);
        }

        let draft = RequestDraft {
            url,
            target_size_mb: positive(self.target_size_mb.as_ref()).unwrap_or(defaults.max_gif_mb),
            width: positive(self.max_width.as_ref())
                .map(|w| w as u32)
                .filter(|&w| w > 0)
                .unwrap_or(defaults.width),
            fps: positive(self.fps.as_ref())
                .map(|f| f as u32)
                .filter(|&f| f > 0)
                .unwrap_or(defaults.fps),
            start_time: self.start_time.as_ref().and_then(start_time_text),
            duration_secs: positive(self.duration.as_ref()),
            remove_watermark: self.remove_watermark.as_ref().is_some_and(truthy),
            mute: self.mute.as_ref().map_or(true, |v| v != &Value::Bool(false)),
            formats,
        };
        ConversionRequest::validate(draft, allowed_hosts)
    }
}

/// A JSON number or numeric string greater than zero
fn positive(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (n.is_finite() && n > 0.0).then_some(n)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn start_time_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Source details echoed back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub url: String,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub duration: Option<f64>,
}

/// One artifact in the response; size in MB rounded to 2 decimals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub url: String,
    #[serde(rename = "sizeMB")]
    pub size_mb: f64,
    pub width: u32,
    pub fps: u32,
}

impl From<&Rendition> for MediaInfo {
    fn from(r: &Rendition) -> Self {
        Self {
            url: r.url.clone(),
            size_mb: rounded_mb(r.bytes),
            width: r.width,
            fps: r.fps,
        }
    }
}

/// Successful conversion response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertResponse {
    pub ok: bool,
    pub id: String,
    pub source: SourceInfo,
    pub gif: MediaInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mp4: Option<MediaInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webm: Option<MediaInfo>,
    pub notes: Vec<String>,
}

impl From<&ConversionResult> for ConvertResponse {
    fn from(result: &ConversionResult) -> Self {
        Self {
            ok: true,
            id: result.id.clone(),
            source: SourceInfo {
                url: result.source_url.clone(),
                title: result.source.title.clone(),
                uploader: result.source.uploader.clone(),
                duration: result.source.duration,
            },
            gif: MediaInfo::from(&result.gif),
            mp4: result.renditions.get(&VideoFormat::Mp4).map(MediaInfo::from),
            webm: result.renditions.get(&VideoFormat::Webm).map(MediaInfo::from),
            notes: result.notes.clone(),
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "ok": false, "error": message.into() }))).into_response()
}

/// Handler for POST /api/convert
async fn convert(
    State(state): State<AppState>,
    body: Result<Json<ConvertBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(rejection.status(), rejection.body_text()),
    };

    let request = match body.into_request(&state.defaults, &state.allowed_hosts) {
        Ok(request) => request,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match state.executor.execute(&request).await {
        Ok(result) => Json(ConvertResponse::from(&result)).into_response(),
        Err(JobError::Validation(e)) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// Handler for GET /api/metrics
async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    let snapshot = state.executor.metrics().read().await.clone();
    Json(snapshot)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o.trim() == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}

/// Creates the axum Router with API routes and static files
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    let output_dir = state.executor.settings().output_dir.clone();
    let outputs = SetResponseHeader::overriding(
        ServeDir::new(output_dir),
        header::CACHE_CONTROL,
        HeaderValue::from_static(OUTPUT_CACHE_CONTROL),
    );

    let mut app = Router::new()
        .route("/api/convert", post(convert))
        .route("/api/health", get(health))
        .route("/api/metrics", get(get_metrics))
        .nest_service(OUTPUT_URL_PREFIX, outputs)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors_layer(&server.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if let Some(dir) = server.public_dir.as_deref().filter(|d| d.is_dir()) {
        info!(dir = %dir.display(), "serving front-end files");
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app
}

/// Runs the HTTP server until it fails or the process is stopped
pub async fn run_server(app: Router, host: &str, port: u16) -> Result<(), ServerError> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    if let Ok(local) = listener.local_addr() {
        info!(addr = %local, "GIFify server listening");
    }
    axum::serve(listener, app)
        .await
        .map_err(ServerError::Serve)
}
