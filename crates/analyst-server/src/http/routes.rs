use super::{upload, AppError, AppResult, AppState};
use analyst_core::{AnalysisRequest, Connector, SynthesisResult};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::header,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

const MB: f64 = 1024.0 * 1024.0;

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.body_limit;

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/status", get(status))
        .route("/api/upload", post(upload::upload_file))
        .route("/api/analyze", post(analyze))
        .route("/api/cache", get(cache_info).delete(clear_cache))
        .route("/api/files", get(list_files))
        .route("/api/connectors", get(list_connectors).post(add_connector))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Two-decimal rounding used by every size/ratio field.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let cache = state.orchestrator.cache().stats();
    let files = state.orchestrator.files();

    let m = &state.metrics;
    m.cache_entries.set(cache.entries as i64);
    m.cache_bytes.set(cache.total_bytes as i64);
    m.registered_files.set(files.len() as i64);
    m.registered_file_bytes.set(files.total_bytes() as i64);
    m.uptime_seconds.set(state.start_time.elapsed().as_secs() as i64);

    let body = m
        .render()
        .map_err(|e| AppError::internal("Failed to encode metrics", e))?;
    Ok((
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    ))
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    connectors: Vec<Connector>,
    cache: StatusCache,
    version: &'static str,
}

#[derive(Serialize)]
struct StatusCache {
    analysis_entries: usize,
    uploaded_files: usize,
    memory_usage_mb: f64,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let cache = state.orchestrator.cache().stats();
    Json(StatusResponse {
        status: "active",
        timestamp: Utc::now(),
        connectors: state.connectors.list(),
        cache: StatusCache {
            analysis_entries: cache.entries,
            uploaded_files: state.orchestrator.files().len(),
            memory_usage_mb: round2(cache.total_bytes as f64 / MB),
        },
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn analyze(
    State(state): State<AppState>,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> AppResult<Json<SynthesisResult>> {
    let Json(request) = body.map_err(|e| AppError::bad_request(e.body_text()))?;
    let result = state
        .orchestrator
        .analyze(request)
        .await
        .map_err(AppError::analysis)?;
    Ok(Json(result))
}

#[derive(Serialize)]
struct CacheInfo {
    size: usize,
    max_size: usize,
    memory_usage_mb: f64,
    max_memory_mb: f64,
    hit_ratio: f64,
    ttl_hours: f64,
}

async fn cache_info(State(state): State<AppState>) -> Json<CacheInfo> {
    let stats = state.orchestrator.cache().stats();
    Json(CacheInfo {
        size: stats.entries,
        max_size: stats.max_entries,
        memory_usage_mb: round2(stats.total_bytes as f64 / MB),
        max_memory_mb: round2(stats.max_bytes as f64 / MB),
        hit_ratio: round2(stats.hit_ratio()),
        ttl_hours: stats.ttl.as_secs_f64() / 3600.0,
    })
}

#[derive(Serialize)]
struct ClearResponse {
    message: &'static str,
    entries_removed: usize,
}

async fn clear_cache(State(state): State<AppState>) -> Json<ClearResponse> {
    let removed = state.orchestrator.cache().clear();
    tracing::info!("Cache cleared ({} entries)", removed);
    Json(ClearResponse {
        message: "Cache cleared",
        entries_removed: removed,
    })
}

#[derive(Serialize)]
struct FileEntry {
    id: String,
    name: String,
    size: u64,
    #[serde(rename = "type")]
    media_type: String,
    uploaded_at: DateTime<Utc>,
    source: String,
}

async fn list_files(State(state): State<AppState>) -> Json<Vec<FileEntry>> {
    let files = state
        .orchestrator
        .files()
        .list()
        .into_iter()
        .map(|(id, record)| FileEntry {
            id,
            name: record.original_name,
            size: record.size,
            media_type: record.mimetype,
            uploaded_at: record.uploaded_at,
            source: record.source,
        })
        .collect();
    Json(files)
}

async fn list_connectors(State(state): State<AppState>) -> Json<Vec<Connector>> {
    Json(state.connectors.list())
}

#[derive(Deserialize)]
struct AddConnectorRequest {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    config: Option<Value>,
}

#[derive(Serialize)]
struct AddConnectorResponse {
    message: &'static str,
    connector: Connector,
}

async fn add_connector(
    State(state): State<AppState>,
    body: Result<Json<AddConnectorRequest>, JsonRejection>,
) -> AppResult<Json<AddConnectorResponse>> {
    let Json(req) = body.map_err(|e| AppError::bad_request(e.body_text()))?;
    let connector = state
        .connectors
        .add(&req.id, &req.name, &req.kind, req.config)?;
    Ok(Json(AddConnectorResponse {
        message: "Connector added successfully",
        connector,
    }))
}
