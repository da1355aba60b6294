pub mod metrics;
mod routes;
mod upload;

pub use metrics::AnalystMetrics;
pub use routes::create_router;

use analyst_core::{
    AnalysisObserver, AnalysisOrchestrator, AnalystError, ConnectorRegistry, FileRegistry,
    ModelClient, ResultCache, UploadPolicy,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AnalystConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub connectors: Arc<ConnectorRegistry>,
    pub metrics: Arc<AnalystMetrics>,
    pub upload_policy: Arc<UploadPolicy>,
    pub upload_dir: PathBuf,
    pub body_limit: usize,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Wire up the registries, cache and orchestrator described by `config`.
    pub fn build(config: &AnalystConfig, model: Arc<dyn ModelClient>) -> Self {
        let metrics = Arc::new(AnalystMetrics::new());
        let files = Arc::new(FileRegistry::new(config.file_limits()));
        let cache = Arc::new(ResultCache::new(config.cache_limits()));
        let observer: Arc<dyn AnalysisObserver> = metrics.clone();
        let orchestrator = AnalysisOrchestrator::with_observer(
            model,
            files,
            cache,
            config.orchestrator_config(),
            observer,
        );

        Self {
            orchestrator: Arc::new(orchestrator),
            connectors: Arc::new(ConnectorRegistry::with_defaults()),
            metrics,
            upload_policy: Arc::new(config.upload_policy()),
            upload_dir: config.server.upload_dir.clone(),
            body_limit: config.body_limit_bytes(),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Body of every error response.
#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: String,
}

/// Custom error type for HTTP handlers
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: String,
    details: Option<String>,
}

impl AppError {
    pub fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            details: None,
        }
    }

    pub fn internal(error: impl Into<String>, details: impl ToString) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: error.into(),
            details: Some(details.to_string()),
        }
    }

    /// Orchestration failures other than bad input are reported as 500
    /// "Analysis failed", with the cause in `details`.
    pub fn analysis(err: AnalystError) -> Self {
        match err {
            AnalystError::Validation(message) => Self::bad_request(message),
            other => Self::internal("Analysis failed", other),
        }
    }
}

impl From<AnalystError> for AppError {
    fn from(err: AnalystError) -> Self {
        match err {
            AnalystError::Validation(message) => Self::bad_request(message),
            AnalystError::NotFound(message) => Self {
                status: StatusCode::NOT_FOUND,
                error: message,
                details: None,
            },
            other => Self::internal("Internal server error", other),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::internal("Internal server error", err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{}: {}", self.error, self.details.as_deref().unwrap_or(""));
        }
        let body = ErrorBody {
            error: self.error,
            details: self.details,
            timestamp: Utc::now().to_rfc3339(),
        };
        (self.status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
