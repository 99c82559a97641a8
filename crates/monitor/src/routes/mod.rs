//! Control API
//!
//! Handlers never touch monitor state directly; every action is a
//! command to the supervisor.

pub mod cache;
pub mod health;
pub mod panels;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::events::{CommandSender, MonitorCommand};

/// Application state shared across handlers
pub struct AppState {
    /// Command channel to the supervisor
    pub commands: CommandSender,
    /// Prometheus rendering, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: Instant,
}

impl AppState {
    /// Send a command and wait for its reply
    pub async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> MonitorCommand,
    ) -> Result<T, ApiError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ApiError::Unavailable)?;
        rx.await.map_err(|_| ApiError::Unavailable)
    }

    /// Send a command without waiting for it to be applied
    pub async fn send(&self, command: MonitorCommand) -> Result<(), ApiError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ApiError::Unavailable)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Handler errors
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// Supervisor stopped
    Unavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "monitor is shutting down".to_string(),
            ),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health::health_handler))
        .route("/api/v1/cache", delete(cache::clear_cache))
        .route("/api/v1/panels/:panel/pause", post(panels::pause))
        .route("/api/v1/panels/:panel/resume", post(panels::resume))
        .route("/api/v1/panels/:panel/rescan", post(panels::rescan))
        .route("/metrics", get(health::metrics_handler))
        .with_state(state)
}
