//! Health and metrics routes

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::events::{MonitorCommand, MonitorStatus};

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub monitor: Option<MonitorStatus>,
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let monitor = state
        .request(|reply| MonitorCommand::Status { reply })
        .await
        .ok();
    let status = match &monitor {
        Some(status) if status.workers_running > 0 => "healthy",
        Some(_) => "idle",
        None => "stopping",
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        monitor,
    })
}

/// Prometheus text exposition
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or_else(|| ApiError::NotFound("metrics recorder not installed".to_string()))
}
