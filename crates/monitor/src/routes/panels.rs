//! Review controls per panel

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use plate_tracker::Panel;
use serde::Serialize;
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::events::MonitorCommand;

#[derive(Debug, Serialize)]
pub struct PanelActionResponse {
    pub panel: Panel,
    pub action: &'static str,
}

fn parse_panel(raw: &str) -> Result<Panel, ApiError> {
    raw.parse().map_err(|e: plate_tracker::TrackerError| ApiError::BadRequest(e.to_string()))
}

async fn apply(
    state: &AppState,
    raw_panel: &str,
    action: &'static str,
    command: fn(Panel) -> MonitorCommand,
) -> Result<(StatusCode, Json<PanelActionResponse>), ApiError> {
    let panel = parse_panel(raw_panel)?;
    state.send(command(panel)).await?;
    Ok((StatusCode::ACCEPTED, Json(PanelActionResponse { panel, action })))
}

/// Suspend confirmations on a panel
pub async fn pause(
    State(state): State<Arc<AppState>>,
    Path(panel): Path<String>,
) -> Result<(StatusCode, Json<PanelActionResponse>), ApiError> {
    apply(&state, &panel, "pause", MonitorCommand::Pause).await
}

/// Resume after review; dwell restarts from zero
pub async fn resume(
    State(state): State<Arc<AppState>>,
    Path(panel): Path<String>,
) -> Result<(StatusCode, Json<PanelActionResponse>), ApiError> {
    apply(&state, &panel, "resume", MonitorCommand::Resume).await
}

/// Forget cooldowns, pending calls and dwell state so the panel can
/// re-detect immediately
pub async fn rescan(
    State(state): State<Arc<AppState>>,
    Path(panel): Path<String>,
) -> Result<(StatusCode, Json<PanelActionResponse>), ApiError> {
    apply(&state, &panel, "rescan", MonitorCommand::Rescan).await
}
