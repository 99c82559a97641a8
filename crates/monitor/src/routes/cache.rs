//! Cache administration

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::events::MonitorCommand;

#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub cleared: usize,
}

/// Drop every cached outcome
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Result<Json<ClearCacheResponse>, ApiError> {
    let cleared = state
        .request(|reply| MonitorCommand::ClearCache { reply })
        .await?;
    Ok(Json(ClearCacheResponse { cleared }))
}

#[cfg(test)]
mod tests {
    use super::super::testing::{call, state};
    use super::*;
    use crate::routes::create_router;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_clear_cache_returns_count() {
        let (state, mut rx) = state();
        tokio::spawn(async move {
            if let Some(MonitorCommand::ClearCache { reply }) = rx.recv().await {
                let _ = reply.send(4);
            }
        });

        let (status, json) = call(create_router(state), "DELETE", "/api/v1/cache").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["cleared"], 4);
    }

    #[tokio::test]
    async fn test_clear_cache_when_supervisor_gone() {
        let (state, rx) = state();
        drop(rx);
        let (status, json) = call(create_router(state), "DELETE", "/api/v1/cache").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], "monitor is shutting down");
    }
}
