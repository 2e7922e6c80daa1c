use crate::fleet::types::ConnectionState;
use crate::{error::AppError, state::AppState};
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u128,
    pub live_feed: ConnectionState,
    pub loaded_trucks: usize,
}

pub fn build_health_response(
    started_at: Instant,
    live_feed: ConnectionState,
    loaded_trucks: usize,
) -> HealthResponse {
    let status = if live_feed.is_terminal() {
        "degraded"
    } else {
        "ok"
    };

    HealthResponse {
        status,
        uptime_ms: started_at.elapsed().as_millis(),
        live_feed,
        loaded_trucks,
    }
}

pub async fn health(state: &AppState) -> Result<HealthResponse, AppError> {
    let live_feed = state
        .live_feed
        .lock()
        .await
        .as_ref()
        .map_or(ConnectionState::Disconnected, |socket| socket.state());

    Ok(build_health_response(
        state.started_at,
        live_feed,
        state.coordinator.snapshot().total,
    ))
}
