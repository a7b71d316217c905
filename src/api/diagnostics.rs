//! Cache, counter, and timer diagnostics endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::info;

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::infrastructure::metrics::{CacheCounterSnapshot, TimerSnapshot};

/// Response envelope for GET /timers
#[derive(Debug, Clone, Serialize)]
pub struct TimersResponse {
    pub timers: TimerSnapshot,
}

/// DELETE /cache — wipes every tier and the in-progress registry
pub async fn clear_cache(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    if let Some(cache) = &state.cache {
        cache
            .clear()
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        info!("cache cleared");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /cachecounters
pub async fn read_cache_counters(State(state): State<AppState>) -> Json<CacheCounterSnapshot> {
    Json(state.counters.read_all())
}

/// DELETE /cachecounters
pub async fn clear_cache_counters(State(state): State<AppState>) -> StatusCode {
    state.counters.clear();
    StatusCode::NO_CONTENT
}

/// GET /timers
pub async fn read_timers(State(state): State<AppState>) -> Json<TimersResponse> {
    Json(TimersResponse {
        timers: state.timers.read_all(),
    })
}

/// DELETE /timers
pub async fn clear_timers(State(state): State<AppState>) -> StatusCode {
    state.timers.clear();
    StatusCode::NO_CONTENT
}
