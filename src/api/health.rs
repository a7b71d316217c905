//! Health check endpoint

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

/// Health response with the build version
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
}

/// Simple liveness probe
pub async fn health_check() -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    (StatusCode::OK, Json(response))
}
