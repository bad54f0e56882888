//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::inference::RegistryStatus;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
    models: RegistryStatus,
}

/// Reports `degraded` while either model is not ready
pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    let models = state.pipeline.registry().status();
    let status = if models.is_ready() { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
        models,
    })
}
