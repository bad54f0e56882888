//! Model management handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::inference::RegistryStatus;
use crate::{AppError, AppResult, AppState};

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub reloaded: bool,
    pub errors: Vec<String>,
    pub models: RegistryStatus,
}

/// Reload both models from disk and report the new state.
///
/// 500 when any model failed to load; a model that was ready before keeps
/// serving in that case.
pub async fn reload(State(state): State<AppState>) -> AppResult<(StatusCode, Json<ReloadResponse>)> {
    let pipeline = state.pipeline.clone();
    let (failures, models) = tokio::task::spawn_blocking(move || {
        let outcome = pipeline.registry().reload();
        (outcome.failures, pipeline.registry().status())
    })
    .await
    .map_err(|e| AppError::InternalError(format!("reload task failed: {}", e)))?;

    let status = if failures.is_empty() {
        tracing::info!("Models reloaded");
        StatusCode::OK
    } else {
        tracing::warn!("Model reload incomplete: {:?}", failures);
        StatusCode::INTERNAL_SERVER_ERROR
    };

    Ok((
        status,
        Json(ReloadResponse {
            reloaded: failures.is_empty(),
            errors: failures,
            models,
        }),
    ))
}
