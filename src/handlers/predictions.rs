//! Prediction history handlers

use axum::{extract::{Path, Query, State}, Json};
use serde::Serialize;

use crate::{AppError, AppResult, AppState};
use crate::models::{PredictionFilter, PredictionRecord};

#[derive(Debug, Serialize)]
pub struct PredictionEntry {
    #[serde(flatten)]
    pub record: PredictionRecord,
    pub image_url: String,
}

#[derive(Debug, Serialize)]
pub struct PredictionStats {
    pub total: i64,
    pub by_label: Vec<LabelCount>,
}

#[derive(Debug, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

fn entry(state: &AppState, record: PredictionRecord) -> PredictionEntry {
    let image_url = state.storage.url(&record.image);
    PredictionEntry { record, image_url }
}

/// List recent predictions, newest first
pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<PredictionFilter>,
) -> AppResult<Json<Vec<PredictionEntry>>> {
    let records = PredictionRecord::list_recent(&state.pool, &filter).await?;
    Ok(Json(records.into_iter().map(|r| entry(&state, r)).collect()))
}

/// Get single prediction
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<PredictionEntry>> {
    let record = PredictionRecord::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Prediction not found".to_string()))?;

    Ok(Json(entry(&state, record)))
}

/// Counts per label
pub async fn stats(State(state): State<AppState>) -> AppResult<Json<PredictionStats>> {
    let counts = PredictionRecord::count_by_label(&state.pool).await?;
    let total = counts.iter().map(|(_, c)| c).sum();

    Ok(Json(PredictionStats {
        total,
        by_label: counts
            .into_iter()
            .map(|(label, count)| LabelCount { label, count })
            .collect(),
    }))
}
