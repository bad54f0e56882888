//! Decision & persistence policy
//!
//! Runs after a successful prediction. Both side effects are best effort:
//! failures are logged and reported in the outcome, never returned as errors,
//! so they cannot change the HTTP response.

use std::path::PathBuf;

use image::RgbImage;
use sqlx::SqlitePool;

use crate::inference::{PipelineError, Prediction, ThresholdConfig};
use crate::models::{CreatePrediction, PredictionRecord};
use crate::storage::{ReviewArchive, StoredImage};

/// What the policy managed to do
#[derive(Debug, Default)]
pub struct PolicyOutcome {
    pub record_id: Option<i64>,
    pub archived: Option<PathBuf>,
}

#[derive(Clone)]
pub struct DecisionPolicy {
    pool: SqlitePool,
    archive: ReviewArchive,
    thresholds: ThresholdConfig,
}

impl DecisionPolicy {
    pub fn new(pool: SqlitePool, archive: ReviewArchive, thresholds: ThresholdConfig) -> Self {
        Self { pool, archive, thresholds }
    }

    pub async fn apply(
        &self,
        stored: &StoredImage,
        prediction: &Prediction,
        preprocessed: RgbImage,
    ) -> PolicyOutcome {
        let record_id = match self.record(stored, prediction).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("DB save failed: {}", e);
                None
            }
        };

        let archived = if self.thresholds.is_uncertain(prediction.probability) {
            match self.archive_uncertain(preprocessed, stored.extension.clone()).await {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::error!("Failed to save uncertain image copy to {}: {}", self.archive.dir().display(), e);
                    None
                }
            }
        } else {
            None
        };

        PolicyOutcome { record_id, archived }
    }

    async fn record(&self, stored: &StoredImage, prediction: &Prediction) -> Result<i64, PipelineError> {
        let record = PredictionRecord::create(
            &self.pool,
            CreatePrediction {
                image: stored.relative_path.clone(),
                label: prediction.label.as_str().to_string(),
                probability: prediction.probability,
            },
        )
        .await?;
        Ok(record.id)
    }

    async fn archive_uncertain(&self, image: RgbImage, extension: String) -> Result<PathBuf, PipelineError> {
        let archive = self.archive.clone();
        tokio::task::spawn_blocking(move || archive.store(&image, &extension))
            .await
            .map_err(|e| PipelineError::Persistence(format!("archive task failed: {}", e)))?
    }
}
