//! Prediction record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Default page size for history listing
const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PredictionRecord {
    pub id: i64,
    /// Path relative to the media root
    pub image: String,
    pub label: String,
    pub probability: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePrediction {
    pub image: String,
    pub label: String,
    pub probability: f32,
}

#[derive(Debug, Deserialize, Default)]
pub struct PredictionFilter {
    pub label: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PredictionFilter {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

impl PredictionRecord {
    pub async fn create(pool: &SqlitePool, data: CreatePrediction) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PredictionRecord>(
            r#"
            INSERT INTO predictions (image, label, probability, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#
        )
        .bind(&data.image)
        .bind(&data.label)
        .bind(f64::from(data.probability))
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PredictionRecord>("SELECT * FROM predictions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Newest first
    pub async fn list_recent(
        pool: &SqlitePool,
        filter: &PredictionFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PredictionRecord>(
            r#"
            SELECT * FROM predictions
            WHERE ($1 IS NULL OR label = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        )
        .bind(filter.label.as_deref().map(str::to_ascii_uppercase))
        .bind(filter.limit())
        .bind(filter.offset())
        .fetch_all(pool)
        .await
    }

    pub async fn count_by_label(pool: &SqlitePool) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (String, i64)>(
            "SELECT label, COUNT(*) AS count FROM predictions GROUP BY label ORDER BY label"
        )
        .fetch_all(pool)
        .await
    }
}
