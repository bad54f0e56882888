//! Configuration module

use std::env;
use std::path::PathBuf;

/// Default upload limit (10 MB)
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Server port
    pub port: u16,

    /// Root directory for uploaded images and review copies
    pub media_root: PathBuf,

    /// Public URL prefix that maps onto `media_root`
    pub media_url: String,

    /// CNN feature extractor (ONNX)
    pub feature_model_path: PathBuf,

    /// Boosted classifier (ONNX)
    pub classifier_model_path: PathBuf,

    /// Maximum accepted request body in bytes
    pub max_upload_bytes: usize,

    /// Environment (development, production)
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://db.sqlite3?mode=rwc".to_string()),

            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),

            media_root: env::var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("media")),

            media_url: env::var("MEDIA_URL")
                .map(|u| normalize_url_prefix(&u))
                .unwrap_or_else(|_| "/media/".to_string()),

            feature_model_path: env::var("FEATURE_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models/cnn_feature.onnx")),

            classifier_model_path: env::var("CLASSIFIER_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models/booster.onnx")),

            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|b| b.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),

            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Directory receiving copies of low-confidence inputs
    pub fn review_dir(&self) -> PathBuf {
        self.media_root.join("misclassified")
    }
}

/// Ensure the media URL prefix starts and ends with `/`.
fn normalize_url_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}
