//! Media storage - uploaded images and review copies
//!
//! Uploads land under `<media_root>/uploads/YYYY/MM/DD/<uuid><ext>` and are
//! served back under the configured media URL prefix.

pub mod archive;

pub use archive::ReviewArchive;

use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use uuid::Uuid;

use crate::inference::PipelineError;

/// Used when the uploaded file name has no extension
pub const DEFAULT_EXTENSION: &str = ".png";

const UPLOADS_FOLDER: &str = "uploads";

/// An upload written to disk
#[derive(Debug, Clone)]
pub struct StoredImage {
    /// Path relative to the media root, `/`-separated
    pub relative_path: String,
    pub absolute_path: PathBuf,
    /// Including the leading dot
    pub extension: String,
}

#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    url_prefix: String,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.into(),
        }
    }

    /// Write `bytes` under a fresh unique name, keeping the original extension.
    pub async fn save_upload(
        &self,
        original_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredImage, PipelineError> {
        let extension = upload_extension(original_name);
        let now = Utc::now();
        let relative_path = format!(
            "{}/{}/{:02}/{:02}/{}{}",
            UPLOADS_FOLDER,
            now.year(),
            now.month(),
            now.day(),
            Uuid::new_v4().simple(),
            extension
        );
        let absolute_path = self.root.join(&relative_path);

        if let Some(parent) = absolute_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&absolute_path, bytes).await?;

        tracing::debug!("Saved uploaded file to {}", absolute_path.display());

        Ok(StoredImage {
            relative_path,
            absolute_path,
            extension,
        })
    }

    /// Public URL of a stored file
    pub fn url(&self, relative_path: &str) -> String {
        format!("{}{}", self.url_prefix, relative_path)
    }
}

/// Extension of the uploaded file name (with dot), or the default.
pub fn upload_extension(original_name: Option<&str>) -> String {
    original_name
        .map(Path::new)
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}
