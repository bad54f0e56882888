//! Review archive for low-confidence predictions
//!
//! Keeps a copy of the preprocessed image so a radiologist can review the
//! inputs the model was unsure about. Writes are best effort.

use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use uuid::Uuid;

use crate::inference::PipelineError;

#[derive(Debug, Clone)]
pub struct ReviewArchive {
    dir: PathBuf,
}

impl ReviewArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save `image` as `<uuid>_uncertain<ext>`.
    ///
    /// Falls back to PNG when `extension` is not an encodable image format.
    pub fn store(&self, image: &RgbImage, extension: &str) -> Result<PathBuf, PipelineError> {
        let format = ImageFormat::from_extension(extension.trim_start_matches('.'))
            .filter(|f| f.can_write())
            .unwrap_or(ImageFormat::Png);
        let extension = if format == ImageFormat::Png && !extension.eq_ignore_ascii_case(".png") {
            ".png"
        } else {
            extension
        };

        fs::create_dir_all(&self.dir)
            .map_err(|e| PipelineError::Persistence(format!("cannot create {}: {}", self.dir.display(), e)))?;

        let path = self
            .dir
            .join(format!("{}_uncertain{}", Uuid::new_v4().simple(), extension));

        image
            .save_with_format(&path, format)
            .map_err(|e| PipelineError::Persistence(format!("cannot write {}: {}", path.display(), e)))?;

        tracing::debug!("Saved uncertain sample to {}", path.display());
        Ok(path)
    }
}
