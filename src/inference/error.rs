//! Pipeline error taxonomy
//!
//! Each stage of the prediction pipeline fails with its own variant so the
//! request handler can map intake problems to 4xx and inference problems to
//! 5xx without inspecting messages.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Model artifact missing or malformed at load time
    #[error("configuration error for {model}: {message}")]
    Configuration { model: &'static str, message: String },

    /// Upload is not a readable image
    #[error("cannot decode image {path}: {message}")]
    ImageDecode { path: PathBuf, message: String },

    /// Loader never produced a usable model
    #[error("{model} unavailable: {reason}")]
    ModelUnavailable { model: &'static str, reason: String },

    /// Model ran but produced no usable output
    #[error("inference failed: {0}")]
    Inference(String),

    /// Upload could not be written to media storage
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Best-effort side effect failed (record insert, review copy)
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl PipelineError {
    pub fn inference(message: impl std::fmt::Display) -> Self {
        PipelineError::Inference(message.to_string())
    }

    pub fn configuration(model: &'static str, message: impl std::fmt::Display) -> Self {
        PipelineError::Configuration {
            model,
            message: message.to_string(),
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Persistence(err.to_string())
    }
}
