//! ONNX Runtime helpers shared by the feature extractor and the classifier.

use std::path::Path;

use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::ValueType;

use super::error::PipelineError;

/// Graph output as seen at load time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    pub name: String,
    /// Plain tensor, as opposed to a sequence or map (e.g. sklearn ZipMap)
    pub is_tensor: bool,
}

#[cfg(test)]
impl OutputInfo {
    pub fn tensor(name: impl Into<String>) -> Self {
        Self { name: name.into(), is_tensor: true }
    }
}

fn session_builder(model: &'static str) -> Result<SessionBuilder, PipelineError> {
    Session::builder()
        .map_err(|e| PipelineError::configuration(model, format!("failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| PipelineError::configuration(model, format!("failed to set optimization: {}", e)))
}

fn ensure_exists(model: &'static str, path: &Path) -> Result<(), PipelineError> {
    if !path.exists() {
        return Err(PipelineError::configuration(
            model,
            format!("model not found: {}", path.display()),
        ));
    }
    Ok(())
}

/// Load an ONNX model from file.
pub fn load_session(model: &'static str, path: &Path) -> Result<Session, PipelineError> {
    tracing::info!("Loading {} from: {}", model, path.display());
    ensure_exists(model, path)?;

    session_builder(model)?
        .commit_from_file(path)
        .map_err(|e| PipelineError::configuration(model, format!("failed to load model: {}", e)))
}

/// Read model bytes, for graphs that need rewriting before commit.
pub fn read_model(model: &'static str, path: &Path) -> Result<Vec<u8>, PipelineError> {
    tracing::info!("Loading {} from: {}", model, path.display());
    ensure_exists(model, path)?;

    std::fs::read(path)
        .map_err(|e| PipelineError::configuration(model, format!("failed to read {}: {}", path.display(), e)))
}

/// Build a session from in-memory model bytes.
pub fn load_session_from_memory(model: &'static str, bytes: &[u8]) -> Result<Session, PipelineError> {
    session_builder(model)?
        .commit_from_memory(bytes)
        .map_err(|e| PipelineError::configuration(model, format!("failed to load model: {}", e)))
}

/// Describe the graph outputs of a loaded session, in declaration order.
pub fn describe_outputs(session: &Session) -> Vec<OutputInfo> {
    session
        .outputs
        .iter()
        .map(|o| OutputInfo {
            name: o.name.clone(),
            is_tensor: matches!(o.output_type, ValueType::Tensor { .. }),
        })
        .collect()
}
