//! Feature Extractor - CNN embedding tap
//!
//! The CNN's pooling layer is exposed as an extra graph output at load time.
//! We run the graph and keep only that output as the embedding fed to the
//! boosted classifier.

use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;

use super::error::PipelineError;
use super::graph;
use super::onnx;

const MODEL_NAME: &str = "feature extractor";

/// Fixed-length vector produced by the CNN
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Maps a preprocessed image tensor to an embedding
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, tensor: &Array4<f32>) -> Result<Embedding, PipelineError>;

    /// Name of the tapped layer, for logs and status
    fn tap_name(&self) -> &str;
}

/// ONNX Runtime backed extractor
pub struct OnnxFeatureExtractor {
    session: Mutex<Session>,
    tap: String,
}

impl OnnxFeatureExtractor {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let bytes = onnx::read_model(MODEL_NAME, path)?;
        let tapped = graph::expose_embedding_tap(bytes)?;
        let session = onnx::load_session_from_memory(MODEL_NAME, &tapped.bytes)?;

        tracing::info!("CNN loaded. Feature extractor ready (tap: {}).", tapped.tap);

        Ok(Self {
            session: Mutex::new(session),
            tap: tapped.tap,
        })
    }
}

impl FeatureExtractor for OnnxFeatureExtractor {
    fn extract(&self, tensor: &Array4<f32>) -> Result<Embedding, PipelineError> {
        let input = Value::from_array(tensor.clone())
            .map_err(|e| PipelineError::inference(format!("tensor error: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| PipelineError::inference(format!("feature extraction failed: {}", e)))?;

        let output = outputs
            .get(&self.tap)
            .ok_or_else(|| PipelineError::inference(format!("missing output {}", self.tap)))?;

        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::inference(format!("extract error: {}", e)))?;

        // [1, n] or [1, 1, 1, n] depending on the exporter; flatten either way
        let embedding = Embedding(data.to_vec());
        if embedding.is_empty() {
            return Err(PipelineError::inference("empty embedding"));
        }
        Ok(embedding)
    }

    fn tap_name(&self) -> &str {
        &self.tap
    }
}
