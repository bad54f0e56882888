//! Inference pipeline: preprocess, then embed and classify.
//!
//! The two stages are exposed separately because they fail differently: a
//! bad upload is the caller's fault, a missing model is ours.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use ndarray::Array4;

use super::classifier::Prediction;
use super::error::PipelineError;
use super::loader::ModelRegistry;
use super::preprocess::{self, Preprocessed};

#[derive(Clone)]
pub struct InferencePipeline {
    registry: Arc<ModelRegistry>,
}

impl InferencePipeline {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Decode and normalize the stored upload.
    pub fn preprocess(&self, path: &Path) -> Result<Preprocessed, PipelineError> {
        preprocess::preprocess_image(path)
    }

    /// Run the feature extractor then the classifier.
    ///
    /// Fails with `ModelUnavailable` before doing any work if either model
    /// is missing.
    pub fn infer(&self, tensor: &Array4<f32>) -> Result<Prediction, PipelineError> {
        let models = self.registry.ensure_loaded();
        let extractor = models.extractor()?;
        let classifier = models.classifier()?;

        let start = Instant::now();
        let embedding = extractor.extract(tensor)?;
        let prediction = classifier.classify(&embedding)?;

        tracing::debug!(
            "Inference: {} (p={:.4}, embedding={}, {:?}, {}us)",
            prediction.label,
            prediction.probability,
            embedding.len(),
            classifier.kind(),
            start.elapsed().as_micros()
        );

        Ok(prediction)
    }
}
