//! Classifier - boosted model on top of the CNN embedding
//!
//! Two shapes of classifier are supported. A probabilistic one exposes
//! per-class probabilities; a discrete one only exposes the predicted class.
//! The variant is chosen once at load time by looking at the graph outputs.

use std::fmt;
use std::path::Path;

use ndarray::Array2;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::error::PipelineError;
use super::extractor::Embedding;
use super::onnx::{self, OutputInfo};
use super::threshold::ThresholdConfig;

const MODEL_NAME: &str = "classifier";

/// Output names used by sklearn/xgboost ONNX converters for class probabilities
const PROBABILITY_OUTPUT_NAMES: &[&str] = &["probabilities", "output_probability", "probability", "probs"];

/// Binary diagnosis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Normal,
    Pneumonia,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Normal => "NORMAL",
            Label::Pneumonia => "PNEUMONIA",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prediction output
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub label: Label,
    /// Positive-class probability, 0.0 - 1.0
    pub probability: f32,
}

/// Which classifier variant was selected at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    Probabilistic,
    Discrete,
}

pub trait Classifier: Send + Sync {
    fn classify(&self, embedding: &Embedding) -> Result<Prediction, PipelineError>;
    fn kind(&self) -> ClassifierKind;
}

/// Decide from a per-class probability row.
///
/// Column 1 is the positive class. A single column is read as the positive
/// probability directly (binary models exported without the negative column).
pub fn decide_from_probabilities(
    probs: &[f32],
    thresholds: &ThresholdConfig,
) -> Result<Prediction, PipelineError> {
    let raw = match probs {
        [p] => *p,
        [_, p, ..] => *p,
        [] => return Err(PipelineError::inference("classifier returned no probabilities")),
    };
    if !raw.is_finite() {
        return Err(PipelineError::inference(format!("non-finite probability {}", raw)));
    }
    let probability = raw.clamp(0.0, 1.0);

    Ok(Prediction {
        label: thresholds.label_for(probability),
        probability,
    })
}

/// Decide from a hard class prediction.
///
/// There is no real confidence here: the probability is forced to exactly
/// 1.0 for the positive class and 0.0 otherwise. Downstream consumers rely on
/// this, so every discrete NORMAL lands in the uncertain band.
pub fn decide_from_class(class: i64) -> Prediction {
    if class == 1 {
        Prediction { label: Label::Pneumonia, probability: 1.0 }
    } else {
        Prediction { label: Label::Normal, probability: 0.0 }
    }
}

/// Index of a tensor output carrying class probabilities, if any.
pub fn select_probability_output(outputs: &[OutputInfo]) -> Option<usize> {
    let named = outputs
        .iter()
        .position(|o| PROBABILITY_OUTPUT_NAMES.contains(&o.name.to_ascii_lowercase().as_str()));

    match named {
        Some(idx) if outputs[idx].is_tensor => Some(idx),
        Some(idx) => {
            tracing::warn!(
                "Probability output {} is not a tensor (export with zipmap disabled); using hard labels",
                outputs[idx].name
            );
            None
        }
        None => outputs.get(1).filter(|o| o.is_tensor).map(|_| 1),
    }
}

/// Load the classifier and pick its variant.
pub fn load_classifier(
    path: &Path,
    thresholds: ThresholdConfig,
) -> Result<Box<dyn Classifier>, PipelineError> {
    let session = onnx::load_session(MODEL_NAME, path)?;
    let outputs = onnx::describe_outputs(&session);

    if let Some(idx) = select_probability_output(&outputs) {
        let output = outputs[idx].name.clone();
        tracing::info!("Booster loaded (probabilistic, output: {}).", output);
        return Ok(Box::new(ProbabilisticClassifier {
            session: Mutex::new(session),
            output,
            thresholds,
        }));
    }

    let label_output = outputs
        .first()
        .filter(|o| o.is_tensor)
        .ok_or_else(|| PipelineError::configuration(MODEL_NAME, "no tensor label output"))?;
    let output = label_output.name.clone();
    tracing::info!("Booster loaded (discrete, output: {}).", output);

    Ok(Box::new(DiscreteClassifier {
        session: Mutex::new(session),
        output,
    }))
}

fn embedding_input(embedding: &Embedding) -> Result<Tensor<f32>, PipelineError> {
    let row = Array2::from_shape_vec((1, embedding.len()), embedding.as_slice().to_vec())
        .map_err(|e| PipelineError::inference(format!("array error: {}", e)))?;
    Tensor::from_array(row)
        .map_err(|e| PipelineError::inference(format!("tensor error: {}", e)))
}

/// Classifier exposing per-class probabilities
pub struct ProbabilisticClassifier {
    session: Mutex<Session>,
    output: String,
    thresholds: ThresholdConfig,
}

impl Classifier for ProbabilisticClassifier {
    fn classify(&self, embedding: &Embedding) -> Result<Prediction, PipelineError> {
        let input = embedding_input(embedding)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| PipelineError::inference(format!("classification failed: {}", e)))?;

        let value = outputs
            .get(&self.output)
            .ok_or_else(|| PipelineError::inference(format!("missing output {}", self.output)))?;
        let (_, probs) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::inference(format!("extract error: {}", e)))?;

        decide_from_probabilities(probs, &self.thresholds)
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Probabilistic
    }
}

/// Classifier exposing only the predicted class
pub struct DiscreteClassifier {
    session: Mutex<Session>,
    output: String,
}

impl Classifier for DiscreteClassifier {
    fn classify(&self, embedding: &Embedding) -> Result<Prediction, PipelineError> {
        let input = embedding_input(embedding)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| PipelineError::inference(format!("classification failed: {}", e)))?;

        let value = outputs
            .get(&self.output)
            .ok_or_else(|| PipelineError::inference(format!("missing output {}", self.output)))?;

        // Integer labels from sklearn, float labels from some booster exports
        let class = match value.try_extract_tensor::<i64>() {
            Ok((_, data)) => data.first().copied(),
            Err(_) => value
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::inference(format!("extract error: {}", e)))?
                .1
                .first()
                .map(|v| v.round() as i64),
        }
        .ok_or_else(|| PipelineError::inference("classifier returned no label"))?;

        Ok(decide_from_class(class))
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Discrete
    }
}
