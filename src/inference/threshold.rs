//! Decision thresholds
//!
//! The decision boundary turns a positive-class probability into a label.
//! The uncertain band flags inputs for manual review regardless of which
//! side of the boundary they fall on.

use serde::{Deserialize, Serialize};

use super::classifier::Label;

/// Threshold Configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Probability at or above which the label is PNEUMONIA
    pub decision_threshold: f32,

    /// Probability below which the input is archived for review
    pub uncertain_threshold: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            decision_threshold: 0.5,
            uncertain_threshold: 0.6,
        }
    }
}

impl ThresholdConfig {
    /// Label for a positive-class probability
    pub fn label_for(&self, probability: f32) -> Label {
        if probability >= self.decision_threshold {
            Label::Pneumonia
        } else {
            Label::Normal
        }
    }

    /// Applied to the raw probability, not to the confidence of the chosen
    /// label: a confident NORMAL (p = 0.05) is also "uncertain".
    pub fn is_uncertain(&self, probability: f32) -> bool {
        probability < self.uncertain_threshold
    }
}
