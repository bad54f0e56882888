//! Inference Module - CNN feature extractor + boosted classifier
//!
//! Stages: preprocess → extract embedding → classify. Models are owned by a
//! `ModelRegistry` injected through the application state.

pub mod classifier;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod loader;
pub mod onnx;
pub mod pipeline;
pub mod preprocess;
pub mod threshold;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-export common types
pub use classifier::{Label, Prediction};
pub use error::PipelineError;
pub use loader::{ModelRegistry, OnnxModelLoader, RegistryStatus};
pub use pipeline::InferencePipeline;
pub use threshold::ThresholdConfig;
