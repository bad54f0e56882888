//! Model Loader - load once, share read-only
//!
//! `ModelRegistry` owns the feature extractor and the classifier for the
//! lifetime of the process. Loading happens at most once: concurrent first
//! callers serialize on the load lock and all observe the same result.
//! A failed slot stays failed until `reload` is called explicitly; a reload
//! that fails keeps whatever was ready before it.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::classifier::{self, Classifier, ClassifierKind};
use super::error::PipelineError;
use super::extractor::{FeatureExtractor, OnnxFeatureExtractor};
use super::threshold::ThresholdConfig;

// ============================================================================
// LOADER
// ============================================================================

/// Source of the two models. Split out so tests can run without ONNX files.
pub trait ModelLoader: Send + Sync {
    fn load_extractor(&self) -> Result<Box<dyn FeatureExtractor>, PipelineError>;
    fn load_classifier(&self) -> Result<Box<dyn Classifier>, PipelineError>;
}

/// Loads both models from ONNX files on disk
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    pub feature_model_path: PathBuf,
    pub classifier_model_path: PathBuf,
    pub thresholds: ThresholdConfig,
}

impl ModelLoader for OnnxModelLoader {
    fn load_extractor(&self) -> Result<Box<dyn FeatureExtractor>, PipelineError> {
        Ok(Box::new(OnnxFeatureExtractor::load(&self.feature_model_path)?))
    }

    fn load_classifier(&self) -> Result<Box<dyn Classifier>, PipelineError> {
        classifier::load_classifier(&self.classifier_model_path, self.thresholds)
    }
}

// ============================================================================
// STATE
// ============================================================================

/// Outcome of loading one model
pub enum ModelSlot<T: ?Sized> {
    Ready(Arc<T>),
    Failed(String),
}

impl<T: ?Sized> Clone for ModelSlot<T> {
    fn clone(&self) -> Self {
        match self {
            ModelSlot::Ready(m) => ModelSlot::Ready(m.clone()),
            ModelSlot::Failed(reason) => ModelSlot::Failed(reason.clone()),
        }
    }
}

impl<T: ?Sized> ModelSlot<T> {
    fn from_result(model: &'static str, result: Result<Box<T>, PipelineError>) -> Self {
        match result {
            Ok(m) => ModelSlot::Ready(Arc::from(m)),
            Err(e) => {
                tracing::error!("Failed to load {}: {}", model, e);
                ModelSlot::Failed(e.to_string())
            }
        }
    }

    /// Borrow the model or explain why it is missing.
    pub fn get(&self, model: &'static str) -> Result<&T, PipelineError> {
        match self {
            ModelSlot::Ready(m) => Ok(m.as_ref()),
            ModelSlot::Failed(reason) => Err(PipelineError::ModelUnavailable {
                model,
                reason: reason.clone(),
            }),
        }
    }

    /// Keep `previous` when it was ready and this load failed.
    fn or_previous(self, model: &'static str, previous: Option<&ModelSlot<T>>, failures: &mut Vec<String>) -> Self {
        match (self, previous) {
            (ModelSlot::Failed(reason), Some(ModelSlot::Ready(current))) => {
                tracing::warn!("Reload of {} failed, keeping the loaded one: {}", model, reason);
                failures.push(reason);
                ModelSlot::Ready(current.clone())
            }
            (ModelSlot::Failed(reason), _) => {
                failures.push(reason.clone());
                ModelSlot::Failed(reason)
            }
            (ready, _) => ready,
        }
    }

    fn status(&self) -> ModelStatus {
        match self {
            ModelSlot::Ready(_) => ModelStatus::Ready,
            ModelSlot::Failed(reason) => ModelStatus::Failed { reason: reason.clone() },
        }
    }
}

/// Both models after a load attempt
pub struct LoadedModels {
    pub extractor: ModelSlot<dyn FeatureExtractor>,
    pub classifier: ModelSlot<dyn Classifier>,
}

impl LoadedModels {
    pub fn extractor(&self) -> Result<&dyn FeatureExtractor, PipelineError> {
        self.extractor.get("feature extractor")
    }

    pub fn classifier(&self) -> Result<&dyn Classifier, PipelineError> {
        self.classifier.get("classifier")
    }
}

/// Result of an explicit reload
pub struct ReloadOutcome {
    pub models: Arc<LoadedModels>,
    /// One message per model that failed to load this time
    pub failures: Vec<String>,
}

impl ReloadOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

enum LoadState {
    Uninitialized,
    Loading,
    Loaded(Arc<LoadedModels>),
}

/// Per-model lifecycle, as reported by `/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ModelStatus {
    Uninitialized,
    Loading,
    Ready,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    pub feature_extractor: ModelStatus,
    pub classifier: ModelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier_kind: Option<ClassifierKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_tap: Option<String>,
}

impl RegistryStatus {
    pub fn is_ready(&self) -> bool {
        self.feature_extractor == ModelStatus::Ready && self.classifier == ModelStatus::Ready
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

pub struct ModelRegistry {
    loader: Box<dyn ModelLoader>,
    state: RwLock<LoadState>,
    load_lock: Mutex<()>,
}

impl ModelRegistry {
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            state: RwLock::new(LoadState::Uninitialized),
            load_lock: Mutex::new(()),
        }
    }

    fn loaded(&self) -> Option<Arc<LoadedModels>> {
        match &*self.state.read() {
            LoadState::Loaded(models) => Some(models.clone()),
            _ => None,
        }
    }

    /// Return the loaded models, loading them on first use.
    ///
    /// Blocks while another caller is loading. Never fails: a model that
    /// could not be loaded is recorded as a failed slot.
    pub fn ensure_loaded(&self) -> Arc<LoadedModels> {
        if let Some(models) = self.loaded() {
            return models;
        }

        let _guard = self.load_lock.lock();
        // Another caller may have finished while we waited
        if let Some(models) = self.loaded() {
            return models;
        }
        self.load_locked()
    }

    /// Load both models again.
    ///
    /// Requests keep using the current models while this runs. A model that
    /// fails to load keeps its previous ready instance.
    pub fn reload(&self) -> ReloadOutcome {
        let _guard = self.load_lock.lock();
        let previous = self.loaded();
        let fresh = self.load_models();

        let mut failures = Vec::new();
        let models = Arc::new(LoadedModels {
            extractor: fresh.extractor.or_previous(
                "feature extractor",
                previous.as_ref().map(|p| &p.extractor),
                &mut failures,
            ),
            classifier: fresh.classifier.or_previous(
                "classifier",
                previous.as_ref().map(|p| &p.classifier),
                &mut failures,
            ),
        });

        *self.state.write() = LoadState::Loaded(models.clone());
        ReloadOutcome { models, failures }
    }

    fn load_locked(&self) -> Arc<LoadedModels> {
        *self.state.write() = LoadState::Loading;
        let models = Arc::new(self.load_models());
        *self.state.write() = LoadState::Loaded(models.clone());
        models
    }

    fn load_models(&self) -> LoadedModels {
        LoadedModels {
            extractor: ModelSlot::from_result("feature extractor", self.loader.load_extractor()),
            classifier: ModelSlot::from_result("classifier", self.loader.load_classifier()),
        }
    }

    pub fn status(&self) -> RegistryStatus {
        match &*self.state.read() {
            LoadState::Uninitialized => RegistryStatus {
                feature_extractor: ModelStatus::Uninitialized,
                classifier: ModelStatus::Uninitialized,
                classifier_kind: None,
                embedding_tap: None,
            },
            LoadState::Loading => RegistryStatus {
                feature_extractor: ModelStatus::Loading,
                classifier: ModelStatus::Loading,
                classifier_kind: None,
                embedding_tap: None,
            },
            LoadState::Loaded(models) => RegistryStatus {
                feature_extractor: models.extractor.status(),
                classifier: models.classifier.status(),
                classifier_kind: models.classifier().ok().map(|c| c.kind()),
                embedding_tap: models.extractor().ok().map(|e| e.tap_name().to_string()),
            },
        }
    }
}
