//! Trained attendance model and its on-disk artifact
//!
//! A [`TrainedModel`] bundles the fitted forest with the exact feature
//! columns it was trained on and provenance metadata. Models are persisted
//! with aprender's `.apr` container (zstd-compressed by default); the path
//! is always explicit.
//!
//! # References
//!
//! Sculley, D., et al. (2015). Hidden technical debt in machine learning systems.
//! Advances in Neural Information Processing Systems.

use crate::evaluation::ClassificationReport;
use crate::features::FEATURE_SCHEMA_VERSION;
use crate::forest::{ForestParams, RandomForest};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during model persistence operations
#[derive(Error, Debug)]
pub enum ModelPersistenceError {
    #[error("Failed to save model: {0}")]
    SaveError(String),

    #[error("Failed to load model: {0}")]
    LoadError(String),

    #[error("Model file not found: {0}")]
    FileNotFound(String),

    #[error("Feature schema version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Result type for model persistence operations
pub type Result<T> = std::result::Result<T, ModelPersistenceError>;

/// Provenance of a trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Crate version that trained this model
    pub crate_version: String,
    /// When the model was trained (RFC 3339)
    pub trained_at: String,
    /// Rows in the training split
    pub training_samples: usize,
    /// Version of the feature schema the model expects
    pub schema_version: u32,
    /// Mean cross-validated weighted F1 of the selected parameters
    pub cv_score: Option<f64>,
    /// Evaluation on the held-out split
    pub test_report: Option<ClassificationReport>,
    pub description: Option<String>,
}

impl ModelMetadata {
    /// Create new metadata stamped with the current time
    pub fn new(training_samples: usize) -> Self {
        Self {
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: chrono::Utc::now().to_rfc3339(),
            training_samples,
            schema_version: FEATURE_SCHEMA_VERSION,
            cv_score: None,
            test_report: None,
            description: None,
        }
    }

    pub fn with_cv_score(mut self, score: f64) -> Self {
        self.cv_score = Some(score);
        self
    }

    pub fn with_test_report(mut self, report: ClassificationReport) -> Self {
        self.test_report = Some(report);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Fitted forest plus the schema it expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub forest: RandomForest,
    pub params: ForestParams,
    /// Ordered feature columns seen at training time
    pub feature_columns: Vec<String>,
    pub metadata: ModelMetadata,
}

impl TrainedModel {
    pub fn new(
        forest: RandomForest,
        feature_columns: Vec<String>,
        metadata: ModelMetadata,
    ) -> Self {
        Self {
            params: forest.params().clone(),
            forest,
            feature_columns,
            metadata,
        }
    }

    /// Feature importances paired with their column names, largest first
    pub fn ranked_importances(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .feature_columns
            .iter()
            .cloned()
            .zip(self.forest.feature_importances())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

/// Options for saving models
#[derive(Debug, Clone)]
pub struct PersistenceOptions {
    /// Enable compression (default: true)
    pub compress: bool,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Default for PersistenceOptions {
    fn default() -> Self {
        Self {
            compress: true,
            name: None,
            description: None,
        }
    }
}

impl PersistenceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Save a trained model to `.apr` format
pub fn save_model(
    model: &TrainedModel,
    path: impl AsRef<Path>,
    options: PersistenceOptions,
) -> Result<()> {
    use aprender::format::{save, Compression, ModelType, SaveOptions};

    let compression = if options.compress {
        Compression::ZstdDefault
    } else {
        Compression::None
    };

    let mut save_options = SaveOptions::new().with_compression(compression);

    if let Some(name) = options.name {
        save_options = save_options.with_name(name);
    }
    if let Some(desc) = options.description {
        save_options = save_options.with_description(desc);
    }

    save(model, ModelType::Custom, path.as_ref(), save_options)
        .map_err(|e| ModelPersistenceError::SaveError(e.to_string()))
}

/// Load a trained model from `.apr` format
///
/// Rejects artifacts built against a different feature schema version, and
/// artifacts whose forest reads features outside its column list.
pub fn load_model(path: impl AsRef<Path>) -> Result<TrainedModel> {
    use aprender::format::{load, ModelType};

    if !path.as_ref().exists() {
        return Err(ModelPersistenceError::FileNotFound(
            path.as_ref().display().to_string(),
        ));
    }

    let model = load::<TrainedModel>(path.as_ref(), ModelType::Custom)
        .map_err(|e| ModelPersistenceError::LoadError(e.to_string()))?;

    if model.metadata.schema_version != FEATURE_SCHEMA_VERSION {
        return Err(ModelPersistenceError::VersionMismatch {
            expected: FEATURE_SCHEMA_VERSION,
            found: model.metadata.schema_version,
        });
    }

    check_feature_count(&model)?;
    Ok(model)
}

fn check_feature_count(model: &TrainedModel) -> Result<()> {
    let columns = model.feature_columns.len();
    if model.forest.n_features() != columns {
        return Err(ModelPersistenceError::LoadError(format!(
            "forest expects {} features but the model lists {} columns",
            model.forest.n_features(),
            columns
        )));
    }
    if let Some(feature) = model.forest.max_split_feature() {
        if feature >= columns {
            return Err(ModelPersistenceError::LoadError(format!(
                "forest splits on feature {feature} but the model lists {columns} columns"
            )));
        }
    }
    Ok(())
}

/// One-line summary of a model for logs and CLI output
pub fn model_status_line(model: &TrainedModel) -> String {
    let mut line = format!(
        "model: asistencia v{}, {} trees, trained {} with {} samples",
        model.metadata.crate_version,
        model.forest.trees().len(),
        model.metadata.trained_at,
        model.metadata.training_samples
    );
    if let Some(score) = model.metadata.cv_score {
        line.push_str(&format!(", cv weighted F1 {score:.4}"));
    }
    line
}
