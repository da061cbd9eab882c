//! Batch inference with a trained model
//!
//! The feature table must carry exactly the columns the model was trained
//! on, in the same order. There is no reordering, fallback or retraining:
//! a mismatch is reported with the offending column names.

use crate::features::{compare_columns, ColumnMismatch, FeatureTable};
use crate::forest::argmax;
use crate::label::{AttendanceClass, NUM_CLASSES};
use crate::model::TrainedModel;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors from prediction
#[derive(Error, Debug, PartialEq)]
pub enum PredictError {
    #[error("Feature columns do not match the model: {0}")]
    SchemaMismatch(ColumnMismatch),
}

pub type Result<T> = std::result::Result<T, PredictError>;

/// Prediction for one row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_class: AttendanceClass,
    /// Indexed by [`AttendanceClass::index`]; sums to 1
    pub class_probabilities: [f64; NUM_CLASSES],
}

impl PredictionResult {
    pub fn probability(&self, class: AttendanceClass) -> f64 {
        self.class_probabilities[class.index()]
    }
}

/// Read-only view over a model for scoring tables
///
/// Holds the model by reference; several predictors can share one model
/// across threads.
#[derive(Debug, Clone, Copy)]
pub struct Predictor<'m> {
    model: &'m TrainedModel,
}

impl<'m> Predictor<'m> {
    pub fn new(model: &'m TrainedModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &'m TrainedModel {
        self.model
    }

    /// Score every row of `table`, in order
    pub fn predict(&self, table: &FeatureTable) -> Result<Vec<PredictionResult>> {
        if let Some(mismatch) = compare_columns(&self.model.feature_columns, table.columns()) {
            return Err(PredictError::SchemaMismatch(mismatch));
        }

        let results: Vec<PredictionResult> = table
            .rows()
            .iter()
            .map(|row| self.predict_row(row))
            .collect();

        debug!(rows = results.len(), "scored feature table");
        Ok(results)
    }

    fn predict_row(&self, row: &[f64]) -> PredictionResult {
        let class_probabilities = self.model.forest.predict_proba(row);
        let predicted_class = AttendanceClass::from_index(argmax(&class_probabilities))
            .unwrap_or(AttendanceClass::Present);
        PredictionResult {
            predicted_class,
            class_probabilities,
        }
    }
}

/// Score `table` with `model`
pub fn predict(model: &TrainedModel, table: &FeatureTable) -> Result<Vec<PredictionResult>> {
    Predictor::new(model).predict(table)
}
