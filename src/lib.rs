//! Asistencia - employee attendance prediction from time-clock punches
//!
//! The pipeline turns raw punch records into a fixed-schema numeric feature
//! table, selects and trains a random forest classifier with cross-validated
//! grid search, scores new records, and rolls prediction accuracy up by
//! date, employee-month or globally.
//!
//! ```text
//! PunchRecord -> FeatureBuilder -> ModelTrainer -> TrainedModel
//!                      |                               |
//!                      +----------> Predictor <--------+
//!                                      |
//!                        aggregate / rollup_by_employee_month
//! ```

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod csv_output;
pub mod evaluation;
pub mod features;
pub mod forest;
pub mod ingest;
pub mod label;
pub mod model;
pub mod predictor;
pub mod record;
pub mod rollup;
pub mod split;
pub mod trainer;
