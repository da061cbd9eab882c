//! Model selection and training
//!
//! 1. Stratified train/test split of the labeled table
//! 2. Exhaustive grid search, each combination scored by the mean
//!    class-weighted F1 over stratified k-fold cross-validation on the
//!    training split
//! 3. Refit of the best combination on the whole training split
//! 4. One evaluation on the held-out split, for reporting only
//!
//! Every (combination, fold) pair is an independent job. Jobs sit in a
//! lock-free queue drained by scoped worker threads; scores come back over a
//! channel and are reduced after all workers have joined. Seeds never depend
//! on which worker ran a job, so the selected model is the same for any
//! worker count.

use crate::config::TrainerConfig;
use crate::evaluation::{balanced_sample_weights, weighted_f1, ClassificationReport};
use crate::features::FeatureTable;
use crate::forest::{ForestError, ForestParams, RandomForest};
use crate::label::NUM_CLASSES;
use crate::model::{ModelMetadata, TrainedModel};
use crate::split::{stratified_k_fold, stratified_train_test_split, Fold};
use crossbeam::channel;
use crossbeam::queue::ArrayQueue;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from model training
#[derive(Error, Debug)]
pub enum TrainError {
    #[error("Feature table has no label column")]
    MissingLabels,

    #[error("Label count {labels} does not match row count {rows}")]
    LengthMismatch { rows: usize, labels: usize },

    #[error("Training split needs all 3 attendance classes, found {found}")]
    InsufficientClasses { found: usize },

    #[error(
        "Insufficient data: every class needs at least {required} training rows, smallest has {actual}"
    )]
    InsufficientData { required: usize, actual: usize },

    #[error("Invalid trainer config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Forest(#[from] ForestError),

    #[error("A grid search worker panicked")]
    WorkerPanic,
}

pub type Result<T> = std::result::Result<T, TrainError>;

/// Cross-validation outcome for one grid combination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CvResult {
    pub params: ForestParams,
    /// Weighted F1 per fold, in fold order
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

/// Everything a training run produced
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub model: TrainedModel,
    /// One entry per grid combination, in grid order
    pub cv_results: Vec<CvResult>,
    /// Index into `cv_results` of the selected combination
    pub best_index: usize,
    pub train_rows: usize,
    pub test_rows: usize,
}

impl TrainingRun {
    pub fn best(&self) -> &CvResult {
        &self.cv_results[self.best_index]
    }

    /// Machine-readable training report
    pub fn to_json(&self) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Report<'a> {
            best: &'a CvResult,
            train_rows: usize,
            test_rows: usize,
            test_report: Option<&'a ClassificationReport>,
            feature_importances: Vec<(String, f64)>,
            cv_results: &'a [CvResult],
        }

        serde_json::to_string_pretty(&Report {
            best: self.best(),
            train_rows: self.train_rows,
            test_rows: self.test_rows,
            test_report: self.model.metadata.test_report.as_ref(),
            feature_importances: self.model.ranked_importances(),
            cv_results: &self.cv_results,
        })
    }

    /// Format a training summary for display
    pub fn format(&self) -> String {
        let mut output = String::new();

        output.push_str("\n=== Training Summary ===\n");
        output.push_str(&format!(
            "Rows: {} train / {} test\n",
            self.train_rows, self.test_rows
        ));
        output.push_str(&format!("Combinations searched: {}\n", self.cv_results.len()));
        output.push_str(&format!("Best parameters: {}\n", self.best().params));
        output.push_str(&format!(
            "Best CV weighted F1: {:.4}\n",
            self.best().mean_score
        ));

        output.push_str("\nTop features:\n");
        for (name, importance) in self.model.ranked_importances().iter().take(5) {
            output.push_str(&format!("  {name:<14} {importance:.4}\n"));
        }

        if let Some(report) = &self.model.metadata.test_report {
            output.push_str(&report.format());
        }

        output
    }
}

/// Grid-search trainer
#[derive(Debug, Clone, Default)]
pub struct ModelTrainer {
    config: TrainerConfig,
}

/// Shared read-only state for the grid search workers
struct SearchContext<'a> {
    rows: &'a [Vec<f64>],
    labels: &'a [usize],
    folds: &'a [Fold],
    fold_weights: &'a [Vec<f64>],
    combinations: &'a [ForestParams],
    seed: u64,
}

impl SearchContext<'_> {
    fn score(&self, combo: usize, fold: usize) -> std::result::Result<f64, ForestError> {
        let split = &self.folds[fold];
        let mut forest = RandomForest::new(self.combinations[combo].clone(), self.seed);
        forest.fit_subset(
            self.rows,
            self.labels,
            &self.fold_weights[fold],
            &split.train,
        )?;

        let truth: Vec<usize> = split.validation.iter().map(|&i| self.labels[i]).collect();
        let predicted: Vec<usize> = split
            .validation
            .iter()
            .map(|&i| forest.predict(&self.rows[i]))
            .collect();
        Ok(weighted_f1(&truth, &predicted))
    }
}

type JobResult = (usize, usize, std::result::Result<f64, ForestError>);

impl ModelTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Train and return only the model
    pub fn train(&self, table: &FeatureTable) -> Result<TrainedModel> {
        Ok(self.train_with_report(table)?.model)
    }

    /// Train and keep the full search record
    pub fn train_with_report(&self, table: &FeatureTable) -> Result<TrainingRun> {
        self.config.validate().map_err(TrainError::InvalidConfig)?;

        let labels: Vec<usize> = table
            .labels()
            .ok_or(TrainError::MissingLabels)?
            .iter()
            .map(|c| c.index())
            .collect();
        let rows = table.rows();
        if labels.len() != rows.len() {
            return Err(TrainError::LengthMismatch {
                rows: rows.len(),
                labels: labels.len(),
            });
        }

        let split = stratified_train_test_split(&labels, self.config.test_fraction, self.config.seed);

        // Every class must reach the training split, and every fold
        let mut train_counts = [0usize; NUM_CLASSES];
        for &i in &split.train {
            train_counts[labels[i]] += 1;
        }
        let found = train_counts.iter().filter(|&&c| c > 0).count();
        if found < NUM_CLASSES {
            return Err(TrainError::InsufficientClasses { found });
        }
        let smallest = train_counts.iter().copied().min().unwrap_or(0);
        if smallest < self.config.cv_folds {
            return Err(TrainError::InsufficientData {
                required: self.config.cv_folds,
                actual: smallest,
            });
        }
        info!(
            train = split.train.len(),
            test = split.test.len(),
            "stratified split"
        );

        let cv_results = self.grid_search(rows, &labels, &split.train)?;
        let best_index = select_best(&cv_results);
        let best = &cv_results[best_index];
        info!(
            params = %best.params,
            cv_weighted_f1 = best.mean_score,
            "selected hyperparameters"
        );

        let weights = balanced_sample_weights(&labels, &split.train);
        let mut forest = RandomForest::new(best.params.clone(), self.config.seed);
        forest.fit_subset(rows, &labels, &weights, &split.train)?;

        let truth: Vec<usize> = split.test.iter().map(|&i| labels[i]).collect();
        let predicted: Vec<usize> = split.test.iter().map(|&i| forest.predict(&rows[i])).collect();
        let report = ClassificationReport::from_labels(&truth, &predicted);
        info!(
            accuracy = report.accuracy,
            weighted_f1 = report.weighted_f1,
            "held-out evaluation"
        );

        let metadata = ModelMetadata::new(split.train.len())
            .with_cv_score(best.mean_score)
            .with_test_report(report);
        let model = TrainedModel::new(forest, table.columns().to_vec(), metadata);

        Ok(TrainingRun {
            model,
            cv_results,
            best_index,
            train_rows: split.train.len(),
            test_rows: split.test.len(),
        })
    }

    /// Score every grid combination with k-fold cross-validation
    fn grid_search(
        &self,
        rows: &[Vec<f64>],
        labels: &[usize],
        train: &[usize],
    ) -> Result<Vec<CvResult>> {
        let combinations = self.config.grid.combinations();
        let folds = stratified_k_fold(
            train,
            labels,
            self.config.cv_folds,
            self.config.seed.wrapping_add(1),
        );
        let fold_weights: Vec<Vec<f64>> = folds
            .iter()
            .map(|fold| balanced_sample_weights(labels, &fold.train))
            .collect();

        let n_jobs = combinations.len() * folds.len();
        let workers = self.config.effective_workers().clamp(1, n_jobs.max(1));
        info!(
            combinations = combinations.len(),
            folds = folds.len(),
            workers,
            "starting grid search"
        );

        let queue = ArrayQueue::new(n_jobs.max(1));
        for combo in 0..combinations.len() {
            for fold in 0..folds.len() {
                // Capacity equals the job count
                let _ = queue.push((combo, fold));
            }
        }

        let ctx = SearchContext {
            rows,
            labels,
            folds: &folds,
            fold_weights: &fold_weights,
            combinations: &combinations,
            seed: self.config.seed,
        };

        let (tx, rx) = channel::unbounded::<JobResult>();
        crossbeam::thread::scope(|s| {
            for _ in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                let ctx = &ctx;
                s.spawn(move |_| {
                    while let Some((combo, fold)) = queue.pop() {
                        let score = ctx.score(combo, fold);
                        if tx.send((combo, fold, score)).is_err() {
                            break;
                        }
                    }
                });
            }
        })
        .map_err(|_| TrainError::WorkerPanic)?;
        drop(tx);

        let mut scores = vec![vec![0.0; folds.len()]; combinations.len()];
        for (combo, fold, score) in rx.iter() {
            scores[combo][fold] = score?;
        }

        Ok(combinations
            .into_iter()
            .zip(scores)
            .map(|(params, fold_scores)| {
                let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
                debug!(params = %params, mean_score, "cv score");
                CvResult {
                    params,
                    fold_scores,
                    mean_score,
                }
            })
            .collect())
    }
}

/// Highest mean score; the earliest combination wins ties
fn select_best(results: &[CvResult]) -> usize {
    let mut best = 0;
    for (i, result) in results.iter().enumerate() {
        if result.mean_score > results[best].mean_score {
            best = i;
        }
    }
    best
}
