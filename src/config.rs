// Configuration for model training and hyperparameter search
//
// Everything the trainer draws randomness from is derived from `seed`, so a
// config file fully determines the selected model.

use crate::forest::{Criterion, ForestParams, MaxFeatures};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Hyperparameter values searched by the trainer
///
/// `max_depth` uses 0 for "unlimited" so the grid round-trips through TOML,
/// which has no null.
///
/// # Example
/// ```
/// use asistencia::config::ParamGrid;
///
/// let grid = ParamGrid::default();
/// assert_eq!(grid.len(), 3 * 4 * 3 * 3 * 2 * 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGrid {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<usize>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
    pub criterion: Vec<Criterion>,
    pub max_features: Vec<MaxFeatures>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![100, 200, 300],
            max_depth: vec![0, 10, 20, 30],
            min_samples_split: vec![2, 5, 10],
            min_samples_leaf: vec![1, 2, 4],
            criterion: vec![Criterion::Gini, Criterion::Entropy],
            max_features: vec![MaxFeatures::Sqrt, MaxFeatures::Log2],
        }
    }
}

impl ParamGrid {
    /// Number of combinations
    pub fn len(&self) -> usize {
        self.n_estimators.len()
            * self.max_depth.len()
            * self.min_samples_split.len()
            * self.min_samples_leaf.len()
            * self.criterion.len()
            * self.max_features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expand the grid into concrete parameter sets
    ///
    /// Axes are nested in alphabetical order of their names with the last
    /// one (`n_estimators`) varying fastest. Grid order decides ties during
    /// model selection, so it is part of the contract.
    pub fn combinations(&self) -> Vec<ForestParams> {
        let mut out = Vec::with_capacity(self.len());
        for &criterion in &self.criterion {
            for &depth in &self.max_depth {
                for &max_features in &self.max_features {
                    for &min_samples_leaf in &self.min_samples_leaf {
                        for &min_samples_split in &self.min_samples_split {
                            for &n_estimators in &self.n_estimators {
                                out.push(ForestParams {
                                    n_estimators,
                                    max_depth: (depth > 0).then_some(depth),
                                    min_samples_split,
                                    min_samples_leaf,
                                    criterion,
                                    max_features,
                                });
                            }
                        }
                    }
                }
            }
        }
        out
    }

    fn validate(&self) -> Result<(), String> {
        let axes = [
            ("n_estimators", self.n_estimators.len()),
            ("max_depth", self.max_depth.len()),
            ("min_samples_split", self.min_samples_split.len()),
            ("min_samples_leaf", self.min_samples_leaf.len()),
            ("criterion", self.criterion.len()),
            ("max_features", self.max_features.len()),
        ];
        if let Some((name, _)) = axes.iter().find(|(_, len)| *len == 0) {
            return Err(format!("grid.{name} must list at least one value"));
        }

        if self.n_estimators.contains(&0) {
            return Err("grid.n_estimators values must be >= 1".to_string());
        }
        if let Some(v) = self.min_samples_split.iter().find(|&&v| v < 2) {
            return Err(format!(
                "grid.min_samples_split values must be >= 2, got {v}"
            ));
        }
        if self.min_samples_leaf.contains(&0) {
            return Err("grid.min_samples_leaf values must be >= 1".to_string());
        }
        Ok(())
    }
}

/// Trainer configuration
///
/// # Example
/// ```
/// use asistencia::config::TrainerConfig;
///
/// let config = TrainerConfig::default();
/// assert_eq!(config.seed, 42);
/// assert_eq!(config.cv_folds, 5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Root seed for the split, the folds and every tree
    pub seed: u64,

    /// Share of each class held out for the final evaluation
    ///
    /// Default: 0.2
    pub test_fraction: f64,

    /// Number of stratified cross-validation folds
    ///
    /// Default: 5
    pub cv_folds: usize,

    /// Grid search worker threads (0 = available parallelism)
    pub workers: usize,

    pub grid: ParamGrid,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.2,
            cv_folds: 5,
            workers: 0,
            grid: ParamGrid::default(),
        }
    }
}

impl TrainerConfig {
    /// Small grid for smoke runs and tests
    pub fn quick() -> Self {
        Self {
            cv_folds: 3,
            grid: ParamGrid {
                n_estimators: vec![15, 30],
                max_depth: vec![0, 8],
                min_samples_split: vec![2],
                min_samples_leaf: vec![1],
                criterion: vec![Criterion::Gini],
                max_features: vec![MaxFeatures::Sqrt],
            },
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            ));
        }

        if self.cv_folds < 2 {
            return Err(format!("cv_folds must be >= 2, got {}", self.cv_folds));
        }

        self.grid.validate()
    }

    /// Worker threads to use for the grid search
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: TrainerConfig = toml::from_str(text)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
