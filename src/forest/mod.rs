//! Random forest classifier for attendance outcomes
//!
//! Bagged ensemble of weighted CART trees. Each tree is grown on a bootstrap
//! sample of the training rows and considers a random subset of features at
//! every split. Probabilities are the mean of the per-tree leaf
//! distributions.
//!
//! All randomness comes from a `u64` seed: tree `t` uses its own
//! [`StdRng`] derived from `(seed, t)`, so the fitted forest does not depend
//! on thread scheduling.
//!
//! # References
//!
//! Breiman, L. (2001). Random forests. Machine Learning, 45(1), 5-32.

mod tree;

pub use tree::DecisionTree;

use crate::label::NUM_CLASSES;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tree::TreeBuilder;

/// Multiplier used to spread per-tree seeds
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Errors from fitting a forest
#[derive(Error, Debug, PartialEq)]
pub enum ForestError {
    #[error("Cannot fit a forest on zero rows")]
    EmptyTrainingSet,

    #[error("Length mismatch: {rows} rows, {labels} labels, {weights} weights")]
    LengthMismatch {
        rows: usize,
        labels: usize,
        weights: usize,
    },

    #[error("Label {0} is not an attendance class (expected 0-2)")]
    InvalidLabel(usize),

    #[error("Row {row} has {found} features, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid forest parameters: {0}")]
    InvalidParams(String),
}

pub type Result<T> = std::result::Result<T, ForestError>;

/// Impurity measure used to rank splits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Gini,
    Entropy,
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Gini => f.write_str("gini"),
            Criterion::Entropy => f.write_str("entropy"),
        }
    }
}

/// Number of features examined at each split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxFeatures {
    /// floor(sqrt(n_features))
    Sqrt,
    /// floor(log2(n_features))
    Log2,
    /// Every feature
    All,
}

impl MaxFeatures {
    /// Concrete feature count for a table width (at least 1)
    pub fn resolve(self, n_features: usize) -> usize {
        let n = n_features.max(1);
        let k = match self {
            MaxFeatures::Sqrt => (n as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n as f64).log2().floor() as usize,
            MaxFeatures::All => n,
        };
        k.clamp(1, n)
    }
}

impl fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxFeatures::Sqrt => f.write_str("sqrt"),
            MaxFeatures::Log2 => f.write_str("log2"),
            MaxFeatures::All => f.write_str("all"),
        }
    }
}

/// One hyperparameter combination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum tree depth (`None` = grow until pure or too small)
    pub max_depth: Option<usize>,
    /// Minimum samples a node needs to be split
    pub min_samples_split: usize,
    /// Minimum samples in each child of a split
    pub min_samples_leaf: usize,
    pub criterion: Criterion,
    pub max_features: MaxFeatures,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            criterion: Criterion::Gini,
            max_features: MaxFeatures::Sqrt,
        }
    }
}

impl ForestParams {
    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(ForestError::InvalidParams(
                "n_estimators must be >= 1".to_string(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(ForestError::InvalidParams(format!(
                "min_samples_split must be >= 2, got {}",
                self.min_samples_split
            )));
        }
        if self.min_samples_leaf == 0 {
            return Err(ForestError::InvalidParams(
                "min_samples_leaf must be >= 1".to_string(),
            ));
        }
        if self.max_depth == Some(0) {
            return Err(ForestError::InvalidParams(
                "max_depth must be >= 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ForestParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let depth = self
            .max_depth
            .map_or_else(|| "none".to_string(), |d| d.to_string());
        write!(
            f,
            "n_estimators={} max_depth={} min_samples_split={} min_samples_leaf={} criterion={} max_features={}",
            self.n_estimators,
            depth,
            self.min_samples_split,
            self.min_samples_leaf,
            self.criterion,
            self.max_features
        )
    }
}

/// Random forest - ensemble of weighted decision trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    seed: u64,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Create an unfitted forest
    pub fn new(params: ForestParams, seed: u64) -> Self {
        RandomForest {
            params,
            seed,
            n_features: 0,
            trees: Vec::new(),
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Highest feature index read by any tree
    pub fn max_split_feature(&self) -> Option<usize> {
        self.trees.iter().filter_map(|t| t.max_split_feature()).max()
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Fit on every row
    pub fn fit(&mut self, rows: &[Vec<f64>], labels: &[usize], weights: &[f64]) -> Result<()> {
        let all: Vec<usize> = (0..rows.len()).collect();
        self.fit_subset(rows, labels, weights, &all)
    }

    /// Fit on the rows selected by `subset`
    ///
    /// `rows`, `labels` and `weights` are indexed by global row index; only
    /// the subset is used, which lets cross-validation share one table.
    pub fn fit_subset(
        &mut self,
        rows: &[Vec<f64>],
        labels: &[usize],
        weights: &[f64],
        subset: &[usize],
    ) -> Result<()> {
        self.params.validate()?;

        if rows.len() != labels.len() || rows.len() != weights.len() {
            return Err(ForestError::LengthMismatch {
                rows: rows.len(),
                labels: labels.len(),
                weights: weights.len(),
            });
        }
        if subset.is_empty() {
            return Err(ForestError::EmptyTrainingSet);
        }

        let n_features = rows[subset[0]].len();
        for &i in subset {
            if rows[i].len() != n_features {
                return Err(ForestError::RaggedRow {
                    row: i,
                    expected: n_features,
                    found: rows[i].len(),
                });
            }
            if labels[i] >= NUM_CLASSES {
                return Err(ForestError::InvalidLabel(labels[i]));
            }
        }

        self.n_features = n_features;
        self.trees = (0..self.params.n_estimators)
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(tree_seed(self.seed, t));
                let bootstrap: Vec<usize> = (0..subset.len())
                    .map(|_| subset[rng.gen_range(0..subset.len())])
                    .collect();
                TreeBuilder::new(rows, labels, weights, &self.params, n_features, rng)
                    .build(bootstrap)
            })
            .collect();

        Ok(())
    }

    /// Mean class probabilities across trees
    ///
    /// An unfitted forest returns the uniform distribution.
    pub fn predict_proba(&self, row: &[f64]) -> [f64; NUM_CLASSES] {
        if self.trees.is_empty() {
            return [1.0 / NUM_CLASSES as f64; NUM_CLASSES];
        }

        let mut proba = [0.0; NUM_CLASSES];
        for tree in &self.trees {
            for (acc, p) in proba.iter_mut().zip(tree.predict_proba(row)) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        for p in &mut proba {
            *p /= n;
        }
        proba
    }

    /// Most probable class (lowest index wins ties)
    pub fn predict(&self, row: &[f64]) -> usize {
        argmax(&self.predict_proba(row))
    }

    /// Normalized mean impurity decrease per feature
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_features];
        for tree in &self.trees {
            let tree_total: f64 = tree.importances().iter().sum();
            if tree_total <= 0.0 {
                continue;
            }
            for (acc, v) in totals.iter_mut().zip(tree.importances()) {
                *acc += v / tree_total;
            }
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            for v in &mut totals {
                *v /= sum;
            }
        }
        totals
    }
}

fn tree_seed(seed: u64, tree: usize) -> u64 {
    seed ^ (tree as u64 + 1).wrapping_mul(SEED_STRIDE)
}

/// Index of the largest value (first one on ties)
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
