// Weighted CART decision tree for attendance classification
//
// Splits minimize the sample-weighted impurity of the two children. Sample
// weights carry the class balancing; min_samples_* constraints count raw
// samples, not weight.

use super::{Criterion, ForestParams};
use crate::label::NUM_CLASSES;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Two feature values closer than this are treated as equal
const FEATURE_EPSILON: f64 = 1e-7;

/// A node in a classification tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum TreeNode {
    /// Rows with `row[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
    /// Class probabilities of the training weight that reached this leaf
    Leaf { distribution: [f64; NUM_CLASSES] },
}

impl TreeNode {
    fn leaf_distribution(&self, row: &[f64]) -> &[f64; NUM_CLASSES] {
        match self {
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.leaf_distribution(row)
                } else {
                    right.leaf_distribution(row)
                }
            }
            TreeNode::Leaf { distribution } => distribution,
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
            TreeNode::Leaf { .. } => 0,
        }
    }

    fn max_feature(&self) -> Option<usize> {
        match self {
            TreeNode::Split {
                feature,
                left,
                right,
                ..
            } => Some(*feature)
                .max(left.max_feature())
                .max(right.max_feature()),
            TreeNode::Leaf { .. } => None,
        }
    }
}

/// Single classification tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    root: TreeNode,
    /// Weighted impurity decrease accumulated per feature
    importances: Vec<f64>,
}

impl DecisionTree {
    /// Class probabilities for one row
    pub fn predict_proba(&self, row: &[f64]) -> [f64; NUM_CLASSES] {
        *self.root.leaf_distribution(row)
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    /// Highest feature index any split reads; `None` for a single leaf
    pub fn max_split_feature(&self) -> Option<usize> {
        self.root.max_feature()
    }

    pub fn importances(&self) -> &[f64] {
        &self.importances
    }
}

/// Impurity of a weighted class histogram
pub(crate) fn impurity(criterion: Criterion, class_weights: &[f64; NUM_CLASSES]) -> f64 {
    let total: f64 = class_weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }

    match criterion {
        Criterion::Gini => {
            1.0 - class_weights
                .iter()
                .map(|w| {
                    let p = w / total;
                    p * p
                })
                .sum::<f64>()
        }
        Criterion::Entropy => class_weights
            .iter()
            .filter(|&&w| w > 0.0)
            .map(|w| {
                let p = w / total;
                -p * p.log2()
            })
            .sum(),
    }
}

/// Best split found for a node
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Weighted child impurity (sum of w_child * impurity_child)
    child_impurity: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

/// Grows one tree over a (possibly repeated) set of row indices
pub(crate) struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    labels: &'a [usize],
    weights: &'a [f64],
    params: &'a ForestParams,
    n_features: usize,
    features_per_split: usize,
    rng: StdRng,
    importances: Vec<f64>,
}

impl<'a> TreeBuilder<'a> {
    pub(crate) fn new(
        rows: &'a [Vec<f64>],
        labels: &'a [usize],
        weights: &'a [f64],
        params: &'a ForestParams,
        n_features: usize,
        rng: StdRng,
    ) -> Self {
        Self {
            rows,
            labels,
            weights,
            params,
            n_features,
            features_per_split: params.max_features.resolve(n_features),
            rng,
            importances: vec![0.0; n_features],
        }
    }

    pub(crate) fn build(mut self, indices: Vec<usize>) -> DecisionTree {
        let root = self.build_node(indices, 0);
        DecisionTree {
            root,
            importances: self.importances,
        }
    }

    fn class_weights(&self, indices: &[usize]) -> [f64; NUM_CLASSES] {
        let mut totals = [0.0; NUM_CLASSES];
        for &i in indices {
            totals[self.labels[i]] += self.weights[i];
        }
        totals
    }

    fn build_node(&mut self, indices: Vec<usize>, depth: usize) -> TreeNode {
        let totals = self.class_weights(&indices);
        let node_weight: f64 = totals.iter().sum();
        let node_impurity = impurity(self.params.criterion, &totals);

        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        let too_small = indices.len() < self.params.min_samples_split
            || indices.len() < 2 * self.params.min_samples_leaf;

        if depth_reached || too_small || node_impurity <= 0.0 {
            return Self::leaf(totals);
        }

        let Some(split) = self.find_split(&indices) else {
            return Self::leaf(totals);
        };

        self.importances[split.feature] += node_weight * node_impurity - split.child_impurity;

        let left = Box::new(self.build_node(split.left, depth + 1));
        let right = Box::new(self.build_node(split.right, depth + 1));

        TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        }
    }

    fn leaf(totals: [f64; NUM_CLASSES]) -> TreeNode {
        let total: f64 = totals.iter().sum();
        let mut distribution = [0.0; NUM_CLASSES];
        if total > 0.0 {
            for (p, w) in distribution.iter_mut().zip(totals.iter()) {
                *p = w / total;
            }
        }
        TreeNode::Leaf { distribution }
    }

    /// Search a random subset of features for the lowest child impurity
    ///
    /// Features that are constant within the node do not count towards the
    /// subset size, so a split is found whenever one exists.
    fn find_split(&mut self, indices: &[usize]) -> Option<SplitCandidate> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        features.shuffle(&mut self.rng);

        let mut best: Option<(usize, f64, f64)> = None;
        let mut visited = 0;

        for &feature in &features {
            if visited >= self.features_per_split && best.is_some() {
                break;
            }

            let mut sorted = indices.to_vec();
            sorted.sort_by(|&a, &b| {
                self.rows[a][feature]
                    .partial_cmp(&self.rows[b][feature])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let lo = self.rows[sorted[0]][feature];
            let hi = self.rows[sorted[sorted.len() - 1]][feature];
            if hi - lo <= FEATURE_EPSILON {
                continue;
            }
            visited += 1;

            if let Some((threshold, child_impurity)) = self.best_threshold(&sorted, feature) {
                let improves = best.map_or(true, |(_, _, current)| child_impurity < current);
                if improves {
                    best = Some((feature, threshold, child_impurity));
                }
            }
        }

        let (feature, threshold, child_impurity) = best?;
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| self.rows[i][feature] <= threshold);

        Some(SplitCandidate {
            feature,
            threshold,
            child_impurity,
            left,
            right,
        })
    }

    /// Sweep thresholds over indices sorted by `feature`
    fn best_threshold(&self, sorted: &[usize], feature: usize) -> Option<(f64, f64)> {
        let n = sorted.len();
        let min_leaf = self.params.min_samples_leaf;
        let mut left = [0.0; NUM_CLASSES];
        let mut right = self.class_weights(sorted);
        let mut best: Option<(f64, f64)> = None;

        for pos in 0..n - 1 {
            let i = sorted[pos];
            left[self.labels[i]] += self.weights[i];
            right[self.labels[i]] -= self.weights[i];

            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }

            let current = self.rows[i][feature];
            let next = self.rows[sorted[pos + 1]][feature];
            if next - current <= FEATURE_EPSILON {
                continue;
            }

            let w_left: f64 = left.iter().sum();
            let w_right: f64 = right.iter().sum();
            let child = w_left * impurity(self.params.criterion, &left)
                + w_right * impurity(self.params.criterion, &right);

            if best.map_or(true, |(_, b)| child < b) {
                let mut threshold = current + (next - current) / 2.0;
                if threshold >= next {
                    threshold = current;
                }
                best = Some((threshold, child));
            }
        }

        best
    }
}
