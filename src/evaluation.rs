//! Classification metrics for model selection and held-out evaluation
//!
//! Scores come from `aprender::metrics::classification`:
//!
//! - Class-weighted F1 (per-class F1 weighted by true support), the grid
//!   search score
//! - Accuracy, weighted precision / recall and the confusion matrix for the
//!   held-out report; per-class rows are read off that matrix
//! - Balanced class weights `n / (n_classes * count_c)` for training
//!
//! aprender panics on empty input, so every entry point short-circuits an
//! empty label set to zero scores.

use crate::label::{AttendanceClass, NUM_CLASSES};
use aprender::metrics::classification::{self, Average};
use serde::{Deserialize, Serialize};

/// `matrix[actual][predicted]`
pub type ConfusionMatrix = [[usize; NUM_CLASSES]; NUM_CLASSES];

/// Equal-length prefixes of both label lists
fn paired<'a>(truth: &'a [usize], predicted: &'a [usize]) -> (&'a [usize], &'a [usize]) {
    let n = truth.len().min(predicted.len());
    (&truth[..n], &predicted[..n])
}

/// Count (actual, predicted) pairs
///
/// aprender sizes its matrix by the largest label seen; it is copied into a
/// fixed 3x3 grid.
pub fn confusion_matrix(truth: &[usize], predicted: &[usize]) -> ConfusionMatrix {
    let mut matrix = [[0usize; NUM_CLASSES]; NUM_CLASSES];
    let (truth, predicted) = paired(truth, predicted);
    if truth.is_empty() {
        return matrix;
    }

    let counts = classification::confusion_matrix(predicted, truth);
    let n = counts.n_rows().min(NUM_CLASSES);
    for (actual, row) in matrix.iter_mut().enumerate().take(n) {
        for (pred, cell) in row.iter_mut().enumerate().take(n) {
            *cell = counts.get(actual, pred);
        }
    }
    matrix
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Precision, recall and F1 for one class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of true instances
    pub support: usize,
}

impl ClassMetrics {
    fn from_confusion(matrix: &ConfusionMatrix, class: usize) -> Self {
        let tp = matrix[class][class];
        let predicted: usize = (0..NUM_CLASSES).map(|a| matrix[a][class]).sum();
        let support: usize = matrix[class].iter().sum();

        let precision = ratio(tp, predicted);
        let recall = ratio(tp, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            precision,
            recall,
            f1,
            support,
        }
    }
}

/// Held-out evaluation summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub total: usize,
    pub accuracy: f64,
    pub weighted_precision: f64,
    pub weighted_recall: f64,
    pub weighted_f1: f64,
    pub per_class: [ClassMetrics; NUM_CLASSES],
    pub confusion: ConfusionMatrix,
}

impl ClassificationReport {
    pub fn from_labels(truth: &[usize], predicted: &[usize]) -> Self {
        let (truth, predicted) = paired(truth, predicted);
        let confusion = confusion_matrix(truth, predicted);
        let per_class = [0, 1, 2].map(|c| ClassMetrics::from_confusion(&confusion, c));

        let (accuracy, weighted_precision, weighted_recall) = if truth.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (
                f64::from(classification::accuracy(predicted, truth)),
                f64::from(classification::precision(predicted, truth, Average::Weighted)),
                f64::from(classification::recall(predicted, truth, Average::Weighted)),
            )
        };

        Self {
            total: truth.len(),
            accuracy,
            weighted_precision,
            weighted_recall,
            weighted_f1: weighted_f1(truth, predicted),
            per_class,
            confusion,
        }
    }

    /// Format the report for display
    pub fn format(&self) -> String {
        let mut output = String::new();

        output.push_str("\n=== Held-out Evaluation ===\n");
        output.push_str(&format!("Samples: {}\n", self.total));
        output.push_str(&format!("Accuracy: {:.4}\n", self.accuracy));
        output.push_str(&format!(
            "Weighted precision / recall / F1: {:.4} / {:.4} / {:.4}\n",
            self.weighted_precision, self.weighted_recall, self.weighted_f1
        ));

        output.push_str("\nclass      precision  recall  f1      support\n");
        for class in AttendanceClass::ALL {
            let m = &self.per_class[class.index()];
            output.push_str(&format!(
                "{:<10} {:>9.3}  {:>6.3}  {:>6.3}  {:>7}\n",
                class.name(),
                m.precision,
                m.recall,
                m.f1,
                m.support
            ));
        }

        output.push_str("\nConfusion matrix (rows = actual, cols = predicted):\n");
        output.push_str("           present  absent  late\n");
        for class in AttendanceClass::ALL {
            let row = &self.confusion[class.index()];
            output.push_str(&format!(
                "{:<10} {:>7}  {:>6}  {:>4}\n",
                class.name(),
                row[0],
                row[1],
                row[2]
            ));
        }

        output
    }
}

/// Per-class F1 averaged with weights equal to each class's true support
pub fn weighted_f1(truth: &[usize], predicted: &[usize]) -> f64 {
    let (truth, predicted) = paired(truth, predicted);
    if truth.is_empty() {
        return 0.0;
    }
    f64::from(classification::f1_score(predicted, truth, Average::Weighted))
}

/// Balanced class weights over the given row indices
///
/// Classes absent from `indices` get weight 0.
pub fn balanced_class_weights(labels: &[usize], indices: &[usize]) -> [f64; NUM_CLASSES] {
    let mut counts = [0usize; NUM_CLASSES];
    for &i in indices {
        counts[labels[i]] += 1;
    }
    let present = counts.iter().filter(|&&c| c > 0).count();

    let mut weights = [0.0; NUM_CLASSES];
    for (w, &count) in weights.iter_mut().zip(&counts) {
        if count > 0 {
            *w = indices.len() as f64 / (present as f64 * count as f64);
        }
    }
    weights
}

/// Per-row sample weights for the rows in `indices`
///
/// Returns a vector over all rows; rows outside `indices` get weight 0.
pub fn balanced_sample_weights(labels: &[usize], indices: &[usize]) -> Vec<f64> {
    let class_weights = balanced_class_weights(labels, indices);
    let mut weights = vec![0.0; labels.len()];
    for &i in indices {
        weights[i] = class_weights[labels[i]];
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix() {
        let truth = vec![0, 0, 1, 2, 2];
        let predicted = vec![0, 1, 1, 2, 0];
        let m = confusion_matrix(&truth, &predicted);
        assert_eq!(m[0], [1, 1, 0]);
        assert_eq!(m[1], [0, 1, 0]);
        assert_eq!(m[2], [1, 0, 1]);
    }

    #[test]
    fn test_perfect_predictions() {
        let truth = vec![0, 1, 2, 0];
        let report = ClassificationReport::from_labels(&truth, &truth);
        assert!((report.accuracy - 1.0).abs() < 1e-6);
        assert!((report.weighted_f1 - 1.0).abs() < 1e-6);
        assert!((report.weighted_precision - 1.0).abs() < 1e-6);
        assert!((report.weighted_recall - 1.0).abs() < 1e-6);
        for m in &report.per_class {
            assert_eq!(m.precision, 1.0);
            assert_eq!(m.recall, 1.0);
        }
    }

    #[test]
    fn test_weighted_f1_matches_hand_computation() {
        // class 0: tp=1 fp=1 fn=1 -> p=0.5 r=0.5 f1=0.5, support 2
        // class 1: tp=1 fp=1 fn=0 -> p=0.5 r=1.0 f1=2/3, support 1
        // class 2: tp=1 fp=0 fn=1 -> p=1.0 r=0.5 f1=2/3, support 2
        let truth = vec![0, 0, 1, 2, 2];
        let predicted = vec![0, 1, 1, 2, 0];
        let expected = (0.5 * 2.0 + (2.0 / 3.0) * 1.0 + (2.0 / 3.0) * 2.0) / 5.0;
        assert!((weighted_f1(&truth, &predicted) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_recall_equals_accuracy() {
        // Support-weighted recall reduces to accuracy
        let truth = vec![0, 0, 1, 2, 2, 2];
        let predicted = vec![0, 1, 1, 2, 0, 2];
        let report = ClassificationReport::from_labels(&truth, &predicted);
        assert!((report.weighted_recall - report.accuracy).abs() < 1e-6);
        assert!((report.accuracy - 4.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_confusion_matrix_pads_missing_classes() {
        // aprender returns a 2x2 matrix here
        let m = confusion_matrix(&[0, 1, 1], &[0, 0, 1]);
        assert_eq!(m, [[1, 0, 0], [1, 1, 0], [0, 0, 0]]);
    }

    #[test]
    fn test_mismatched_lengths_use_common_prefix() {
        let report = ClassificationReport::from_labels(&[0, 1, 2, 2], &[0, 1]);
        assert_eq!(report.total, 2);
        assert_eq!(weighted_f1(&[0, 1, 2], &[]), 0.0);
    }

    #[test]
    fn test_class_never_predicted_has_zero_precision() {
        let truth = vec![0, 0, 1];
        let predicted = vec![0, 0, 0];
        let report = ClassificationReport::from_labels(&truth, &predicted);
        assert_eq!(report.per_class[1].precision, 0.0);
        assert_eq!(report.per_class[1].recall, 0.0);
        assert_eq!(report.per_class[1].f1, 0.0);
        assert!((report.accuracy - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_report() {
        let report = ClassificationReport::from_labels(&[], &[]);
        assert_eq!(report.total, 0);
        assert_eq!(report.accuracy, 0.0);
        assert_eq!(report.weighted_f1, 0.0);
        assert_eq!(report.confusion, [[0; 3]; 3]);
    }

    #[test]
    fn test_balanced_class_weights() {
        // 6 present, 2 absent, 2 late
        let labels = vec![0, 0, 0, 0, 0, 0, 1, 1, 2, 2];
        let all: Vec<usize> = (0..10).collect();
        let w = balanced_class_weights(&labels, &all);
        assert!((w[0] - 10.0 / 18.0).abs() < 1e-12);
        assert!((w[1] - 10.0 / 6.0).abs() < 1e-12);
        assert!((w[2] - 10.0 / 6.0).abs() < 1e-12);

        // Total weight per class is equal
        assert!((w[0] * 6.0 - w[1] * 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_balanced_weights_ignore_absent_class() {
        let labels = vec![0, 0, 1, 1];
        let w = balanced_class_weights(&labels, &[0, 1, 2, 3]);
        assert_eq!(w, [1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_sample_weights_cover_subset_only() {
        let labels = vec![0, 0, 0, 1];
        let w = balanced_sample_weights(&labels, &[0, 1, 3]);
        assert_eq!(w[2], 0.0);
        assert!((w[0] - 0.75).abs() < 1e-12);
        assert!((w[3] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_report_format() {
        let report = ClassificationReport::from_labels(&[0, 1, 2], &[0, 1, 1]);
        let text = report.format();
        assert!(text.contains("Held-out Evaluation"));
        assert!(text.contains("Accuracy: 0.6667"));
        assert!(text.contains("absent"));
        assert!(text.contains("Confusion matrix"));
    }
}
