//! Prediction accuracy rolled up by group
//!
//! Grouping is supplied by the caller as a key function over row indices,
//! so the same reduction serves per-date, per-employee-month and global
//! views. Groups come back ordered by key.

use crate::label::{AttendanceClass, NUM_CLASSES};
use crate::predictor::PredictionResult;
use crate::record::PunchRecord;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum AggregateError {
    #[error("Got {predictions} predictions but {truth} ground truth labels")]
    LengthMismatch { predictions: usize, truth: usize },

    #[error("Got {predictions} predictions for {records} records")]
    RecordCountMismatch { records: usize, predictions: usize },
}

pub type Result<T> = std::result::Result<T, AggregateError>;

/// `numerator / denominator * 100`, or 0 when the denominator is 0
pub fn rate_pct(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}

/// Correctness counts for one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccuracyMetric<K> {
    pub key: K,
    pub total_count: usize,
    pub correct_count: usize,
    /// Correct predictions per true class
    pub per_class_correct: [usize; NUM_CLASSES],
    /// Ground-truth instances per class; sums to `total_count`
    pub per_class_actual: [usize; NUM_CLASSES],
}

impl<K> AccuracyMetric<K> {
    fn empty(key: K) -> Self {
        Self {
            key,
            total_count: 0,
            correct_count: 0,
            per_class_correct: [0; NUM_CLASSES],
            per_class_actual: [0; NUM_CLASSES],
        }
    }

    fn record(&mut self, predicted: AttendanceClass, actual: AttendanceClass) {
        self.total_count += 1;
        self.per_class_actual[actual.index()] += 1;
        if predicted == actual {
            self.correct_count += 1;
            self.per_class_correct[actual.index()] += 1;
        }
    }

    /// Overall accuracy in percent
    pub fn rate(&self) -> f64 {
        rate_pct(self.correct_count, self.total_count)
    }

    /// Recall of one class in percent
    pub fn class_rate(&self, class: AttendanceClass) -> f64 {
        rate_pct(
            self.per_class_correct[class.index()],
            self.per_class_actual[class.index()],
        )
    }

    pub fn actual_absences(&self) -> usize {
        self.per_class_actual[AttendanceClass::Absent.index()]
    }
}

/// Compare predictions with ground truth, grouped by `key_fn(row)`
pub fn aggregate<K, F>(
    predictions: &[PredictionResult],
    truth: &[AttendanceClass],
    key_fn: F,
) -> Result<Vec<AccuracyMetric<K>>>
where
    K: Ord + Clone,
    F: Fn(usize) -> K,
{
    if predictions.len() != truth.len() {
        return Err(AggregateError::LengthMismatch {
            predictions: predictions.len(),
            truth: truth.len(),
        });
    }

    let mut groups: BTreeMap<K, AccuracyMetric<K>> = BTreeMap::new();
    for (row, (prediction, &actual)) in predictions.iter().zip(truth).enumerate() {
        let key = key_fn(row);
        groups
            .entry(key.clone())
            .or_insert_with(|| AccuracyMetric::empty(key))
            .record(prediction.predicted_class, actual);
    }

    Ok(groups.into_values().collect())
}

/// Built-in grouping keys over punch records
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum GroupKey {
    Global,
    /// `None` collects records whose date did not parse
    Date(Option<NaiveDate>),
    EmployeeMonth {
        employee_id: String,
        /// `None` when the date did not parse
        period: Option<(i32, u32)>,
    },
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Global => f.write_str("global"),
            GroupKey::Date(Some(date)) => write!(f, "{}", date.format("%Y-%m-%d")),
            GroupKey::Date(None) => f.write_str("unknown-date"),
            GroupKey::EmployeeMonth {
                employee_id,
                period: Some((year, month)),
            } => write!(f, "{employee_id}/{year:04}-{month:02}"),
            GroupKey::EmployeeMonth {
                employee_id,
                period: None,
            } => write!(f, "{employee_id}/unknown-date"),
        }
    }
}

/// How to group records for [`aggregate_records`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    Global,
    Date,
    EmployeeMonth,
}

impl Grouping {
    pub fn key(self, record: &PunchRecord) -> GroupKey {
        match self {
            Grouping::Global => GroupKey::Global,
            Grouping::Date => GroupKey::Date(record.date()),
            Grouping::EmployeeMonth => GroupKey::EmployeeMonth {
                employee_id: record.employee_id.clone(),
                period: record.date().map(|d| (d.year(), d.month())),
            },
        }
    }
}

/// [`aggregate`] with one of the built-in groupings
///
/// `records`, `predictions` and `truth` are parallel by row.
pub fn aggregate_records(
    records: &[PunchRecord],
    predictions: &[PredictionResult],
    truth: &[AttendanceClass],
    grouping: Grouping,
) -> Result<Vec<AccuracyMetric<GroupKey>>> {
    if records.len() != predictions.len() {
        return Err(AggregateError::RecordCountMismatch {
            records: records.len(),
            predictions: predictions.len(),
        });
    }
    aggregate(predictions, truth, |row| grouping.key(&records[row]))
}
