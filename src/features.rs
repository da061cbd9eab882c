//! Feature construction from punch records
//!
//! Every [`PunchRecord`] becomes one fixed-schema, purely numeric
//! [`FeatureVector`]. Derivations are best-effort: an unparseable date or
//! clock time leaves the dependent features missing, and a single
//! imputation pass at the end of [`FeatureBuilder::build_vector`] turns every
//! missing value into 0.
//!
//! The column order in [`FEATURE_COLUMNS`] is the contract between the
//! builder, persisted feature tables and trained models. Changing it requires
//! bumping [`FEATURE_SCHEMA_VERSION`].

use crate::label::{classify, AttendanceClass};
use crate::record::PunchRecord;
use chrono::Datelike;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Version of the feature column contract
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Number of feature columns
pub const NUM_FEATURES: usize = 11;

/// Feature column names, in table order
pub const FEATURE_COLUMNS: [&str; NUM_FEATURES] = [
    "dia_semana",
    "es_viernes",
    "es_lunes",
    "es_fin_semana",
    "mes",
    "anio",
    "dia_mes",
    "semana_anio",
    "tardanza_min",
    "tarde",
    "muy_tarde",
];

/// Name of the label column in persisted feature tables
pub const LABEL_COLUMN: &str = "ausencia";

/// Lateness above this many minutes counts as late
pub const LATE_THRESHOLD_MIN: f64 = 15.0;

/// Lateness above this many minutes counts as very late
pub const VERY_LATE_THRESHOLD_MIN: f64 = 30.0;

/// Errors raised while assembling or validating feature tables
#[derive(Error, Debug, PartialEq)]
pub enum FeatureError {
    #[error("Row {row} has {found} values, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Label count {labels} does not match row count {rows}")]
    LabelCountMismatch { rows: usize, labels: usize },

    #[error("Row {row}: label {value} is not a valid attendance class")]
    InvalidLabel { row: usize, value: String },

    #[error("Feature schema mismatch: {0}")]
    SchemaMismatch(ColumnMismatch),
}

pub type Result<T> = std::result::Result<T, FeatureError>;

/// Difference between an expected and an actual column list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMismatch {
    /// Expected columns that are absent
    pub missing: Vec<String>,
    /// Columns present but not expected
    pub unexpected: Vec<String>,
    /// Shared columns sitting at a different position than expected
    pub misordered: Vec<String>,
}

impl fmt::Display for ColumnMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing columns [{}]", self.missing.join(", ")));
        }
        if !self.unexpected.is_empty() {
            parts.push(format!(
                "unexpected columns [{}]",
                self.unexpected.join(", ")
            ));
        }
        if !self.misordered.is_empty() {
            parts.push(format!(
                "columns out of order [{}]",
                self.misordered.join(", ")
            ));
        }
        f.write_str(&parts.join("; "))
    }
}

/// Occurrences in `list` beyond how often the name appears in `other`
fn surplus(list: &[&str], other: &[&str]) -> Vec<String> {
    list.iter()
        .enumerate()
        .filter(|(i, name)| {
            let earlier = list[..*i].iter().filter(|c| c == name).count();
            earlier >= other.iter().filter(|c| c == name).count()
        })
        .map(|(_, name)| name.to_string())
        .collect()
}

/// Compare a column list against the expected one
///
/// Returns `None` when both lists are identical, in order. Otherwise at
/// least one of the three lists is non-empty; a repeated column counts as
/// unexpected.
pub fn compare_columns<E, F>(expected: &[E], found: &[F]) -> Option<ColumnMismatch>
where
    E: AsRef<str>,
    F: AsRef<str>,
{
    let expected: Vec<&str> = expected.iter().map(|c| c.as_ref()).collect();
    let found: Vec<&str> = found.iter().map(|c| c.as_ref()).collect();

    if expected == found {
        return None;
    }

    let missing = surplus(&expected, &found);
    let unexpected = surplus(&found, &expected);
    let shared_expected = expected.iter().filter(|c| found.contains(c));
    let shared_found = found.iter().filter(|c| expected.contains(c));
    let misordered: Vec<String> = shared_expected
        .zip(shared_found)
        .filter(|(e, f)| e != f)
        .map(|(e, _)| e.to_string())
        .collect();

    Some(ColumnMismatch {
        missing,
        unexpected,
        misordered,
    })
}

/// Numeric features for one punch record
///
/// Every field is a plain `f64`; booleans are 0/1. `label` is only set for
/// vectors built in training mode.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    /// 0 = Monday ... 6 = Sunday
    pub weekday: f64,
    pub is_friday: f64,
    pub is_monday: f64,
    pub is_weekend: f64,
    pub month: f64,
    pub year: f64,
    pub day_of_month: f64,
    /// ISO week number
    pub week_of_year: f64,
    pub lateness_minutes: f64,
    pub is_late: f64,
    pub is_very_late: f64,
    pub label: Option<AttendanceClass>,
}

impl FeatureVector {
    /// Values in [`FEATURE_COLUMNS`] order
    pub fn to_row(&self) -> Vec<f64> {
        vec![
            self.weekday,
            self.is_friday,
            self.is_monday,
            self.is_weekend,
            self.month,
            self.year,
            self.day_of_month,
            self.week_of_year,
            self.lateness_minutes,
            self.is_late,
            self.is_very_late,
        ]
    }
}

/// Derived values before imputation; `None` marks an unknown value
#[derive(Debug, Clone, Default)]
struct PartialFeatures {
    weekday: Option<f64>,
    is_friday: Option<f64>,
    is_monday: Option<f64>,
    is_weekend: Option<f64>,
    month: Option<f64>,
    year: Option<f64>,
    day_of_month: Option<f64>,
    week_of_year: Option<f64>,
    lateness_minutes: Option<f64>,
    is_late: Option<f64>,
    is_very_late: Option<f64>,
}

/// Missing or NaN becomes 0
pub fn impute(value: Option<f64>) -> f64 {
    match value {
        Some(v) if !v.is_nan() => v,
        _ => 0.0,
    }
}

fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

impl PartialFeatures {
    fn derive(record: &PunchRecord) -> Self {
        let mut partial = PartialFeatures::default();

        if let Some(date) = record.date() {
            let weekday = date.weekday().num_days_from_monday();
            partial.weekday = Some(weekday as f64);
            partial.is_friday = Some(flag(weekday == 4));
            partial.is_monday = Some(flag(weekday == 0));
            partial.is_weekend = Some(flag(weekday >= 5));
            partial.month = Some(date.month() as f64);
            partial.year = Some(date.year() as f64);
            partial.day_of_month = Some(date.day() as f64);
            partial.week_of_year = Some(date.iso_week().week() as f64);
        }

        if let Some(minutes) = record.lateness_minutes() {
            partial.lateness_minutes = Some(minutes);
            partial.is_late = Some(flag(minutes > LATE_THRESHOLD_MIN));
            partial.is_very_late = Some(flag(minutes > VERY_LATE_THRESHOLD_MIN));
        }

        partial
    }

    /// The single imputation pass: every unknown value becomes 0
    fn impute(self, label: Option<AttendanceClass>) -> FeatureVector {
        FeatureVector {
            weekday: impute(self.weekday),
            is_friday: impute(self.is_friday),
            is_monday: impute(self.is_monday),
            is_weekend: impute(self.is_weekend),
            month: impute(self.month),
            year: impute(self.year),
            day_of_month: impute(self.day_of_month),
            week_of_year: impute(self.week_of_year),
            lateness_minutes: impute(self.lateness_minutes),
            is_late: impute(self.is_late),
            is_very_late: impute(self.is_very_late),
            label,
        }
    }
}

/// Whether labels are derived while building
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Derive labels from the `ausencia` status
    Training,
    /// No labels
    Inference,
}

/// Builds feature vectors and tables from punch records
#[derive(Debug, Clone, Copy)]
pub struct FeatureBuilder {
    mode: BuildMode,
}

impl FeatureBuilder {
    pub fn new(mode: BuildMode) -> Self {
        Self { mode }
    }

    /// Builder that derives labels
    pub fn training() -> Self {
        Self::new(BuildMode::Training)
    }

    /// Builder without labels
    pub fn inference() -> Self {
        Self::new(BuildMode::Inference)
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    /// Build the feature vector for a single record
    pub fn build_vector(&self, record: &PunchRecord) -> FeatureVector {
        let label = match self.mode {
            BuildMode::Training => Some(classify(record.raw_attendance_status.as_deref())),
            BuildMode::Inference => None,
        };
        PartialFeatures::derive(record).impute(label)
    }

    /// Build one vector per record, in input order
    pub fn build_vectors(&self, records: &[PunchRecord]) -> Vec<FeatureVector> {
        let mut invalid_dates = 0usize;
        let mut missing_lateness = 0usize;

        let vectors: Vec<FeatureVector> = records
            .iter()
            .map(|record| {
                if record.date().is_none() {
                    invalid_dates += 1;
                }
                if record.lateness_minutes().is_none() {
                    missing_lateness += 1;
                }
                self.build_vector(record)
            })
            .collect();

        if invalid_dates > 0 {
            warn!(
                invalid_dates,
                total = records.len(),
                "records with missing or unparseable dates; date features set to 0"
            );
        }
        if missing_lateness > 0 {
            debug!(
                missing_lateness,
                total = records.len(),
                "records without parseable clock-in times; lateness set to 0"
            );
        }

        vectors
    }

    /// Build the feature table for a batch of records
    pub fn build(&self, records: &[PunchRecord]) -> FeatureTable {
        FeatureTable::from_vectors(&self.build_vectors(records))
    }
}

/// Numeric feature table with optional labels
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
    labels: Option<Vec<AttendanceClass>>,
}

impl FeatureTable {
    /// Assemble a table, checking row widths and label count
    pub fn new(
        columns: Vec<String>,
        rows: Vec<Vec<f64>>,
        labels: Option<Vec<AttendanceClass>>,
    ) -> Result<Self> {
        if let Some((row, values)) = rows
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != columns.len())
        {
            return Err(FeatureError::RaggedRow {
                row,
                expected: columns.len(),
                found: values.len(),
            });
        }

        if let Some(labels) = &labels {
            if labels.len() != rows.len() {
                return Err(FeatureError::LabelCountMismatch {
                    rows: rows.len(),
                    labels: labels.len(),
                });
            }
        }

        Ok(Self {
            columns,
            rows,
            labels,
        })
    }

    /// Table in the builder's schema from prebuilt vectors
    ///
    /// Labels are kept only if every vector carries one.
    pub fn from_vectors(vectors: &[FeatureVector]) -> Self {
        let labels: Option<Vec<AttendanceClass>> = vectors.iter().map(|v| v.label).collect();
        let labels = if vectors.is_empty() { None } else { labels };
        Self {
            columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: vectors.iter().map(FeatureVector::to_row).collect(),
            labels,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn labels(&self) -> Option<&[AttendanceClass]> {
        self.labels.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, if it exists
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }

    /// Same table with the label column removed
    pub fn without_labels(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            labels: None,
        }
    }

    /// Check that the columns are exactly the builder's schema
    pub fn validate_schema(&self) -> Result<()> {
        match compare_columns(&FEATURE_COLUMNS, &self.columns) {
            None => Ok(()),
            Some(mismatch) => Err(FeatureError::SchemaMismatch(mismatch)),
        }
    }
}
