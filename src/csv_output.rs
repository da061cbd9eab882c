//! CSV output for feature tables, predictions, metrics and rollups
//!
//! Every writer renders to a `String`; the caller decides where it goes.

use crate::aggregate::{AccuracyMetric, GroupKey};
use crate::features::{FeatureTable, LABEL_COLUMN};
use crate::label::AttendanceClass;
use crate::predictor::PredictionResult;
use crate::record::PunchRecord;
use crate::rollup::EmployeeMonthRollup;

/// Minimal CSV builder: a header and rows of pre-rendered fields
#[derive(Debug)]
pub struct CsvWriter {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvWriter {
    pub fn new<S: AsRef<str>>(header: &[S]) -> Self {
        Self {
            header: header.iter().map(|h| h.as_ref().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, fields: Vec<String>) {
        self.rows.push(fields);
    }

    /// Escape CSV field (handle commas, quotes, newlines)
    pub fn escape_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
        {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    fn format_row(fields: &[String]) -> String {
        fields
            .iter()
            .map(|f| Self::escape_field(f))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Generate CSV output as string
    pub fn to_csv(&self) -> String {
        let mut output = Self::format_row(&self.header);
        output.push('\n');

        for row in &self.rows {
            output.push_str(&Self::format_row(row));
            output.push('\n');
        }

        output
    }
}

fn pct(value: f64) -> String {
    format!("{value:.2}")
}

fn prob(value: f64) -> String {
    format!("{value:.4}")
}

/// Feature table, with the `ausencia` label column last when labeled
pub fn feature_table_csv(table: &FeatureTable) -> String {
    let mut header: Vec<&str> = table.columns().iter().map(String::as_str).collect();
    if table.labels().is_some() {
        header.push(LABEL_COLUMN);
    }

    let mut writer = CsvWriter::new(&header);
    for (i, row) in table.rows().iter().enumerate() {
        let mut fields: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        if let Some(labels) = table.labels() {
            fields.push(labels[i].index().to_string());
        }
        writer.add_row(fields);
    }
    writer.to_csv()
}

/// One line per record: identity, predicted class and class probabilities
pub fn predictions_csv(records: &[PunchRecord], predictions: &[PredictionResult]) -> String {
    let mut writer = CsvWriter::new(&[
        "employee_id",
        "fecha",
        "predicted_class",
        "prob_present",
        "prob_absent",
        "prob_late",
    ]);

    for (record, prediction) in records.iter().zip(predictions) {
        writer.add_row(vec![
            record.employee_id.clone(),
            record.raw_date.clone().unwrap_or_default(),
            prediction.predicted_class.index().to_string(),
            prob(prediction.probability(AttendanceClass::Present)),
            prob(prediction.probability(AttendanceClass::Absent)),
            prob(prediction.probability(AttendanceClass::Late)),
        ]);
    }
    writer.to_csv()
}

/// Accuracy per group; grouped output should end with the global row
pub fn metrics_csv(metrics: &[AccuracyMetric<GroupKey>]) -> String {
    let mut writer = CsvWriter::new(&[
        "group",
        "total",
        "correct",
        "correct_present",
        "correct_absent",
        "correct_late",
        "actual_present",
        "actual_absent",
        "actual_late",
        "rate_pct",
        "rate_present_pct",
        "rate_absent_pct",
        "rate_late_pct",
    ]);

    for m in metrics {
        let mut fields = vec![
            m.key.to_string(),
            m.total_count.to_string(),
            m.correct_count.to_string(),
        ];
        fields.extend(m.per_class_correct.iter().map(|c| c.to_string()));
        fields.extend(m.per_class_actual.iter().map(|c| c.to_string()));
        fields.push(pct(m.rate()));
        fields.extend(AttendanceClass::ALL.iter().map(|&c| pct(m.class_rate(c))));
        writer.add_row(fields);
    }
    writer.to_csv()
}

/// Employee-month rollups in the order given
pub fn rollup_csv(rollups: &[EmployeeMonthRollup]) -> String {
    let mut writer = CsvWriter::new(&[
        "employee_id",
        "employee_name",
        "year",
        "month",
        "days",
        "predicted_present",
        "predicted_absent",
        "predicted_late",
        "prob_present_pct",
        "prob_absent_pct",
        "prob_late_pct",
        "mean_lateness_min",
    ]);

    for r in rollups {
        let mut fields = vec![
            r.employee_id.clone(),
            r.employee_name.clone(),
            r.year.map(|y| y.to_string()).unwrap_or_default(),
            r.month.map(|m| m.to_string()).unwrap_or_default(),
            r.days.to_string(),
        ];
        fields.extend(r.predicted.iter().map(|c| c.to_string()));
        fields.extend(r.mean_probability_pct.iter().map(|&p| pct(p)));
        fields.push(r.mean_lateness_min.map(pct).unwrap_or_default());
        writer.add_row(fields);
    }
    writer.to_csv()
}
