//! Per employee-month summary of predicted attendance
//!
//! Works without ground truth: it averages the class probabilities the
//! model assigned to each employee-day and counts predicted outcomes, which
//! is what the monthly absence-risk report is built from.

use crate::label::{AttendanceClass, NUM_CLASSES};
use crate::predictor::PredictionResult;
use crate::record::PunchRecord;
use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeMap;

/// Summary of one employee over one calendar month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeMonthRollup {
    pub employee_id: String,
    pub employee_name: String,
    /// `None` for records whose date did not parse
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub days: usize,
    pub predicted: [usize; NUM_CLASSES],
    /// Mean probability per class, in percent
    pub mean_probability_pct: [f64; NUM_CLASSES],
    /// Mean lateness over records with both clock-in times
    pub mean_lateness_min: Option<f64>,
}

impl EmployeeMonthRollup {
    pub fn absence_risk_pct(&self) -> f64 {
        self.mean_probability_pct[AttendanceClass::Absent.index()]
    }
}

#[derive(Default)]
struct Accumulator {
    employee_name: String,
    days: usize,
    predicted: [usize; NUM_CLASSES],
    probability_sums: [f64; NUM_CLASSES],
    lateness_sum: f64,
    lateness_days: usize,
}

/// Roll predictions up by (employee, year, month)
///
/// `records` and `predictions` are parallel by row; extra entries on either
/// side are ignored. Output is sorted by mean absence probability, highest
/// first, then by employee id and period.
pub fn rollup_by_employee_month(
    records: &[PunchRecord],
    predictions: &[PredictionResult],
) -> Vec<EmployeeMonthRollup> {
    type Key = (String, Option<(i32, u32)>);
    let mut groups: BTreeMap<Key, Accumulator> = BTreeMap::new();

    for (record, prediction) in records.iter().zip(predictions) {
        let period = record.date().map(|d| (d.year(), d.month()));
        let acc = groups
            .entry((record.employee_id.clone(), period))
            .or_default();

        if acc.employee_name.is_empty() {
            acc.employee_name = record.employee_name.clone();
        }
        acc.days += 1;
        acc.predicted[prediction.predicted_class.index()] += 1;
        for (sum, p) in acc
            .probability_sums
            .iter_mut()
            .zip(prediction.class_probabilities)
        {
            *sum += p;
        }
        if let Some(minutes) = record.lateness_minutes() {
            acc.lateness_sum += minutes;
            acc.lateness_days += 1;
        }
    }

    let mut rollups: Vec<EmployeeMonthRollup> = groups
        .into_iter()
        .map(|((employee_id, period), acc)| {
            let days = acc.days as f64;
            EmployeeMonthRollup {
                employee_id,
                employee_name: acc.employee_name,
                year: period.map(|(y, _)| y),
                month: period.map(|(_, m)| m),
                days: acc.days,
                predicted: acc.predicted,
                mean_probability_pct: acc.probability_sums.map(|s| s / days * 100.0),
                mean_lateness_min: (acc.lateness_days > 0)
                    .then(|| acc.lateness_sum / acc.lateness_days as f64),
            }
        })
        .collect();

    // BTreeMap order already breaks ties by employee and period; the sort is stable
    rollups.sort_by(|a, b| b.absence_risk_pct().total_cmp(&a.absence_risk_pct()));
    rollups
}
