//! Attendance label derivation from free-text status codes
//!
//! Time-clock exports carry a free-text `ausencia` column ("Ausente
//! Justificado", "Tardanza 20min", empty for a normal day...). This module
//! maps that text onto the closed set of outcomes the model predicts.
//!
//! Matching is an ordered rule table: the first rule whose keywords appear
//! in the normalized status wins. A status mentioning both an absence and a
//! late arrival therefore resolves to [`AttendanceClass::Absent`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of attendance classes the pipeline predicts
pub const NUM_CLASSES: usize = 3;

/// Attendance outcome for one employee-day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttendanceClass {
    /// Worked the day (also the default for an empty status)
    Present = 0,
    /// Did not show up, justified or not
    Absent = 1,
    /// Clocked in late
    Late = 2,
}

impl AttendanceClass {
    /// All classes in label order
    pub const ALL: [AttendanceClass; NUM_CLASSES] = [
        AttendanceClass::Present,
        AttendanceClass::Absent,
        AttendanceClass::Late,
    ];

    /// Numeric label (0 = Present, 1 = Absent, 2 = Late)
    pub fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`AttendanceClass::index`]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Lower-case name used in table headers
    pub fn name(self) -> &'static str {
        match self {
            AttendanceClass::Present => "present",
            AttendanceClass::Absent => "absent",
            AttendanceClass::Late => "late",
        }
    }
}

impl fmt::Display for AttendanceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of the status rule table
#[derive(Debug, Clone, Copy)]
pub struct StatusRule {
    /// Any of these substrings triggers the rule
    pub keywords: &'static [&'static str],
    /// Class assigned when the rule fires
    pub class: AttendanceClass,
}

/// Status rules in priority order. Absent is checked before Late.
pub const STATUS_RULES: [StatusRule; 2] = [
    StatusRule {
        keywords: &["ausente"],
        class: AttendanceClass::Absent,
    },
    StatusRule {
        keywords: &["tardanza", "tarde"],
        class: AttendanceClass::Late,
    },
];

/// Normalize a raw status for matching (trim + lower-case)
fn normalize_status(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Classify a raw attendance status
///
/// Empty or missing statuses and statuses matching no rule are
/// [`AttendanceClass::Present`].
///
/// # Example
/// ```
/// use asistencia::label::{classify, AttendanceClass};
///
/// assert_eq!(classify(Some("Ausente Justificado")), AttendanceClass::Absent);
/// assert_eq!(classify(Some("Tardanza 20min")), AttendanceClass::Late);
/// assert_eq!(classify(None), AttendanceClass::Present);
/// ```
pub fn classify(raw_status: Option<&str>) -> AttendanceClass {
    let status = match raw_status {
        Some(raw) => normalize_status(raw),
        None => return AttendanceClass::Present,
    };

    if status.is_empty() {
        return AttendanceClass::Present;
    }

    STATUS_RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|kw| status.contains(kw)))
        .map(|rule| rule.class)
        .unwrap_or(AttendanceClass::Present)
}
