//! Raw time-clock punch records
//!
//! A [`PunchRecord`] keeps the date and time cells exactly as exported.
//! Parsing happens on access and is best-effort: a cell that does not parse
//! reads as `None` instead of failing the whole record.

use chrono::{NaiveDate, NaiveTime};

/// Formats accepted for clock times, tried in order
const TIME_FORMATS: [&str; 6] = [
    "%H:%M:%S%.f",
    "%H:%M:%S",
    "%H:%M",
    "%I:%M:%S %p",
    "%I:%M %p",
    "%I:%M%p",
];

/// One employee-day observation from the time clock
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PunchRecord {
    pub employee_id: String,
    pub employee_name: String,
    /// Raw `fecha` cell (day-first)
    pub raw_date: Option<String>,
    pub raw_scheduled_clock_in: Option<String>,
    pub raw_actual_clock_in: Option<String>,
    pub raw_scheduled_clock_out: Option<String>,
    pub raw_actual_clock_out: Option<String>,
    /// Free-text `ausencia` cell
    pub raw_attendance_status: Option<String>,
}

impl PunchRecord {
    /// Calendar date, `None` when missing or unparseable
    pub fn date(&self) -> Option<NaiveDate> {
        self.raw_date.as_deref().and_then(parse_date)
    }

    pub fn scheduled_clock_in(&self) -> Option<NaiveTime> {
        self.raw_scheduled_clock_in.as_deref().and_then(parse_time)
    }

    pub fn actual_clock_in(&self) -> Option<NaiveTime> {
        self.raw_actual_clock_in.as_deref().and_then(parse_time)
    }

    pub fn scheduled_clock_out(&self) -> Option<NaiveTime> {
        self.raw_scheduled_clock_out.as_deref().and_then(parse_time)
    }

    pub fn actual_clock_out(&self) -> Option<NaiveTime> {
        self.raw_actual_clock_out.as_deref().and_then(parse_time)
    }

    /// Signed minutes between actual and scheduled clock-in
    ///
    /// Positive means the employee arrived late. `None` if either time is
    /// missing or unparseable.
    pub fn lateness_minutes(&self) -> Option<f64> {
        let scheduled = self.scheduled_clock_in()?;
        let actual = self.actual_clock_in()?;
        Some(minutes_between(scheduled, actual))
    }
}

/// Signed minutes from `from` to `to` on the time-of-day axis
pub fn minutes_between(from: NaiveTime, to: NaiveTime) -> f64 {
    to.signed_duration_since(from).num_seconds() as f64 / 60.0
}

/// Parse a day-first date
///
/// Accepts `dd/mm/yyyy`, `dd-mm-yyyy` and `dd.mm.yyyy` (two-digit years map
/// 00-68 to 2000s and 69-99 to 1900s), ISO `yyyy-mm-dd`, and either form
/// followed by a time component, which is ignored.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let token = raw
        .trim()
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()?;
    if token.is_empty() {
        return None;
    }

    let parts: Vec<&str> = token.split(['/', '-', '.']).collect();
    if parts.len() != 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }

    let (year, month, day) = if parts[0].len() == 4 {
        (parts[0], parts[1], parts[2])
    } else {
        (parts[2], parts[1], parts[0])
    };

    let mut year: i32 = year.parse().ok()?;
    if parts[0].len() != 4 && parts[2].len() <= 2 {
        year += if year <= 68 { 2000 } else { 1900 };
    }
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a clock time, ignoring any leading date component
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let mut value = raw.trim();
    if value.is_empty() {
        return None;
    }

    // "2024-03-05 08:15" / "05/03/2024 08:15" / "2024-03-05T08:15:00"
    if let Some((head, tail)) = value.split_once(['T', ' ']) {
        if head.contains(['/', '-', '.']) {
            value = tail.trim();
        }
    }

    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(value, fmt).ok())
}
