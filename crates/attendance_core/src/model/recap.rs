//! Monthly recap model.
//!
//! # Responsibility
//! - Parse and bound calendar months used as aggregation ranges.
//! - Define per-person tallies and detail rows produced by aggregation.
//!
//! # Invariants
//! - A `YearMonth` range is `[first_day, last_day]`, both inclusive.
//! - `MonthlyRecap::total` equals the sum of its status counters.

use crate::model::attendance::{AttendanceStatus, ISO_DATE_FORMAT};
use crate::model::person::PersonId;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

static YEAR_MONTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})$").expect("valid year-month regex"));

/// Placeholder shown when a referenced entity cannot be resolved.
pub const UNRESOLVED_PLACEHOLDER: &str = "—";

/// Calendar month used as an aggregation range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

/// Invalid month input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearMonthError {
    /// Input is not `YYYY-MM`.
    Malformed(String),
    /// Month or year yields no calendar range.
    OutOfRange { year: i32, month: u32 },
}

impl Display for YearMonthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(value) => write!(f, "month must be YYYY-MM, got `{value}`"),
            Self::OutOfRange { year, month } => {
                write!(f, "month {year}-{month:02} has no calendar range")
            }
        }
    }
}

impl Error for YearMonthError {}

impl YearMonth {
    /// Builds a month after checking it has a valid first and last day.
    pub fn new(year: i32, month: u32) -> Result<Self, YearMonthError> {
        let candidate = Self { year, month };
        if candidate.first_day_opt().is_none() || candidate.last_day_opt().is_none() {
            return Err(YearMonthError::OutOfRange { year, month });
        }
        Ok(candidate)
    }

    /// Month containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn first_day(self) -> NaiveDate {
        self.first_day_opt().unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(self) -> NaiveDate {
        self.last_day_opt().unwrap_or(NaiveDate::MAX)
    }

    /// Inclusive range check.
    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.first_day() && date <= self.last_day()
    }

    /// `(first_day, last_day)` formatted as stored dates.
    pub fn iso_bounds(self) -> (String, String) {
        (
            self.first_day().format(ISO_DATE_FORMAT).to_string(),
            self.last_day().format(ISO_DATE_FORMAT).to_string(),
        )
    }

    fn first_day_opt(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    fn last_day_opt(self) -> Option<NaiveDate> {
        let (next_year, next_month) = if self.month == 12 {
            (self.year.checked_add(1)?, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
    }
}

impl FromStr for YearMonth {
    type Err = YearMonthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let captures = YEAR_MONTH_RE
            .captures(trimmed)
            .ok_or_else(|| YearMonthError::Malformed(trimmed.to_string()))?;
        let year = captures[1]
            .parse::<i32>()
            .map_err(|_| YearMonthError::Malformed(trimmed.to_string()))?;
        let month = captures[2]
            .parse::<u32>()
            .map_err(|_| YearMonthError::Malformed(trimmed.to_string()))?;
        Self::new(year, month)
    }
}

impl Display for YearMonth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Per-status event counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub present: u32,
    pub excused_leave: u32,
    pub sick: u32,
    pub unexcused: u32,
}

impl StatusCounts {
    pub fn get(&self, status: AttendanceStatus) -> u32 {
        match status {
            AttendanceStatus::Present => self.present,
            AttendanceStatus::ExcusedLeave => self.excused_leave,
            AttendanceStatus::Sick => self.sick,
            AttendanceStatus::Unexcused => self.unexcused,
        }
    }

    pub fn increment(&mut self, status: AttendanceStatus) {
        let slot = match status {
            AttendanceStatus::Present => &mut self.present,
            AttendanceStatus::ExcusedLeave => &mut self.excused_leave,
            AttendanceStatus::Sick => &mut self.sick,
            AttendanceStatus::Unexcused => &mut self.unexcused,
        };
        *slot += 1;
    }

    pub fn sum(&self) -> u32 {
        self.present + self.excused_leave + self.sick + self.unexcused
    }
}

/// One chronological row of a detail recap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecapDetailRow {
    pub date: NaiveDate,
    /// Slot time label, or the placeholder when the slot is unknown.
    pub time_label: String,
    /// Subject name, or the placeholder when the join fails.
    pub subject: String,
    /// Class label, or the placeholder when unknown.
    pub class_label: String,
    pub status: AttendanceStatus,
}

/// Per-person monthly tally ready for tabular rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyRecap {
    pub person_id: PersonId,
    pub person_name: String,
    pub counts: StatusCounts,
    pub total: u32,
    /// Empty unless detail mode was requested.
    pub details: Vec<RecapDetailRow>,
}

impl MonthlyRecap {
    /// Zero-filled row for one person.
    pub fn empty(person_id: impl Into<PersonId>, person_name: impl Into<String>) -> Self {
        Self {
            person_id: person_id.into(),
            person_name: person_name.into(),
            counts: StatusCounts::default(),
            total: 0,
            details: Vec::new(),
        }
    }

    /// Counts one event of `status`.
    pub fn record(&mut self, status: AttendanceStatus) {
        self.counts.increment(status);
        self.total += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::{MonthlyRecap, YearMonth, YearMonthError};
    use crate::model::attendance::AttendanceStatus;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_and_bounds_months() {
        let feb: YearMonth = "2024-02".parse().unwrap();
        assert_eq!(feb.first_day(), date(2024, 2, 1));
        assert_eq!(feb.last_day(), date(2024, 2, 29));

        let dec: YearMonth = "2023-12".parse().unwrap();
        assert_eq!(dec.last_day(), date(2023, 12, 31));
        assert_eq!(dec.to_string(), "2023-12");
        assert_eq!(
            dec.iso_bounds(),
            ("2023-12-01".to_string(), "2023-12-31".to_string())
        );
    }

    #[test]
    fn range_is_inclusive_on_both_ends() {
        let month = YearMonth::new(2024, 9).unwrap();
        assert!(month.contains(date(2024, 9, 1)));
        assert!(month.contains(date(2024, 9, 30)));
        assert!(!month.contains(date(2024, 8, 31)));
        assert!(!month.contains(date(2024, 10, 1)));
    }

    #[test]
    fn rejects_invalid_months() {
        assert!(matches!(
            "2024-13".parse::<YearMonth>(),
            Err(YearMonthError::OutOfRange { month: 13, .. })
        ));
        assert!(matches!(
            "2024-00".parse::<YearMonth>(),
            Err(YearMonthError::OutOfRange { .. })
        ));
        assert!(matches!(
            "March 2024".parse::<YearMonth>(),
            Err(YearMonthError::Malformed(_))
        ));
    }

    #[test]
    fn recording_keeps_total_in_sync() {
        let mut recap = MonthlyRecap::empty("g1", "Pak Budi");
        recap.record(AttendanceStatus::Present);
        recap.record(AttendanceStatus::Present);
        recap.record(AttendanceStatus::Sick);
        assert_eq!(recap.counts.present, 2);
        assert_eq!(recap.counts.get(AttendanceStatus::Sick), 1);
        assert_eq!(recap.total, recap.counts.sum());
    }
}
