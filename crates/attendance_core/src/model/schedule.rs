//! Schedule slot and subject reference entities.
//!
//! A schedule slot is one recurring teaching period: a weekday, a time label,
//! a class, a subject and the teacher who holds it.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Class numbers offered by the school.
pub const CLASS_OPTIONS: [u8; 7] = [0, 1, 2, 3, 4, 5, 6];

/// Whether `class` is one of [`CLASS_OPTIONS`].
pub fn is_class_option(class: u8) -> bool {
    CLASS_OPTIONS.contains(&class)
}

/// Weekday names as stored in `jadwal.hari`, Sunday first.
pub const WEEKDAY_NAMES: [&str; 7] = [
    "Minggu", "Senin", "Selasa", "Rabu", "Kamis", "Jumat", "Sabtu",
];

/// Returns the stored weekday name for a calendar date.
pub fn weekday_name(date: NaiveDate) -> &'static str {
    let index = match date.weekday() {
        Weekday::Sun => 0,
        other => other.number_from_monday() as usize,
    };
    WEEKDAY_NAMES[index]
}

/// One recurring teaching period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub id: String,
    /// Weekday name, see [`WEEKDAY_NAMES`].
    pub weekday: String,
    /// Time-of-day label such as `07:00 - 08:00`.
    pub time_label: String,
    pub class: u8,
    pub subject_id: String,
    pub teacher_id: String,
}

impl ScheduleSlot {
    /// Whether this slot recurs on the weekday of `date`.
    pub fn is_held_on(&self, date: NaiveDate) -> bool {
        self.weekday == weekday_name(date)
    }
}

/// Curriculum entry referenced by schedule slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::{is_class_option, weekday_name, ScheduleSlot};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekday_names_follow_the_school_locale() {
        // 2024-07-07 is a Sunday.
        assert_eq!(weekday_name(date(2024, 7, 7)), "Minggu");
        assert_eq!(weekday_name(date(2024, 7, 8)), "Senin");
        assert_eq!(weekday_name(date(2024, 7, 12)), "Jumat");
        assert_eq!(weekday_name(date(2024, 7, 13)), "Sabtu");
    }

    #[test]
    fn class_options_span_kindergarten_to_sixth_grade() {
        assert!(is_class_option(0));
        assert!(is_class_option(6));
        assert!(!is_class_option(7));
    }

    #[test]
    fn slot_matches_only_its_weekday() {
        let slot = ScheduleSlot {
            id: "j1".to_string(),
            weekday: "Senin".to_string(),
            time_label: "07:00".to_string(),
            class: 1,
            subject_id: "k1".to_string(),
            teacher_id: "g1".to_string(),
        };
        assert!(slot.is_held_on(date(2024, 7, 8)));
        assert!(!slot.is_held_on(date(2024, 7, 9)));
    }
}
