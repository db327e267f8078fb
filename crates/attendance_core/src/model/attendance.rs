//! Attendance event model and record identity.
//!
//! # Responsibility
//! - Define the tracked attendance status set and its stored wire values.
//! - Define the logical key `(slot, person, date)` of an attendance event.
//! - Derive stable record ids from logical keys.
//!
//! # Invariants
//! - `derive_record_id` is pure and deterministic: the same triple always
//!   yields the same id, across processes and sessions.
//! - Components are escaped before joining, so distinct triples never collide
//!   on the separator.
//! - An existing record id always wins over a freshly derived one.

use crate::model::person::{PersonId, PersonKind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// ISO calendar date format used on the wire (`yyyy-MM-dd`).
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

const KEY_SEPARATOR: char = '_';

/// Attendance status of one person for one slot on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    /// `Hadir`.
    Present,
    /// `Izin`.
    ExcusedLeave,
    /// `Sakit`.
    Sick,
    /// `Alpha`.
    Unexcused,
}

impl AttendanceStatus {
    /// All statuses in display order.
    pub const ALL: [AttendanceStatus; 4] = [
        Self::Present,
        Self::ExcusedLeave,
        Self::Sick,
        Self::Unexcused,
    ];

    /// Stored value of this status.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Present => "Hadir",
            Self::ExcusedLeave => "Izin",
            Self::Sick => "Sakit",
            Self::Unexcused => "Alpha",
        }
    }

    /// Parses a stored status value. Matching is exact.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "Hadir" => Some(Self::Present),
            "Izin" => Some(Self::ExcusedLeave),
            "Sakit" => Some(Self::Sick),
            "Alpha" => Some(Self::Unexcused),
            _ => None,
        }
    }
}

impl Display for AttendanceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Stable identifier of a stored attendance document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Logical identity of one attendance event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttendanceKey {
    pub kind: PersonKind,
    pub slot_id: String,
    pub person_id: PersonId,
    pub date: NaiveDate,
}

impl AttendanceKey {
    pub fn new(
        kind: PersonKind,
        slot_id: impl Into<String>,
        person_id: impl Into<PersonId>,
        date: NaiveDate,
    ) -> Self {
        Self {
            kind,
            slot_id: slot_id.into(),
            person_id: person_id.into(),
            date,
        }
    }

    /// Date formatted as stored in `tanggal`.
    pub fn iso_date(&self) -> String {
        self.date.format(ISO_DATE_FORMAT).to_string()
    }

    /// Deterministic record id for this key.
    pub fn derive_record_id(&self) -> RecordId {
        derive_record_id(&self.slot_id, &self.person_id, &self.iso_date())
    }
}

/// One stored attendance fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    /// Id of the stored document. May predate the deterministic scheme.
    pub record_id: RecordId,
    pub key: AttendanceKey,
    pub status: AttendanceStatus,
    pub note: Option<String>,
    /// Denormalized class number. Student events only.
    pub class: Option<u8>,
}

impl AttendanceEvent {
    /// Whether this event is stored under the id derived from its key.
    pub fn has_derived_id(&self) -> bool {
        self.record_id == self.key.derive_record_id()
    }

    /// Whether this event replaces `held` as the single event of their
    /// shared key: a derived-id record wins over an earlier-scheme one, and
    /// otherwise the first record seen stays.
    pub fn supersedes(&self, held: &AttendanceEvent) -> bool {
        !held.has_derived_id() && self.has_derived_id()
    }
}

/// Derives the record id for a `(slot, person, date)` triple.
///
/// Every component is taken literally. `%` and `_` inside a component are
/// percent-escaped before joining with `_`, so the joined form is unambiguous
/// for arbitrary input strings.
pub fn derive_record_id(slot_id: &str, person_id: &str, iso_date: &str) -> RecordId {
    let mut id = String::with_capacity(slot_id.len() + person_id.len() + iso_date.len() + 2);
    push_escaped(&mut id, slot_id);
    id.push(KEY_SEPARATOR);
    push_escaped(&mut id, person_id);
    id.push(KEY_SEPARATOR);
    push_escaped(&mut id, iso_date);
    RecordId(id)
}

/// Resolves the record id to write for `key`.
///
/// Reuses the id of `existing` when a record for the key is already known, so
/// records created under an earlier id scheme keep being updated in place.
pub fn resolve_record_id(key: &AttendanceKey, existing: Option<&AttendanceEvent>) -> RecordId {
    match existing {
        Some(event) => event.record_id.clone(),
        None => key.derive_record_id(),
    }
}

fn push_escaped(out: &mut String, component: &str) {
    for ch in component.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '_' => out.push_str("%5F"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        derive_record_id, resolve_record_id, AttendanceEvent, AttendanceKey, AttendanceStatus,
        RecordId,
    };
    use crate::model::person::PersonKind;
    use chrono::NaiveDate;

    fn key() -> AttendanceKey {
        AttendanceKey::new(
            PersonKind::Student,
            "jadwal01",
            "siswa07",
            NaiveDate::from_ymd_opt(2024, 8, 5).unwrap(),
        )
    }

    #[test]
    fn derivation_is_deterministic() {
        let first = derive_record_id("jadwal01", "siswa07", "2024-08-05");
        let second = derive_record_id("jadwal01", "siswa07", "2024-08-05");
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "jadwal01_siswa07_2024-08-05");
        assert_eq!(key().derive_record_id(), first);
    }

    #[test]
    fn separator_inside_components_does_not_collide() {
        let a = derive_record_id("a_b", "c", "2024-01-01");
        let b = derive_record_id("a", "b_c", "2024-01-01");
        assert_ne!(a, b);

        let escaped = derive_record_id("a%5Fb", "c", "2024-01-01");
        assert_ne!(a, escaped);
    }

    #[test]
    fn arbitrary_strings_are_taken_literally() {
        let id = derive_record_id("", "ünï/côde", "not-a-date");
        assert_eq!(id.as_str(), "_ünï/côde_not-a-date");
    }

    #[test]
    fn existing_record_id_is_reused() {
        let legacy = AttendanceEvent {
            record_id: RecordId::new("Xk29fLegacyAutoId"),
            key: key(),
            status: AttendanceStatus::Sick,
            note: None,
            class: Some(2),
        };
        assert_eq!(
            resolve_record_id(&key(), Some(&legacy)).as_str(),
            "Xk29fLegacyAutoId"
        );
        assert_eq!(resolve_record_id(&key(), None), key().derive_record_id());
    }

    #[test]
    fn derived_id_record_supersedes_an_earlier_scheme_one() {
        let event = |id: RecordId| AttendanceEvent {
            record_id: id,
            key: key(),
            status: AttendanceStatus::Present,
            note: None,
            class: None,
        };
        let legacy = event(RecordId::new("autoId123"));
        let other_legacy = event(RecordId::new("autoId456"));
        let derived = event(key().derive_record_id());

        assert!(derived.supersedes(&legacy));
        assert!(!legacy.supersedes(&derived));
        assert!(!other_legacy.supersedes(&legacy));
        assert!(!derived.supersedes(&derived.clone()));
    }

    #[test]
    fn wire_values_parse_exactly() {
        for status in AttendanceStatus::ALL {
            assert_eq!(AttendanceStatus::from_wire(status.as_wire()), Some(status));
        }
        assert_eq!(AttendanceStatus::from_wire("hadir"), None);
        assert_eq!(AttendanceStatus::from_wire("Present"), None);
    }
}
