//! Person reference entities.
//!
//! # Responsibility
//! - Model teachers and students as one `Person` shape with a `PersonKind`.
//! - Map each kind to its attendance collection and person reference field.
//!
//! # Invariants
//! - `class` and `status` are only meaningful for `PersonKind::Student`.
//! - Persons are immutable inside a session; only a catalog reload replaces
//!   them.

use serde::{Deserialize, Serialize};

/// Opaque store-generated person identifier.
pub type PersonId = String;

/// Collection holding teacher attendance documents.
pub const TEACHER_ATTENDANCE_COLLECTION: &str = "absensiGuru";
/// Collection holding student attendance documents.
pub const STUDENT_ATTENDANCE_COLLECTION: &str = "absensiSiswa";

/// Role of a person inside the school dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonKind {
    Teacher,
    Student,
}

impl PersonKind {
    /// Collection where attendance events for this kind are stored.
    pub fn attendance_collection(self) -> &'static str {
        match self {
            Self::Teacher => TEACHER_ATTENDANCE_COLLECTION,
            Self::Student => STUDENT_ATTENDANCE_COLLECTION,
        }
    }

    /// Attendance document field referencing the person.
    pub fn person_field(self) -> &'static str {
        match self {
            Self::Teacher => "guruId",
            Self::Student => "siswaId",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::Student => "student",
        }
    }
}

/// Enrollment state of a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    Active,
    Inactive,
}

impl StudentStatus {
    /// Wire value marking an active student.
    pub const ACTIVE_WIRE: &'static str = "Aktif";

    /// Any value other than `Aktif` counts as inactive.
    pub fn from_wire(value: &str) -> Self {
        if value.trim() == Self::ACTIVE_WIRE {
            Self::Active
        } else {
            Self::Inactive
        }
    }
}

/// Teacher or student known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub kind: PersonKind,
    /// Display name used in recaps and notices.
    pub name: String,
    /// Student registration number (NIS). Students only.
    pub registration_no: Option<String>,
    /// Class number. Students only.
    pub class: Option<u8>,
    /// Enrollment state. Students only.
    pub status: Option<StudentStatus>,
}

impl Person {
    pub fn teacher(id: impl Into<PersonId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: PersonKind::Teacher,
            name: name.into(),
            registration_no: None,
            class: None,
            status: None,
        }
    }

    pub fn student(
        id: impl Into<PersonId>,
        name: impl Into<String>,
        class: u8,
        status: StudentStatus,
    ) -> Self {
        Self {
            id: id.into(),
            kind: PersonKind::Student,
            name: name.into(),
            registration_no: None,
            class: Some(class),
            status: Some(status),
        }
    }

    /// Teachers are always active; students follow their enrollment status.
    pub fn is_active(&self) -> bool {
        match self.kind {
            PersonKind::Teacher => true,
            PersonKind::Student => self.status == Some(StudentStatus::Active),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Person, PersonKind, StudentStatus};

    #[test]
    fn kinds_map_to_distinct_collections_and_fields() {
        assert_ne!(
            PersonKind::Teacher.attendance_collection(),
            PersonKind::Student.attendance_collection()
        );
        assert_eq!(PersonKind::Teacher.person_field(), "guruId");
        assert_eq!(PersonKind::Student.person_field(), "siswaId");
    }

    #[test]
    fn only_aktif_is_active() {
        assert_eq!(StudentStatus::from_wire("Aktif"), StudentStatus::Active);
        assert_eq!(StudentStatus::from_wire(" Aktif "), StudentStatus::Active);
        assert_eq!(StudentStatus::from_wire("Lulus"), StudentStatus::Inactive);
        assert_eq!(StudentStatus::from_wire(""), StudentStatus::Inactive);
    }

    #[test]
    fn teachers_are_always_active() {
        assert!(Person::teacher("g1", "Bu Sari").is_active());
        assert!(!Person::student("s1", "Adi", 3, StudentStatus::Inactive).is_active());
    }
}
