//! Mapping between stored documents and domain entities.
//!
//! # Responsibility
//! - Own collection names and field names of the school dataset.
//! - Decode reference documents into catalog entities.
//! - Encode and decode attendance documents.
//!
//! # Invariants
//! - Attendance decoding rejects unknown status values instead of guessing.
//! - Class numbers are accepted as JSON numbers or digit strings; they are
//!   written back as numbers on attendance documents.

use crate::model::attendance::{
    AttendanceEvent, AttendanceKey, AttendanceStatus, RecordId, ISO_DATE_FORMAT,
};
use crate::model::person::{Person, PersonKind, StudentStatus};
use crate::model::schedule::{ScheduleSlot, Subject};
use crate::repo::document_store::{Document, Fields};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const TEACHERS_COLLECTION: &str = "gurus";
pub const STUDENTS_COLLECTION: &str = "siswa";
pub const SCHEDULE_COLLECTION: &str = "jadwal";
pub const SUBJECTS_COLLECTION: &str = "kurikulum";

pub const FIELD_SLOT_ID: &str = "jadwalId";
pub const FIELD_DATE: &str = "tanggal";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_NOTE: &str = "keterangan";
pub const FIELD_CLASS: &str = "kelas";
pub const FIELD_WEEKDAY: &str = "hari";

/// A stored document that does not match its collection's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    pub collection: &'static str,
    pub document_id: String,
    pub reason: String,
}

impl RecordError {
    fn new(collection: &'static str, document: &Document, reason: impl Into<String>) -> Self {
        Self {
            collection,
            document_id: document.id.clone(),
            reason: reason.into(),
        }
    }
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid {} document `{}`: {}",
            self.collection, self.document_id, self.reason
        )
    }
}

impl Error for RecordError {}

pub type RecordResult<T> = Result<T, RecordError>;

pub fn decode_teacher(document: &Document) -> RecordResult<Person> {
    let name = required_str(TEACHERS_COLLECTION, document, "name")?;
    Ok(Person::teacher(document.id.clone(), name))
}

pub fn decode_student(document: &Document) -> RecordResult<Person> {
    let name = required_str(STUDENTS_COLLECTION, document, "nama")?;
    let class = class_number(document.fields.get(FIELD_CLASS)).ok_or_else(|| {
        RecordError::new(STUDENTS_COLLECTION, document, "missing or invalid `kelas`")
    })?;
    let status = StudentStatus::from_wire(document.str_field("status").unwrap_or_default());
    let mut student = Person::student(document.id.clone(), name, class, status);
    student.registration_no = document.fields.get("nis").and_then(scalar_to_string);
    Ok(student)
}

pub fn decode_slot(document: &Document) -> RecordResult<ScheduleSlot> {
    let class = class_number(document.fields.get(FIELD_CLASS)).ok_or_else(|| {
        RecordError::new(SCHEDULE_COLLECTION, document, "missing or invalid `kelas`")
    })?;
    Ok(ScheduleSlot {
        id: document.id.clone(),
        weekday: required_str(SCHEDULE_COLLECTION, document, FIELD_WEEKDAY)?,
        time_label: required_str(SCHEDULE_COLLECTION, document, "jam")?,
        class,
        subject_id: required_str(SCHEDULE_COLLECTION, document, "kurikulumId")?,
        teacher_id: required_str(SCHEDULE_COLLECTION, document, "guruId")?,
    })
}

pub fn decode_subject(document: &Document) -> RecordResult<Subject> {
    Ok(Subject {
        id: document.id.clone(),
        name: required_str(SUBJECTS_COLLECTION, document, "mataPelajaran")?,
    })
}

/// Decodes an attendance document of `kind`.
pub fn decode_attendance(kind: PersonKind, document: &Document) -> RecordResult<AttendanceEvent> {
    let collection = kind.attendance_collection();
    let slot_id = required_str(collection, document, FIELD_SLOT_ID)?;
    let person_id = required_str(collection, document, kind.person_field())?;
    let date_text = required_str(collection, document, FIELD_DATE)?;
    let date = NaiveDate::parse_from_str(&date_text, ISO_DATE_FORMAT).map_err(|_| {
        RecordError::new(collection, document, format!("invalid date `{date_text}`"))
    })?;
    let status_text = required_str(collection, document, FIELD_STATUS)?;
    let status = AttendanceStatus::from_wire(&status_text).ok_or_else(|| {
        RecordError::new(collection, document, format!("unknown status `{status_text}`"))
    })?;
    let note = document
        .str_field(FIELD_NOTE)
        .filter(|note| !note.is_empty())
        .map(str::to_string);

    Ok(AttendanceEvent {
        record_id: RecordId::new(document.id.clone()),
        key: AttendanceKey::new(kind, slot_id, person_id, date),
        status,
        note,
        class: class_number(document.fields.get(FIELD_CLASS)),
    })
}

/// Fields written by one status change.
///
/// `note` and `class` are only written when provided, so a merge upsert keeps
/// whatever is already stored for them.
pub fn encode_status_change(
    key: &AttendanceKey,
    status: AttendanceStatus,
    note: Option<&str>,
    class: Option<u8>,
) -> Fields {
    let mut fields = Fields::new();
    fields.insert(FIELD_SLOT_ID.to_string(), json!(key.slot_id));
    fields.insert(key.kind.person_field().to_string(), json!(key.person_id));
    fields.insert(FIELD_DATE.to_string(), json!(key.iso_date()));
    fields.insert(FIELD_STATUS.to_string(), json!(status.as_wire()));
    if let Some(note) = note {
        fields.insert(FIELD_NOTE.to_string(), json!(note));
    }
    if let (PersonKind::Student, Some(class)) = (key.kind, class) {
        fields.insert(FIELD_CLASS.to_string(), json!(class));
    }
    fields
}

pub fn encode_teacher(name: &str) -> Fields {
    object(json!({ "name": name }))
}

pub fn encode_student(name: &str, registration_no: &str, class: u8, active: bool) -> Fields {
    let status = if active {
        StudentStatus::ACTIVE_WIRE
    } else {
        "Tidak Aktif"
    };
    object(json!({
        "nama": name,
        "nis": registration_no,
        "kelas": class,
        "status": status,
    }))
}

/// Schedule documents keep `kelas` as a string.
pub fn encode_slot(
    weekday: &str,
    time_label: &str,
    class: u8,
    subject_id: &str,
    teacher_id: &str,
) -> Fields {
    object(json!({
        "hari": weekday,
        "jam": time_label,
        "kelas": class.to_string(),
        "kurikulumId": subject_id,
        "guruId": teacher_id,
    }))
}

pub fn encode_subject(name: &str) -> Fields {
    object(json!({ "mataPelajaran": name }))
}

fn object(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

fn required_str(
    collection: &'static str,
    document: &Document,
    field: &str,
) -> RecordResult<String> {
    match document.str_field(field) {
        Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
        _ => Err(RecordError::new(collection, document, format!("missing `{field}`"))),
    }
}

fn class_number(value: Option<&Value>) -> Option<u8> {
    match value? {
        Value::Number(number) => number.as_u64().and_then(|n| u8::try_from(n).ok()),
        Value::String(text) => text.trim().parse::<u8>().ok(),
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_attendance, decode_slot, decode_student, encode_status_change};
    use crate::model::attendance::{AttendanceKey, AttendanceStatus};
    use crate::model::person::{PersonKind, StudentStatus};
    use crate::repo::document_store::Document;
    use chrono::NaiveDate;
    use serde_json::json;

    fn doc(id: &str, value: serde_json::Value) -> Document {
        Document::new(id, value.as_object().cloned().unwrap())
    }

    #[test]
    fn slot_class_accepts_string_and_number() {
        let text = doc(
            "j1",
            json!({"hari": "Senin", "jam": "07:00", "kelas": "2", "kurikulumId": "k", "guruId": "g"}),
        );
        let number = doc(
            "j2",
            json!({"hari": "Senin", "jam": "07:00", "kelas": 2, "kurikulumId": "k", "guruId": "g"}),
        );
        assert_eq!(decode_slot(&text).unwrap().class, 2);
        assert_eq!(decode_slot(&number).unwrap().class, 2);
    }

    #[test]
    fn student_decoding_reads_status_and_registration_number() {
        let student = decode_student(&doc(
            "s1",
            json!({"nama": "Adi", "nis": 10023, "kelas": 4, "status": "Aktif"}),
        ))
        .unwrap();
        assert_eq!(student.status, Some(StudentStatus::Active));
        assert_eq!(student.registration_no.as_deref(), Some("10023"));
        assert_eq!(student.class, Some(4));
    }

    #[test]
    fn attendance_with_unknown_status_is_rejected() {
        let err = decode_attendance(
            PersonKind::Teacher,
            &doc(
                "a1",
                json!({"jadwalId": "j", "guruId": "g", "tanggal": "2024-08-05", "status": "Telat"}),
            ),
        )
        .unwrap_err();
        assert!(err.reason.contains("Telat"));
    }

    #[test]
    fn empty_note_decodes_as_none() {
        let event = decode_attendance(
            PersonKind::Teacher,
            &doc(
                "a1",
                json!({"jadwalId": "j", "guruId": "g", "tanggal": "2024-08-05", "status": "Izin", "keterangan": ""}),
            ),
        )
        .unwrap();
        assert_eq!(event.status, AttendanceStatus::ExcusedLeave);
        assert_eq!(event.note, None);
    }

    #[test]
    fn status_change_omits_unset_optional_fields() {
        let key = AttendanceKey::new(
            PersonKind::Student,
            "j1",
            "s1",
            NaiveDate::from_ymd_opt(2024, 8, 5).unwrap(),
        );
        let fields = encode_status_change(&key, AttendanceStatus::Sick, None, None);
        assert_eq!(fields.get("siswaId"), Some(&json!("s1")));
        assert_eq!(fields.get("tanggal"), Some(&json!("2024-08-05")));
        assert!(fields.get("keterangan").is_none());
        assert!(fields.get("kelas").is_none());

        let with_class = encode_status_change(&key, AttendanceStatus::Sick, Some("flu"), Some(3));
        assert_eq!(with_class.get("kelas"), Some(&json!(3)));
        assert_eq!(with_class.get("keterangan"), Some(&json!("flu")));
    }
}
