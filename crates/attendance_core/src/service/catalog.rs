//! Entity catalog: reference data snapshot for one session.
//!
//! # Responsibility
//! - Bulk-load teachers, students, schedule slots and subjects.
//! - Answer O(1) id lookups used by views, writers and recaps.
//! - Derive the day's schedule and class rosters.
//!
//! # Invariants
//! - Each entity type is replaced all-or-nothing; a failed load keeps the
//!   previous snapshot of that type.
//! - Lookups against a type that never loaded resolve to `None`.
//! - Only `reload*` mutates the snapshot.

use crate::model::person::{Person, PersonId, PersonKind};
use crate::model::recap::UNRESOLVED_PLACEHOLDER;
use crate::model::schedule::{ScheduleSlot, Subject};
use crate::repo::document_store::{Document, DocumentStore, StoreError, StoreResult};
use crate::repo::records::{
    decode_slot, decode_student, decode_subject, decode_teacher, RecordResult,
    SCHEDULE_COLLECTION, STUDENTS_COLLECTION, SUBJECTS_COLLECTION, TEACHERS_COLLECTION,
};
use chrono::NaiveDate;
use log::{info, warn};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Reference entity types held by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Teachers,
    Students,
    ScheduleSlots,
    Subjects,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        Self::Teachers,
        Self::Students,
        Self::ScheduleSlots,
        Self::Subjects,
    ];

    pub fn collection(self) -> &'static str {
        match self {
            Self::Teachers => TEACHERS_COLLECTION,
            Self::Students => STUDENTS_COLLECTION,
            Self::ScheduleSlots => SCHEDULE_COLLECTION,
            Self::Subjects => SUBJECTS_COLLECTION,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Teachers => "teachers",
            Self::Students => "students",
            Self::ScheduleSlots => "schedule_slots",
            Self::Subjects => "subjects",
        }
    }
}

/// Reference data could not be (fully) loaded.
///
/// Recoverable: types that loaded are applied, the rest keep stale data.
#[derive(Debug)]
pub enum CatalogError {
    LoadFailed {
        failures: Vec<(EntityType, StoreError)>,
    },
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoadFailed { failures } => {
                write!(f, "catalog load failed for")?;
                for (index, (entity, err)) in failures.iter().enumerate() {
                    let sep = if index == 0 { " " } else { "; " };
                    write!(f, "{sep}{}: {err}", entity.as_str())?;
                }
                Ok(())
            }
        }
    }
}

impl Error for CatalogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::LoadFailed { failures } => failures.first().map(|(_, err)| err as &dyn Error),
        }
    }
}

impl CatalogError {
    pub fn failed_types(&self) -> Vec<EntityType> {
        match self {
            Self::LoadFailed { failures } => failures.iter().map(|(entity, _)| *entity).collect(),
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Sizes of the snapshot after a successful reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogCounts {
    pub teachers: usize,
    pub students: usize,
    pub schedule_slots: usize,
    pub subjects: usize,
    /// Documents skipped because they did not decode.
    pub skipped: usize,
}

/// Owned reference data snapshot.
#[derive(Debug, Default)]
pub struct EntityCatalog {
    teachers: Option<HashMap<PersonId, Person>>,
    students: Option<HashMap<PersonId, Person>>,
    slots: Option<HashMap<String, ScheduleSlot>>,
    subjects: Option<HashMap<String, Subject>>,
    loaded_context: Option<Option<String>>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reloads every entity type from `store`.
    ///
    /// # Errors
    /// - `CatalogError::LoadFailed` names every type whose fetch failed; those
    ///   keep their previous snapshot while the others are replaced.
    pub fn reload<S: DocumentStore + ?Sized>(&mut self, store: &S) -> CatalogResult<CatalogCounts> {
        let started_at = Instant::now();
        let mut counts = CatalogCounts::default();
        let mut failures = Vec::new();

        match load_collection(store, EntityType::Teachers, decode_teacher) {
            Ok((items, skipped)) => {
                counts.teachers = items.len();
                counts.skipped += skipped;
                self.teachers = Some(index_by(items, |person| person.id.clone()));
            }
            Err(err) => failures.push((EntityType::Teachers, err)),
        }
        match load_collection(store, EntityType::Students, decode_student) {
            Ok((items, skipped)) => {
                counts.students = items.len();
                counts.skipped += skipped;
                self.students = Some(index_by(items, |person| person.id.clone()));
            }
            Err(err) => failures.push((EntityType::Students, err)),
        }
        match load_collection(store, EntityType::ScheduleSlots, decode_slot) {
            Ok((items, skipped)) => {
                counts.schedule_slots = items.len();
                counts.skipped += skipped;
                self.slots = Some(index_by(items, |slot| slot.id.clone()));
            }
            Err(err) => failures.push((EntityType::ScheduleSlots, err)),
        }
        match load_collection(store, EntityType::Subjects, decode_subject) {
            Ok((items, skipped)) => {
                counts.subjects = items.len();
                counts.skipped += skipped;
                self.subjects = Some(index_by(items, |subject| subject.id.clone()));
            }
            Err(err) => failures.push((EntityType::Subjects, err)),
        }

        if failures.is_empty() {
            info!(
                "event=catalog_reload module=catalog status=ok duration_ms={} teachers={} students={} slots={} subjects={} skipped={}",
                started_at.elapsed().as_millis(),
                counts.teachers,
                counts.students,
                counts.schedule_slots,
                counts.subjects,
                counts.skipped
            );
            Ok(counts)
        } else {
            let error = CatalogError::LoadFailed { failures };
            warn!(
                "event=catalog_reload module=catalog status=error duration_ms={} error_code=catalog_load_failed error={error}",
                started_at.elapsed().as_millis()
            );
            Err(error)
        }
    }

    /// Reloads when `context` (e.g. the signed-in user) differs from the one
    /// of the last successful reload, or when nothing loaded yet.
    ///
    /// Returns `Ok(None)` when the snapshot is already current.
    pub fn reload_for_context<S: DocumentStore + ?Sized>(
        &mut self,
        store: &S,
        context: Option<&str>,
    ) -> CatalogResult<Option<CatalogCounts>> {
        if let Some(loaded) = &self.loaded_context {
            if loaded.as_deref() == context {
                return Ok(None);
            }
        }
        let counts = self.reload(store)?;
        self.loaded_context = Some(context.map(str::to_string));
        Ok(Some(counts))
    }

    pub fn is_loaded(&self, entity: EntityType) -> bool {
        match entity {
            EntityType::Teachers => self.teachers.is_some(),
            EntityType::Students => self.students.is_some(),
            EntityType::ScheduleSlots => self.slots.is_some(),
            EntityType::Subjects => self.subjects.is_some(),
        }
    }

    /// Teacher or student by id. Teacher and student ids live in separate
    /// collections and may coincide.
    pub fn person(&self, kind: PersonKind, id: &str) -> Option<&Person> {
        let people = match kind {
            PersonKind::Teacher => self.teachers.as_ref(),
            PersonKind::Student => self.students.as_ref(),
        };
        people.and_then(|people| people.get(id))
    }

    pub fn person_name(&self, kind: PersonKind, id: &str) -> Option<&str> {
        self.person(kind, id).map(|person| person.name.as_str())
    }

    /// Person name or the unresolved placeholder.
    pub fn person_label(&self, kind: PersonKind, id: &str) -> &str {
        self.person_name(kind, id).unwrap_or(UNRESOLVED_PLACEHOLDER)
    }

    pub fn slot_by_id(&self, id: &str) -> Option<&ScheduleSlot> {
        self.slots.as_ref().and_then(|slots| slots.get(id))
    }

    /// Subject name of the slot's curriculum entry.
    pub fn subject_name(&self, slot_id: &str) -> Option<&str> {
        let slot = self.slot_by_id(slot_id)?;
        self.subjects
            .as_ref()?
            .get(&slot.subject_id)
            .map(|subject| subject.name.as_str())
    }

    /// Name of the teacher holding the slot.
    pub fn teacher_name(&self, slot_id: &str) -> Option<&str> {
        let slot = self.slot_by_id(slot_id)?;
        self.teachers
            .as_ref()?
            .get(&slot.teacher_id)
            .map(|teacher| teacher.name.as_str())
    }

    /// `"{time} - {subject} ({teacher})"` with placeholders for gaps.
    pub fn slot_label(&self, slot_id: &str) -> String {
        let time = self
            .slot_by_id(slot_id)
            .map(|slot| slot.time_label.as_str())
            .unwrap_or(UNRESOLVED_PLACEHOLDER);
        format!(
            "{time} - {} ({})",
            self.subject_name(slot_id).unwrap_or(UNRESOLVED_PLACEHOLDER),
            self.teacher_name(slot_id).unwrap_or(UNRESOLVED_PLACEHOLDER)
        )
    }

    /// Slots held on the weekday of `date`, optionally for one class, ordered
    /// by time label then class.
    pub fn slots_for_day(&self, date: NaiveDate, class: Option<u8>) -> Vec<&ScheduleSlot> {
        let mut slots: Vec<&ScheduleSlot> = self
            .slots
            .iter()
            .flat_map(HashMap::values)
            .filter(|slot| slot.is_held_on(date))
            .filter(|slot| class.map_or(true, |class| slot.class == class))
            .collect();
        slots.sort_by(|a, b| {
            a.time_label
                .cmp(&b.time_label)
                .then(a.class.cmp(&b.class))
                .then_with(|| a.id.cmp(&b.id))
        });
        slots
    }

    /// All teachers ordered by name.
    pub fn teachers(&self) -> Vec<&Person> {
        sorted_by_name(self.teachers.iter().flat_map(HashMap::values))
    }

    /// Active students of `class` ordered by name.
    pub fn active_students(&self, class: u8) -> Vec<&Person> {
        sorted_by_name(
            self.students
                .iter()
                .flat_map(HashMap::values)
                .filter(|student| student.class == Some(class) && student.is_active()),
        )
    }

    /// Default recap population for `kind`: all teachers, or the active
    /// students of `class` (every active student when `class` is `None`).
    pub fn population(&self, kind: PersonKind, class: Option<u8>) -> Vec<Person> {
        match kind {
            PersonKind::Teacher => self.teachers().into_iter().cloned().collect(),
            PersonKind::Student => sorted_by_name(
                self.students
                    .iter()
                    .flat_map(HashMap::values)
                    .filter(|student| student.is_active())
                    .filter(|student| class.map_or(true, |class| student.class == Some(class))),
            )
            .into_iter()
            .cloned()
            .collect(),
        }
    }
}

fn load_collection<S, T, F>(
    store: &S,
    entity: EntityType,
    decode: F,
) -> StoreResult<(Vec<T>, usize)>
where
    S: DocumentStore + ?Sized,
    F: Fn(&Document) -> RecordResult<T>,
{
    let documents = store.query(entity.collection(), &[])?;
    let mut items = Vec::with_capacity(documents.len());
    let mut skipped = 0;
    for document in &documents {
        match decode(document) {
            Ok(item) => items.push(item),
            Err(err) => {
                skipped += 1;
                warn!(
                    "event=catalog_decode module=catalog status=skipped entity={} error={err}",
                    entity.as_str()
                );
            }
        }
    }
    Ok((items, skipped))
}

fn index_by<T, K>(items: Vec<T>, key: K) -> HashMap<String, T>
where
    K: Fn(&T) -> String,
{
    items.into_iter().map(|item| (key(&item), item)).collect()
}

fn sorted_by_name<'a>(people: impl Iterator<Item = &'a Person>) -> Vec<&'a Person> {
    let mut people: Vec<&Person> = people.collect();
    people.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
    people
}
