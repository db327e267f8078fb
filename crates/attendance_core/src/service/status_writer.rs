//! Status transition writer.
//!
//! # Responsibility
//! - Apply one attendance status change as a merge upsert.
//! - Resolve the target record id through the live view and key derivation.
//! - Report outcomes through the notification channel.
//!
//! # Invariants
//! - Without write privilege nothing reaches the store.
//! - Fields not carried by a change are preserved by the merge.
//! - Repeating a change converges on the same stored record.

use crate::model::attendance::{resolve_record_id, AttendanceKey, AttendanceStatus, RecordId};
use crate::model::person::PersonKind;
use crate::repo::document_store::{DocumentStore, StoreError, WriteMode};
use crate::repo::records::encode_status_change;
use crate::service::access::AccessControl;
use crate::service::catalog::EntityCatalog;
use crate::service::live_view::{LiveAttendanceView, ViewSelection};
use crate::service::notify::{Notice, Notifier};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Status write failures.
#[derive(Debug)]
pub enum WriteError {
    /// Caller lacks write privilege; the store was not contacted.
    PermissionDenied,
    /// A student change was requested without a selected schedule slot.
    NoSlotSelected,
    Store(StoreError),
}

impl Display for WriteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "caller is not allowed to write attendance"),
            Self::NoSlotSelected => write!(f, "no schedule slot selected"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for WriteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for WriteError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

pub type WriteResult<T> = Result<T, WriteError>;

/// One requested status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub key: AttendanceKey,
    pub status: AttendanceStatus,
    /// `None` keeps any stored note.
    pub note: Option<String>,
    /// Denormalized class for student events. Looked up in the catalog when
    /// `None`.
    pub class: Option<u8>,
}

impl StatusChange {
    pub fn new(key: AttendanceKey, status: AttendanceStatus) -> Self {
        Self {
            key,
            status,
            note: None,
            class: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_class(mut self, class: u8) -> Self {
        self.class = Some(class);
        self
    }

    /// Student change under the slot picked in `selection`.
    ///
    /// # Errors
    /// - `WriteError::NoSlotSelected` when no slot is selected.
    pub fn for_selected_student(
        selection: &ViewSelection,
        student_id: &str,
        status: AttendanceStatus,
    ) -> WriteResult<Self> {
        let key = selection
            .key_for(PersonKind::Student, student_id)
            .ok_or(WriteError::NoSlotSelected)?;
        let mut change = Self::new(key, status);
        change.class = selection.class();
        Ok(change)
    }
}

/// Applies status changes against a document store.
pub struct StatusTransitionWriter<'s, S, A, N>
where
    S: DocumentStore + ?Sized,
    A: AccessControl,
    N: Notifier,
{
    store: &'s S,
    access: A,
    notifier: N,
}

impl<'s, S, A, N> StatusTransitionWriter<'s, S, A, N>
where
    S: DocumentStore + ?Sized,
    A: AccessControl,
    N: Notifier,
{
    pub fn new(store: &'s S, access: A, notifier: N) -> Self {
        Self {
            store,
            access,
            notifier,
        }
    }

    /// Writes `change` and returns the record id it landed on.
    ///
    /// The record id is taken from the view's existing entry for the key when
    /// present, otherwise derived from the key. The view itself is not
    /// touched; it converges through its own subscription.
    ///
    /// # Errors
    /// - `WriteError::PermissionDenied` without write privilege (no store
    ///   round-trip, no notice).
    /// - `WriteError::Store` when the upsert fails; an error notice is sent.
    pub fn set_status<V>(
        &self,
        view: &LiveAttendanceView<'_, V>,
        catalog: &EntityCatalog,
        change: &StatusChange,
    ) -> WriteResult<RecordId>
    where
        V: DocumentStore + ?Sized,
    {
        if !self.access.has_write_privilege() {
            info!(
                "event=status_write module=writer status=denied kind={}",
                change.key.kind.as_str()
            );
            return Err(WriteError::PermissionDenied);
        }

        let started_at = Instant::now();
        let key = &change.key;
        let record_id = resolve_record_id(key, view.get(key));
        let class = match key.kind {
            PersonKind::Student => change.class.or_else(|| {
                catalog
                    .person(key.kind, &key.person_id)
                    .and_then(|person| person.class)
            }),
            PersonKind::Teacher => None,
        };
        let fields = encode_status_change(key, change.status, change.note.as_deref(), class);
        let collection = key.kind.attendance_collection();

        match self
            .store
            .upsert(collection, record_id.as_str(), &fields, WriteMode::Merge)
        {
            Ok(()) => {
                info!(
                    "event=status_write module=writer status=ok collection={collection} record={record_id} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                self.notifier.notify(Notice::info(
                    "Attendance updated",
                    format!(
                        "{} set to {}",
                        catalog.person_label(key.kind, &key.person_id),
                        change.status
                    ),
                ));
                Ok(record_id)
            }
            Err(err) => {
                error!(
                    "event=status_write module=writer status=error collection={collection} record={record_id} duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                );
                self.notifier.notify(Notice::error(
                    "Failed to save attendance",
                    Some(err.to_string()),
                ));
                Err(WriteError::Store(err))
            }
        }
    }
}
