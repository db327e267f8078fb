//! Live attendance view over a store change feed.
//!
//! # Responsibility
//! - Hold the current `AttendanceKey -> AttendanceEvent` map for one filter.
//! - Re-subscribe whenever the filter changes.
//! - Track the date/class/slot selection that drives the filter.
//!
//! # Invariants
//! - At most one subscription is active; it is torn down before the next one
//!   is created, and its receiver is dropped with it.
//! - Only the latest snapshot delivered by the active subscription is applied.
//! - A key is present iff the last applied snapshot holds an event for it
//!   that the filter admits; duplicates of one key collapse to one event.
//! - Changing date or class clears the selected slot.

use crate::model::attendance::{
    AttendanceEvent, AttendanceKey, AttendanceStatus, RecordId, ISO_DATE_FORMAT,
};
use crate::model::person::{PersonId, PersonKind};
use crate::repo::document_store::{
    Document, DocumentStore, FeedEvent, Predicate, StoreError, Subscription,
};
use crate::repo::records::{decode_attendance, FIELD_DATE, FIELD_SLOT_ID};
use chrono::NaiveDate;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Live-view failures.
#[derive(Debug)]
pub enum ViewError {
    /// The subscription could not be established.
    Subscribe(StoreError),
    /// The feed reported an error; the view stopped updating.
    Feed(String),
}

impl Display for ViewError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscribe(err) => write!(f, "attendance subscription failed: {err}"),
            Self::Feed(message) => write!(f, "attendance feed failed: {message}"),
        }
    }
}

impl Error for ViewError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Subscribe(err) => Some(err),
            Self::Feed(_) => None,
        }
    }
}

pub type ViewResult<T> = Result<T, ViewError>;

/// Which attendance events a view observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceFilter {
    pub kind: PersonKind,
    pub date: NaiveDate,
    /// Applied to student events only; teacher events carry no class.
    pub class: Option<u8>,
    pub slot_id: Option<String>,
}

impl AttendanceFilter {
    pub fn teachers(date: NaiveDate) -> Self {
        Self {
            kind: PersonKind::Teacher,
            date,
            class: None,
            slot_id: None,
        }
    }

    pub fn students(date: NaiveDate, class: Option<u8>, slot_id: Option<String>) -> Self {
        Self {
            kind: PersonKind::Student,
            date,
            class,
            slot_id,
        }
    }

    /// Store predicates for this filter.
    ///
    /// Class is not pushed to the store: student records written without
    /// `kelas` must stay visible. See [`admits`](Self::admits).
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = vec![Predicate::eq(
            FIELD_DATE,
            self.date.format(ISO_DATE_FORMAT).to_string(),
        )];
        if let Some(slot_id) = &self.slot_id {
            predicates.push(Predicate::eq(FIELD_SLOT_ID, slot_id.as_str()));
        }
        predicates
    }

    /// Whether a delivered event belongs to this filter. A student event
    /// without a stored class matches any class.
    pub fn admits(&self, event: &AttendanceEvent) -> bool {
        match (self.kind, self.class, event.class) {
            (PersonKind::Student, Some(wanted), Some(stored)) => wanted == stored,
            _ => true,
        }
    }
}

/// Date/class/slot selection driving a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSelection {
    date: NaiveDate,
    class: Option<u8>,
    slot_id: Option<String>,
}

impl ViewSelection {
    pub fn new(date: NaiveDate, class: Option<u8>) -> Self {
        Self {
            date,
            class,
            slot_id: None,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn class(&self) -> Option<u8> {
        self.class
    }

    pub fn slot_id(&self) -> Option<&str> {
        self.slot_id.as_deref()
    }

    /// Slot options depend on the date, so the slot selection is cleared.
    pub fn set_date(&mut self, date: NaiveDate) {
        if self.date != date {
            self.date = date;
            self.slot_id = None;
        }
    }

    /// Slot options depend on the class, so the slot selection is cleared.
    pub fn set_class(&mut self, class: Option<u8>) {
        if self.class != class {
            self.class = class;
            self.slot_id = None;
        }
    }

    pub fn select_slot(&mut self, slot_id: Option<String>) {
        self.slot_id = slot_id;
    }

    pub fn filter(&self, kind: PersonKind) -> AttendanceFilter {
        AttendanceFilter {
            kind,
            date: self.date,
            class: self.class,
            slot_id: self.slot_id.clone(),
        }
    }

    /// Key for `person_id` under the selected slot, if one is selected.
    pub fn key_for(
        &self,
        kind: PersonKind,
        person_id: impl Into<PersonId>,
    ) -> Option<AttendanceKey> {
        let slot_id = self.slot_id.as_ref()?;
        Some(AttendanceKey::new(kind, slot_id.clone(), person_id, self.date))
    }
}

/// Attendance map kept current by a store subscription.
pub struct LiveAttendanceView<'s, S: DocumentStore + ?Sized> {
    store: &'s S,
    filter: Option<AttendanceFilter>,
    subscription: Option<Subscription>,
    entries: HashMap<AttendanceKey, AttendanceEvent>,
    last_error: Option<String>,
}

impl<'s, S: DocumentStore + ?Sized> LiveAttendanceView<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            filter: None,
            subscription: None,
            entries: HashMap::new(),
            last_error: None,
        }
    }

    /// Switches the view to `filter`.
    ///
    /// The previous subscription is cancelled first and its entries are
    /// discarded; the new subscription's initial snapshot is applied by the
    /// next [`pump`](Self::pump).
    pub fn observe(&mut self, filter: AttendanceFilter) -> ViewResult<()> {
        self.teardown();
        self.filter = None;
        self.entries.clear();
        self.last_error = None;

        let collection = filter.kind.attendance_collection();
        let subscription = self
            .store
            .subscribe(collection, &filter.predicates())
            .map_err(|err| {
                error!(
                    "event=view_subscribe module=live_view status=error collection={collection} error={err}"
                );
                self.last_error = Some(err.to_string());
                ViewError::Subscribe(err)
            })?;

        info!(
            "event=view_subscribe module=live_view status=ok collection={collection} date={} subscription={}",
            filter.date,
            subscription.id().0
        );
        self.filter = Some(filter);
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Applies pending deliveries of the active subscription.
    ///
    /// Returns how many deliveries were consumed. Only the newest snapshot
    /// among them is materialized.
    ///
    /// # Errors
    /// - `ViewError::Feed` when the feed reports a failure. The subscription
    ///   is dropped and the view keeps its last entries until `observe` is
    ///   called again.
    pub fn pump(&mut self) -> ViewResult<usize> {
        let Some(subscription) = self.subscription.as_ref() else {
            return Ok(0);
        };

        let mut consumed = 0;
        let mut latest = None;
        let mut failure = None;
        while let Some(event) = subscription.try_next() {
            consumed += 1;
            match event {
                FeedEvent::Snapshot(documents) => latest = Some(documents),
                FeedEvent::Error(message) => {
                    failure = Some(message);
                    break;
                }
            }
        }

        if let Some(message) = failure {
            error!("event=view_feed module=live_view status=error error={message}");
            self.teardown();
            self.last_error = Some(message.clone());
            return Err(ViewError::Feed(message));
        }

        if let Some(documents) = latest {
            self.apply_snapshot(&documents);
        }
        Ok(consumed)
    }

    pub fn filter(&self) -> Option<&AttendanceFilter> {
        self.filter.as_ref()
    }

    /// Whether a subscription is currently delivering.
    pub fn is_live(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn get(&self, key: &AttendanceKey) -> Option<&AttendanceEvent> {
        self.entries.get(key)
    }

    /// `None` means "not yet recorded".
    pub fn status(&self, key: &AttendanceKey) -> Option<AttendanceStatus> {
        self.entries.get(key).map(|event| event.status)
    }

    pub fn record_id(&self, key: &AttendanceKey) -> Option<&RecordId> {
        self.entries.get(key).map(|event| &event.record_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &AttendanceEvent> {
        self.entries.values()
    }

    /// Events of the current filter keyed by person id.
    pub fn by_person(&self) -> HashMap<&str, &AttendanceEvent> {
        self.entries
            .values()
            .map(|event| (event.key.person_id.as_str(), event))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn teardown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            debug!(
                "event=view_teardown module=live_view status=ok subscription={}",
                subscription.id().0
            );
            self.store.unsubscribe(subscription);
        }
    }

    fn apply_snapshot(&mut self, documents: &[Document]) {
        let Some(filter) = self.filter.as_ref() else {
            return;
        };

        let mut entries: HashMap<AttendanceKey, AttendanceEvent> = HashMap::new();
        for document in documents {
            let event = match decode_attendance(filter.kind, document) {
                Ok(event) => event,
                Err(err) => {
                    warn!("event=view_decode module=live_view status=skipped error={err}");
                    continue;
                }
            };
            if !filter.admits(&event) {
                continue;
            }
            match entries.get(&event.key) {
                Some(held) if !event.supersedes(held) => {}
                _ => {
                    entries.insert(event.key.clone(), event);
                }
            }
        }

        debug!(
            "event=view_snapshot module=live_view status=ok documents={} entries={}",
            documents.len(),
            entries.len()
        );
        self.entries = entries;
    }
}

impl<S: DocumentStore + ?Sized> Drop for LiveAttendanceView<'_, S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::{AttendanceFilter, ViewSelection};
    use crate::model::attendance::{AttendanceEvent, AttendanceKey, AttendanceStatus};
    use crate::model::person::PersonKind;
    use crate::repo::document_store::Predicate;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, d).unwrap()
    }

    #[test]
    fn changing_date_or_class_clears_slot() {
        let mut selection = ViewSelection::new(date(5), Some(1));
        selection.select_slot(Some("j1".to_string()));
        selection.set_class(Some(1));
        assert_eq!(selection.slot_id(), Some("j1"));

        selection.set_class(Some(2));
        assert_eq!(selection.slot_id(), None);

        selection.select_slot(Some("j2".to_string()));
        selection.set_date(date(6));
        assert_eq!(selection.slot_id(), None);
        assert!(selection.key_for(PersonKind::Student, "s1").is_none());
    }

    #[test]
    fn teacher_filters_ignore_class() {
        let mut filter = AttendanceFilter::teachers(date(5));
        filter.class = Some(3);
        assert_eq!(
            filter.predicates(),
            vec![Predicate::eq("tanggal", "2024-08-05")]
        );

        let students = AttendanceFilter::students(date(5), Some(3), Some("j1".to_string()));
        assert_eq!(
            students.predicates(),
            vec![
                Predicate::eq("tanggal", "2024-08-05"),
                Predicate::eq("jadwalId", "j1"),
            ]
        );
    }

    #[test]
    fn student_class_is_matched_on_delivered_events() {
        let filter = AttendanceFilter::students(date(5), Some(3), Some("j1".to_string()));
        let key = AttendanceKey::new(PersonKind::Student, "j1", "s1", date(5));
        let event = |class: Option<u8>| AttendanceEvent {
            record_id: key.derive_record_id(),
            key: key.clone(),
            status: AttendanceStatus::Present,
            note: None,
            class,
        };

        assert!(filter.admits(&event(Some(3))));
        assert!(filter.admits(&event(None)));
        assert!(!filter.admits(&event(Some(4))));
        assert!(AttendanceFilter::students(date(5), None, None).admits(&event(Some(4))));
    }
}
