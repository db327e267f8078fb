//! Monthly attendance aggregation.
//!
//! # Responsibility
//! - Fetch one month of attendance events for a population in bounded batches.
//! - Fold events into zero-filled per-person tallies, optionally with detail rows.
//!
//! # Invariants
//! - Every population member gets exactly one row, in population order.
//! - Each logical attendance key is counted once, even when several stored
//!   documents carry it.
//! - Batched fetching yields the same result as one unbounded fetch.
//! - A failed run produces no partial result.

use crate::model::attendance::{AttendanceEvent, AttendanceKey};
use crate::model::person::{Person, PersonKind};
use crate::model::recap::{MonthlyRecap, RecapDetailRow, YearMonth, UNRESOLVED_PLACEHOLDER};
use crate::repo::document_store::{Document, DocumentStore, Predicate, StoreError, MAX_IN_VALUES};
use crate::repo::records::{decode_attendance, RecordError, FIELD_DATE};
use crate::service::catalog::EntityCatalog;
use crate::service::notify::{Notice, Notifier};
use log::{debug, error, info};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Default number of person ids per membership query.
pub const DEFAULT_BATCH_LIMIT: usize = MAX_IN_VALUES;

/// Observable aggregation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Idle,
    Fetching,
    Computing,
    /// Last run failed; cleared by `acknowledge_failure` or the next run.
    Failed,
}

impl AggregatorState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Computing => "computing",
            Self::Failed => "failed",
        }
    }
}

/// Aggregation failures. No partial recap accompanies any of them.
#[derive(Debug)]
pub enum AggregationError {
    /// Batch limit outside `1..=MAX_IN_VALUES`.
    InvalidBatchLimit(usize),
    /// A batch query failed.
    Fetch { batch: usize, source: StoreError },
    /// A fetched event did not decode.
    InvalidRecord(RecordError),
}

impl Display for AggregationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBatchLimit(limit) => write!(
                f,
                "batch limit {limit} outside 1..={MAX_IN_VALUES}"
            ),
            Self::Fetch { batch, source } => {
                write!(f, "attendance fetch failed in batch {batch}: {source}")
            }
            Self::InvalidRecord(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AggregationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidBatchLimit(_) => None,
            Self::Fetch { source, .. } => Some(source),
            Self::InvalidRecord(err) => Some(err),
        }
    }
}

impl From<RecordError> for AggregationError {
    fn from(value: RecordError) -> Self {
        Self::InvalidRecord(value)
    }
}

pub type AggregationResult<T> = Result<T, AggregationError>;

/// What to aggregate and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecapOptions {
    pub kind: PersonKind,
    /// Student recaps only.
    pub class: Option<u8>,
    pub detail: bool,
    pub batch_limit: usize,
}

impl RecapOptions {
    pub fn teachers() -> Self {
        Self {
            kind: PersonKind::Teacher,
            class: None,
            detail: false,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    pub fn students(class: Option<u8>) -> Self {
        Self {
            kind: PersonKind::Student,
            class,
            detail: false,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    pub fn with_detail(mut self, detail: bool) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit;
        self
    }
}

/// Builds monthly recaps from stored attendance events.
pub struct MonthlyAggregator<'s, S: DocumentStore + ?Sized, N: Notifier> {
    store: &'s S,
    notifier: N,
    state: AggregatorState,
    last_batch_count: usize,
}

impl<'s, S: DocumentStore + ?Sized, N: Notifier> MonthlyAggregator<'s, S, N> {
    pub fn new(store: &'s S, notifier: N) -> Self {
        Self {
            store,
            notifier,
            state: AggregatorState::Idle,
            last_batch_count: 0,
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    /// Queries issued by the most recent run.
    pub fn last_batch_count(&self) -> usize {
        self.last_batch_count
    }

    /// Clears a `Failed` state.
    pub fn acknowledge_failure(&mut self) {
        if self.state == AggregatorState::Failed {
            self.state = AggregatorState::Idle;
        }
    }

    /// Aggregates `month` for `population`.
    ///
    /// An empty population yields an empty recap without touching the store.
    ///
    /// # Errors
    /// - `AggregationError::InvalidBatchLimit` before any fetch.
    /// - `AggregationError::Fetch` / `InvalidRecord` after moving to `Failed`
    ///   and emitting an error notice.
    pub fn aggregate(
        &mut self,
        catalog: &EntityCatalog,
        population: &[Person],
        month: YearMonth,
        options: &RecapOptions,
    ) -> AggregationResult<Vec<MonthlyRecap>> {
        if options.batch_limit == 0 || options.batch_limit > MAX_IN_VALUES {
            return Err(AggregationError::InvalidBatchLimit(options.batch_limit));
        }

        self.state = AggregatorState::Idle;
        self.last_batch_count = 0;
        if population.is_empty() {
            debug!(
                "event=recap_aggregate module=aggregator status=ok month={month} persons=0"
            );
            return Ok(Vec::new());
        }

        let started_at = Instant::now();
        info!(
            "event=recap_aggregate module=aggregator status=start kind={} month={month} persons={}",
            options.kind.as_str(),
            population.len()
        );

        self.state = AggregatorState::Fetching;
        let result = self
            .fetch(population, month, options)
            .and_then(|documents| {
                self.state = AggregatorState::Computing;
                compute(catalog, population, month, options, &documents)
            });

        match result {
            Ok(recaps) => {
                self.state = AggregatorState::Idle;
                info!(
                    "event=recap_aggregate module=aggregator status=ok kind={} month={month} rows={} batches={} duration_ms={}",
                    options.kind.as_str(),
                    recaps.len(),
                    self.last_batch_count,
                    started_at.elapsed().as_millis()
                );
                Ok(recaps)
            }
            Err(err) => {
                self.state = AggregatorState::Failed;
                error!(
                    "event=recap_aggregate module=aggregator status=error kind={} month={month} duration_ms={} error={err}",
                    options.kind.as_str(),
                    started_at.elapsed().as_millis()
                );
                self.notifier.notify(Notice::error(
                    "Failed to load monthly recap",
                    Some(err.to_string()),
                ));
                Err(err)
            }
        }
    }

    fn fetch(
        &mut self,
        population: &[Person],
        month: YearMonth,
        options: &RecapOptions,
    ) -> AggregationResult<Vec<Document>> {
        let (first_day, last_day) = month.iso_bounds();
        let collection = options.kind.attendance_collection();
        let ids = unique_ids(population);

        let mut seen = HashSet::new();
        let mut documents = Vec::new();
        for (batch, chunk) in ids.chunks(options.batch_limit).enumerate() {
            // Class is matched in `compute`; records without `kelas` must be fetched.
            let predicates = [
                Predicate::gte(FIELD_DATE, first_day.as_str()),
                Predicate::lte(FIELD_DATE, last_day.as_str()),
                Predicate::is_in(options.kind.person_field(), chunk.iter().copied()),
            ];

            self.last_batch_count += 1;
            let fetched = self
                .store
                .query(collection, &predicates)
                .map_err(|source| AggregationError::Fetch { batch, source })?;
            debug!(
                "event=recap_fetch module=aggregator status=ok batch={batch} ids={} documents={}",
                chunk.len(),
                fetched.len()
            );
            for document in fetched {
                if seen.insert(document.id.clone()) {
                    documents.push(document);
                }
            }
        }
        Ok(documents)
    }
}

fn unique_ids(population: &[Person]) -> Vec<&str> {
    let mut seen = HashSet::new();
    population
        .iter()
        .map(|person| person.id.as_str())
        .filter(|id| seen.insert(*id))
        .collect()
}

fn compute(
    catalog: &EntityCatalog,
    population: &[Person],
    month: YearMonth,
    options: &RecapOptions,
    documents: &[Document],
) -> AggregationResult<Vec<MonthlyRecap>> {
    let mut rows: Vec<MonthlyRecap> = Vec::with_capacity(population.len());
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(population.len());
    for person in population {
        if !index.contains_key(person.id.as_str()) {
            index.insert(person.id.as_str(), rows.len());
            rows.push(MonthlyRecap::empty(person.id.clone(), person.name.clone()));
        }
    }

    let mut events: Vec<AttendanceEvent> = Vec::with_capacity(documents.len());
    let mut by_key: HashMap<AttendanceKey, usize> = HashMap::with_capacity(documents.len());
    let mut duplicates = 0usize;
    for document in documents {
        let event = decode_attendance(options.kind, document)?;
        match by_key.get(&event.key) {
            Some(&held) => {
                duplicates += 1;
                if event.supersedes(&events[held]) {
                    events[held] = event;
                }
            }
            None => {
                by_key.insert(event.key.clone(), events.len());
                events.push(event);
            }
        }
    }

    let mut ignored = 0usize;
    for event in &events {
        let Some(&row) = index.get(event.key.person_id.as_str()) else {
            ignored += 1;
            continue;
        };
        if !month.contains(event.key.date) || !class_matches(options, event) {
            ignored += 1;
            continue;
        }
        rows[row].record(event.status);
        if options.detail {
            rows[row].details.push(detail_row(catalog, event));
        }
    }

    if options.detail {
        for row in &mut rows {
            row.details.sort_by(|a, b| {
                a.date
                    .cmp(&b.date)
                    .then_with(|| a.time_label.cmp(&b.time_label))
            });
        }
    }
    if ignored > 0 || duplicates > 0 {
        debug!(
            "event=recap_compute module=aggregator status=ok ignored={ignored} duplicates={duplicates}"
        );
    }
    Ok(rows)
}

/// A student event without a stored class counts for any class.
fn class_matches(options: &RecapOptions, event: &AttendanceEvent) -> bool {
    match (options.kind, options.class, event.class) {
        (PersonKind::Student, Some(wanted), Some(stored)) => wanted == stored,
        _ => true,
    }
}

fn detail_row(catalog: &EntityCatalog, event: &AttendanceEvent) -> RecapDetailRow {
    let slot = catalog.slot_by_id(&event.key.slot_id);
    let class = event.class.or_else(|| slot.map(|slot| slot.class));
    RecapDetailRow {
        date: event.key.date,
        time_label: slot
            .map(|slot| slot.time_label.clone())
            .unwrap_or_else(|| UNRESOLVED_PLACEHOLDER.to_string()),
        subject: catalog
            .subject_name(&event.key.slot_id)
            .unwrap_or(UNRESOLVED_PLACEHOLDER)
            .to_string(),
        class_label: class
            .map(class_label)
            .unwrap_or_else(|| UNRESOLVED_PLACEHOLDER.to_string()),
        status: event.status,
    }
}

/// Display label of a class number.
pub fn class_label(class: u8) -> String {
    format!("Kelas {class}")
}
