//! Document store contract consumed by the attendance engine.
//!
//! # Responsibility
//! - Define the generic query/subscribe/upsert surface of the sync substrate.
//! - Define the subscription handle that carries change-feed deliveries.
//!
//! # Invariants
//! - Every feed delivery is a full snapshot of the matching documents, never
//!   a delta.
//! - Once a subscription is cancelled, its receiver is gone and nothing
//!   delivered afterwards can be observed through it.
//! - Membership predicates carry at most [`MAX_IN_VALUES`] values.

use crate::db::DbError;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{Receiver, TryRecvError};

/// Upper bound on values inside one `In` predicate.
pub const MAX_IN_VALUES: usize = 30;

/// Document field map.
pub type Fields = serde_json::Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by document store implementations.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Serialization(serde_json::Error),
    /// An `In` predicate exceeded [`MAX_IN_VALUES`].
    TooManyValues { field: String, count: usize },
    /// Predicate cannot be expressed by this store.
    UnsupportedPredicate(String),
    /// Backend unreachable or refused the request.
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "document serialization failed: {err}"),
            Self::TooManyValues { field, count } => write!(
                f,
                "membership filter on `{field}` has {count} values; at most {MAX_IN_VALUES} allowed"
            ),
            Self::UnsupportedPredicate(message) => write!(f, "unsupported predicate: {message}"),
            Self::Unavailable(message) => write!(f, "document store unavailable: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// One stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// String field value, if present and a string.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Field filter understood by document stores.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Gte { field: String, value: Value },
    Lte { field: String, value: Value },
}

impl Predicate {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn is_in<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self::Gte {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Self::Lte {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Eq { field, .. }
            | Self::In { field, .. }
            | Self::Gte { field, .. }
            | Self::Lte { field, .. } => field,
        }
    }
}

/// Rejects predicate lists a store must refuse regardless of backend.
pub fn validate_predicates(predicates: &[Predicate]) -> StoreResult<()> {
    for predicate in predicates {
        if let Predicate::In { field, values } = predicate {
            if values.len() > MAX_IN_VALUES {
                return Err(StoreError::TooManyValues {
                    field: field.clone(),
                    count: values.len(),
                });
            }
        }
    }
    Ok(())
}

/// How an upsert treats fields already stored on the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Written fields overwrite; absent fields are preserved.
    Merge,
    /// The document is replaced by the written fields.
    Replace,
}

/// Identifier of one active subscription inside a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// One change-feed delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Full set of documents currently matching the subscription.
    Snapshot(Vec<Document>),
    /// The feed failed and will not deliver further snapshots.
    Error(String),
}

/// Receiving half of a change feed.
///
/// Dropping it (or handing it to `DocumentStore::unsubscribe`) ends the feed.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    receiver: Receiver<FeedEvent>,
}

impl Subscription {
    pub fn new(id: SubscriptionId, receiver: Receiver<FeedEvent>) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next pending delivery without blocking.
    ///
    /// A feed whose sending half is gone reports `FeedEvent::Error`.
    pub fn try_next(&self) -> Option<FeedEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                Some(FeedEvent::Error("change feed closed by store".to_string()))
            }
        }
    }
}

/// Generic document store consumed by catalog, live view, writer and
/// aggregator.
pub trait DocumentStore {
    /// Returns documents of `collection` matching all predicates.
    fn query(&self, collection: &str, predicates: &[Predicate]) -> StoreResult<Vec<Document>>;

    /// Starts a change feed. The current snapshot is delivered first.
    fn subscribe(&self, collection: &str, predicates: &[Predicate]) -> StoreResult<Subscription>;

    /// Stops delivering to `subscription` and drops its receiver.
    fn unsubscribe(&self, subscription: Subscription);

    /// Writes `fields` to `document_id`, creating the document when missing.
    fn upsert(
        &self,
        collection: &str,
        document_id: &str,
        fields: &Fields,
        mode: WriteMode,
    ) -> StoreResult<()>;

    /// Creates a document under a store-generated id.
    fn insert(&self, collection: &str, fields: &Fields) -> StoreResult<String>;
}
