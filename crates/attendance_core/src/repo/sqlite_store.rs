//! SQLite-backed document store.
//!
//! # Responsibility
//! - Persist schemaless documents as JSON objects in the `documents` table.
//! - Translate predicates into `json_extract` filters.
//! - Fan out full snapshots to change-feed subscribers after every write.
//!
//! # Invariants
//! - Merge upserts follow JSON merge-patch: written keys overwrite, absent keys
//!   are preserved.
//! - A subscriber receives its initial snapshot before `subscribe` returns.
//! - Subscribers whose receiver is gone are pruned on the next publish.

use crate::db::open_db_in_memory;
use crate::repo::document_store::{
    validate_predicates, Document, DocumentStore, FeedEvent, Fields, Predicate, StoreError,
    StoreResult, Subscription, SubscriptionId, WriteMode,
};
use log::{debug, warn};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Sender};
use uuid::Uuid;

struct Subscriber {
    collection: String,
    predicates: Vec<Predicate>,
    sender: Sender<FeedEvent>,
}

/// Single-connection document store with in-process change feeds.
pub struct SqliteDocumentStore {
    conn: Connection,
    subscribers: RefCell<BTreeMap<SubscriptionId, Subscriber>>,
    next_subscription_id: Cell<u64>,
}

impl SqliteDocumentStore {
    /// Wraps a migrated connection (see `db::open_db`).
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            subscribers: RefCell::new(BTreeMap::new()),
            next_subscription_id: Cell::new(1),
        }
    }

    /// Opens a fresh in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Underlying connection, for diagnostics and test setup.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Number of live change feeds.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Total documents stored in `collection`.
    pub fn count(&self, collection: &str) -> StoreResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1;",
            [collection],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Fetches one document by id.
    pub fn get(&self, collection: &str, document_id: &str) -> StoreResult<Option<Document>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, fields FROM documents WHERE collection = ?1 AND id = ?2;")?;
        let mut rows = stmt.query(params![collection, document_id])?;
        match rows.next()? {
            Some(row) => {
                let id: String = row.get(0)?;
                let raw: String = row.get(1)?;
                Ok(Some(Document::new(id, parse_fields(&raw)?)))
            }
            None => Ok(None),
        }
    }

    fn run_query(&self, collection: &str, predicates: &[Predicate]) -> StoreResult<Vec<Document>> {
        let (sql, bind_values) = build_select(collection, predicates)?;
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let raw: String = row.get(1)?;
            documents.push(Document::new(id, parse_fields(&raw)?));
        }
        Ok(documents)
    }

    fn publish(&self, collection: &str) {
        let mut closed = Vec::new();
        {
            let subscribers = self.subscribers.borrow();
            for (id, subscriber) in subscribers.iter() {
                if subscriber.collection != collection {
                    continue;
                }
                let event = match self.run_query(collection, &subscriber.predicates) {
                    Ok(documents) => FeedEvent::Snapshot(documents),
                    Err(err) => {
                        warn!(
                            "event=feed_publish module=store status=error subscription={} error={err}",
                            id.0
                        );
                        FeedEvent::Error(err.to_string())
                    }
                };
                if subscriber.sender.send(event).is_err() {
                    closed.push(*id);
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.subscribers.borrow_mut();
            for id in closed {
                subscribers.remove(&id);
                debug!("event=feed_prune module=store status=ok subscription={}", id.0);
            }
        }
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn query(&self, collection: &str, predicates: &[Predicate]) -> StoreResult<Vec<Document>> {
        validate_predicates(predicates)?;
        self.run_query(collection, predicates)
    }

    fn subscribe(&self, collection: &str, predicates: &[Predicate]) -> StoreResult<Subscription> {
        validate_predicates(predicates)?;
        let initial = self.run_query(collection, predicates)?;

        let id = SubscriptionId(self.next_subscription_id.get());
        self.next_subscription_id.set(id.0 + 1);

        let (sender, receiver) = mpsc::channel();
        // The receiver is still in hand, so this send cannot fail.
        let _ = sender.send(FeedEvent::Snapshot(initial));
        self.subscribers.borrow_mut().insert(
            id,
            Subscriber {
                collection: collection.to_string(),
                predicates: predicates.to_vec(),
                sender,
            },
        );
        debug!(
            "event=feed_subscribe module=store status=ok subscription={} collection={collection}",
            id.0
        );
        Ok(Subscription::new(id, receiver))
    }

    fn unsubscribe(&self, subscription: Subscription) {
        let id = subscription.id();
        self.subscribers.borrow_mut().remove(&id);
        drop(subscription);
        debug!("event=feed_unsubscribe module=store status=ok subscription={}", id.0);
    }

    fn upsert(
        &self,
        collection: &str,
        document_id: &str,
        fields: &Fields,
        mode: WriteMode,
    ) -> StoreResult<()> {
        let payload = serde_json::to_string(fields)?;
        let sql = match mode {
            WriteMode::Merge => {
                "INSERT INTO documents (collection, id, fields) VALUES (?1, ?2, json(?3))
                 ON CONFLICT (collection, id) DO UPDATE SET
                    fields = json_patch(documents.fields, excluded.fields),
                    updated_at = (strftime('%s', 'now') * 1000);"
            }
            WriteMode::Replace => {
                "INSERT INTO documents (collection, id, fields) VALUES (?1, ?2, json(?3))
                 ON CONFLICT (collection, id) DO UPDATE SET
                    fields = excluded.fields,
                    updated_at = (strftime('%s', 'now') * 1000);"
            }
        };
        self.conn
            .execute(sql, params![collection, document_id, payload])?;
        self.publish(collection);
        Ok(())
    }

    fn insert(&self, collection: &str, fields: &Fields) -> StoreResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        let payload = serde_json::to_string(fields)?;
        self.conn.execute(
            "INSERT INTO documents (collection, id, fields) VALUES (?1, ?2, json(?3));",
            params![collection, id.as_str(), payload],
        )?;
        self.publish(collection);
        Ok(id)
    }
}

fn parse_fields(raw: &str) -> StoreResult<Fields> {
    Ok(serde_json::from_str(raw)?)
}

fn build_select(collection: &str, predicates: &[Predicate]) -> StoreResult<(String, Vec<SqlValue>)> {
    let mut sql = String::from("SELECT id, fields FROM documents WHERE collection = ?");
    let mut bind_values = vec![SqlValue::Text(collection.to_string())];

    for predicate in predicates {
        let path = json_path(predicate.field())?;
        match predicate {
            Predicate::Eq { value, .. } if value.is_null() => {
                sql.push_str(" AND json_extract(fields, ?) IS NULL");
                bind_values.push(SqlValue::Text(path));
            }
            Predicate::Eq { value, .. } => {
                sql.push_str(" AND json_extract(fields, ?) = ?");
                bind_values.push(SqlValue::Text(path));
                bind_values.push(to_sql_value(value)?);
            }
            Predicate::In { values, .. } if values.is_empty() => {
                sql.push_str(" AND 0");
            }
            Predicate::In { values, .. } => {
                let placeholders = vec!["?"; values.len()].join(", ");
                sql.push_str(&format!(" AND json_extract(fields, ?) IN ({placeholders})"));
                bind_values.push(SqlValue::Text(path));
                for value in values {
                    bind_values.push(to_sql_value(value)?);
                }
            }
            Predicate::Gte { value, .. } => {
                sql.push_str(" AND json_extract(fields, ?) >= ?");
                bind_values.push(SqlValue::Text(path));
                bind_values.push(to_sql_value(value)?);
            }
            Predicate::Lte { value, .. } => {
                sql.push_str(" AND json_extract(fields, ?) <= ?");
                bind_values.push(SqlValue::Text(path));
                bind_values.push(to_sql_value(value)?);
            }
        }
    }

    sql.push_str(" ORDER BY id ASC");
    Ok((sql, bind_values))
}

fn json_path(field: &str) -> StoreResult<String> {
    if field.is_empty() || field.contains('"') {
        return Err(StoreError::UnsupportedPredicate(format!(
            "invalid field name `{field}`"
        )));
    }
    Ok(format!("$.\"{field}\""))
}

// json_extract yields INTEGER 0/1 for JSON booleans.
fn to_sql_value(value: &Value) -> StoreResult<SqlValue> {
    match value {
        Value::String(text) => Ok(SqlValue::Text(text.clone())),
        Value::Bool(flag) => Ok(SqlValue::Integer(i64::from(*flag))),
        Value::Number(number) => match (number.as_i64(), number.as_f64()) {
            (Some(int), _) => Ok(SqlValue::Integer(int)),
            (None, Some(real)) => Ok(SqlValue::Real(real)),
            _ => Err(StoreError::UnsupportedPredicate(format!(
                "number `{number}` out of range"
            ))),
        },
        Value::Null | Value::Array(_) | Value::Object(_) => Err(StoreError::UnsupportedPredicate(
            format!("cannot compare against `{value}`"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteDocumentStore;
    use crate::repo::document_store::{
        DocumentStore, FeedEvent, Fields, Predicate, StoreError, WriteMode,
    };
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn merge_upsert_preserves_absent_fields() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .upsert(
                "absensiGuru",
                "r1",
                &fields(json!({"status": "Hadir", "keterangan": "rapat"})),
                WriteMode::Merge,
            )
            .unwrap();
        store
            .upsert(
                "absensiGuru",
                "r1",
                &fields(json!({"status": "Sakit"})),
                WriteMode::Merge,
            )
            .unwrap();

        let doc = store.get("absensiGuru", "r1").unwrap().unwrap();
        assert_eq!(doc.str_field("status"), Some("Sakit"));
        assert_eq!(doc.str_field("keterangan"), Some("rapat"));
        assert_eq!(store.count("absensiGuru").unwrap(), 1);
    }

    #[test]
    fn replace_upsert_drops_absent_fields() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .upsert(
                "c",
                "d",
                &fields(json!({"a": 1, "b": 2})),
                WriteMode::Replace,
            )
            .unwrap();
        store
            .upsert("c", "d", &fields(json!({"a": 3})), WriteMode::Replace)
            .unwrap();
        let doc = store.get("c", "d").unwrap().unwrap();
        assert_eq!(doc.fields.get("a"), Some(&json!(3)));
        assert!(doc.fields.get("b").is_none());
    }

    #[test]
    fn predicates_filter_by_type_exact_values() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .insert("siswa", &fields(json!({"nama": "Adi", "kelas": 3})))
            .unwrap();
        store
            .insert("siswa", &fields(json!({"nama": "Budi", "kelas": "3"})))
            .unwrap();
        store
            .insert("siswa", &fields(json!({"nama": "Citra", "kelas": 4})))
            .unwrap();

        let numeric = store
            .query("siswa", &[Predicate::eq("kelas", 3)])
            .unwrap();
        assert_eq!(numeric.len(), 1);
        assert_eq!(numeric[0].str_field("nama"), Some("Adi"));

        let members = store
            .query("siswa", &[Predicate::is_in("nama", ["Adi", "Citra", "Dewi"])])
            .unwrap();
        assert_eq!(members.len(), 2);

        let none = store
            .query("siswa", &[Predicate::is_in("nama", Vec::<String>::new())])
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn date_range_predicates_are_inclusive() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        for (id, date) in [("a", "2024-02-29"), ("b", "2024-03-01"), ("c", "2024-03-31"), ("d", "2024-04-01")] {
            store
                .upsert("absensiGuru", id, &fields(json!({"tanggal": date})), WriteMode::Merge)
                .unwrap();
        }
        let march = store
            .query(
                "absensiGuru",
                &[
                    Predicate::gte("tanggal", "2024-03-01"),
                    Predicate::lte("tanggal", "2024-03-31"),
                ],
            )
            .unwrap();
        let ids: Vec<_> = march.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn oversized_membership_filters_are_rejected() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let err = store
            .query("siswa", &[Predicate::is_in("id", (0..31).map(|i| i.to_string()))])
            .unwrap_err();
        assert!(matches!(err, StoreError::TooManyValues { .. }));
    }

    #[test]
    fn subscribers_get_initial_and_follow_up_snapshots() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let subscription = store
            .subscribe("absensiGuru", &[Predicate::eq("tanggal", "2024-08-05")])
            .unwrap();
        assert_eq!(subscription.try_next(), Some(FeedEvent::Snapshot(Vec::new())));
        assert_eq!(subscription.try_next(), None);

        store
            .upsert(
                "absensiGuru",
                "r1",
                &fields(json!({"tanggal": "2024-08-05", "status": "Hadir"})),
                WriteMode::Merge,
            )
            .unwrap();
        match subscription.try_next() {
            Some(FeedEvent::Snapshot(docs)) => assert_eq!(docs.len(), 1),
            other => panic!("unexpected delivery: {other:?}"),
        }

        store.unsubscribe(subscription);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn dropped_receivers_are_pruned_on_publish() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let subscription = store.subscribe("jadwal", &[]).unwrap();
        drop(subscription);
        assert_eq!(store.subscriber_count(), 1);

        store.insert("jadwal", &fields(json!({"hari": "Senin"}))).unwrap();
        assert_eq!(store.subscriber_count(), 0);
    }
}
