use attendance_core::db::migrations::latest_version;
use attendance_core::db::{open_db, open_db_in_memory, DbError};
use attendance_core::repo::records::encode_teacher;
use attendance_core::{DocumentStore, SqliteDocumentStore, StoreError, WriteMode};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "documents");
    assert_index_exists(&conn, "idx_documents_tanggal");
}

#[test]
fn opening_same_database_twice_keeps_documents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("attendance.db");

    let store = SqliteDocumentStore::new(open_db(&path).unwrap());
    store
        .upsert("gurus", "g1", &encode_teacher("Bu Sari"), WriteMode::Merge)
        .unwrap();
    drop(store);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let store = SqliteDocumentStore::new(conn_second);
    let teacher = store.get("gurus", "g1").unwrap().unwrap();
    assert_eq!(teacher.str_field("name"), Some("Bu Sari"));
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn documents_must_be_json_objects() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();
    let err = store
        .connection()
        .execute(
            "INSERT INTO documents (collection, id, fields) VALUES ('gurus', 'g1', '[1, 2]');",
            [],
        )
        .unwrap_err();
    assert!(err.to_string().contains("CHECK"));

    let store_err: StoreError = err.into();
    assert!(matches!(store_err, StoreError::Db(DbError::Sqlite(_))));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    assert_schema_entry(conn, "table", table_name);
}

fn assert_index_exists(conn: &Connection, index_name: &str) {
    assert_schema_entry(conn, "index", index_name);
}

fn assert_schema_entry(conn: &Connection, kind: &str, name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            );",
            [kind, name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "{kind} {name} does not exist");
}
