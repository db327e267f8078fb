//! Schema registry for the `documents` table.
//!
//! Migrations run inside one transaction: a database is either fully
//! upgraded to [`latest_version`] or left at the version it had.
//!
//! # Invariants
//! - Versions are strictly increasing and start at 1.
//! - Applied version is mirrored to `PRAGMA user_version`.
//! - A database written by a newer build is rejected, never downgraded.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "documents",
        sql: include_str!("0001_documents.sql"),
    },
    Migration {
        version: 2,
        name: "attendance_date_index",
        sql: include_str!("0002_attendance_date_index.sql"),
    },
];

/// Schema version produced by this build.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Checks JSON support, then brings `conn` up to [`latest_version`].
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    require_json_support(conn)?;
    upgrade(conn, MIGRATIONS)
}

fn require_json_support(conn: &Connection) -> DbResult<()> {
    conn.query_row("SELECT json_patch('{}', json_object('k', 1));", [], |row| {
        row.get::<_, String>(0)
    })
    .map(|_| ())
    .map_err(DbError::JsonUnsupported)
}

fn upgrade(conn: &mut Connection, migrations: &[Migration]) -> DbResult<()> {
    let from_version = user_version(conn)?;
    let latest = migrations.last().map_or(0, |migration| migration.version);

    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }
    if from_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in migrations
        .iter()
        .filter(|migration| migration.version > from_version)
    {
        tx.execute_batch(migration.sql)
            .and_then(|()| {
                tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))
            })
            .map_err(|source| DbError::Migration {
                version: migration.version,
                name: migration.name,
                source,
            })?;
        debug!(
            "event=db_migrate module=db status=step version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;

    info!("event=db_migrate module=db status=ok from_version={from_version} to_version={latest}");
    Ok(())
}

fn user_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

#[cfg(test)]
mod tests {
    use super::{upgrade, user_version, Migration, MIGRATIONS};
    use crate::db::DbError;
    use rusqlite::Connection;

    #[test]
    fn registry_versions_are_strictly_increasing() {
        let versions: Vec<u32> = MIGRATIONS.iter().map(|migration| migration.version).collect();
        assert_eq!(versions.first(), Some(&1));
        assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn failed_step_rolls_back_the_whole_upgrade() {
        let mut conn = Connection::open_in_memory().unwrap();
        let broken = [
            MIGRATIONS[0],
            Migration {
                version: 2,
                name: "broken_index",
                sql: "CREATE INDEX idx_missing ON no_such_table (id);",
            },
        ];

        let err = upgrade(&mut conn, &broken).unwrap_err();
        match err {
            DbError::Migration { version, name, .. } => {
                assert_eq!(version, 2);
                assert_eq!(name, "broken_index");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(user_version(&conn).unwrap(), 0);
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'documents';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
    }
}
