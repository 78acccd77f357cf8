use std::path::Path;

use rusqlite::Connection;

use super::DatabaseError;

/// Open the procsync store at `path`, applying any pending migrations.
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Fresh in-memory store with the full schema.
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA foreign_keys=ON;"
    )?;
    Ok(())
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![
        (1, include_str!("../../resources/migrations/001_initial.sql")),
    ];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(sql).map_err(|e| DatabaseError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get::<_, i64>(0),
    )
    .unwrap_or(0)
}

/// Count tables in the database (for verification)
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_initializes_all_tables() {
        let conn = open_memory_database().unwrap();
        // 5 entity tables + field_changes + entity_links + schema_version
        let count = count_tables(&conn).unwrap();
        assert_eq!(count, 8, "Expected 8 tables, got {count}");
    }

    #[test]
    fn schema_version_is_current() {
        let conn = open_memory_database().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn migration_idempotent() {
        let conn = open_memory_database().unwrap();
        let result = run_migrations(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn foreign_keys_enabled() {
        let conn = open_memory_database().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn on_disk_database_reopens_without_remigrating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("procsync.db");
        {
            let conn = open_database(&path).unwrap();
            conn.execute(
                "INSERT INTO requests (id, business_key, created_at, updated_at)
                 VALUES ('a', 'k', '2024-01-01 00:00:00', '2024-01-01 00:00:00')",
                [],
            )
            .unwrap();
        }
        let conn = open_database(&path).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM requests", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn audit_table_rejects_update_and_delete() {
        let conn = open_memory_database().unwrap();
        conn.execute(
            "INSERT INTO field_changes (entity_type, entity_id, field, old_value, new_value, changed_at, source)
             VALUES ('request', 'x', 'amount', NULL, '1', '2024-01-01 00:00:00', 'INGESTION')",
            [],
        )
        .unwrap();
        assert!(conn.execute("UPDATE field_changes SET new_value = '2'", []).is_err());
        assert!(conn.execute("DELETE FROM field_changes", []).is_err());
    }

    #[test]
    fn user_change_requires_actor() {
        let conn = open_memory_database().unwrap();
        let result = conn.execute(
            "INSERT INTO field_changes (entity_type, entity_id, field, changed_at, source)
             VALUES ('request', 'x', 'comment', '2024-01-01 00:00:00', 'USER')",
            [],
        );
        assert!(result.is_err());
    }
}
