//! Store schema definitions and migrations.

use rusqlite::Connection;

use super::error::StoreError;

/// Current schema version. Increment when making schema changes.
pub const SCHEMA_VERSION: i32 = 1;

/// Schema DDL for version 1.
///
/// `reports` is the document table: one row per sync record, keyed by
/// (collection, doc_id) so the replace-or-insert write is a single atomic
/// statement. `load_source` is nullable — records written before provenance
/// tracking existed carry NULL until the provenance migration stamps them.
const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS reports (
    collection TEXT NOT NULL,
    doc_id TEXT NOT NULL,
    period TEXT NOT NULL,
    report_kind TEXT NOT NULL,
    record_count INTEGER NOT NULL DEFAULT 0,
    inserted_at INTEGER NOT NULL,
    load_source TEXT,
    month_name TEXT,
    payload TEXT NOT NULL,
    PRIMARY KEY (collection, doc_id)
);

CREATE INDEX IF NOT EXISTS idx_reports_period ON reports(collection, period);
CREATE INDEX IF NOT EXISTS idx_reports_load_source ON reports(load_source);

CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at INTEGER NOT NULL,
    completed_at INTEGER,
    units_succeeded INTEGER DEFAULT 0,
    units_skipped INTEGER DEFAULT 0,
    units_failed INTEGER DEFAULT 0,
    units_remaining INTEGER DEFAULT 0,
    interrupted INTEGER DEFAULT 0
);
"#;

/// Get the current schema version from the database.
pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32, StoreError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StoreError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

/// Initialize or migrate the store schema.
///
/// Idempotent; safe to call on both new and existing databases.
pub(crate) fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchemaVersion {
            found: current_version,
            expected: SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(SCHEMA_V1)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
        tracing::debug!("Initialized store schema at version {}", SCHEMA_VERSION);
    } else if current_version < SCHEMA_VERSION {
        for version in (current_version + 1)..=SCHEMA_VERSION {
            migrate_to_version(conn, version)?;
        }
    }

    Ok(())
}

/// Apply migration for a specific version.
fn migrate_to_version(conn: &Connection, version: i32) -> Result<(), StoreError> {
    // Future schema migrations go here; version 1 is the base schema.
    conn.execute_batch(SCHEMA_V1)?;
    set_schema_version(conn, version)?;
    tracing::info!("Migrated store to schema version {}", version);
    Ok(())
}
