//! Document store trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use super::error::StoreError;
use super::schema;
use super::types::{RunStats, StoreSummary, StoredReport, SyncRecord};
use crate::period::Period;
use crate::report::{month_display_name, Provenance, ReportKind, ReportUnit};

/// Document store operations, as seen by the sync engine and the
/// operational commands.
///
/// Object-safe; used as `Arc<dyn DocumentStore>` so tests can substitute an
/// in-memory store. Completeness queries always reflect current store state
/// — there is no caching between calls, which is what makes re-invocation
/// after a crash (or alongside an external writer) safe.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Atomically replace-or-insert one sync record under its natural key.
    async fn save(&self, record: &SyncRecord) -> Result<(), StoreError>;

    /// Replace-or-insert an arbitrary document (derived reports). Writes no
    /// provenance tag.
    async fn save_document(
        &self,
        collection: &str,
        doc_id: &str,
        period: &str,
        kind_label: &str,
        payload: &Value,
    ) -> Result<(), StoreError>;

    /// Whether a unit's record exists under its exact natural key.
    async fn exists(&self, unit: &ReportUnit) -> Result<bool, StoreError>;

    /// The subset of (period, kind) pairs with no persisted record, ordered
    /// by period ascending then by the given kind order.
    async fn missing_units(
        &self,
        kinds: &[ReportKind],
        periods: &[Period],
    ) -> Result<Vec<ReportUnit>, StoreError>;

    /// Distinct period keys present in a kind's collection, sorted.
    async fn existing_periods(&self, kind: ReportKind) -> Result<Vec<String>, StoreError>;

    /// Read one record back, if present.
    async fn load(&self, unit: &ReportUnit) -> Result<Option<StoredReport>, StoreError>;

    /// Migration: stamp `automatic` provenance on records written before
    /// provenance tracking existed. Returns the number of rows updated.
    async fn backfill_provenance(&self, kinds: &[ReportKind]) -> Result<u64, StoreError>;

    /// Migration: rewrite month display names stored as raw `YYYY-MM` keys
    /// (or missing entirely) to their proper names. Returns rows updated.
    async fn fix_month_names(&self) -> Result<u64, StoreError>;

    /// Record the start of a sync invocation; returns the run id.
    async fn start_run(&self) -> Result<i64, StoreError>;

    /// Record an invocation's final counters.
    async fn complete_run(&self, run_id: i64, stats: &RunStats) -> Result<(), StoreError>;

    /// Snapshot of store contents for the status report.
    async fn summary(&self) -> Result<StoreSummary, StoreError>;
}

/// SQLite implementation of the document store.
pub struct SqliteDocumentStore {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    /// Path to the database file (for error messages).
    path: PathBuf,
}

impl std::fmt::Debug for SqliteDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDocumentStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteDocumentStore {
    /// Open or create a store at the given path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path_clone).map_err(|e| StoreError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            // WAL keeps readers (status/dates commands) from blocking the
            // writer; NORMAL synchronous is safe under WAL.
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StoreError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StoreError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, StoreError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory store (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn save(&self, record: &SyncRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&record.payload)
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let conn = self.lock()?;
        // Full replacement: every field of a prior record for this key is
        // superseded, never merged.
        conn.execute(
            r#"
            INSERT OR REPLACE INTO reports
                (collection, doc_id, period, report_kind, record_count,
                 inserted_at, load_source, month_name, payload)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            rusqlite::params![
                record.kind.collection(),
                record.doc_id,
                record.period,
                record.kind.label(),
                record.record_count as i64,
                record.inserted_at.timestamp(),
                record.provenance.as_str(),
                record.month_name,
                payload,
            ],
        )
        .map_err(StoreError::query)?;

        Ok(())
    }

    async fn save_document(
        &self,
        collection: &str,
        doc_id: &str,
        period: &str,
        kind_label: &str,
        payload: &Value,
    ) -> Result<(), StoreError> {
        let payload =
            serde_json::to_string(payload).map_err(|e| StoreError::Query(e.to_string()))?;
        let inserted_at = Utc::now().timestamp();

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO reports
                (collection, doc_id, period, report_kind, record_count,
                 inserted_at, load_source, month_name, payload)
            VALUES (?1, ?2, ?3, ?4, 0, ?5, NULL, NULL, ?6)
            "#,
            rusqlite::params![collection, doc_id, period, kind_label, inserted_at, payload],
        )
        .map_err(StoreError::query)?;

        Ok(())
    }

    async fn exists(&self, unit: &ReportUnit) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM reports WHERE collection = ?1 AND doc_id = ?2",
                [unit.kind.collection(), unit.natural_key().as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::query)?;
        Ok(found.is_some())
    }

    async fn missing_units(
        &self,
        kinds: &[ReportKind],
        periods: &[Period],
    ) -> Result<Vec<ReportUnit>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached("SELECT 1 FROM reports WHERE collection = ?1 AND doc_id = ?2")
            .map_err(StoreError::query)?;

        let mut sorted_periods: Vec<Period> = periods.to_vec();
        sorted_periods.sort();

        let mut missing = Vec::new();
        for period in &sorted_periods {
            for kind in kinds {
                let unit = ReportUnit::new(*period, *kind);
                let found: Option<i64> = stmt
                    .query_row(
                        [kind.collection(), unit.natural_key().as_str()],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(StoreError::query)?;
                if found.is_none() {
                    missing.push(unit);
                }
            }
        }
        Ok(missing)
    }

    async fn existing_periods(&self, kind: ReportKind) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT DISTINCT period FROM reports WHERE collection = ?1 ORDER BY period",
            )
            .map_err(StoreError::query)?;

        let periods = stmt
            .query_map([kind.collection()], |row| row.get::<_, String>(0))
            .map_err(StoreError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::query)?;

        Ok(periods)
    }

    async fn load(&self, unit: &ReportUnit) -> Result<Option<StoredReport>, StoreError> {
        let conn = self.lock()?;
        let row: Option<(String, String, i64, i64, Option<String>, Option<String>, String)> = conn
            .query_row(
                r#"
                SELECT doc_id, period, record_count, inserted_at,
                       load_source, month_name, payload
                FROM reports WHERE collection = ?1 AND doc_id = ?2
                "#,
                [unit.kind.collection(), unit.natural_key().as_str()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()
            .map_err(StoreError::query)?;

        let Some((doc_id, period, record_count, inserted_at, load_source, month_name, payload)) =
            row
        else {
            return Ok(None);
        };

        let payload: Value =
            serde_json::from_str(&payload).map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(Some(StoredReport {
            doc_id,
            period,
            record_count: record_count as u64,
            inserted_at: Utc
                .timestamp_opt(inserted_at, 0)
                .single()
                .unwrap_or(DateTime::UNIX_EPOCH),
            provenance: load_source.as_deref().and_then(Provenance::from_str),
            month_name,
            payload,
        }))
    }

    async fn backfill_provenance(&self, kinds: &[ReportKind]) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let mut total = 0u64;
        for kind in kinds {
            let rows = conn
                .execute(
                    "UPDATE reports SET load_source = 'automatic'
                     WHERE collection = ?1 AND load_source IS NULL",
                    [kind.collection()],
                )
                .map_err(StoreError::query)?;
            total += rows as u64;
        }
        Ok(total)
    }

    async fn fix_month_names(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let mut total = 0u64;

        for kind in ReportKind::MONTHLY {
            // Rows whose display name is absent or still the raw month key.
            let stale: Vec<(String, String)> = {
                let mut stmt = conn
                    .prepare_cached(
                        "SELECT doc_id, period FROM reports
                         WHERE collection = ?1
                           AND (month_name IS NULL
                                OR month_name GLOB '[0-9][0-9][0-9][0-9]-[0-9][0-9]')",
                    )
                    .map_err(StoreError::query)?;
                let rows = stmt
                    .query_map([kind.collection()], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })
                    .map_err(StoreError::query)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(StoreError::query)?;
                rows
            };

            for (doc_id, period) in stale {
                let month: Option<u32> = period
                    .get(5..7)
                    .and_then(|m| m.parse().ok());
                let Some(name) = month.and_then(month_display_name) else {
                    tracing::warn!(period = %period, "Cannot derive month name, leaving as-is");
                    continue;
                };
                // Point update on the display name only — the narrow
                // exception to full-record replacement.
                let rows = conn
                    .execute(
                        "UPDATE reports SET month_name = ?1
                         WHERE collection = ?2 AND doc_id = ?3",
                        rusqlite::params![name, kind.collection(), doc_id],
                    )
                    .map_err(StoreError::query)?;
                total += rows as u64;
            }
        }
        Ok(total)
    }

    async fn start_run(&self) -> Result<i64, StoreError> {
        let started_at = Utc::now().timestamp();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sync_runs (started_at) VALUES (?1)",
            [started_at],
        )
        .map_err(StoreError::query)?;
        Ok(conn.last_insert_rowid())
    }

    async fn complete_run(&self, run_id: i64, stats: &RunStats) -> Result<(), StoreError> {
        let completed_at = Utc::now().timestamp();
        let conn = self.lock()?;
        conn.execute(
            "UPDATE sync_runs SET completed_at = ?1, units_succeeded = ?2,
             units_skipped = ?3, units_failed = ?4, units_remaining = ?5,
             interrupted = ?6 WHERE id = ?7",
            rusqlite::params![
                completed_at,
                stats.units_succeeded as i64,
                stats.units_skipped as i64,
                stats.units_failed as i64,
                stats.units_remaining as i64,
                stats.interrupted as i64,
                run_id,
            ],
        )
        .map_err(StoreError::query)?;
        Ok(())
    }

    async fn summary(&self) -> Result<StoreSummary, StoreError> {
        let conn = self.lock()?;

        let collections = {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT collection, COUNT(*) FROM reports
                     GROUP BY collection ORDER BY collection",
                )
                .map_err(StoreError::query)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                })
                .map_err(StoreError::query)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(StoreError::query)?;
            rows
        };

        let last_run: Option<(Option<i64>, Option<i64>)> = conn
            .query_row(
                "SELECT started_at, completed_at FROM sync_runs ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(StoreError::query)?;

        let (last_run_started, last_run_completed) = match last_run {
            Some((started, completed)) => (
                started.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                completed.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            ),
            None => (None, None),
        };

        Ok(StoreSummary {
            collections,
            last_run_started,
            last_run_completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(d: u32) -> Period {
        Period::day(2025, 7, d).unwrap()
    }

    fn record_for(unit: &ReportUnit, marker: i64) -> SyncRecord {
        SyncRecord::from_fetch(unit, vec![json!({ "marker": marker })], Provenance::Automatic)
    }

    #[tokio::test]
    async fn test_save_then_exists() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let unit = ReportUnit::new(day(1), ReportKind::Totals);

        assert!(!store.exists(&unit).await.unwrap());
        store.save(&record_for(&unit, 1)).await.unwrap();
        assert!(store.exists(&unit).await.unwrap());
    }

    #[tokio::test]
    async fn test_idempotent_write_yields_one_record() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let unit = ReportUnit::new(day(1), ReportKind::Standard);

        let mut first = record_for(&unit, 1);
        first.inserted_at = Utc.timestamp_opt(1_000, 0).single().unwrap();
        store.save(&first).await.unwrap();

        let mut second = SyncRecord::from_fetch(
            &unit,
            vec![json!({"marker": 2}), json!({"marker": 3})],
            Provenance::Backfill,
        );
        second.inserted_at = Utc.timestamp_opt(2_000, 0).single().unwrap();
        store.save(&second).await.unwrap();

        let stored = store.load(&unit).await.unwrap().unwrap();
        assert_eq!(stored.record_count, 2);
        assert_eq!(stored.provenance, Some(Provenance::Backfill));
        assert_eq!(stored.inserted_at.timestamp(), 2_000);

        let summary = store.summary().await.unwrap();
        assert_eq!(summary.total_records(), 1);
    }

    #[tokio::test]
    async fn test_same_key_different_collections_do_not_collide() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let month = Period::month(2025, 7).unwrap();

        for kind in [ReportKind::InvoicesByMonth, ReportKind::InvoicesByBranch] {
            let unit = ReportUnit::new(month, kind);
            store.save(&record_for(&unit, 1)).await.unwrap();
        }

        let summary = store.summary().await.unwrap();
        assert_eq!(summary.total_records(), 2);
    }

    #[tokio::test]
    async fn test_missing_units_gap_detection() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let kinds = [ReportKind::Totals, ReportKind::Standard];
        let periods = [day(1), day(2), day(3)];

        // Day 1 fully present, day 2 half present, day 3 empty.
        store
            .save(&record_for(&ReportUnit::new(day(1), ReportKind::Totals), 1))
            .await
            .unwrap();
        store
            .save(&record_for(&ReportUnit::new(day(1), ReportKind::Standard), 1))
            .await
            .unwrap();
        store
            .save(&record_for(&ReportUnit::new(day(2), ReportKind::Totals), 1))
            .await
            .unwrap();

        let missing = store.missing_units(&kinds, &periods).await.unwrap();
        let keys: Vec<String> = missing.iter().map(|u| u.natural_key()).collect();
        assert_eq!(
            keys,
            [
                "2025-07-02-standard",
                "2025-07-03-totals",
                "2025-07-03-standard",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_units_orders_periods_ascending() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let missing = store
            .missing_units(&[ReportKind::Totals], &[day(3), day(1), day(2)])
            .await
            .unwrap();
        let keys: Vec<String> = missing.iter().map(|u| u.period.key()).collect();
        assert_eq!(keys, ["2025-07-01", "2025-07-02", "2025-07-03"]);
    }

    #[tokio::test]
    async fn test_completeness_monotonicity() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let unit = ReportUnit::new(day(5), ReportKind::EightColumns);

        store.save(&record_for(&unit, 1)).await.unwrap();
        for _ in 0..3 {
            let missing = store
                .missing_units(&[ReportKind::EightColumns], &[day(5)])
                .await
                .unwrap();
            assert!(missing.is_empty());
        }
    }

    #[tokio::test]
    async fn test_empty_missing_implies_all_present() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let kinds = [ReportKind::Totals, ReportKind::Standard];
        let periods = [day(1), day(2)];

        for period in &periods {
            for kind in &kinds {
                store
                    .save(&record_for(&ReportUnit::new(*period, *kind), 1))
                    .await
                    .unwrap();
            }
        }

        let missing = store.missing_units(&kinds, &periods).await.unwrap();
        assert!(missing.is_empty());
        for period in &periods {
            for kind in &kinds {
                assert!(store.exists(&ReportUnit::new(*period, *kind)).await.unwrap());
            }
        }
    }

    #[tokio::test]
    async fn test_existing_periods_sorted_distinct() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        for d in [3, 1, 2] {
            let unit = ReportUnit::new(day(d), ReportKind::Totals);
            store.save(&record_for(&unit, 1)).await.unwrap();
        }
        // Re-write one to check DISTINCT
        let unit = ReportUnit::new(day(2), ReportKind::Totals);
        store.save(&record_for(&unit, 9)).await.unwrap();

        let periods = store.existing_periods(ReportKind::Totals).await.unwrap();
        assert_eq!(periods, ["2025-07-01", "2025-07-02", "2025-07-03"]);
    }

    #[tokio::test]
    async fn test_backfill_provenance_only_touches_null_rows() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();

        // A legacy document without provenance.
        store
            .save_document(
                "balance_totals",
                "2025-06-01-totals",
                "2025-06-01",
                "totals",
                &json!([{"a": 1}]),
            )
            .await
            .unwrap();
        // A tagged record.
        let unit = ReportUnit::new(day(1), ReportKind::Totals);
        let mut rec = record_for(&unit, 1);
        rec.provenance = Provenance::Backfill;
        store.save(&rec).await.unwrap();

        let updated = store
            .backfill_provenance(&[ReportKind::Totals])
            .await
            .unwrap();
        assert_eq!(updated, 1);

        // Tagged record untouched.
        let stored = store.load(&unit).await.unwrap().unwrap();
        assert_eq!(stored.provenance, Some(Provenance::Backfill));

        // Second run is a no-op.
        let updated = store
            .backfill_provenance(&[ReportKind::Totals])
            .await
            .unwrap();
        assert_eq!(updated, 0);
    }

    #[tokio::test]
    async fn test_fix_month_names_rewrites_raw_keys() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let month = Period::month(2025, 1).unwrap();
        let unit = ReportUnit::new(month, ReportKind::InvoicesByMonth);

        let mut rec = record_for(&unit, 1);
        rec.month_name = Some("2025-01".to_string()); // stale raw key
        store.save(&rec).await.unwrap();

        let updated = store.fix_month_names().await.unwrap();
        assert_eq!(updated, 1);

        let stored = store.load(&unit).await.unwrap().unwrap();
        assert_eq!(stored.month_name.as_deref(), Some("Enero"));

        // Already-fixed names are left alone.
        let updated = store.fix_month_names().await.unwrap();
        assert_eq!(updated, 0);
    }

    #[tokio::test]
    async fn test_fix_month_names_ignores_daily_collections() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let unit = ReportUnit::new(day(1), ReportKind::Totals);
        store.save(&record_for(&unit, 1)).await.unwrap();

        let updated = store.fix_month_names().await.unwrap();
        assert_eq!(updated, 0);
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();

        let run_id = store.start_run().await.unwrap();
        assert!(run_id > 0);

        let stats = RunStats {
            units_succeeded: 5,
            units_skipped: 1,
            units_failed: 2,
            units_remaining: 2,
            interrupted: false,
        };
        store.complete_run(run_id, &stats).await.unwrap();

        let summary = store.summary().await.unwrap();
        assert!(summary.last_run_started.is_some());
        assert!(summary.last_run_completed.is_some());
    }

    #[tokio::test]
    async fn test_open_creates_db_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.db");
        let _store = SqliteDocumentStore::open(&path).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_payload_round_trips_through_store() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let unit = ReportUnit::new(day(1), ReportKind::EightColumns);
        let payload = vec![
            json!({"accountCode": "1101", "asset": 1500.0, "liability": 0.0}),
            json!({"accountCode": "2101", "asset": 0.0, "liability": 900.5}),
        ];
        let rec = SyncRecord::from_fetch(&unit, payload.clone(), Provenance::Manual);
        store.save(&rec).await.unwrap();

        let stored = store.load(&unit).await.unwrap().unwrap();
        assert_eq!(stored.payload, Value::Array(payload));
    }
}
