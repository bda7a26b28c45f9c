//! Types for the document store.

use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;

use crate::report::{month_display_name, Granularity, Provenance, ReportKind, ReportUnit};

/// The persisted artifact for one completed report unit.
///
/// Built in memory by the sync engine after a successful fetch, then written
/// with a single atomic replace-or-insert keyed on (collection, doc id).
#[derive(Debug, Clone)]
pub struct SyncRecord {
    /// Deterministic natural key within the collection.
    pub doc_id: String,
    /// Canonical period key (`YYYY-MM-DD` or `YYYY-MM`).
    pub period: String,
    /// Which report family the payload belongs to.
    pub kind: ReportKind,
    /// Number of records in the normalized payload.
    pub record_count: u64,
    /// When this record was built (superseded on every re-write).
    pub inserted_at: DateTime<Utc>,
    /// Which invocation mode produced the record.
    pub provenance: Provenance,
    /// Display name for monthly aggregates (`Julio`), absent for daily data.
    pub month_name: Option<String>,
    /// Opaque upstream payload, normalized to an array of records.
    pub payload: Value,
}

impl SyncRecord {
    /// Build a record for a fetched unit.
    pub fn from_fetch(unit: &ReportUnit, records: Vec<Value>, provenance: Provenance) -> Self {
        let month_name = match unit.kind.granularity() {
            Granularity::Monthly => {
                month_display_name(unit.period.first_day().month()).map(str::to_string)
            }
            Granularity::Daily => None,
        };
        Self {
            doc_id: unit.natural_key(),
            period: unit.period.key(),
            kind: unit.kind,
            record_count: records.len() as u64,
            inserted_at: Utc::now(),
            provenance,
            month_name,
            payload: Value::Array(records),
        }
    }
}

/// A record as read back from the store.
#[derive(Debug, Clone)]
pub struct StoredReport {
    pub doc_id: String,
    pub period: String,
    pub record_count: u64,
    pub inserted_at: DateTime<Utc>,
    /// NULL for records written before provenance tracking existed.
    pub provenance: Option<Provenance>,
    pub month_name: Option<String>,
    pub payload: Value,
}

/// Counters recorded for one sync invocation (audit only — never consulted
/// to decide what work remains).
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub units_succeeded: u64,
    pub units_skipped: u64,
    pub units_failed: u64,
    pub units_remaining: u64,
    pub interrupted: bool,
}

/// Snapshot of store contents for the `status` command.
#[derive(Debug, Clone)]
pub struct StoreSummary {
    /// (collection, record count) pairs, sorted by collection name.
    pub collections: Vec<(String, u64)>,
    pub last_run_started: Option<DateTime<Utc>>,
    pub last_run_completed: Option<DateTime<Utc>>,
}

impl StoreSummary {
    pub fn total_records(&self) -> u64 {
        self.collections.iter().map(|(_, n)| n).sum()
    }
}
