//! Document store for synchronized report data.
//!
//! One SQLite database plays the role of the document store: a `reports`
//! table keyed by (collection, doc id) with the payload as opaque JSON, and
//! a `sync_runs` audit table. The sync engine only ever talks to the
//! [`DocumentStore`] trait; completeness is recomputed from the store on
//! every query, which is what makes invocations resumable without a cursor.

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{DocumentStore, SqliteDocumentStore};
pub use error::StoreError;
pub use types::{RunStats, StoreSummary, StoredReport, SyncRecord};
