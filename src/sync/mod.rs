//! The incremental synchronization engine.
//!
//! Given a target period range and report kinds, the engine determines which
//! (period, kind) units are missing from the store, then drives a strictly
//! sequential fetch/persist cycle over a bounded batch of periods: per-unit
//! retries with fixed backoff, pacing sleeps between calls to stay under
//! upstream rate limits, and scheduled credential renewal. Whatever is not
//! completed stays missing and is picked up by the next invocation —
//! completeness is always recomputed from the store, so there is no cursor
//! to corrupt.

pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, ReportSource};
use crate::period::Period;
use crate::report::{Provenance, ReportKind, ReportUnit};
use crate::store::{DocumentStore, RunStats, StoreError, SyncRecord};
use self::retry::RetryPolicy;

/// Tunables for one invocation. All delays may be zero (tests run with every
/// delay zeroed).
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum periods processed per invocation (bounded worst-case runtime).
    pub batch_size: usize,
    /// Total fetch-then-persist attempts per unit.
    pub unit_attempts: u32,
    /// Fixed backoff between attempts on the same unit.
    pub retry_delay: Duration,
    /// Pacing between report kinds within one period.
    pub kind_pacing: Duration,
    /// Pacing between successive periods.
    pub period_pacing: Duration,
    /// Attempts to acquire a credential before the run is declared fatal.
    pub auth_attempts: u32,
    /// Fixed backoff between credential attempts.
    pub auth_retry_delay: Duration,
    /// Renew the credential after this many processed periods (0 = never).
    pub renew_every: usize,
    /// Count the batch ceiling in whole calendar months instead of periods:
    /// the first `batch_size` months containing missing days are expanded
    /// into their day periods. Long historical backfills use this to finish
    /// one month per invocation.
    pub align_to_months: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: 7,
            unit_attempts: 3,
            retry_delay: Duration::from_secs(300),
            kind_pacing: Duration::from_secs(120),
            period_pacing: Duration::from_secs(60),
            auth_attempts: 3,
            auth_retry_delay: Duration::from_secs(300),
            renew_every: 5,
            align_to_months: false,
        }
    }
}

/// What one invocation should cover.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub periods: Vec<Period>,
    pub kinds: Vec<ReportKind>,
    pub provenance: Provenance,
}

/// Outcome of one invocation. Always produced unless the run failed fatally.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Missing units across the whole requested range, before this run.
    pub total_missing: usize,
    /// Units fetched and persisted by this run.
    pub succeeded: usize,
    /// Units selected into the batch but found present at processing time
    /// (filled by a concurrent or earlier writer).
    pub skipped: usize,
    /// Units that exhausted their retry budget and remain missing.
    pub failed: usize,
    /// Missing units left for the next invocation.
    pub remaining: usize,
    /// Whether a shutdown signal cut the batch short.
    pub interrupted: bool,
}

impl RunSummary {
    /// Every requested unit has a persisted record. This is the terminal
    /// signal that a recurring backfill job can be retired.
    pub fn complete(&self) -> bool {
        self.remaining == 0 && !self.interrupted
    }

    pub fn made_progress(&self) -> bool {
        self.succeeded > 0
    }

    fn stats(&self) -> RunStats {
        RunStats {
            units_succeeded: self.succeeded as u64,
            units_skipped: self.skipped as u64,
            units_failed: self.failed as u64,
            units_remaining: self.remaining as u64,
            interrupted: self.interrupted,
        }
    }
}

/// Failures that abort the invocation outright. Everything else is a
/// per-unit outcome that leaves work for the next run.
#[derive(Error, Debug)]
pub enum SyncFatal {
    #[error("authentication failed after {attempts} attempt(s): {source}")]
    Auth { attempts: u32, source: ApiError },

    #[error("document store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// A single unit's failure, for logging. Fetch and persist failures get the
/// same retry treatment.
#[derive(Error, Debug)]
enum UnitError {
    #[error("fetch failed: {0}")]
    Fetch(ApiError),
    #[error("persist failed: {0}")]
    Persist(StoreError),
}

pub struct SyncEngine {
    source: Arc<dyn ReportSource>,
    store: Arc<dyn DocumentStore>,
    options: SyncOptions,
    shutdown: CancellationToken,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn ReportSource>,
        store: Arc<dyn DocumentStore>,
        options: SyncOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            store,
            options,
            shutdown,
        }
    }

    /// Run one bounded invocation of the fetch/persist cycle.
    pub async fn run(&self, plan: &SyncPlan) -> Result<RunSummary, SyncFatal> {
        self.acquire_credential().await?;

        let missing = self
            .store
            .missing_units(&plan.kinds, &plan.periods)
            .await?;

        let mut summary = RunSummary {
            total_missing: missing.len(),
            ..Default::default()
        };

        if missing.is_empty() {
            tracing::info!(
                periods = plan.periods.len(),
                kinds = plan.kinds.len(),
                "All requested units are present; nothing to do"
            );
            return Ok(summary);
        }

        // Oldest first: completing older gaps first keeps the historical
        // record filling in monotonically.
        let by_period = group_by_period(&missing);
        let batch = select_batch(by_period, self.options.batch_size, self.options.align_to_months);

        let first_period = batch[0].0;
        let last_period = batch[batch.len() - 1].0;
        tracing::info!(
            missing = missing.len(),
            batch_periods = batch.len(),
            first = %first_period,
            last = %last_period,
            "Selected batch"
        );

        let run_id = self.store.start_run().await?;

        'batch: for (index, (period, kinds)) in batch.iter().enumerate() {
            if self.shutdown.is_cancelled() {
                summary.interrupted = true;
                break;
            }

            if index > 0 {
                self.pace(self.options.period_pacing).await;
            }

            // Scheduled, not reactive: upstream expiry is not reliably
            // observable from error codes, so renew on a period cadence.
            if self.options.renew_every > 0
                && index > 0
                && index % self.options.renew_every == 0
            {
                tracing::info!("Renewing credential (scheduled)");
                if let Err(e) = self.acquire_credential().await {
                    tracing::error!("Credential renewal failed, deferring remaining work: {e}");
                    break;
                }
            }

            let mut fetched_in_period = false;
            for kind in kinds {
                if self.shutdown.is_cancelled() {
                    summary.interrupted = true;
                    break 'batch;
                }
                let unit = ReportUnit::new(*period, *kind);

                // Re-check right before processing: an earlier invocation or
                // an external writer may have filled the unit since batch
                // selection. Present units are skipped without consuming a
                // fetch attempt.
                if self.store.exists(&unit).await? {
                    tracing::info!(
                        period = %unit.period,
                        kind = unit.kind.label(),
                        "Unit already present, skipping"
                    );
                    summary.skipped += 1;
                    continue;
                }

                if fetched_in_period {
                    self.pace(self.options.kind_pacing).await;
                }
                fetched_in_period = true;

                match self.process_unit(&unit, plan.provenance).await {
                    Ok(record_count) => {
                        tracing::info!(
                            period = %unit.period,
                            kind = unit.kind.label(),
                            records = record_count,
                            "Unit persisted"
                        );
                        summary.succeeded += 1;
                    }
                    Err(e) => {
                        // No terminal per-unit failure state: the unit simply
                        // stays missing for the next invocation.
                        tracing::warn!(
                            period = %unit.period,
                            kind = unit.kind.label(),
                            "Unit left missing after {} attempt(s): {e}",
                            self.options.unit_attempts.max(1),
                        );
                        summary.failed += 1;
                    }
                }
            }
        }

        summary.remaining = summary
            .total_missing
            .saturating_sub(summary.succeeded + summary.skipped);

        // Audit record only; a failure here must not fail the run.
        if let Err(e) = self.store.complete_run(run_id, &summary.stats()).await {
            tracing::warn!("Failed to record run summary: {e}");
        }

        tracing::info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            remaining = summary.remaining,
            complete = summary.complete(),
            "Run finished"
        );

        Ok(summary)
    }

    /// One unit: fetch then persist, both within the shared retry budget.
    async fn process_unit(
        &self,
        unit: &ReportUnit,
        provenance: Provenance,
    ) -> Result<u64, UnitError> {
        let policy = RetryPolicy {
            max_attempts: self.options.unit_attempts,
            delay: self.options.retry_delay,
        };
        retry::with_retries(&policy, &self.shutdown, || async {
            let records = self
                .source
                .fetch(unit.kind, &unit.period)
                .await
                .map_err(UnitError::Fetch)?;
            let record = SyncRecord::from_fetch(unit, records, provenance);
            let count = record.record_count;
            self.store.save(&record).await.map_err(UnitError::Persist)?;
            Ok(count)
        })
        .await
    }

    /// Acquire (or renew) the credential with the outer retry policy.
    async fn acquire_credential(&self) -> Result<(), SyncFatal> {
        let policy = RetryPolicy {
            max_attempts: self.options.auth_attempts,
            delay: self.options.auth_retry_delay,
        };
        retry::with_retries(&policy, &self.shutdown, || self.source.acquire())
            .await
            .map_err(|source| SyncFatal::Auth {
                attempts: policy.max_attempts.max(1),
                source,
            })
    }

    async fn pace(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }
}

/// Group an ascending unit list into (period, kinds) rows, preserving order.
fn group_by_period(units: &[ReportUnit]) -> Vec<(Period, Vec<ReportKind>)> {
    let mut out: Vec<(Period, Vec<ReportKind>)> = Vec::new();
    for unit in units {
        match out.last_mut() {
            Some((period, kinds)) if *period == unit.period => kinds.push(unit.kind),
            _ => out.push((unit.period, vec![unit.kind])),
        }
    }
    out
}

/// Bound the batch. Period-counted by default; month-aligned ceilings expand
/// the first `limit` months containing missing periods into their days and
/// keep the missing periods that fall inside them.
fn select_batch(
    by_period: Vec<(Period, Vec<ReportKind>)>,
    limit: usize,
    align_to_months: bool,
) -> Vec<(Period, Vec<ReportKind>)> {
    let limit = limit.max(1);
    if !align_to_months {
        return by_period.into_iter().take(limit).collect();
    }

    let mut months: Vec<Period> = Vec::new();
    for (period, _) in &by_period {
        let month = period.containing_month();
        if months.last() != Some(&month) {
            months.push(month);
        }
    }
    months.truncate(limit);

    let allowed: std::collections::HashSet<Period> =
        months.iter().flat_map(|month| month.days()).collect();
    let aligned: Vec<(Period, Vec<ReportKind>)> = by_period
        .iter()
        .filter(|(period, _)| allowed.contains(period))
        .cloned()
        .collect();
    if aligned.is_empty() {
        // Month-granularity periods don't decompose into themselves; fall
        // back to the plain period-counted ceiling.
        by_period.into_iter().take(limit).collect()
    } else {
        aligned
    }
}
