//! ledgersync — pulls time-indexed accounting reports (balance sheets,
//! invoice aggregates) from a remote API and persists each one exactly once
//! per period into a local document store.
//!
//! The engine is stateless across invocations: completeness is recomputed
//! from the store itself, so daily jobs, manual runs, and long historical
//! backfills all converge by re-invocation, never re-processing completed
//! work and never needing a progress cursor.

#![warn(clippy::all)]

mod api;
mod cli;
mod config;
mod ledger;
mod period;
mod report;
mod shutdown;
mod store;
mod sync;

use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Local, NaiveDate};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, ConnectionArgs, MigrateCommand, TuningArgs};
use config::Config;
use period::{Period, PeriodRange};
use report::{Granularity, Provenance, ReportKind};
use store::{DocumentStore, SqliteDocumentStore};
use sync::{RunSummary, SyncEngine, SyncPlan};

/// Exit code when progress was expected but none was made. Distinct from
/// hard failures (exit 1: bad configuration, authentication exhausted,
/// store unreachable) so a scheduler can tell "re-invoke later" from
/// "operator needed". Forward progress — even partial — exits 0.
const EXIT_NO_PROGRESS: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Status => {
            let store = open_store(&cli.connection).await?;
            run_status(&store).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Dates => {
            let store = open_store(&cli.connection).await?;
            run_dates(&store).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Ledger(args) => {
            let store = open_store(&cli.connection).await?;
            run_ledger(&store, args.date).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Migrate(args) => {
            let store = open_store(&cli.connection).await?;
            run_migrate(&store, args.which).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Sync(ref args) => {
            let date = match args.date {
                Some(d) => d,
                None => yesterday()?,
            };
            let plan = SyncPlan {
                periods: vec![Period::Day(date)],
                kinds: ReportKind::DAILY.to_vec(),
                provenance: args.provenance,
            };
            run_engine(&cli.connection, &cli.tuning, plan, 1, false).await
        }
        Command::Backfill(ref args) => {
            let range = PeriodRange::new(
                Period::Day(args.start_date),
                Period::Day(args.end_date),
            )?;
            let plan = SyncPlan {
                periods: range.periods(),
                kinds: ReportKind::DAILY.to_vec(),
                provenance: args.provenance,
            };
            run_engine(
                &cli.connection,
                &cli.tuning,
                plan,
                args.max_periods,
                args.whole_months,
            )
            .await
        }
        Command::Invoices(ref args) => {
            let range = parse_month_range(&args.start_month, &args.end_month)?;
            let kinds = if args.kinds.is_empty() {
                ReportKind::MONTHLY.to_vec()
            } else {
                ensure_granularity(&args.kinds, Granularity::Monthly)?;
                args.kinds.clone()
            };
            let plan = SyncPlan {
                periods: range.periods(),
                kinds,
                provenance: args.provenance,
            };
            run_engine(&cli.connection, &cli.tuning, plan, args.max_periods, false).await
        }
        Command::Run(ref args) => {
            let start: Period = args.start.parse()?;
            let end: Period = args.end.parse()?;
            let range = PeriodRange::new(start, end)?;
            let expected = match start {
                Period::Day(_) => Granularity::Daily,
                Period::Month { .. } => Granularity::Monthly,
            };
            ensure_granularity(&args.kinds, expected)?;
            let plan = SyncPlan {
                periods: range.periods(),
                kinds: args.kinds.clone(),
                provenance: args.provenance,
            };
            run_engine(&cli.connection, &cli.tuning, plan, args.max_periods, false).await
        }
    }
}

/// Open the store for operational commands that never touch the API.
async fn open_store(connection: &ConnectionArgs) -> anyhow::Result<SqliteDocumentStore> {
    let path = config::expand_tilde(&connection.store);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(SqliteDocumentStore::open(&path).await?)
}

/// Build the full stack and run one sync invocation.
async fn run_engine(
    connection: &ConnectionArgs,
    tuning: &TuningArgs,
    plan: SyncPlan,
    batch_size: usize,
    align_to_months: bool,
) -> anyhow::Result<ExitCode> {
    let config = Config::from_cli(connection, tuning)?;
    tracing::info!(
        periods = plan.periods.len(),
        kinds = plan.kinds.len(),
        batch_size,
        provenance = plan.provenance.as_str(),
        "Starting ledgersync"
    );

    if let Some(parent) = config.store_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store = Arc::new(SqliteDocumentStore::open(&config.store_path).await?);
    let session = Arc::new(api::ApiSession::new(&config)?);
    let shutdown_token = shutdown::install();

    let engine = SyncEngine::new(
        session,
        store,
        config.sync_options(batch_size, align_to_months),
        shutdown_token,
    );
    let summary = engine.run(&plan).await?;
    print_summary(&summary);

    if summary.total_missing == 0 || summary.made_progress() || summary.skipped > 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_NO_PROGRESS))
    }
}

fn print_summary(summary: &RunSummary) {
    println!("Run summary:");
    println!("  Missing before run:  {}", summary.total_missing);
    println!("  Succeeded:           {}", summary.succeeded);
    println!("  Already present:     {}", summary.skipped);
    println!("  Left for next run:   {}", summary.failed);
    println!("  Still missing:       {}", summary.remaining);
    if summary.interrupted {
        println!("  Interrupted by signal; remaining work resumes next invocation.");
    }
    if summary.complete() {
        println!();
        println!("All requested units are present. A recurring job for this");
        println!("range can be retired.");
    } else if summary.remaining > 0 {
        println!();
        println!(
            "{} unit(s) remain; the next invocation will continue from the store.",
            summary.remaining
        );
    }
}

/// Run the status command.
async fn run_status(store: &SqliteDocumentStore) -> anyhow::Result<()> {
    let summary = store.summary().await?;

    if summary.collections.is_empty() {
        println!("The store is empty. Run a sync first.");
        return Ok(());
    }

    println!("Collections:");
    for (name, count) in &summary.collections {
        println!("  {:<24} {}", name, count);
    }
    println!();
    println!("Total records: {}", summary.total_records());

    if let Some(started) = &summary.last_run_started {
        println!(
            "Last run started:   {}",
            started.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if let Some(completed) = &summary.last_run_completed {
        println!(
            "Last run completed: {}",
            completed.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    Ok(())
}

/// Run the dates command: per-period completeness table for the daily
/// balance collections, with gap detection over the observed range.
async fn run_dates(store: &SqliteDocumentStore) -> anyhow::Result<()> {
    let kinds = ReportKind::DAILY;

    // date -> presence flags, one per daily kind.
    let mut table: BTreeMap<String, [bool; 3]> = BTreeMap::new();
    for (i, kind) in kinds.iter().enumerate() {
        for period in store.existing_periods(*kind).await? {
            table.entry(period).or_default()[i] = true;
        }
    }

    if table.is_empty() {
        println!("No balance-sheet periods in the store yet.");
        return Ok(());
    }

    println!(
        "{:<12} {:>8} {:>9} {:>9}   Status",
        "Date", "Totals", "Standard", "8Columns"
    );
    let mut complete = 0usize;
    for (date, flags) in &table {
        let mark = |b: bool| if b { "x" } else { "-" };
        let status = if flags.iter().all(|b| *b) {
            complete += 1;
            "complete"
        } else {
            "partial"
        };
        println!(
            "{:<12} {:>8} {:>9} {:>9}   {}",
            date,
            mark(flags[0]),
            mark(flags[1]),
            mark(flags[2]),
            status
        );
    }

    println!();
    println!("Periods: {} total, {} complete", table.len(), complete);

    // Gap detection between the first and last observed date.
    let first = table.keys().next().expect("table is non-empty");
    let last = table.keys().next_back().expect("table is non-empty");
    let (Ok(first), Ok(last)) = (
        NaiveDate::parse_from_str(first, "%Y-%m-%d"),
        NaiveDate::parse_from_str(last, "%Y-%m-%d"),
    ) else {
        return Ok(());
    };

    let mut gaps: Vec<String> = Vec::new();
    let mut cursor = first;
    while cursor <= last {
        let key = cursor.format("%Y-%m-%d").to_string();
        if !table.contains_key(&key) {
            gaps.push(key);
        }
        cursor = cursor + Duration::days(1);
    }

    if gaps.is_empty() {
        println!("No gaps between {} and {}.", first, last);
    } else {
        println!(
            "Gaps: {} missing date(s) between {} and {} (first {}, last {})",
            gaps.len(),
            first,
            last,
            gaps[0],
            gaps[gaps.len() - 1]
        );
    }

    Ok(())
}

/// Run the ledger command.
async fn run_ledger(store: &SqliteDocumentStore, date: NaiveDate) -> anyhow::Result<()> {
    let report = ledger::generate_and_store(store, date).await?;

    println!("Balance report for {}:", date);
    println!("  Asset lines:       {}", report.assets.len());
    println!("  Liability lines:   {}", report.liabilities.len());
    println!("  Total assets:      {:.2}", report.totals.total_assets);
    println!("  Total liabilities: {:.2}", report.totals.total_liabilities);
    println!("  Result:            {:.2}", report.totals.total_equity);
    println!("  Balance check:     {:.2}", report.totals.balance_check);
    Ok(())
}

/// Run a store migration.
async fn run_migrate(
    store: &SqliteDocumentStore,
    which: MigrateCommand,
) -> anyhow::Result<()> {
    match which {
        MigrateCommand::Provenance => {
            let updated = store.backfill_provenance(&ReportKind::DAILY).await?;
            println!(
                "Stamped '{}' on {} record(s) without a provenance tag.",
                Provenance::Automatic.as_str(),
                updated
            );
        }
        MigrateCommand::MonthNames => {
            let updated = store.fix_month_names().await?;
            println!("Rewrote month display names on {} record(s).", updated);
        }
    }
    Ok(())
}

fn yesterday() -> anyhow::Result<NaiveDate> {
    Local::now()
        .date_naive()
        .pred_opt()
        .context("cannot compute yesterday's date")
}

fn parse_month_range(start: &str, end: &str) -> anyhow::Result<PeriodRange> {
    let start: Period = start.parse()?;
    let end: Period = end.parse()?;
    if !matches!(start, Period::Month { .. }) || !matches!(end, Period::Month { .. }) {
        anyhow::bail!("month range bounds must be YYYY-MM");
    }
    Ok(PeriodRange::new(start, end)?)
}

fn ensure_granularity(kinds: &[ReportKind], expected: Granularity) -> anyhow::Result<()> {
    for kind in kinds {
        if kind.granularity() != expected {
            anyhow::bail!(
                "report kind '{}' is keyed by {}, but the requested range is keyed by {}",
                kind.label(),
                granularity_name(kind.granularity()),
                granularity_name(expected),
            );
        }
    }
    Ok(())
}

fn granularity_name(g: Granularity) -> &'static str {
    match g {
        Granularity::Daily => "day",
        Granularity::Monthly => "month",
    }
}
