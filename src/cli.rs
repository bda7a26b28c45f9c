use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::report::{Provenance, ReportKind};

#[derive(Parser, Debug)]
#[command(
    name = "ledgersync",
    about = "Synchronize accounting reports from a remote API into a local document store"
)]
pub struct Cli {
    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub tuning: TuningArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Upstream API and store connection settings. Environment enters the
/// program only through these bindings.
#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// Accounting API base URL
    #[arg(long, env = "LEDGERSYNC_API_URL")]
    pub api_url: Option<String>,

    /// API user name
    #[arg(long, env = "LEDGERSYNC_API_USERNAME", default_value = "API")]
    pub api_username: String,

    /// API password.
    /// WARNING: passing via --api-password is visible in process listings.
    /// Prefer the LEDGERSYNC_API_PASSWORD environment variable instead.
    #[arg(long, env = "LEDGERSYNC_API_PASSWORD", hide_env_values = true)]
    pub api_password: Option<String>,

    /// Upstream tenant identifier (company VAT id)
    #[arg(long, env = "LEDGERSYNC_TENANT_ID", hide_env_values = true)]
    pub tenant_id: Option<String>,

    /// Path to the document store database
    #[arg(long, env = "LEDGERSYNC_STORE", default_value = "~/.ledgersync/reports.db")]
    pub store: String,
}

/// Timing and budget knobs shared by every sync profile.
#[derive(Args, Debug)]
pub struct TuningArgs {
    /// Request timeout for invoice aggregates, in seconds
    #[arg(long, default_value_t = 900)]
    pub fetch_timeout: u64,

    /// Request timeout for full balance-sheet dumps, in seconds
    #[arg(long, default_value_t = 1800)]
    pub bulk_fetch_timeout: u64,

    /// Total fetch attempts per report unit
    #[arg(long, default_value_t = 3)]
    pub unit_attempts: u32,

    /// Fixed delay between attempts on the same unit, in seconds
    #[arg(long, default_value_t = 300)]
    pub retry_delay: u64,

    /// Pause between report kinds within one period, in seconds
    #[arg(long, default_value_t = 120)]
    pub kind_pacing: u64,

    /// Pause between periods, in seconds
    #[arg(long, default_value_t = 60)]
    pub period_pacing: u64,

    /// Credential acquisition attempts before giving up
    #[arg(long, default_value_t = 3)]
    pub auth_attempts: u32,

    /// Fixed delay between credential attempts, in seconds
    #[arg(long, default_value_t = 300)]
    pub auth_retry_delay: u64,

    /// Renew the credential after this many processed periods (0 = never)
    #[arg(long, default_value_t = 5)]
    pub renew_every: usize,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Daily balance-sheet sync (yesterday unless --date is given)
    Sync(SyncArgs),

    /// Historical day-range backfill, bounded per invocation
    Backfill(BackfillArgs),

    /// Monthly invoice aggregates over a month range
    Invoices(InvoicesArgs),

    /// One-off sync over an explicit range and kind selection
    Run(RunArgs),

    /// Show store contents and the last run
    Status,

    /// Per-period completeness table for the daily balance collections
    Dates,

    /// Generate the structured balance report for a date
    Ledger(LedgerArgs),

    /// One-time store migrations
    Migrate(MigrateArgs),
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Target date (defaults to yesterday)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Provenance tag stamped on written records
    #[arg(long, value_enum, default_value = "automatic")]
    pub provenance: Provenance,
}

#[derive(Args, Debug)]
pub struct BackfillArgs {
    /// First day of the historical range
    #[arg(long, env = "LEDGERSYNC_BACKFILL_START")]
    pub start_date: NaiveDate,

    /// Last day of the historical range (inclusive)
    #[arg(long, env = "LEDGERSYNC_BACKFILL_END")]
    pub end_date: NaiveDate,

    /// Maximum days processed by this invocation (months when
    /// --whole-months is set)
    #[arg(long, env = "LEDGERSYNC_MAX_PERIODS", default_value_t = 7)]
    pub max_periods: usize,

    /// Count the ceiling in whole calendar months: each invocation finishes
    /// the oldest incomplete month(s) before stopping
    #[arg(long)]
    pub whole_months: bool,

    /// Provenance tag stamped on written records
    #[arg(long, value_enum, default_value = "backfill")]
    pub provenance: Provenance,
}

#[derive(Args, Debug)]
pub struct InvoicesArgs {
    /// First month of the range (YYYY-MM)
    #[arg(long)]
    pub start_month: String,

    /// Last month of the range (YYYY-MM, inclusive)
    #[arg(long)]
    pub end_month: String,

    /// Invoice kinds to fetch (default: all monthly kinds)
    #[arg(long = "kind", value_enum)]
    pub kinds: Vec<ReportKind>,

    /// Maximum months processed by this invocation
    #[arg(long, default_value_t = 12)]
    pub max_periods: usize,

    /// Provenance tag stamped on written records
    #[arg(long, value_enum, default_value = "automatic")]
    pub provenance: Provenance,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// First period of the range (YYYY-MM-DD or YYYY-MM)
    #[arg(long)]
    pub start: String,

    /// Last period of the range (inclusive, same granularity as --start)
    #[arg(long)]
    pub end: String,

    /// Report kinds to fetch (granularity must match the range)
    #[arg(long = "kind", value_enum, required = true)]
    pub kinds: Vec<ReportKind>,

    /// Maximum periods processed by this invocation
    #[arg(long, default_value_t = 7)]
    pub max_periods: usize,

    /// Provenance tag stamped on written records
    #[arg(long, value_enum, default_value = "manual")]
    pub provenance: Provenance,
}

#[derive(Args, Debug)]
pub struct LedgerArgs {
    /// Target date of the stored 8-column balance
    #[arg(long)]
    pub date: NaiveDate,
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub which: MigrateCommand,
}

#[derive(Subcommand, Debug)]
pub enum MigrateCommand {
    /// Stamp `automatic` provenance on legacy records missing a tag
    Provenance,

    /// Rewrite month display names stored as raw YYYY-MM keys
    MonthNames,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).unwrap()
    }

    #[test]
    fn test_sync_defaults() {
        let cli = parse(&["ledgersync", "sync"]);
        match cli.command {
            Command::Sync(args) => {
                assert!(args.date.is_none());
                assert_eq!(args.provenance, Provenance::Automatic);
            }
            _ => panic!("expected sync command"),
        }
        assert_eq!(cli.tuning.unit_attempts, 3);
        assert_eq!(cli.tuning.retry_delay, 300);
    }

    #[test]
    fn test_backfill_parses_dates_and_ceiling() {
        let cli = parse(&[
            "ledgersync",
            "backfill",
            "--start-date",
            "2025-01-01",
            "--end-date",
            "2025-09-30",
            "--max-periods",
            "31",
        ]);
        match cli.command {
            Command::Backfill(args) => {
                assert_eq!(
                    args.start_date,
                    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
                );
                assert_eq!(args.max_periods, 31);
                assert_eq!(args.provenance, Provenance::Backfill);
            }
            _ => panic!("expected backfill command"),
        }
    }

    #[test]
    fn test_run_kind_selection() {
        let cli = parse(&[
            "ledgersync",
            "run",
            "--start",
            "2025-01-01",
            "--end",
            "2025-01-03",
            "--kind",
            "totals",
            "--kind",
            "8-columns",
        ]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(
                    args.kinds,
                    vec![ReportKind::Totals, ReportKind::EightColumns]
                );
                assert_eq!(args.provenance, Provenance::Manual);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_run_requires_kind() {
        let result = Cli::try_parse_from([
            "ledgersync",
            "run",
            "--start",
            "2025-01-01",
            "--end",
            "2025-01-03",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_sync_rejects_bad_date() {
        let result = Cli::try_parse_from(["ledgersync", "sync", "--date", "not-a-date"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_migrate_subcommands() {
        let cli = parse(&["ledgersync", "migrate", "month-names"]);
        match cli.command {
            Command::Migrate(args) => {
                assert!(matches!(args.which, MigrateCommand::MonthNames));
            }
            _ => panic!("expected migrate command"),
        }
    }
}
