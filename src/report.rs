//! Report kinds, provenance tags, and the unit of synchronization work.

use crate::period::Period;

/// Which upstream report family a period's data belongs to.
///
/// Each kind maps to one upstream endpoint and one store collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ReportKind {
    /// Balance sheet totals per account group.
    Totals,
    /// Standard balance sheet.
    Standard,
    /// 8-column balance sheet (full line-item dump).
    #[value(name = "8-columns")]
    EightColumns,
    /// Sales invoices aggregated by month.
    InvoicesByMonth,
    /// Sales invoices aggregated by branch.
    InvoicesByBranch,
    /// Sales invoices aggregated by salesman.
    InvoicesBySalesman,
}

/// Whether a kind is keyed by day or by month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Daily,
    Monthly,
}

/// Which configured request timeout applies to a kind.
///
/// Full balance-sheet dumps can return tens of thousands of line items and
/// need a much longer timeout than the small invoice aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    Standard,
    Bulk,
}

impl ReportKind {
    /// The daily balance-sheet kinds, in upstream processing order.
    pub const DAILY: [ReportKind; 3] = [
        ReportKind::Totals,
        ReportKind::Standard,
        ReportKind::EightColumns,
    ];

    /// The monthly invoice-aggregate kinds.
    pub const MONTHLY: [ReportKind; 3] = [
        ReportKind::InvoicesByMonth,
        ReportKind::InvoicesByBranch,
        ReportKind::InvoicesBySalesman,
    ];

    /// Label used in natural keys and the `report_kind` column.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Totals => "totals",
            Self::Standard => "standard",
            Self::EightColumns => "8Columns",
            Self::InvoicesByMonth => "invoicesByMonth",
            Self::InvoicesByBranch => "invoicesByBranch",
            Self::InvoicesBySalesman => "invoicesBySalesman",
        }
    }

    /// Parse the label stored in the database.
    #[allow(dead_code)] // Symmetric with label(); used in tests
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "totals" => Some(Self::Totals),
            "standard" => Some(Self::Standard),
            "8Columns" => Some(Self::EightColumns),
            "invoicesByMonth" => Some(Self::InvoicesByMonth),
            "invoicesByBranch" => Some(Self::InvoicesByBranch),
            "invoicesBySalesman" => Some(Self::InvoicesBySalesman),
            _ => None,
        }
    }

    /// Upstream REST path, relative to the API base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Totals => "/accounting/balanceSheet/totals",
            Self::Standard => "/accounting/balanceSheet/standard",
            Self::EightColumns => "/accounting/balanceSheet/8Columns",
            Self::InvoicesByMonth => "/reports/sales/invoices/byMonth",
            Self::InvoicesByBranch => "/reports/sales/invoices/byBranch",
            Self::InvoicesBySalesman => "/reports/sales/invoices/bySalesman",
        }
    }

    /// Store collection holding this kind's records.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Totals => "balance_totals",
            Self::Standard => "balance_standard",
            Self::EightColumns => "balance_8columns",
            Self::InvoicesByMonth => "invoices_by_month",
            Self::InvoicesByBranch => "invoices_by_branch",
            Self::InvoicesBySalesman => "invoices_by_salesman",
        }
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            Self::Totals | Self::Standard | Self::EightColumns => Granularity::Daily,
            Self::InvoicesByMonth | Self::InvoicesByBranch | Self::InvoicesBySalesman => {
                Granularity::Monthly
            }
        }
    }

    pub fn timeout_class(&self) -> TimeoutClass {
        match self.granularity() {
            Granularity::Daily => TimeoutClass::Bulk,
            Granularity::Monthly => TimeoutClass::Standard,
        }
    }
}

/// Which invocation mode produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Provenance {
    Automatic,
    Manual,
    Backfill,
}

impl Provenance {
    /// Convert to the string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Manual => "manual",
            Self::Backfill => "backfill",
        }
    }

    /// Parse from the string stored in the database.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "automatic" => Some(Self::Automatic),
            "manual" => Some(Self::Manual),
            "backfill" => Some(Self::Backfill),
            _ => None,
        }
    }
}

/// One (period, kind) pair — the atomic item of synchronization work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReportUnit {
    pub period: Period,
    pub kind: ReportKind,
}

impl ReportUnit {
    pub fn new(period: Period, kind: ReportKind) -> Self {
        Self { period, kind }
    }

    /// Deterministic document identifier for idempotent upserts.
    ///
    /// Daily kinds use `"{date}-{label}"`; monthly kinds use the month key
    /// alone since each kind writes to its own collection.
    pub fn natural_key(&self) -> String {
        match self.kind.granularity() {
            Granularity::Daily => format!("{}-{}", self.period.key(), self.kind.label()),
            Granularity::Monthly => self.period.key(),
        }
    }
}

/// Spanish display name for a month number, as the original dashboards expect.
pub fn month_display_name(month: u32) -> Option<&'static str> {
    match month {
        1 => Some("Enero"),
        2 => Some("Febrero"),
        3 => Some("Marzo"),
        4 => Some("Abril"),
        5 => Some("Mayo"),
        6 => Some("Junio"),
        7 => Some("Julio"),
        8 => Some("Agosto"),
        9 => Some("Septiembre"),
        10 => Some("Octubre"),
        11 => Some("Noviembre"),
        12 => Some("Diciembre"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_round_trip() {
        for kind in ReportKind::DAILY.into_iter().chain(ReportKind::MONTHLY) {
            assert_eq!(ReportKind::from_label(kind.label()), Some(kind));
        }
    }

    #[test]
    fn test_label_from_invalid() {
        assert_eq!(ReportKind::from_label("bogus"), None);
    }

    #[test]
    fn test_provenance_round_trip() {
        for tag in [
            Provenance::Automatic,
            Provenance::Manual,
            Provenance::Backfill,
        ] {
            assert_eq!(Provenance::from_str(tag.as_str()), Some(tag));
        }
        assert_eq!(Provenance::from_str("unknown"), None);
    }

    #[test]
    fn test_daily_natural_key_includes_label() {
        let unit = ReportUnit::new(
            Period::day(2025, 7, 1).unwrap(),
            ReportKind::EightColumns,
        );
        assert_eq!(unit.natural_key(), "2025-07-01-8Columns");
    }

    #[test]
    fn test_monthly_natural_key_is_month_alone() {
        let unit = ReportUnit::new(
            Period::month(2025, 7).unwrap(),
            ReportKind::InvoicesByMonth,
        );
        assert_eq!(unit.natural_key(), "2025-07");
    }

    #[test]
    fn test_timeout_class_split() {
        assert_eq!(ReportKind::EightColumns.timeout_class(), TimeoutClass::Bulk);
        assert_eq!(
            ReportKind::InvoicesByMonth.timeout_class(),
            TimeoutClass::Standard
        );
    }

    #[test]
    fn test_collections_are_distinct() {
        let mut names: Vec<&str> = ReportKind::DAILY
            .iter()
            .chain(ReportKind::MONTHLY.iter())
            .map(|k| k.collection())
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn test_month_display_name() {
        assert_eq!(month_display_name(7), Some("Julio"));
        assert_eq!(month_display_name(13), None);
    }
}
