//! Derived balance report.
//!
//! Transforms a stored 8-column balance into a structured balance sheet and
//! writes it back to the store. Pure transformation over already-synchronized
//! data — the upstream API is never touched.
//!
//! The upstream 8-column convention reports equity accounts inside the
//! liability column; without a chart of accounts they cannot be split out,
//! so the liabilities section is really "liabilities and equity" and the
//! equity section carries only the computed result of the exercise.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::period::Period;
use crate::report::{ReportKind, ReportUnit};
use crate::store::{DocumentStore, StoreError};

/// Collection holding generated balance reports.
const COLLECTION: &str = "balance_general";

#[derive(Error, Debug)]
pub enum LedgerError {
    /// The 8-column balance for the requested date has not been synchronized.
    #[error("no 8-column balance stored for {0}")]
    MissingSource(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One account line in the generated report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountLine {
    pub account_code: String,
    pub account_name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceTotals {
    pub total_assets: f64,
    pub total_liabilities: f64,
    pub total_equity: f64,
    /// assets − (liabilities + equity); 0 when the report balances.
    pub balance_check: f64,
}

/// Structured balance sheet derived from one day's 8-column balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceReport {
    pub assets: Vec<AccountLine>,
    /// Includes equity accounts, per the 8-column convention.
    pub liabilities: Vec<AccountLine>,
    /// The computed result of the exercise only.
    pub equity: Vec<AccountLine>,
    pub totals: BalanceTotals,
}

/// Build the structured report from 8-column account records.
///
/// Accounts with a positive asset balance land in assets, positive liability
/// balances in liabilities; the difference is the result of the exercise and
/// becomes the single equity line that makes the sheet balance.
pub fn build_balance_report(accounts: &[Value]) -> BalanceReport {
    let mut assets = Vec::new();
    let mut liabilities = Vec::new();
    let mut total_assets = 0.0;
    let mut total_liabilities = 0.0;

    for account in accounts {
        let code = account
            .get("accountCode")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let name = account
            .get("accountName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let asset = account.get("asset").and_then(Value::as_f64).unwrap_or(0.0);
        let liability = account
            .get("liability")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        if asset > 0.0 {
            assets.push(AccountLine {
                account_code: code.clone(),
                account_name: name.clone(),
                amount: asset,
            });
            total_assets += asset;
        }
        if liability > 0.0 {
            liabilities.push(AccountLine {
                account_code: code,
                account_name: name,
                amount: liability,
            });
            total_liabilities += liability;
        }
    }

    assets.sort_by(|a, b| a.account_code.cmp(&b.account_code));
    liabilities.sort_by(|a, b| a.account_code.cmp(&b.account_code));

    let result_of_exercise = total_assets - total_liabilities;
    let equity = vec![AccountLine {
        account_code: "RES-EJER".to_string(),
        account_name: "Resultado del Ejercicio".to_string(),
        amount: result_of_exercise,
    }];

    BalanceReport {
        assets,
        liabilities,
        equity,
        totals: BalanceTotals {
            total_assets,
            total_liabilities,
            total_equity: result_of_exercise,
            balance_check: total_assets - (total_liabilities + result_of_exercise),
        },
    }
}

/// Generate the report for a date from the store and write it back under
/// `"{date}-General"` with the usual replace-or-insert semantics.
pub async fn generate_and_store(
    store: &dyn DocumentStore,
    date: NaiveDate,
) -> Result<BalanceReport, LedgerError> {
    let period = Period::Day(date);
    let unit = ReportUnit::new(period, ReportKind::EightColumns);

    let source = store
        .load(&unit)
        .await?
        .ok_or_else(|| LedgerError::MissingSource(period.key()))?;

    tracing::info!(
        source_doc = %source.doc_id,
        date = %source.period,
        records = source.record_count,
        fetched_at = %source.inserted_at,
        provenance = source.provenance.map(|p| p.as_str()).unwrap_or("untagged"),
        "Building balance report from stored 8-column balance"
    );

    let accounts: Vec<Value> = match source.payload {
        Value::Array(items) => items,
        other => vec![other],
    };
    let report = build_balance_report(&accounts);

    let document = json!({
        "date": period.key(),
        "generatedAt": Utc::now().to_rfc3339(),
        "source": ReportKind::EightColumns.collection(),
        "assets": report.assets,
        "liabilities": report.liabilities,
        "equity": report.equity,
        "totals": report.totals,
    });

    let doc_id = format!("{}-General", period.key());
    store
        .save_document(COLLECTION, &doc_id, &period.key(), "general", &document)
        .await?;

    Ok(report)
}
