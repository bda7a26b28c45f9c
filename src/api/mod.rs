//! Upstream accounting API client.
//!
//! [`ApiSession`] owns the bearer credential and performs one bounded-timeout
//! request per (report kind, period). It never retries and never writes:
//! retry budgets, pacing, and credential-renewal cadence all live in the
//! sync engine, which drives this client through the [`ReportSource`] trait.

pub mod error;
pub mod token;

pub use error::ApiError;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::period::Period;
use crate::report::{Granularity, ReportKind, TimeoutClass};

/// Timeout for the credential endpoint. Login is cheap; report fetches get
/// the long per-kind timeouts instead.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of report data, as seen by the sync engine.
///
/// Object-safe so the engine can be driven by a stub in tests.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Obtain (or replace) the bearer credential. One attempt; the caller
    /// owns retry policy.
    async fn acquire(&self) -> Result<(), ApiError>;

    /// Fetch one report unit's payload, normalized to a sequence of records.
    /// Exactly one outbound call per invocation.
    async fn fetch(&self, kind: ReportKind, period: &Period) -> Result<Vec<Value>, ApiError>;
}

/// HTTP session against the accounting API.
pub struct ApiSession {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    tenant_id: String,
    fetch_timeout: Duration,
    bulk_fetch_timeout: Duration,
    /// Current bearer credential, opaque. Replaced wholesale on renewal.
    token: RwLock<Option<String>>,
}

impl std::fmt::Debug for ApiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSession")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

impl ApiSession {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            username: config.api_username.clone(),
            password: config.api_password.clone(),
            tenant_id: config.tenant_id.clone(),
            fetch_timeout: config.fetch_timeout,
            bulk_fetch_timeout: config.bulk_fetch_timeout,
            token: RwLock::new(None),
        })
    }

    fn timeout_for(&self, kind: ReportKind) -> Duration {
        match kind.timeout_class() {
            TimeoutClass::Standard => self.fetch_timeout,
            TimeoutClass::Bulk => self.bulk_fetch_timeout,
        }
    }

    /// Query parameters for one report request.
    ///
    /// Daily balance kinds take a single `dateTo` plus the flags the
    /// dashboards rely on; monthly aggregates take the month's first and
    /// last day as `dateFrom`/`dateTo`.
    fn query_params(kind: ReportKind, period: &Period) -> Vec<(&'static str, String)> {
        match kind.granularity() {
            Granularity::Daily => vec![
                ("dateTo", period.key()),
                ("showAccountsWithZeroBalance", "true".to_string()),
                ("showOnlyAccountsWithActivity", "false".to_string()),
            ],
            Granularity::Monthly => vec![
                ("dateFrom", period.first_day().format("%Y-%m-%d").to_string()),
                ("dateTo", period.last_day().format("%Y-%m-%d").to_string()),
            ],
        }
    }
}

#[async_trait]
impl ReportSource for ApiSession {
    async fn acquire(&self) -> Result<(), ApiError> {
        let url = format!("{}/security/login", self.base_url);
        tracing::info!(url = %url, "Acquiring credential");

        let body = json!({
            "userName": self.username,
            "password": self.password,
            "companyVATId": self.tenant_id,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(LOGIN_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Auth(format!(
                "credential endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let text = response.text().await?;
        let (token, shape) = token::extract_token(&text)
            .ok_or_else(|| ApiError::Auth("empty token in credential response".to_string()))?;

        tracing::debug!(shape = ?shape, length = token.len(), "Credential acquired");
        *self.token.write().await = Some(token);
        Ok(())
    }

    async fn fetch(&self, kind: ReportKind, period: &Period) -> Result<Vec<Value>, ApiError> {
        let token = self
            .token
            .read()
            .await
            .clone()
            .ok_or(ApiError::NoCredential)?;

        let url = format!("{}{}", self.base_url, kind.path());
        tracing::debug!(kind = kind.label(), period = %period, url = %url, "Fetching report");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .query(&Self::query_params(kind, period))
            .timeout(self.timeout_for(kind))
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = response.json().await?;
        Ok(normalize_payload(payload))
    }
}

/// Normalize a payload to an ordered sequence of records: arrays pass
/// through, a single object is wrapped in a one-element sequence.
pub fn normalize_payload(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_array_passes_through() {
        let records = normalize_payload(json!([{"a": 1}, {"a": 2}]));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_normalize_wraps_single_object() {
        let records = normalize_payload(json!({"total": 100}));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["total"], 100);
    }

    #[test]
    fn test_normalize_empty_array() {
        assert!(normalize_payload(json!([])).is_empty());
    }

    #[test]
    fn test_daily_params_use_date_to_only() {
        let period = Period::day(2025, 7, 1).unwrap();
        let params = ApiSession::query_params(ReportKind::Totals, &period);
        assert_eq!(params[0], ("dateTo", "2025-07-01".to_string()));
        assert!(params
            .iter()
            .any(|(k, v)| *k == "showAccountsWithZeroBalance" && v == "true"));
    }

    #[test]
    fn test_monthly_params_span_the_month() {
        let period = Period::month(2025, 2).unwrap();
        let params = ApiSession::query_params(ReportKind::InvoicesByMonth, &period);
        assert_eq!(params[0], ("dateFrom", "2025-02-01".to_string()));
        assert_eq!(params[1], ("dateTo", "2025-02-28".to_string()));
    }
}
