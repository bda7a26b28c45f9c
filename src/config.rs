//! Application configuration.
//!
//! An explicit value object built from the CLI at startup and passed into
//! each component's constructor; no component reads ambient environment
//! state. Environment variables are consumed only by the clap bindings in
//! [`crate::cli`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cli::{ConnectionArgs, TuningArgs};
use crate::sync::SyncOptions;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required connection field was supplied neither as a flag nor via
    /// its environment variable. Fatal before any network or store call.
    #[error("missing required configuration: {0}")]
    Missing(&'static str),
}

pub struct Config {
    pub api_base_url: String,
    pub api_username: String,
    pub api_password: String,
    pub tenant_id: String,
    pub store_path: PathBuf,

    pub fetch_timeout: Duration,
    pub bulk_fetch_timeout: Duration,

    pub unit_attempts: u32,
    pub retry_delay: Duration,
    pub kind_pacing: Duration,
    pub period_pacing: Duration,
    pub auth_attempts: u32,
    pub auth_retry_delay: Duration,
    pub renew_every: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field("api_username", &self.api_username)
            .field("api_password", &"<redacted>")
            .field("tenant_id", &"<redacted>")
            .field("store_path", &self.store_path)
            .finish_non_exhaustive()
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(
        connection: &ConnectionArgs,
        tuning: &TuningArgs,
    ) -> Result<Self, ConfigError> {
        let api_base_url = require(&connection.api_url, "api-url (LEDGERSYNC_API_URL)")?;
        let api_password = require(
            &connection.api_password,
            "api-password (LEDGERSYNC_API_PASSWORD)",
        )?;
        let tenant_id = require(&connection.tenant_id, "tenant-id (LEDGERSYNC_TENANT_ID)")?;

        Ok(Self {
            api_base_url,
            api_username: connection.api_username.clone(),
            api_password,
            tenant_id,
            store_path: expand_tilde(&connection.store),
            fetch_timeout: Duration::from_secs(tuning.fetch_timeout),
            bulk_fetch_timeout: Duration::from_secs(tuning.bulk_fetch_timeout),
            unit_attempts: tuning.unit_attempts,
            retry_delay: Duration::from_secs(tuning.retry_delay),
            kind_pacing: Duration::from_secs(tuning.kind_pacing),
            period_pacing: Duration::from_secs(tuning.period_pacing),
            auth_attempts: tuning.auth_attempts,
            auth_retry_delay: Duration::from_secs(tuning.auth_retry_delay),
            renew_every: tuning.renew_every,
        })
    }

    /// Engine tunables for one invocation with the given batch ceiling.
    pub fn sync_options(&self, batch_size: usize, align_to_months: bool) -> SyncOptions {
        SyncOptions {
            batch_size,
            unit_attempts: self.unit_attempts,
            retry_delay: self.retry_delay,
            kind_pacing: self.kind_pacing,
            period_pacing: self.period_pacing,
            auth_attempts: self.auth_attempts,
            auth_retry_delay: self.auth_retry_delay,
            renew_every: self.renew_every,
            align_to_months,
        }
    }
}

fn require(value: &Option<String>, name: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => Err(ConfigError::Missing(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn connection(overrides: impl FnOnce(&mut ConnectionArgs)) -> (ConnectionArgs, TuningArgs) {
        let cli = crate::cli::Cli::try_parse_from([
            "ledgersync",
            "--api-url",
            "https://api.example.test",
            "--api-password",
            "secret",
            "--tenant-id",
            "76123456-7",
            "status",
        ])
        .unwrap();
        let mut conn = cli.connection;
        overrides(&mut conn);
        (conn, cli.tuning)
    }

    #[test]
    fn test_from_cli_complete() {
        let (conn, tuning) = connection(|_| {});
        let config = Config::from_cli(&conn, &tuning).unwrap();
        assert_eq!(config.api_base_url, "https://api.example.test");
        assert_eq!(config.api_username, "API");
        assert_eq!(config.fetch_timeout, Duration::from_secs(900));
        assert_eq!(config.bulk_fetch_timeout, Duration::from_secs(1800));
        assert_eq!(config.renew_every, 5);
    }

    #[test]
    fn test_missing_password_is_fatal() {
        let (conn, tuning) = connection(|c| c.api_password = None);
        let result = Config::from_cli(&conn, &tuning);
        assert!(matches!(result, Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_blank_tenant_is_fatal() {
        let (conn, tuning) = connection(|c| c.tenant_id = Some("  ".to_string()));
        assert!(Config::from_cli(&conn, &tuning).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let (conn, tuning) = connection(|_| {});
        let config = Config::from_cli(&conn, &tuning).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("76123456-7"));
    }

    #[test]
    fn test_expand_tilde_no_prefix() {
        assert_eq!(
            expand_tilde("/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        assert_eq!(expand_tilde("relative/path"), PathBuf::from("relative/path"));
    }

    #[test]
    fn test_expand_tilde_with_home() {
        let result = expand_tilde("~/reports.db");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(result, home.join("reports.db"));
        }
    }

    #[test]
    fn test_sync_options_carries_batch_size() {
        let (conn, tuning) = connection(|_| {});
        let config = Config::from_cli(&conn, &tuning).unwrap();
        let options = config.sync_options(31, false);
        assert_eq!(options.batch_size, 31);
        assert_eq!(options.unit_attempts, 3);
        assert!(!options.align_to_months);
    }
}
