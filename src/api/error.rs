//! Error types for upstream API interactions.

use thiserror::Error;

/// Failure modes of a single outbound call.
///
/// The fetcher classifies and returns; it never retries. Retry policy is the
/// orchestrator's alone.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request did not complete within its configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Upstream answered with a non-success status.
    #[error("HTTP error {status}")]
    Http { status: u16 },

    /// Connection-level failure (DNS, TLS, reset, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The credential endpoint rejected the identity or returned an
    /// unusable token body.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A call was attempted before any credential was acquired.
    #[error("no credential acquired")]
    NoCredential,
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ApiError::Timeout;
        }
        if let Some(status) = err.status() {
            return ApiError::Http {
                status: status.as_u16(),
            };
        }
        ApiError::Transport(err.to_string())
    }
}
