//! Bearer-token extraction from the credential endpoint's response body.
//!
//! Upstream returns the token in one of several shapes depending on server
//! version: a JSON object with a `token` field, a bare JSON string, or raw
//! text (sometimes wrapped in quotes). Extraction is an ordered list of
//! strategies tried in sequence; the first that yields a non-empty token
//! wins.

use serde_json::Value;

/// The shapes a credential response body can take, in the order tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenShape {
    /// `{"token": "..."}`
    JsonField,
    /// `"..."` — a bare JSON string.
    JsonString,
    /// Plain text, possibly wrapped in single or double quotes.
    RawText,
}

/// Extract a bearer token from a response body.
///
/// Returns the token and the shape that matched, or `None` if every strategy
/// produced an empty result.
pub fn extract_token(body: &str) -> Option<(String, TokenShape)> {
    for shape in [TokenShape::JsonField, TokenShape::JsonString, TokenShape::RawText] {
        if let Some(token) = try_shape(shape, body) {
            if !token.is_empty() {
                return Some((token, shape));
            }
        }
    }
    None
}

fn try_shape(shape: TokenShape, body: &str) -> Option<String> {
    match shape {
        TokenShape::JsonField => {
            let value: Value = serde_json::from_str(body).ok()?;
            value
                .get("token")
                .and_then(Value::as_str)
                .map(str::to_string)
        }
        TokenShape::JsonString => {
            let value: Value = serde_json::from_str(body).ok()?;
            value.as_str().map(str::to_string)
        }
        TokenShape::RawText => Some(
            body.trim()
                .trim_matches('"')
                .trim_matches('\'')
                .to_string(),
        ),
    }
}
