//! Provider error classification.
//!
//! Every failure of a remote call is reduced to one [`ProviderErrorKind`];
//! callers dispatch on the kind instead of inspecting transport errors.

use std::fmt;

use reqwest::StatusCode;

const MAX_API_ERROR_CHARS: usize = 200;

/// Closed set of remote-call failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    AuthFailed,
    RateLimited,
    ServerError,
    BadRequest,
    ConnectionFailed,
    Timeout,
    Unknown,
}

impl ProviderErrorKind {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            401 | 403 => Self::AuthFailed,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            400..=499 => Self::BadRequest,
            _ => Self::Unknown,
        }
    }

    /// Classify a transport-level failure (no HTTP status received).
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::from_status(status)
        } else if err.is_connect() || err.is_request() {
            Self::ConnectionFailed
        } else if err.is_decode() {
            Self::Unknown
        } else {
            Self::ConnectionFailed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthFailed => "auth_failed",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::BadRequest => "bad_request",
            Self::ConnectionFailed => "connection_failed",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified remote-call failure. `message` is already sanitized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl AsRef<str>) -> Self {
        Self {
            kind,
            message: sanitize_api_error(message.as_ref()),
        }
    }

    pub fn from_transport(err: &reqwest::Error) -> Self {
        Self::new(ProviderErrorKind::from_transport(err), err.to_string())
    }
}

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

/// Redact tokens that look like API credentials (`sk-...`, `Bearer ...`).
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 3] = ["sk-", "Bearer ", "bearer "];

    let mut scrubbed = input.to_string();
    for prefix in PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };
            let start = search_from + rel;
            let token_start = start + prefix.len();
            let token_len: usize = scrubbed[token_start..]
                .chars()
                .take_while(|c| is_secret_char(*c))
                .map(char::len_utf8)
                .sum();

            if token_len == 0 {
                search_from = token_start;
                continue;
            }

            scrubbed.replace_range(start..token_start + token_len, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }
    scrubbed
}

/// Scrub secrets and cap the length of an upstream error body.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);
    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let end = scrubbed
        .char_indices()
        .nth(MAX_API_ERROR_CHARS)
        .map_or(scrubbed.len(), |(i, _)| i);
    format!("{}...", &scrubbed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            ProviderErrorKind::from_status(StatusCode::UNAUTHORIZED),
            ProviderErrorKind::AuthFailed
        );
        assert_eq!(
            ProviderErrorKind::from_status(StatusCode::FORBIDDEN),
            ProviderErrorKind::AuthFailed
        );
        assert_eq!(
            ProviderErrorKind::from_status(StatusCode::TOO_MANY_REQUESTS),
            ProviderErrorKind::RateLimited
        );
        assert_eq!(
            ProviderErrorKind::from_status(StatusCode::BAD_GATEWAY),
            ProviderErrorKind::ServerError
        );
        assert_eq!(
            ProviderErrorKind::from_status(StatusCode::BAD_REQUEST),
            ProviderErrorKind::BadRequest
        );
        assert_eq!(
            ProviderErrorKind::from_status(StatusCode::NOT_FOUND),
            ProviderErrorKind::BadRequest
        );
    }

    #[test]
    fn test_scrubs_api_keys() {
        let out = sanitize_api_error("Incorrect API key provided: sk-abc123XYZ.");
        assert!(!out.contains("sk-abc123XYZ"));
        assert!(out.contains("[REDACTED]"));

        let out = scrub_secret_patterns("header was Bearer abcdef123456");
        assert_eq!(out, "header was [REDACTED]");
    }

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let long = "x".repeat(500);
        let out = sanitize_api_error(&long);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), MAX_API_ERROR_CHARS + 3);
    }

    #[test]
    fn test_sanitize_leaves_plain_text() {
        assert_eq!(sanitize_api_error("upstream timeout"), "upstream timeout");
    }

    #[test]
    fn test_error_display_includes_kind() {
        let err = ProviderError::new(ProviderErrorKind::RateLimited, "slow down");
        assert_eq!(err.to_string(), "rate_limited: slow down");
    }
}
