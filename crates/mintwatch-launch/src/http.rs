//! Shared reqwest plumbing and error classification.

use mintwatch_core::error::MintError;
use reqwest::StatusCode;
use std::time::Duration;

/// Client with the given overall request timeout.
pub(crate) fn client(timeout_secs: u64) -> Result<reqwest::Client, MintError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| MintError::Config(format!("http client: {e}")))
}

/// Classify a failed send for an idempotent call: everything is retryable
/// except malformed requests.
pub(crate) fn send_error(what: &str, e: reqwest::Error) -> MintError {
    if e.is_builder() {
        MintError::Permanent(format!("{what}: {e}"))
    } else {
        MintError::Transient(format!("{what}: {e}"))
    }
}

/// Classify a non-success status for an idempotent call.
pub(crate) fn status_error(what: &str, status: StatusCode, body: &str) -> MintError {
    let body = truncate(body, 200);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        MintError::Transient(format!("{what}: HTTP {status}: {body}"))
    } else {
        MintError::Permanent(format!("{what}: HTTP {status}: {body}"))
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(status_error("x", StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(status_error("x", StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(matches!(
            status_error("x", StatusCode::UNAUTHORIZED, ""),
            MintError::Permanent(_)
        ));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
