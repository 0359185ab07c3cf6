//! Shared HTTP plumbing for provider adapters

use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::error::{ProviderError, Result};

/// Per-call ceiling; a stuck provider call must not stall the whole batch
pub const CALL_TIMEOUT: Duration = Duration::from_secs(15);

pub fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(CALL_TIMEOUT)
        .build()
        .map_err(|e| ProviderError::Network(format!("Failed to build HTTP client: {}", e)).into())
}

/// Map an API response status to the retryable/terminal error taxonomy.
///
/// 401/403 mean the credential is dead, 400/422 mean the payload is bad;
/// neither clears on retry. 429 and 5xx do.
pub fn classify_status(
    provider: &str,
    context: &str,
    status: StatusCode,
    body: &str,
) -> ProviderError {
    let detail = format!("{} {} failed ({}): {}", provider, context, status, body);
    match status.as_u16() {
        401 | 403 => ProviderError::Authentication(detail),
        400 | 422 => ProviderError::Validation(detail),
        429 => ProviderError::RateLimit(detail),
        500..=599 => ProviderError::Network(detail),
        _ => ProviderError::Publish(detail),
    }
}

/// Map a token-endpoint rejection. Grant failures are terminal OAuth errors
/// rather than publish failures; 429/5xx still classify as retryable.
pub fn classify_token_status(
    provider: &str,
    context: &str,
    status: StatusCode,
    body: &str,
) -> ProviderError {
    let detail = format!("{} {} rejected ({}): {}", provider, context, status, body);
    match status.as_u16() {
        429 => ProviderError::RateLimit(detail),
        500..=599 => ProviderError::Network(detail),
        _ => ProviderError::OAuth(detail),
    }
}

/// Map a transport-level failure (connect, TLS, timeout). Always retryable.
pub fn transport_error(provider: &str, context: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Network(format!("{} {} timed out: {}", provider, context, err))
    } else {
        ProviderError::Network(format!("{} {}: {}", provider, context, err))
    }
}

/// Drain a failed response body for the error message
pub async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_terminal_auth() {
        for code in [401, 403] {
            let status = StatusCode::from_u16(code).unwrap();
            let err = classify_status("twitter", "publish tweet", status, "nope");
            assert!(matches!(err, ProviderError::Authentication(_)));
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_classify_status_terminal_validation() {
        for code in [400, 422] {
            let status = StatusCode::from_u16(code).unwrap();
            let err = classify_status("instagram", "create container", status, "bad");
            assert!(matches!(err, ProviderError::Validation(_)));
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_classify_status_retryable() {
        let err = classify_status(
            "twitter",
            "publish tweet",
            StatusCode::TOO_MANY_REQUESTS,
            "slow down",
        );
        assert!(matches!(err, ProviderError::RateLimit(_)));
        assert!(err.is_retryable());

        for code in [500, 502, 503] {
            let status = StatusCode::from_u16(code).unwrap();
            let err = classify_status("twitter", "publish tweet", status, "oops");
            assert!(matches!(err, ProviderError::Network(_)));
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_classify_status_unexpected_code() {
        let err = classify_status("twitter", "publish tweet", StatusCode::IM_A_TEAPOT, "?");
        assert!(matches!(err, ProviderError::Publish(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_token_status() {
        let err = classify_token_status(
            "twitter",
            "token exchange",
            StatusCode::BAD_REQUEST,
            "invalid_grant",
        );
        assert!(matches!(err, ProviderError::OAuth(_)));
        assert!(!err.is_retryable());

        let err = classify_token_status(
            "twitter",
            "token refresh",
            StatusCode::SERVICE_UNAVAILABLE,
            "down",
        );
        assert!(matches!(err, ProviderError::Network(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_message_includes_context() {
        let err = classify_status(
            "google_calendar",
            "insert event",
            StatusCode::UNAUTHORIZED,
            "expired",
        );
        let message = format!("{}", err);
        assert!(message.contains("google_calendar"));
        assert!(message.contains("insert event"));
        assert!(message.contains("401"));
        assert!(message.contains("expired"));
    }
}
