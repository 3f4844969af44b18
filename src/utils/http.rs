//! Shared HTTP status classification for the external gateways.

use crate::types::{AppError, Result};
use reqwest::StatusCode;
use std::time::Duration;

/// Longest accepted request timeout, in seconds
pub const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// Whether `secs` is a usable request timeout.
pub fn is_valid_timeout(secs: f64) -> bool {
    secs > 0.0 && secs <= MAX_TIMEOUT_SECS
}

/// Request timeout from a configured number of seconds.
pub fn request_timeout(secs: f64) -> Result<Duration> {
    if !is_valid_timeout(secs) {
        return Err(AppError::Configuration(format!(
            "timeout must be greater than 0 and at most {} seconds, got {}",
            MAX_TIMEOUT_SECS, secs
        )));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Map a non-success HTTP status from `service` onto the error taxonomy.
///
/// Returns `None` for success statuses.
pub fn status_error(service: &str, status: StatusCode, body: &str) -> Option<AppError> {
    if status.is_success() {
        return None;
    }

    let detail = format!("{} returned {}: {}", service, status.as_u16(), truncate(body, 200));
    let err = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Authentication(detail),
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => AppError::Timeout(detail),
        s if s.is_server_error() => AppError::Unavailable(detail),
        _ => AppError::InvalidInput(detail),
    };
    Some(err)
}

/// Pass a successful response through; turn any other into a classified error.
pub async fn check_status(service: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(service, status, &body)
        .unwrap_or_else(|| AppError::Internal(format!("{} returned {}", service, status))))
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(401, "Authentication")]
    #[case(403, "Authentication")]
    #[case(429, "RateLimited")]
    #[case(504, "Timeout")]
    #[case(503, "Unavailable")]
    #[case(400, "InvalidInput")]
    fn test_status_mapping(#[case] code: u16, #[case] expected: &str) {
        let status = StatusCode::from_u16(code).unwrap();
        let err = status_error("svc", status, "body").expect("error status");
        let name = match err {
            AppError::Authentication(_) => "Authentication",
            AppError::RateLimited(_) => "RateLimited",
            AppError::Timeout(_) => "Timeout",
            AppError::Unavailable(_) => "Unavailable",
            AppError::InvalidInput(_) => "InvalidInput",
            _ => "other",
        };
        assert_eq!(name, expected);
    }

    #[test]
    fn test_success_is_not_an_error() {
        assert!(status_error("svc", StatusCode::OK, "").is_none());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
