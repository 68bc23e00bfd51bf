//! Typed command results and rate-limit headers.

use chrono::{DateTime, Utc};
use cms_limits::RateLimitDecision;
use serde::Serialize;

use crate::error::{ceil_secs, ApiError};

/// Public error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&ApiError> for ErrorBody {
    fn from(err: &ApiError) -> Self {
        Self {
            code: err.error_code().to_string(),
            message: err.to_string(),
        }
    }
}

/// `{success, item?, error?}` result of a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> CommandOutcome<T> {
    pub fn ok(item: T) -> Self {
        Self {
            success: true,
            item: Some(item),
            error: None,
        }
    }

    pub fn err(error: &ApiError) -> Self {
        Self {
            success: false,
            item: None,
            error: Some(error.into()),
        }
    }
}

impl<T> From<Result<T, ApiError>> for CommandOutcome<T> {
    fn from(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(item) => Self::ok(item),
            Err(e) => Self::err(&e),
        }
    }
}

/// Rate-limit state rendered as response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitHeaders {
    pub limit: u32,
    pub remaining: u32,
    /// Window close, epoch seconds
    pub reset: i64,
    /// Seconds to wait, only when rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl RateLimitHeaders {
    pub const LIMIT: &'static str = "X-RateLimit-Limit";
    pub const REMAINING: &'static str = "X-RateLimit-Remaining";
    pub const RESET: &'static str = "X-RateLimit-Reset";
    pub const RETRY_AFTER: &'static str = "Retry-After";

    /// Headers for `decision`, anchored to the wall clock at `now`.
    pub fn from_decision(decision: &RateLimitDecision, now: DateTime<Utc>) -> Self {
        let reset_after = ceil_secs(decision.reset_after);
        Self {
            limit: decision.limit,
            remaining: decision.remaining,
            reset: now.timestamp().saturating_add(reset_after as i64),
            retry_after: decision.retry_after().map(ceil_secs),
        }
    }

    /// Header name/value pairs in a stable order.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (Self::LIMIT, self.limit.to_string()),
            (Self::REMAINING, self.remaining.to_string()),
            (Self::RESET, self.reset.to_string()),
        ];
        if let Some(secs) = self.retry_after {
            pairs.push((Self::RETRY_AFTER, secs.to_string()));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;
    use tokio::time::Instant;

    fn decision(allowed: bool, remaining: u32, reset_after: Duration) -> RateLimitDecision {
        RateLimitDecision {
            allowed,
            limit: 10,
            remaining,
            reset_at: Instant::now() + reset_after,
            reset_after,
        }
    }

    #[test]
    fn test_outcome_omits_absent_fields() {
        let ok = serde_json::to_value(CommandOutcome::ok("page-0001")).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "item": "page-0001"}));

        let err = ApiError::NotFound {
            code: "CONTENT_NOT_FOUND",
            message: "content not found: page-0001".into(),
        };
        let failed = serde_json::to_value(CommandOutcome::<String>::err(&err)).unwrap();
        assert_eq!(
            failed,
            serde_json::json!({
                "success": false,
                "error": {"code": "CONTENT_NOT_FOUND", "message": "content not found: page-0001"}
            })
        );
    }

    #[tokio::test]
    async fn test_headers_when_allowed() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let headers =
            RateLimitHeaders::from_decision(&decision(true, 7, Duration::from_millis(41_500)), now);

        assert_eq!(headers.reset, now.timestamp() + 42);
        assert_eq!(headers.retry_after, None);
        assert_eq!(
            headers.to_pairs(),
            vec![
                ("X-RateLimit-Limit", "10".to_string()),
                ("X-RateLimit-Remaining", "7".to_string()),
                ("X-RateLimit-Reset", (now.timestamp() + 42).to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_headers_when_rejected() {
        let now = Utc::now();
        let headers =
            RateLimitHeaders::from_decision(&decision(false, 0, Duration::from_secs(30)), now);

        assert_eq!(headers.retry_after, Some(30));
        assert_eq!(headers.to_pairs().last(), Some(&("Retry-After", "30".to_string())));
    }
}
