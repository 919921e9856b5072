//! Structured provider error model.

use core::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Status code the provider answers with when the caller exceeded its quota.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Longest `X-Rate-Limit-Reset` taken at face value. Quota windows are far
/// shorter; anything above this is treated like a missing hint.
pub const MAX_RESET_SECS: u64 = 24 * 60 * 60;

/// The `error` object carried by non-2xx provider responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorItem {
    pub code: i64,
    pub message: String,
}

impl ErrorItem {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Rate-limit headers attached to a 429 response.
///
/// Headers that are absent or not numeric decode as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// `X-Rate-Limit-Quota`
    pub quota: u64,
    /// `X-Rate-Limit-Remaining`
    pub remaining: u64,
    /// `X-Rate-Limit-Reset`, seconds until the quota window resets.
    pub reset_secs: u64,
}

impl RateLimit {
    /// Delay hinted by the provider before the next attempt, if any.
    ///
    /// Zero and values above [`MAX_RESET_SECS`] give no hint.
    pub fn reset_after(&self) -> Option<Duration> {
        (1..=MAX_RESET_SECS)
            .contains(&self.reset_secs)
            .then(|| Duration::from_secs(self.reset_secs))
    }
}

/// A non-2xx answer from the provider.
///
/// `status` is always present. `error` holds the decoded provider error, or a
/// synthetic item (code 0) carrying the raw body when it did not decode.
/// `rate_limit` is only set for 429 responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
}

impl ProviderError {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            error: None,
            rate_limit: None,
        }
    }

    pub fn with_error(mut self, error: ErrorItem) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// Whether the provider throttled this request.
    pub fn is_rate_limited(&self) -> bool {
        self.status == STATUS_TOO_MANY_REQUESTS
    }

    /// Backoff requested through `X-Rate-Limit-Reset`.
    pub fn retry_after(&self) -> Option<Duration> {
        self.rate_limit.as_ref().and_then(RateLimit::reset_after)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider returned status {}", self.status)?;
        if let Some(item) = &self.error {
            write!(f, ": [{}] {}", item.code, item.message)?;
        }
        if let Some(limit) = &self.rate_limit {
            write!(
                f,
                " (quota {}, remaining {}, reset in {}s)",
                limit.quota, limit.remaining, limit.reset_secs
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for ProviderError {}
