//! Turns non-2xx answers into structured provider errors.

use serde::Deserialize;

use pushgate_core::error::STATUS_TOO_MANY_REQUESTS;
use pushgate_core::{ErrorItem, ProviderError, RateLimit};

use super::RawResponse;

pub const HEADER_RATE_LIMIT_QUOTA: &str = "X-Rate-Limit-Quota";
pub const HEADER_RATE_LIMIT_REMAINING: &str = "X-Rate-Limit-Remaining";
pub const HEADER_RATE_LIMIT_RESET: &str = "X-Rate-Limit-Reset";

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<ErrorItem>,
}

/// Pass 2xx answers through; convert everything else into a [`ProviderError`].
///
/// The error body is decoded when it matches `{"error": {"code", "message"}}`.
/// Otherwise the raw body (or, if empty, the decode failure) becomes the
/// message of a code-0 item. Rate-limit headers are only read on 429.
pub fn classify(response: RawResponse) -> Result<RawResponse, ProviderError> {
    if response.is_success() {
        return Ok(response);
    }

    let mut error = ProviderError::new(response.status).with_error(error_item(&response.body));
    if response.status == STATUS_TOO_MANY_REQUESTS {
        error = error.with_rate_limit(rate_limit(&response));
    }
    Err(error)
}

fn error_item(body: &[u8]) -> ErrorItem {
    let raw = || String::from_utf8_lossy(body).trim().to_string();

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody { error: Some(item) }) => item,
        Ok(ErrorBody { error: None }) => ErrorItem::new(0, raw()),
        Err(e) => {
            let raw = raw();
            if raw.is_empty() {
                ErrorItem::new(0, format!("undecodable error body: {e}"))
            } else {
                ErrorItem::new(0, raw)
            }
        }
    }
}

fn rate_limit(response: &RawResponse) -> RateLimit {
    let number = |name: &str| {
        response
            .header(name)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0)
    };

    RateLimit {
        quota: number(HEADER_RATE_LIMIT_QUOTA),
        remaining: number(HEADER_RATE_LIMIT_REMAINING),
        reset_secs: number(HEADER_RATE_LIMIT_RESET),
    }
}
