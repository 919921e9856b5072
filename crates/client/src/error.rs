//! Client error model.

use pushgate_core::ProviderError;
use pushgate_queue::QueueError;

use crate::config::ConfigError;

/// Failure below the HTTP status line: the exchange itself did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The provider could not be reached (refused, DNS, TLS handshake).
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
    #[error("request deadline exceeded")]
    DeadlineExceeded,
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Unreachability is worth retrying; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Connect(_))
    }
}

/// Error reported for a push, a validation or a CID request.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// Non-2xx answer. 429 is retried by push jobs.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// 2xx answer whose body did not decode.
    #[error("failed to decode provider response: {0}")]
    Decode(String),

    #[error("failed to encode payload: {0}")]
    Encode(String),

    /// The CID endpoint answered with an empty list.
    #[error("provider returned no usable cid")]
    NoCid,

    /// Only raised when a retry bound is configured.
    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<PushError> },

    /// The queue refused the job; its callback will never run.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl PushError {
    /// Provider status code, when the failure came from a provider answer.
    pub fn status(&self) -> Option<u16> {
        match self {
            PushError::Provider(e) => Some(e.status),
            PushError::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// Error building a [`crate::PushClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build transport: {0}")]
    Transport(#[from] TransportError),
    #[error("failed to start queue: {0}")]
    Queue(#[from] QueueError),
}
