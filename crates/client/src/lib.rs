//! `pushgate-client`: push dispatch against the provider REST API.
//!
//! A [`PushClient`] owns a bounded [`pushgate_queue::Queue`], a per-class
//! [`CidClient`] and a [`Transport`]. Pushes are queued as [`PushJob`]s which
//! retry rate-limited and unreachable attempts on their own and report the
//! final outcome to a callback exactly once.

pub mod api;
pub mod cid;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod job;
pub mod transport;

pub use api::ProviderApi;
pub use cid::{CidCache, CidClient, CidSource, DEFAULT_CID_VALIDITY};
pub use client::PushClient;
pub use config::{ClientConfig, ConfigError};
pub use context::RequestContext;
pub use error::{ClientError, PushError, TransportError};
pub use job::{PushCallback, PushJob};
pub use transport::{HttpTransport, Method, ProviderRequest, RawResponse, Transport};

pub use pushgate_core::{CidKind, ErrorItem, Payload, ProviderError, PushResult, RateLimit};
pub use pushgate_queue::{JobId, QueueStats};
