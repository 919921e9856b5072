//! `pushgate-core`: provider-facing data shared by the queue client crates.
//!
//! This crate contains **pure data** (no IO, no threads): the opaque push
//! payload, the push result document, the CID classes and the structured
//! provider error.

pub mod error;
pub mod payload;
pub mod result;

pub use error::{ErrorItem, ProviderError, RateLimit};
pub use payload::{CidKind, Payload};
pub use result::PushResult;
