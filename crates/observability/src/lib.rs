//! Shared tracing setup for pushgate binaries and tests.

/// Subscriber configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, init, init_with};
