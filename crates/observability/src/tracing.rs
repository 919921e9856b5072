//! Tracing subscriber initialization.
//!
//! Library crates only emit events; installing a subscriber is left to the
//! process (the CLI, a host application, or a test).

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable lines.
    Pretty,
}

/// JSON logs filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    init_with(None, LogFormat::Json);
}

/// Install a subscriber with an explicit filter directive.
///
/// `filter` overrides `RUST_LOG` when given. An unparsable directive falls
/// back to [`DEFAULT_FILTER`].
pub fn init_with(filter: Option<&str>, format: LogFormat) {
    let filter = match filter {
        Some(directive) => EnvFilter::try_new(directive).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_thread_names(true)
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_with(Some("debug"), LogFormat::Pretty);
        init();
        init_with(Some("not a [valid directive"), LogFormat::Json);
        ::tracing::info!("still logging");
    }
}
