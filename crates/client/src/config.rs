//! Client configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::cid::DEFAULT_CID_VALIDITY;

/// Provider base URL, including the API version segment.
pub const DEFAULT_HOST: &str = "https://api.jpush.cn/v3";

pub const ENV_HOST: &str = "PUSHGATE_HOST";
pub const ENV_APP_KEY: &str = "PUSHGATE_APP_KEY";
pub const ENV_MASTER_SECRET: &str = "PUSHGATE_MASTER_SECRET";
pub const ENV_WORKERS: &str = "PUSHGATE_WORKERS";
pub const ENV_CID_BATCH_SIZE: &str = "PUSHGATE_CID_BATCH_SIZE";
pub const ENV_TIMEOUT_SECS: &str = "PUSHGATE_TIMEOUT_SECS";
pub const ENV_MAX_ATTEMPTS: &str = "PUSHGATE_MAX_ATTEMPTS";

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

/// Push client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Provider base URL
    pub host: String,
    /// Application key (basic auth user)
    pub app_key: String,
    /// Master secret (basic auth password)
    pub master_secret: String,
    /// Worker pool size (maximum concurrent pushes)
    pub workers: usize,
    /// CIDs requested per refill
    pub cid_batch_size: usize,
    /// Default per-request timeout of the HTTP transport
    pub request_timeout: Duration,
    /// Retry bound for rate-limited/unreachable pushes (None = unbounded)
    pub max_attempts: Option<u32>,
    /// How long a fetched CID batch stays usable
    pub cid_validity: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            app_key: String::new(),
            master_secret: String::new(),
            workers: 4,
            cid_batch_size: 1000,
            request_timeout: Duration::from_secs(30),
            max_attempts: None,
            cid_validity: DEFAULT_CID_VALIDITY,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("app_key", &self.app_key)
            .field("master_secret", &"<redacted>")
            .field("workers", &self.workers)
            .field("cid_batch_size", &self.cid_batch_size)
            .field("request_timeout", &self.request_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("cid_validity", &self.cid_validity)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(app_key: impl Into<String>, master_secret: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            master_secret: master_secret.into(),
            ..Self::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_cid_batch_size(mut self, count: usize) -> Self {
        self.cid_batch_size = count;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_cid_validity(mut self, validity: Duration) -> Self {
        self.cid_validity = validity;
        self
    }

    /// Check the settings a client cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing("host"));
        }
        if self.app_key.is_empty() {
            return Err(ConfigError::Missing("app_key"));
        }
        if self.master_secret.is_empty() {
            return Err(ConfigError::Missing("master_secret"));
        }
        if self.workers == 0 {
            return Err(ConfigError::Zero("workers"));
        }
        if self.cid_batch_size == 0 {
            return Err(ConfigError::Zero("cid_batch_size"));
        }
        if self.max_attempts == Some(0) {
            return Err(ConfigError::Zero("max_attempts"));
        }
        Ok(())
    }

    /// Load from `PUSHGATE_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (environment, file, test map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(host) = lookup(ENV_HOST) {
            config.host = host;
        }
        config.app_key = lookup(ENV_APP_KEY).ok_or(ConfigError::Missing(ENV_APP_KEY))?;
        config.master_secret =
            lookup(ENV_MASTER_SECRET).ok_or(ConfigError::Missing(ENV_MASTER_SECRET))?;

        if let Some(workers) = parse(&lookup, ENV_WORKERS)? {
            config.workers = workers;
        }
        if let Some(count) = parse(&lookup, ENV_CID_BATCH_SIZE)? {
            config.cid_batch_size = count;
        }
        if let Some(secs) = parse::<u64>(&lookup, ENV_TIMEOUT_SECS)? {
            config.request_timeout = Duration::from_secs(secs);
        }
        config.max_attempts = parse(&lookup, ENV_MAX_ATTEMPTS)?;

        config.validate()?;
        Ok(config)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
