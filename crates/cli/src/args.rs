//! Command-line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use pushgate_client::config::{
    DEFAULT_HOST, ENV_APP_KEY, ENV_CID_BATCH_SIZE, ENV_HOST, ENV_MASTER_SECRET, ENV_MAX_ATTEMPTS,
    ENV_TIMEOUT_SECS, ENV_WORKERS,
};
use pushgate_client::{CidKind, ClientConfig};

#[derive(Parser)]
#[command(name = "pushgate")]
#[command(version)]
#[command(about = "Send push notifications through the provider REST API", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Log filter directive (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log: Option<String>,

    /// Human-readable logs instead of JSON
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct ConnectionArgs {
    /// Provider base URL
    #[arg(long, env = ENV_HOST, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Application key
    #[arg(long, env = ENV_APP_KEY)]
    pub app_key: String,

    /// Master secret
    #[arg(long, env = ENV_MASTER_SECRET, hide_env_values = true)]
    pub master_secret: String,

    /// Concurrent provider requests
    #[arg(long, env = ENV_WORKERS, default_value_t = 4)]
    pub workers: usize,

    /// CIDs requested per batch
    #[arg(long, env = ENV_CID_BATCH_SIZE, default_value_t = 1000)]
    pub cid_batch_size: usize,

    /// Per-request timeout in seconds
    #[arg(long, env = ENV_TIMEOUT_SECS, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Give up after this many retryable failures (unbounded by default)
    #[arg(long, env = ENV_MAX_ATTEMPTS)]
    pub max_attempts: Option<u32>,
}

impl ConnectionArgs {
    pub fn to_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(&self.app_key, &self.master_secret)
            .with_host(&self.host)
            .with_workers(self.workers)
            .with_cid_batch_size(self.cid_batch_size)
            .with_request_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(max) = self.max_attempts {
            config = config.with_max_attempts(max);
        }
        config
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send one payload and wait for the outcome
    Send {
        /// JSON payload file ("-" for stdin)
        #[arg(default_value = "-")]
        payload: PathBuf,

        /// Dry-run the payload against /push/validate before sending
        #[arg(long)]
        validate: bool,

        /// Give up waiting after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Fetch one-time push identifiers
    Cid {
        /// Identifier class
        #[arg(long, value_enum, default_value_t = CidClass::Push)]
        class: CidClass,

        /// How many identifiers to print
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CidClass {
    Push,
    Schedule,
}

impl From<CidClass> for CidKind {
    fn from(class: CidClass) -> Self {
        match class {
            CidClass::Push => CidKind::Immediate,
            CidClass::Schedule => CidKind::Scheduled,
        }
    }
}
