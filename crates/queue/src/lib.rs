//! In-memory job queue with a bounded worker pool.
//!
//! ## Design
//!
//! - Fixed pool of N worker threads, created at `start()` and torn down at `stop()`
//! - One dispatcher thread handing pending jobs to idle workers in FIFO order
//! - Jobs report an outcome; retries rejoin the tail of the pending list
//! - Delayed retries wait in a timer set without holding a worker
//! - `stop()` drains every accepted job before tearing the pool down
//!
//! ## Components
//!
//! - `Job`: unit of work executed by a worker
//! - `Queue`: pending list, idle-worker registry and lifecycle
//! - `worker`: execution slot that runs one job at a time
//!
//! Nothing is persisted: queued jobs are lost if the process exits.

pub mod queue;
pub mod types;
mod worker;

pub use queue::{Queue, QueueConfig, QueueError, QueueStats};
pub use types::{Job, JobId, JobOutcome, Phase};
