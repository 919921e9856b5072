//! Core job types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier the queue assigns to an accepted job.
///
/// Returned by `Queue::push` and attached as `job_id` to every dispatch,
/// retry and completion log line. It stays the same across retries, so one
/// push can be followed through all of its attempts. Time-ordered (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Rebuild an id taken from a log line or a caller's records.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a job asks of the queue after one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job reached a terminal state and has reported it.
    Completed,
    /// Transient failure: re-submit to the tail of the pending list now.
    RetryNow,
    /// Re-submit to the tail of the pending list once the delay has elapsed.
    RetryAfter(Duration),
}

impl JobOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobOutcome::Completed)
    }
}

/// A unit of work run by the queue.
///
/// `run` is called once per dispatch, always from a single worker at a time.
/// A job that returns a retry outcome is dispatched again later; it must
/// keep whatever state it needs for the next attempt.
pub trait Job: Send + 'static {
    fn run(&mut self) -> JobOutcome;

    /// Short label used in logs.
    fn name(&self) -> &str {
        "job"
    }
}

impl<F> Job for F
where
    F: FnMut() -> JobOutcome + Send + 'static,
{
    fn run(&mut self) -> JobOutcome {
        self()
    }
}

/// Queue lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NotStarted,
    Running,
    /// No longer accepting jobs; draining the ones already accepted.
    Stopping,
    Stopped,
}

impl Phase {
    pub fn accepts_jobs(&self) -> bool {
        matches!(self, Phase::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_completed_is_terminal() {
        assert!(JobOutcome::Completed.is_terminal());
        assert!(!JobOutcome::RetryNow.is_terminal());
        assert!(!JobOutcome::RetryAfter(Duration::from_secs(1)).is_terminal());
    }

    #[test]
    fn closures_are_jobs() {
        let mut calls = 0;
        let mut job = move || {
            calls += 1;
            if calls < 2 {
                JobOutcome::RetryNow
            } else {
                JobOutcome::Completed
            }
        };

        assert_eq!(Job::run(&mut job), JobOutcome::RetryNow);
        assert_eq!(Job::run(&mut job), JobOutcome::Completed);
        assert_eq!(Job::name(&job), "job");
    }

    #[test]
    fn only_running_accepts_jobs() {
        assert!(!Phase::NotStarted.accepts_jobs());
        assert!(Phase::Running.accepts_jobs());
        assert!(!Phase::Stopping.accepts_jobs());
        assert!(!Phase::Stopped.accepts_jobs());
    }
}
