//! Queue lifecycle, pending list and dispatcher loop.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use super::types::{Job, JobId, JobOutcome, Phase};
use super::worker::{self, WorkerSlot};

/// Longest delay a `RetryAfter` outcome is honored for.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Name for logging and thread names
    pub name: String,
    /// Size of the worker pool (maximum concurrent jobs)
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "push-queue".to_string(),
            workers: 4,
        }
    }
}

impl QueueConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Queue error.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue has not been started")]
    NotStarted,
    #[error("queue is closed")]
    Closed,
    #[error("failed to spawn queue thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Snapshot of queue counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    /// Jobs waiting for a worker
    pub pending: usize,
    /// Jobs waiting for a retry delay to elapse
    pub delayed: usize,
    /// Jobs accepted and not yet completed
    pub outstanding: usize,
    /// Jobs currently held by a worker
    pub running: usize,
    pub dispatched: u64,
    pub completed: u64,
    pub retried: u64,
}

/// A job accepted by the queue, with its bookkeeping.
pub(crate) struct QueuedJob {
    pub(crate) id: JobId,
    /// Number of times this job has been handed to a worker.
    pub(crate) dispatches: u32,
    pub(crate) job: Box<dyn Job>,
}

/// Min-heap entry for delayed retries. Ties keep re-submission order.
struct Delayed {
    due: Instant,
    seq: u64,
    queued: QueuedJob,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct State {
    phase: Phase,
    pending: VecDeque<QueuedJob>,
    delayed: BinaryHeap<Delayed>,
    outstanding: usize,
    running: usize,
    dispatched: u64,
    completed: u64,
    retried: u64,
    delay_seq: u64,
}

impl State {
    fn new() -> Self {
        Self {
            phase: Phase::NotStarted,
            pending: VecDeque::new(),
            delayed: BinaryHeap::new(),
            outstanding: 0,
            running: 0,
            dispatched: 0,
            completed: 0,
            retried: 0,
            delay_seq: 0,
        }
    }

    /// Move every delayed job whose time has come to the pending tail.
    fn promote_due(&mut self, now: Instant) {
        while self.delayed.peek().is_some_and(|d| d.due <= now) {
            if let Some(entry) = self.delayed.pop() {
                self.pending.push_back(entry.queued);
            }
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.peek().map(|d| d.due)
    }

    /// The dispatcher may exit once nothing accepted can still need a worker.
    fn drained(&self) -> bool {
        !matches!(self.phase, Phase::Running) && self.outstanding == 0
    }
}

/// State shared by the queue handle, the dispatcher and the workers.
pub(crate) struct Shared {
    state: Mutex<State>,
    /// Signalled on push, retry, completion and stop.
    work: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the head of the pending list can be dispatched.
    ///
    /// Returns `None` once the queue is stopping and fully drained.
    fn next_job(&self) -> Option<QueuedJob> {
        let mut state = self.lock();
        loop {
            let now = Instant::now();
            state.promote_due(now);

            if let Some(mut queued) = state.pending.pop_front() {
                queued.dispatches += 1;
                state.running += 1;
                state.dispatched += 1;
                return Some(queued);
            }

            if state.drained() {
                return None;
            }

            state = match state.next_due() {
                Some(due) => {
                    let timeout = due.saturating_duration_since(now);
                    match self.work.wait_timeout(state, timeout) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => self
                    .work
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Put back a job the dispatcher could not hand off.
    fn restore(&self, queued: QueuedJob) {
        let mut state = self.lock();
        state.running = state.running.saturating_sub(1);
        state.pending.push_front(queued);
        drop(state);
        self.work.notify_all();
    }

    /// Record the outcome of one execution, re-submitting retries.
    pub(crate) fn finish(&self, queued: QueuedJob, outcome: JobOutcome) {
        let mut state = self.lock();
        state.running = state.running.saturating_sub(1);

        match outcome {
            JobOutcome::Completed => {
                state.outstanding = state.outstanding.saturating_sub(1);
                state.completed += 1;
                trace!(job_id = %queued.id, dispatches = queued.dispatches, "job completed");
            }
            JobOutcome::RetryNow => {
                state.retried += 1;
                debug!(job_id = %queued.id, dispatches = queued.dispatches, "job re-queued");
                state.pending.push_back(queued);
            }
            JobOutcome::RetryAfter(delay) => {
                let delay = delay.min(MAX_RETRY_DELAY);
                let now = Instant::now();
                state.retried += 1;
                state.delay_seq += 1;
                let seq = state.delay_seq;
                debug!(
                    job_id = %queued.id,
                    dispatches = queued.dispatches,
                    delay_ms = delay.as_millis() as u64,
                    "job scheduled for retry"
                );
                state.delayed.push(Delayed {
                    due: now.checked_add(delay).unwrap_or(now),
                    seq,
                    queued,
                });
            }
        }

        drop(state);
        self.work.notify_all();
    }
}

/// Job queue backed by a fixed pool of worker threads.
///
/// Jobs are dispatched in submission order; retried jobs rejoin the tail.
/// Dropping a started queue stops it, which blocks until every accepted job
/// has completed.
pub struct Queue {
    config: QueueConfig,
    shared: Arc<Shared>,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl Queue {
    /// Create a queue. A pool size of zero is raised to one.
    pub fn new(config: QueueConfig) -> Self {
        let config = QueueConfig {
            workers: config.workers.max(1),
            ..config
        };
        Self {
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(State::new()),
                work: Condvar::new(),
            }),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    /// Spawn the worker pool and the dispatcher.
    ///
    /// Only the first call has an effect; later or concurrent calls return
    /// `Ok(())` without spawning anything.
    pub fn start(&self) -> Result<(), QueueError> {
        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut state = self.shared.lock();
            if state.phase != Phase::NotStarted {
                return Ok(());
            }
            state.phase = Phase::Running;
        }

        let (idle_tx, idle_rx) = mpsc::sync_channel::<WorkerSlot>(self.config.workers);

        for id in 0..self.config.workers {
            match worker::spawn(&self.config.name, id, self.shared.clone(), idle_tx.clone()) {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    drop(idle_rx);
                    self.abort_start(&mut threads);
                    return Err(e.into());
                }
            }
        }
        drop(idle_tx);

        let shared = self.shared.clone();
        let name = self.config.name.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-dispatcher", self.config.name))
            .spawn(move || dispatch_loop(&name, &shared, idle_rx));

        match spawned {
            Ok(handle) => threads.push(handle),
            Err(e) => {
                self.abort_start(&mut threads);
                return Err(e.into());
            }
        }

        info!(queue = %self.config.name, workers = self.config.workers, "queue started");
        Ok(())
    }

    /// Workers already spawned exit once the idle registry is gone.
    fn abort_start(&self, threads: &mut Vec<thread::JoinHandle<()>>) {
        self.shared.lock().phase = Phase::Stopped;
        self.shared.work.notify_all();
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
        warn!(queue = %self.config.name, "queue failed to start");
    }

    /// Accept a job for execution.
    pub fn push<J: Job>(&self, job: J) -> Result<JobId, QueueError> {
        self.push_boxed(Box::new(job))
    }

    /// Accept an already boxed job.
    ///
    /// Fails without keeping the job when the queue is not running.
    pub fn push_boxed(&self, job: Box<dyn Job>) -> Result<JobId, QueueError> {
        let mut state = self.shared.lock();
        match state.phase {
            Phase::Running => {}
            Phase::NotStarted => return Err(QueueError::NotStarted),
            Phase::Stopping | Phase::Stopped => return Err(QueueError::Closed),
        }

        let id = JobId::new();
        trace!(queue = %self.config.name, job_id = %id, name = job.name(), "job accepted");
        state.outstanding += 1;
        state.pending.push_back(QueuedJob {
            id,
            dispatches: 0,
            job,
        });
        drop(state);

        self.shared.work.notify_all();
        Ok(id)
    }

    /// Stop accepting jobs, wait for every accepted job to complete, then
    /// tear down the dispatcher and the workers.
    ///
    /// In-flight work is not cancelled. Every caller blocks until teardown
    /// has finished; calls after that return immediately.
    pub fn stop(&self) {
        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut state = self.shared.lock();
            match state.phase {
                Phase::NotStarted => {
                    state.phase = Phase::Stopped;
                    return;
                }
                Phase::Running => {
                    state.phase = Phase::Stopping;
                    info!(
                        queue = %self.config.name,
                        outstanding = state.outstanding,
                        "queue stopping"
                    );
                }
                Phase::Stopping | Phase::Stopped => {}
            }
        }
        self.shared.work.notify_all();

        let mut joined = false;
        for handle in threads.drain(..) {
            joined = true;
            if handle.join().is_err() {
                warn!(queue = %self.config.name, "queue thread panicked");
            }
        }

        self.shared.lock().phase = Phase::Stopped;
        if joined {
            info!(queue = %self.config.name, "queue stopped");
        }
    }

    /// Current counters.
    pub fn stats(&self) -> QueueStats {
        let state = self.shared.lock();
        QueueStats {
            pending: state.pending.len(),
            delayed: state.delayed.len(),
            outstanding: state.outstanding,
            running: state.running,
            dispatched: state.dispatched,
            completed: state.completed,
            retried: state.retried,
        }
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("config", &self.config)
            .field("phase", &self.phase())
            .finish()
    }
}

/// Hand pending jobs to idle workers until the queue is stopped and drained.
///
/// Blocks on the idle registry while every worker is busy. Dropping the
/// registry on exit releases the parked workers.
fn dispatch_loop(name: &str, shared: &Shared, idle: mpsc::Receiver<WorkerSlot>) {
    debug!(queue = %name, "dispatcher started");

    loop {
        let slot = match idle.recv() {
            Ok(slot) => slot,
            Err(_) => {
                warn!(queue = %name, "no workers left; dispatcher exiting");
                break;
            }
        };

        let Some(queued) = shared.next_job() else {
            break;
        };

        trace!(
            queue = %name,
            job_id = %queued.id,
            dispatches = queued.dispatches,
            "dispatching job"
        );

        if let Err(mpsc::SendError(queued)) = slot.send(queued) {
            warn!(queue = %name, job_id = %queued.id, "worker vanished before hand-off");
            shared.restore(queued);
        }
    }

    debug!(queue = %name, "dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    fn started(workers: usize) -> Queue {
        let queue = Queue::new(QueueConfig::default().with_name("test").with_workers(workers));
        queue.start().unwrap();
        queue
    }

    #[test]
    fn push_before_start_is_rejected() {
        let queue = Queue::new(QueueConfig::default());
        let err = queue.push(|| JobOutcome::Completed).unwrap_err();
        assert!(matches!(err, QueueError::NotStarted));
        assert_eq!(queue.stats().outstanding, 0);
    }

    #[test]
    fn start_is_idempotent() {
        let queue = started(2);
        queue.start().unwrap();
        assert_eq!(queue.phase(), Phase::Running);
        assert_eq!(queue.threads.lock().unwrap().len(), 3);
        queue.stop();
    }

    #[test]
    fn zero_workers_is_raised_to_one() {
        let queue = Queue::new(QueueConfig::default().with_workers(0));
        assert_eq!(queue.config().workers, 1);
    }

    #[test]
    fn stop_on_unstarted_queue_is_final() {
        let queue = Queue::new(QueueConfig::default());
        queue.stop();
        assert_eq!(queue.phase(), Phase::Stopped);
        queue.start().unwrap();
        assert_eq!(queue.phase(), Phase::Stopped);
    }

    #[test]
    fn retry_now_rejoins_the_tail() {
        let queue = started(1);
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();

        queue
            .push(move || {
                if r.fetch_add(1, AtomicOrdering::SeqCst) < 2 {
                    JobOutcome::RetryNow
                } else {
                    JobOutcome::Completed
                }
            })
            .unwrap();

        queue.stop();
        assert_eq!(runs.load(AtomicOrdering::SeqCst), 3);

        let stats = queue.stats();
        assert_eq!(stats.retried, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.dispatched, 3);
        assert_eq!(stats.outstanding, 0);
    }

    #[test]
    fn delayed_retry_does_not_hold_a_worker() {
        let queue = started(1);
        let delayed_runs = Arc::new(AtomicUsize::new(0));
        let quick_done = Arc::new(Mutex::new(None::<Instant>));
        let started_at = Instant::now();

        let d = delayed_runs.clone();
        queue
            .push(move || {
                if d.fetch_add(1, AtomicOrdering::SeqCst) == 0 {
                    JobOutcome::RetryAfter(Duration::from_millis(300))
                } else {
                    JobOutcome::Completed
                }
            })
            .unwrap();

        let q = quick_done.clone();
        queue
            .push(move || {
                *q.lock().unwrap() = Some(Instant::now());
                JobOutcome::Completed
            })
            .unwrap();

        queue.stop();
        let finished = Instant::now();

        assert_eq!(delayed_runs.load(AtomicOrdering::SeqCst), 2);
        let quick = quick_done.lock().unwrap().expect("second job ran");
        // The single worker was free while the first job waited out its delay.
        assert!(quick.duration_since(started_at) < Duration::from_millis(300));
        assert!(finished.duration_since(started_at) >= Duration::from_millis(300));
        assert!(finished.duration_since(started_at) < TEST_TIMEOUT);
    }

    #[test]
    fn panicking_job_does_not_block_shutdown() {
        let queue = started(1);
        let after = Arc::new(AtomicUsize::new(0));

        queue.push(|| -> JobOutcome { panic!("boom") }).unwrap();
        let a = after.clone();
        queue
            .push(move || {
                a.fetch_add(1, AtomicOrdering::SeqCst);
                JobOutcome::Completed
            })
            .unwrap();

        queue.stop();
        assert_eq!(after.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(queue.stats().completed, 2);
    }

    #[test]
    fn oversized_retry_delay_is_capped() {
        let shared = Shared {
            state: Mutex::new(State::new()),
            work: Condvar::new(),
        };
        let before = Instant::now();

        shared.finish(
            QueuedJob {
                id: JobId::new(),
                dispatches: 1,
                job: Box::new(|| JobOutcome::Completed),
            },
            JobOutcome::RetryAfter(Duration::MAX),
        );

        let state = shared.lock();
        assert_eq!(state.delayed.len(), 1);
        assert_eq!(state.retried, 1);
        let due = state.next_due().unwrap();
        assert!(due >= before + MAX_RETRY_DELAY);
        assert!(due <= Instant::now() + MAX_RETRY_DELAY);
    }

    #[test]
    fn delayed_entries_pop_earliest_first() {
        let mut heap = BinaryHeap::new();
        let now = Instant::now();
        for (offset, seq) in [(30u64, 1u64), (10, 2), (20, 3), (10, 4)] {
            heap.push(Delayed {
                due: now + Duration::from_millis(offset),
                seq,
                queued: QueuedJob {
                    id: JobId::new(),
                    dispatches: 0,
                    job: Box::new(|| JobOutcome::Completed),
                },
            });
        }

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|d| d.seq)).collect();
        assert_eq!(order, vec![2, 4, 3, 1]);
    }
}
