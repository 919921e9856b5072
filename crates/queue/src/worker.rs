use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, mpsc};
use std::thread;

use tracing::{error, trace};

use crate::queue::{QueuedJob, Shared};
use crate::types::JobOutcome;

/// Hand-off channel registered in the idle pool for a single activation.
pub(crate) type WorkerSlot = mpsc::Sender<QueuedJob>;

/// Spawn a worker thread.
///
/// - Registers a fresh slot in the idle pool before every job
/// - Runs one job at a time, to completion, then reports the outcome
/// - Exits when the pool or its slot is dropped by the dispatcher
pub(crate) fn spawn(
    queue: &str,
    id: usize,
    shared: Arc<Shared>,
    idle: mpsc::SyncSender<WorkerSlot>,
) -> io::Result<thread::JoinHandle<()>> {
    let name = format!("{queue}-worker-{id}");
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || worker_loop(&name, &shared, &idle))
}

fn worker_loop(name: &str, shared: &Shared, idle: &mpsc::SyncSender<WorkerSlot>) {
    loop {
        let (slot, assigned) = mpsc::channel();

        // Pool dropped: the dispatcher has exited.
        if idle.send(slot).is_err() {
            break;
        }

        // Slot dropped without a job: same.
        let Ok(mut queued) = assigned.recv() else {
            break;
        };

        trace!(worker = name, job_id = %queued.id, job = queued.job.name(), "running job");
        let outcome = run_guarded(name, &mut queued);
        shared.finish(queued, outcome);
    }

    trace!(worker = name, "worker stopped");
}

/// A panicking job counts as completed so that `stop()` can still drain.
fn run_guarded(name: &str, queued: &mut QueuedJob) -> JobOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| queued.job.run())) {
        Ok(outcome) => outcome,
        Err(_) => {
            error!(worker = name, job_id = %queued.id, "job panicked; dropping it");
            JobOutcome::Completed
        }
    }
}
