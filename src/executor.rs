//! # Worker executors.
//!
//! All controller side effects (service `start`/`stop`, listener
//! notifications, neighbor propagation) run as jobs on an [`Executor`],
//! never under a controller lock.
//!
//! ## Rules
//! - [`Executor::execute`] hands the job **back** on rejection; the
//!   submitter runs it inline on the calling thread. Rejection is a
//!   shutdown-race fallback, not a flow-control mechanism.
//! - Jobs must not panic across the executor boundary; the controller wraps
//!   its jobs accordingly.
//!
//! Two implementations:
//! - [`ThreadPoolExecutor`] — the default, a fixed pool of worker threads.
//! - [`InlineExecutor`] — runs every job on the submitting thread; useful
//!   for deterministic tests and tiny embedded setups.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::executor::ThreadPool;

/// A unit of work submitted by a controller.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Capability to run controller jobs on worker threads.
pub trait Executor: Send + Sync + 'static {
    /// Submits a job.
    ///
    /// On rejection the job is returned to the caller, who must run it
    /// inline.
    fn execute(&self, job: Job) -> Result<(), Job>;
}

/// Default executor: a fixed pool of worker threads.
pub struct ThreadPoolExecutor {
    pool: ThreadPool,
    down: AtomicBool,
}

impl ThreadPoolExecutor {
    /// Creates a pool with the executor's default thread count.
    pub fn new() -> io::Result<Self> {
        Self::with_threads(0)
    }

    /// Creates a pool with `threads` workers (`0` = executor default).
    pub fn with_threads(threads: usize) -> io::Result<Self> {
        let mut builder = ThreadPool::builder();
        builder.name_prefix("servisor-worker-");
        if threads > 0 {
            builder.pool_size(threads);
        }
        Ok(ThreadPoolExecutor {
            pool: builder.create()?,
            down: AtomicBool::new(false),
        })
    }

    /// Stops accepting jobs. Subsequent submissions are rejected and run
    /// inline on their submitters.
    pub fn shutdown(&self) {
        self.down.store(true, Ordering::Release);
    }
}

impl Executor for ThreadPoolExecutor {
    fn execute(&self, job: Job) -> Result<(), Job> {
        if self.down.load(Ordering::Acquire) {
            return Err(job);
        }
        self.pool.spawn_ok(async move { job() });
        Ok(())
    }
}

/// Runs every job immediately on the submitting thread.
///
/// Turns the whole container synchronous and deterministic: an operation
/// returns only after every effect it caused has settled.
#[derive(Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) -> Result<(), Job> {
        job();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn pool_runs_jobs() {
        let pool = ThreadPoolExecutor::new().unwrap();
        let (tx, rx) = mpsc::channel();
        pool.execute(Box::new(move || tx.send(42).unwrap())).ok().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn shutdown_rejects_with_job_returned() {
        let pool = ThreadPoolExecutor::new().unwrap();
        pool.shutdown();
        let rejected = pool.execute(Box::new(|| {}));
        assert!(rejected.is_err());
    }

    #[test]
    fn inline_runs_before_returning() {
        let hit = std::sync::Arc::new(AtomicBool::new(false));
        let flag = hit.clone();
        InlineExecutor
            .execute(Box::new(move || flag.store(true, Ordering::SeqCst)))
            .ok()
            .unwrap();
        assert!(hit.load(Ordering::SeqCst));
    }
}
