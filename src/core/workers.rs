//! Background thread pool for page loads and page renders.
//!
//! Uses work-stealing deques so an idle worker picks up whatever job is
//! waiting. The viewer never runs more than one render at a time, but a
//! document load can overlap with the tail of a render from the previous
//! document.
//!
//! Epoch mechanism lets a newer `open()` skip loads that were queued for a
//! document the user already navigated away from.

use crossbeam::deque::{Injector, Stealer, Worker};
use log::{trace, warn};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Boxed job executed on a worker thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Executor interface used by the scheduler and the viewer.
///
/// Lets tests swap the thread pool for a pool that runs jobs on demand.
pub trait WorkerPool: Send + Sync {
    /// Run job on some worker thread, eventually.
    fn execute(&self, job: Job);

    /// Run job only if `epoch` still matches the pool's epoch when the job
    /// is picked up. Stale jobs are dropped without running.
    fn execute_with_epoch(&self, epoch: u64, job: Job);
}

impl<T: WorkerPool + ?Sized> WorkerPool for Arc<T> {
    fn execute(&self, job: Job) {
        (**self).execute(job)
    }

    fn execute_with_epoch(&self, epoch: u64, job: Job) {
        (**self).execute_with_epoch(epoch, job)
    }
}

/// Worker pool with work-stealing and a shared epoch counter.
///
/// # Example
/// ```ignore
/// let epoch = Arc::new(AtomicU64::new(0));
/// let workers = Workers::new(2, Arc::clone(&epoch))?;
/// workers.execute(Box::new(move || {
///     // runs on folio-worker-N
/// }));
/// ```
pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    current_epoch: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    /// Spawn `num_threads` workers (at least one) sharing `epoch`.
    pub fn new(num_threads: usize, epoch: Arc<AtomicU64>) -> std::io::Result<Self> {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut locals: Vec<Worker<Job>> = Vec::with_capacity(num_threads);
        let mut stealers: Vec<Stealer<Job>> = Vec::with_capacity(num_threads);
        for _ in 0..num_threads {
            let worker: Worker<Job> = Worker::new_fifo();
            stealers.push(worker.stealer());
            locals.push(worker);
        }

        let mut handles = Vec::with_capacity(num_threads);
        for (worker_id, local) in locals.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let stealers = stealers.clone();

            let handle = thread::Builder::new()
                .name(format!("folio-worker-{}", worker_id))
                .spawn(move || {
                    trace!("Worker {} started", worker_id);
                    worker_loop(&local, &injector, &stealers, &shutdown);
                    trace!("Worker {} stopped", worker_id);
                })?;
            handles.push(handle);
        }

        trace!("Workers initialized: {} threads", num_threads);

        Ok(Self {
            injector,
            handles,
            current_epoch: epoch,
            shutdown,
        })
    }

    /// Number of worker threads.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Run one job; a panicking job must not take its worker thread down
fn run_job(job: Job) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        warn!("Worker job panicked");
    }
}

fn worker_loop(
    local: &Worker<Job>,
    injector: &Injector<Job>,
    stealers: &[Stealer<Job>],
    shutdown: &AtomicBool,
) {
    loop {
        if let Some(job) = local.pop() {
            run_job(job);
            continue;
        }

        if let Some(job) = injector.steal_batch_and_pop(local).success() {
            run_job(job);
            continue;
        }

        if let Some(job) = stealers.iter().find_map(|s| s.steal().success()) {
            run_job(job);
            continue;
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        // Idle: 1ms sleep keeps CPU usage near zero between page changes
        thread::sleep(Duration::from_millis(1));
    }
}

impl WorkerPool for Workers {
    fn execute(&self, job: Job) {
        self.injector.push(job);
    }

    fn execute_with_epoch(&self, epoch: u64, job: Job) {
        let current_epoch = Arc::clone(&self.current_epoch);
        // Checked at execution time, not enqueue time
        self.injector.push(Box::new(move || {
            if current_epoch.load(Ordering::Acquire) == epoch {
                job();
            } else {
                trace!("Skipping stale job (epoch {})", epoch);
            }
        }));
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);
        self.shutdown.store(true, Ordering::SeqCst);

        // A page render in progress is allowed to finish; don't wait forever for it.
        let deadline = Instant::now() + Duration::from_millis(500);
        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, detaching remaining workers");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }
        trace!("All {} workers stopped", num_threads);
    }
}
