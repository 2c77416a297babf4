//! Bounded thread pool for best-effort background tasks (thumbnails, link
//! verification, recent-project registration).
//!
//! Jobs are fire-and-forget: nobody awaits them and failures are only logged.
//! The queue is bounded, so a burst of imports cannot spawn unlimited work;
//! when full, new jobs are dropped with a warning.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::{trace, warn};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

struct Task {
    label: String,
    job: Job,
}

/// Background work queue shared by the store and the media resolver.
///
/// # Example
/// ```ignore
/// let queue = BackgroundQueue::new(2, 64);
/// queue.submit("thumbnail clip.mp4", move || {
///     thumbnailer.render(&source, MediaType::Video, id, &target)
/// });
/// ```
pub struct BackgroundQueue {
    sender: Option<Sender<Task>>,
    handles: Vec<thread::JoinHandle<()>>,
    pending: Arc<AtomicUsize>,
}

impl BackgroundQueue {
    /// Create the pool.
    ///
    /// * `num_threads` - worker threads (at least one is always started)
    /// * `capacity` - maximum number of queued, not yet running, jobs
    pub fn new(num_threads: usize, capacity: usize) -> Self {
        let (sender, receiver) = bounded::<Task>(capacity.max(1));
        let pending = Arc::new(AtomicUsize::new(0));

        let handles = (0..num_threads.max(1))
            .map(|worker_id| {
                let receiver: Receiver<Task> = receiver.clone();
                let pending = Arc::clone(&pending);
                thread::Builder::new()
                    .name(format!("vvstudio-bg-{}", worker_id))
                    .spawn(move || {
                        trace!("Background worker {} started", worker_id);
                        // Channel closes when the queue is dropped
                        for task in receiver.iter() {
                            run_task(task);
                            pending.fetch_sub(1, Ordering::SeqCst);
                        }
                        trace!("Background worker {} stopped", worker_id);
                    })
                    .expect("Failed to spawn background worker thread")
            })
            .collect::<Vec<_>>();

        trace!(
            "BackgroundQueue initialized: {} threads, capacity {}",
            handles.len(),
            capacity
        );

        Self {
            sender: Some(sender),
            handles,
            pending,
        }
    }

    /// Pool sized from the CPU count (half the cores, at least one).
    pub fn with_defaults(capacity: usize) -> Self {
        Self::new((num_cpus::get() / 2).max(1), capacity)
    }

    /// Enqueue a job. Returns `false` if the queue was full or shut down and
    /// the job was dropped.
    pub fn submit<F>(&self, label: impl Into<String>, f: F) -> bool
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let label = label.into();
        let Some(sender) = &self.sender else {
            warn!("Background queue shut down, dropping '{}'", label);
            return false;
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        match sender.try_send(Task {
            label,
            job: Box::new(f),
        }) {
            Ok(()) => true,
            Err(TrySendError::Full(task)) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                warn!("Background queue full, dropping '{}'", task.label);
                false
            }
            Err(TrySendError::Disconnected(task)) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                warn!("Background queue disconnected, dropping '{}'", task.label);
                false
            }
        }
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Block until every submitted job has finished or `timeout` elapses.
    /// Returns `true` when the queue drained.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

fn run_task(task: Task) {
    let Task { label, job } = task;
    trace!("Running background job '{}'", label);
    match catch_unwind(AssertUnwindSafe(job)) {
        Ok(Ok(())) => trace!("Background job '{}' done", label),
        Ok(Err(e)) => warn!("Background job '{}' failed: {:#}", label, e),
        Err(_) => warn!("Background job '{}' panicked", label),
    }
}

impl Drop for BackgroundQueue {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("BackgroundQueue shutting down ({} threads)...", num_threads);

        // Closing the channel lets workers finish queued jobs and exit
        self.sender.take();

        // Best-effort jobs only: don't hold the process hostage
        let deadline = Instant::now() + Duration::from_millis(500);

        let handles = std::mem::take(&mut self.handles);
        for handle in handles {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, detaching remaining workers");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} background workers stopped", num_threads);
    }
}
