//! Bounded worker pools and cross-cutting cancellation/deadline
//! primitives (spec.md §4.9, §5). No cooperative suspension: a worker
//! occupies a thread for the duration of its task; pools admit work up
//! to a fixed worker count via a bounded FIFO queue, rejecting beyond
//! `queue_bound` with `QueueFull`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::error::{Result, SeismicError};

/// A query- or clustering-scoped cancellation flag, checked at cluster
/// boundaries (query executor) and per-term boundaries (clustering
/// fan-out). Cheap to clone; all clones observe the same underlying
/// flag.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A query deadline in microseconds from construction (spec.md §5).
#[derive(Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    pub fn from_now(micros: u64) -> Self {
        Self {
            expires_at: Instant::now() + Duration::from_micros(micros),
        }
    }

    pub fn far_future() -> Self {
        Self {
            expires_at: Instant::now() + Duration::from_secs(3600 * 24 * 365),
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A bounded worker pool: `num_workers` dedicated threads drain a
/// `crossbeam-channel` bounded FIFO queue of at most `queue_bound`
/// pending tasks; [`Self::submit`] rejects with `QueueFull` once the
/// queue is at capacity (spec.md §4.9).
pub struct BoundedPool {
    sender: Sender<Job>,
    queue_bound: usize,
    workers: Vec<JoinHandle<()>>,
}

impl BoundedPool {
    pub fn new(num_workers: usize, queue_bound: usize) -> Self {
        let (sender, receiver): (Sender<Job>, Receiver<Job>) = bounded(queue_bound);
        let workers = (0..num_workers.max(1))
            .map(|_| {
                let receiver = receiver.clone();
                std::thread::spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })
            })
            .collect();
        Self {
            sender,
            queue_bound,
            workers,
        }
    }

    /// Training-pool sizing: `max(allocated_cpu / 2, 1)` (spec.md §4.9).
    pub fn training_pool(allocated_cpu: usize) -> Self {
        Self::new((allocated_cpu / 2).max(1), 1000)
    }

    /// Query-pool sizing: `min(2 * allocated_cpu, 1000)` (spec.md §4.9).
    pub fn query_pool(allocated_cpu: usize) -> Self {
        Self::new((2 * allocated_cpu).clamp(1, 1000), 1000)
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Submits `job` for background execution. Fails with `QueueFull`
    /// if the queue already holds `queue_bound` pending tasks.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        match self.sender.try_send(Box::new(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SeismicError::QueueFull {
                bound: self.queue_bound,
            }),
            Err(TrySendError::Disconnected(_)) => {
                Err(SeismicError::StorageError("worker pool is shut down".into()))
            }
        }
    }

    /// Submits `job` and returns a receiver for its result, for callers
    /// that need to fan out work (one submission per term/leaf) and
    /// collect results afterward (spec.md §4.4, §4.7).
    pub fn submit_collect<F, T>(&self, job: F) -> Result<Receiver<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = bounded(1);
        self.submit(move || {
            let _ = result_tx.send(job());
        })?;
        Ok(result_rx)
    }
}

impl Drop for BoundedPool {
    fn drop(&mut self) {
        // Dropping `sender` (implicit field drop before this point would
        // be wrong, so do it explicitly) closes the channel and lets
        // every worker's `recv` loop exit.
        let (dummy, _) = bounded::<Job>(0);
        let closed = std::mem::replace(&mut self.sender, dummy);
        drop(closed);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
