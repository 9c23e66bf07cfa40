//! Bounded worker pool.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      WorkerPool                            │
//! ├────────────────────────────────────────────────────────────┤
//! │  submit() ──► sizing ladder                                │
//! │     │   1. below core   → spawn worker, run directly       │
//! │     │   2. at core      → enqueue                          │
//! │     │   3. queue full,                                     │
//! │     │      below max    → spawn non-core worker            │
//! │     │   4. saturated    → admission policy                 │
//! │     ▼                                                      │
//! │  ┌──────────────┐    ┌─────────┐  ┌─────────┐              │
//! │  │ BoundedQueue │◄───┤ Worker1 │  │ Worker2 │  ...         │
//! │  └──────────────┘    └────┬────┘  └────┬────┘              │
//! │                          ▼            ▼                    │
//! │                     TaskHandle results                     │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Workers above the core count retire after `keep_alive` of idleness.
//! Shutdown closes the queue: graceful shutdown drains it, immediate
//! shutdown purges it and signals in-flight tasks to cancel.

mod task;
mod worker;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::admission::AdmissionPolicy;
use crate::config::{ConfigError, PoolConfig, WorkerNamer};
use crate::error::{PutError, SubmitError};
use crate::events::{EventBus, PoolEvent, PoolState};
use crate::handle::{self, CancelToken, TaskHandle};
use crate::queue::BoundedQueue;

use task::{FireAndForget, Job, Runnable};

/// Mutable pool bookkeeping, guarded by a single mutex.
pub(crate) struct Book {
    pub(crate) state: PoolState,
    /// Live worker threads.
    pub(crate) workers: usize,
    /// Workers that reserved retirement but have not yet exited.
    pub(crate) retiring: usize,
    /// Workers currently running a task.
    pub(crate) busy: usize,
    pub(crate) next_worker_id: usize,
    /// Cancel tokens of in-flight tasks, keyed by worker id.
    pub(crate) running: HashMap<usize, CancelToken>,
}

/// State shared between the pool facade and its worker threads.
pub(crate) struct PoolShared {
    pub(crate) name: String,
    pub(crate) core: usize,
    pub(crate) max: usize,
    pub(crate) keep_alive: Duration,
    pub(crate) admission: AdmissionPolicy,
    pub(crate) namer: Option<WorkerNamer>,
    pub(crate) queue: BoundedQueue<Box<dyn Runnable>>,
    pub(crate) book: Mutex<Book>,
    pub(crate) terminated: Condvar,
    pub(crate) events: EventBus,
    pub(crate) completed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) rejected: AtomicU64,
}

/// Point-in-time pool gauges. Values may be stale by the time they are read;
/// use them for monitoring, never for correctness decisions.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// Current lifecycle state.
    pub state: PoolState,
    /// Live worker threads.
    pub workers: usize,
    /// Workers currently running a task.
    pub busy: usize,
    /// Workers waiting for work.
    pub idle: usize,
    /// Tasks waiting in the queue.
    pub queued: usize,
    /// Maximum queue capacity.
    pub queue_capacity: usize,
    /// Tasks completed successfully since the pool was created.
    pub completed: u64,
    /// Tasks whose body panicked.
    pub failed: u64,
    /// Submissions refused or discarded by the admission policy.
    pub rejected: u64,
}

/// A bounded pool of worker threads executing opaque tasks.
///
/// See the [module documentation](self) for the sizing ladder and lifecycle.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    /// Create a pool from a validated configuration.
    pub fn new(config: PoolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let PoolConfig {
            core,
            max,
            keep_alive,
            queue_capacity,
            admission,
            name,
            namer,
        } = config;

        let shared = Arc::new(PoolShared {
            name,
            core,
            max,
            keep_alive,
            admission,
            namer,
            queue: BoundedQueue::new(queue_capacity),
            book: Mutex::new(Book {
                state: PoolState::Running,
                workers: 0,
                retiring: 0,
                busy: 0,
                next_worker_id: 0,
                running: HashMap::new(),
            }),
            terminated: Condvar::new(),
            events: EventBus::new(),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        });

        tracing::info!(
            pool = %shared.name,
            core = shared.core,
            max = shared.max,
            queue_capacity,
            admission = %shared.admission,
            "worker pool created"
        );

        Ok(Self { shared })
    }

    /// Create a fixed-size pool: `workers` core threads and no burst
    /// capacity.
    pub fn fixed(workers: usize, queue_capacity: usize) -> Result<Self, ConfigError> {
        Self::new(
            PoolConfig::builder()
                .core(workers)
                .max(workers)
                .queue_capacity(queue_capacity)
                .build()?,
        )
    }

    /// Submit a task, returning a handle to its eventual result.
    pub fn submit<T, F>(&self, f: F) -> Result<TaskHandle<T>, SubmitError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.submit_cancellable(move |_| f())
    }

    /// Submit a task whose body observes the cooperative cancellation token.
    pub fn submit_cancellable<T, F>(&self, f: F) -> Result<TaskHandle<T>, SubmitError>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&CancelToken) -> T + Send + 'static,
    {
        let (promise, handle) = handle::pair();
        self.dispatch(Box::new(Job::new(promise, f)))?;
        Ok(handle)
    }

    /// Submit a task with no result handle. Failures surface only through
    /// the pool's failure accounting and the error log.
    pub fn execute<F>(&self, f: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch(Box::new(FireAndForget::new(f)))
    }

    /// Route one task through the sizing ladder. The order is deliberate:
    /// grow to core, then queue, then grow to max, then ask the admission
    /// policy.
    fn dispatch(&self, job: Box<dyn Runnable>) -> Result<(), SubmitError> {
        let shared = &self.shared;

        {
            let mut book = shared.book.lock().unwrap();
            if book.state != PoolState::Running {
                return Err(SubmitError::ShutDown);
            }
            if book.workers < shared.core {
                spawn_worker(shared, &mut book, Some(job));
                return Ok(());
            }
        }

        let job = match shared.queue.try_put(job) {
            Ok(()) => {
                // With core == 0 (or after non-core retirement) the queue can
                // accept work while no worker is alive; spawn one so the task
                // cannot strand.
                let mut book = shared.book.lock().unwrap();
                if book.workers == 0
                    && book.state == PoolState::Running
                    && book.workers < shared.max
                {
                    spawn_worker(shared, &mut book, None);
                }
                return Ok(());
            }
            Err(PutError::Closed(_)) => return Err(SubmitError::ShutDown),
            Err(err) => err.into_inner(),
        };

        {
            let mut book = shared.book.lock().unwrap();
            if book.state != PoolState::Running {
                return Err(SubmitError::ShutDown);
            }
            if book.workers < shared.max {
                spawn_worker(shared, &mut book, Some(job));
                return Ok(());
            }
        }

        self.admit(job)
    }

    /// Apply the admission policy to a task that found the pool saturated.
    fn admit(&self, job: Box<dyn Runnable>) -> Result<(), SubmitError> {
        let shared = &self.shared;
        match shared.admission {
            AdmissionPolicy::Reject => {
                shared.rejected.fetch_add(1, Ordering::SeqCst);
                let queued = shared.queue.len();
                tracing::debug!(pool = %shared.name, queued, "submission rejected: overload");
                Err(SubmitError::Overload {
                    capacity: shared.queue.capacity(),
                    queued,
                })
            }
            AdmissionPolicy::CallerRuns => {
                let outcome = job.run();
                shared.record(outcome);
                Ok(())
            }
            AdmissionPolicy::DropNewest => {
                shared.rejected.fetch_add(1, Ordering::SeqCst);
                job.abandon();
                Ok(())
            }
            AdmissionPolicy::DropOldest => match shared.queue.force_put(job) {
                Ok(Some(evicted)) => {
                    shared.rejected.fetch_add(1, Ordering::SeqCst);
                    evicted.abandon();
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(PutError::Closed(_)) => Err(SubmitError::ShutDown),
                Err(err) => {
                    // Zero-capacity queue: nothing to evict, the newcomer is
                    // dropped instead.
                    shared.rejected.fetch_add(1, Ordering::SeqCst);
                    err.into_inner().abandon();
                    Ok(())
                }
            },
        }
    }

    /// Begin a graceful shutdown: no new submissions, queued work drains,
    /// workers exit once the queue is empty. Idempotent.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        {
            let mut book = shared.book.lock().unwrap();
            if book.state != PoolState::Running {
                return;
            }
            book.state = PoolState::ShuttingDown;
        }
        tracing::info!(pool = %shared.name, "pool shutting down");
        shared.events.emit(PoolEvent {
            state: PoolState::ShuttingDown,
        });
        shared.queue.close();
        self.finish_if_empty(PoolState::ShuttingDown);
    }

    /// Shut down immediately: purge the queue (each purged task's handle
    /// resolves cancelled), signal in-flight tasks to cancel, and stop
    /// workers after their current iteration. Returns the number of purged
    /// tasks. Idempotent; may also escalate a graceful shutdown in progress.
    pub fn shutdown_now(&self) -> usize {
        let shared = &self.shared;
        {
            let mut book = shared.book.lock().unwrap();
            if matches!(book.state, PoolState::Stopping | PoolState::Terminated) {
                return 0;
            }
            book.state = PoolState::Stopping;
            for token in book.running.values() {
                token.set();
            }
        }
        shared.events.emit(PoolEvent {
            state: PoolState::Stopping,
        });
        shared.queue.close();

        let purged = shared.queue.drain();
        let count = purged.len();
        for job in purged {
            job.abandon();
        }
        tracing::info!(pool = %shared.name, purged = count, "pool stopping");

        self.finish_if_empty(PoolState::Stopping);
        count
    }

    /// Graceful shutdown with a deadline: drain for half of `timeout`, then
    /// escalate to `shutdown_now` and wait out the rest. Returns whether the
    /// pool terminated in time.
    pub fn shutdown_graceful(&self, timeout: Duration) -> bool {
        self.shutdown();
        let half = timeout / 2;
        if self.await_termination(half) {
            return true;
        }
        let purged = self.shutdown_now();
        if purged > 0 {
            tracing::warn!(pool = %self.shared.name, purged, "discarded queued tasks");
        }
        self.await_termination(timeout.saturating_sub(half))
    }

    /// Block until the pool is terminated or `timeout` elapses. Returns
    /// `true` iff the pool terminated. A zero timeout is a non-blocking
    /// poll.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let shared = &self.shared;
        let mut book = shared.book.lock().unwrap();
        loop {
            if book.state == PoolState::Terminated {
                return true;
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (guard, _) = shared.terminated.wait_timeout(book, remaining).unwrap();
            book = guard;
        }
    }

    /// Flip to TERMINATED when shutdown finds no workers left to do it.
    fn finish_if_empty(&self, expected: PoolState) {
        let shared = &self.shared;
        let terminated = {
            let mut book = shared.book.lock().unwrap();
            if book.workers == 0 && book.state == expected {
                book.state = PoolState::Terminated;
                true
            } else {
                false
            }
        };
        if terminated {
            shared.events.emit(PoolEvent {
                state: PoolState::Terminated,
            });
            shared.terminated.notify_all();
            tracing::info!(pool = %shared.name, "pool terminated");
        }
    }

    /// Subscribe to lifecycle transitions.
    pub fn subscribe(&self) -> Receiver<PoolEvent> {
        self.shared.events.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PoolState {
        self.shared.book.lock().unwrap().state
    }

    /// Snapshot of the pool's gauges.
    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        let queued = shared.queue.len();
        let book = shared.book.lock().unwrap();
        PoolStats {
            state: book.state,
            workers: book.workers,
            busy: book.busy,
            idle: book.workers.saturating_sub(book.busy),
            queued,
            queue_capacity: shared.queue.capacity(),
            completed: shared.completed.load(Ordering::SeqCst),
            failed: shared.failed.load(Ordering::SeqCst),
            rejected: shared.rejected.load(Ordering::SeqCst),
        }
    }

    /// Pool name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Register and start one worker thread. Must be called with the book lock
/// held; the count is incremented before the thread starts so the sizing
/// ladder never overshoots `max`.
pub(crate) fn spawn_worker(
    shared: &Arc<PoolShared>,
    book: &mut Book,
    initial: Option<Box<dyn Runnable>>,
) {
    let id = book.next_worker_id;
    book.next_worker_id += 1;
    book.workers += 1;

    let thread_name = match &shared.namer {
        Some(namer) => namer(id),
        None => format!("{}-{}", shared.name, id),
    };
    let pool = Arc::clone(shared);
    thread::Builder::new()
        .name(thread_name)
        .spawn(move || worker::run(pool, id, initial))
        .expect("failed to spawn worker thread");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(core: usize, max: usize, capacity: usize, admission: AdmissionPolicy) -> WorkerPool {
        WorkerPool::new(
            PoolConfig::builder()
                .core(core)
                .max(max)
                .queue_capacity(capacity)
                .admission(admission)
                .name("test")
                .build()
                .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_submit_and_get() {
        let pool = pool(2, 2, 8, AdmissionPolicy::Reject);
        let handle = pool.submit(|| 21 * 2).unwrap();
        assert_eq!(handle.get().unwrap(), 42);
    }

    #[test]
    fn test_submit_after_shutdown_rejected() {
        let pool = pool(1, 1, 8, AdmissionPolicy::Reject);
        pool.shutdown();
        let err = pool.submit(|| 1).unwrap_err();
        assert!(err.is_shut_down());
    }

    #[test]
    fn test_stats_reflect_completion() {
        let pool = pool(1, 1, 8, AdmissionPolicy::Reject);
        pool.submit(|| ()).unwrap().wait().unwrap();

        // The handle completes just before the worker's accounting runs;
        // give the counter a moment to land.
        let deadline = Instant::now() + Duration::from_secs(1);
        while pool.stats().completed == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let stats = pool.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.queue_capacity, 8);
    }

    #[test]
    fn test_task_panic_is_isolated() {
        let pool = pool(1, 1, 8, AdmissionPolicy::Reject);
        let failing = pool.submit(|| -> i32 { panic!("task blew up") }).unwrap();
        assert!(failing.get().unwrap_err().is_failed());

        // The worker survives and keeps serving tasks.
        let ok = pool.submit(|| 5).unwrap();
        assert_eq!(ok.get().unwrap(), 5);
        assert_eq!(pool.stats().failed, 1);
    }

    #[test]
    fn test_stats_serialize() {
        let pool = pool(1, 2, 4, AdmissionPolicy::DropOldest);
        let json = serde_json::to_value(pool.stats()).unwrap();
        assert_eq!(json["state"], "running");
        assert_eq!(json["queue_capacity"], 4);
    }
}
