//! Worker thread main loop.

use std::sync::Arc;
use std::thread;

use crate::error::TakeError;
use crate::events::{PoolEvent, PoolState};

use super::task::{RunOutcome, Runnable};
use super::PoolShared;

/// Bookkeeping guard: deregisters the worker on every exit path and handles
/// the pool-wide consequences (replacement, termination).
struct WorkerGuard {
    shared: Arc<PoolShared>,
    id: usize,
    /// Set when the worker reserved its own retirement slot.
    retired: bool,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        let mut terminated = false;
        {
            let mut book = self.shared.book.lock().unwrap();
            book.workers -= 1;
            if self.retired {
                book.retiring -= 1;
            }
            book.running.remove(&self.id);

            // A worker that died outside the normal retire/shutdown paths is
            // replaced so the standing capacity stays at `core`.
            if thread::panicking()
                && book.state == PoolState::Running
                && book.workers < self.shared.core
            {
                tracing::warn!(worker = self.id, "worker died unexpectedly, replacing");
                super::spawn_worker(&self.shared, &mut book, None);
            }

            if book.workers == 0
                && matches!(book.state, PoolState::ShuttingDown | PoolState::Stopping)
            {
                book.state = PoolState::Terminated;
                terminated = true;
            }
        }
        if terminated {
            // Publish before waking awaiters so a subscriber that saw
            // `await_termination` return also sees the event.
            self.shared.events.emit(PoolEvent {
                state: PoolState::Terminated,
            });
            self.shared.terminated.notify_all();
            tracing::info!(pool = %self.shared.name, "pool terminated");
        }
    }
}

pub(super) fn run(shared: Arc<PoolShared>, id: usize, initial: Option<Box<dyn Runnable>>) {
    tracing::debug!(worker = id, "worker started");
    let mut guard = WorkerGuard {
        shared: Arc::clone(&shared),
        id,
        retired: false,
    };

    if let Some(job) = initial {
        execute_job(&shared, id, job);
    }

    loop {
        let above_core = { shared.book.lock().unwrap().workers > shared.core };

        let job = if above_core {
            match shared.queue.take_timeout(shared.keep_alive) {
                Ok(job) => job,
                Err(TakeError::TimedOut) => {
                    // Reserve the retirement under the lock so concurrent
                    // timeouts cannot drop the pool below `core`.
                    let retire = {
                        let mut book = shared.book.lock().unwrap();
                        if book.workers - book.retiring > shared.core {
                            book.retiring += 1;
                            true
                        } else {
                            false
                        }
                    };
                    if retire {
                        tracing::debug!(worker = id, "idle past keep-alive, retiring");
                        guard.retired = true;
                        break;
                    }
                    continue;
                }
                Err(_) => break,
            }
        } else {
            match shared.queue.take() {
                Ok(job) => job,
                Err(_) => break,
            }
        };

        execute_job(&shared, id, job);
    }

    tracing::debug!(worker = id, "worker stopped");
}

/// Run one task, tracking the busy count and exposing the task's cancel
/// token so `shutdown_now` can reach in-flight work.
pub(super) fn execute_job(shared: &PoolShared, id: usize, job: Box<dyn Runnable>) {
    {
        let mut book = shared.book.lock().unwrap();
        book.busy += 1;
        let token = job.token();
        // A task dequeued concurrently with shutdown_now may register after
        // the token sweep; the state check under the same lock closes that
        // window.
        if book.state == PoolState::Stopping {
            token.set();
        }
        book.running.insert(id, token);
    }
    let outcome = job.run();
    {
        let mut book = shared.book.lock().unwrap();
        book.busy -= 1;
        book.running.remove(&id);
    }
    shared.record(outcome);
}

impl PoolShared {
    pub(super) fn record(&self, outcome: RunOutcome) {
        use std::sync::atomic::Ordering;
        match outcome {
            RunOutcome::Completed => {
                self.completed.fetch_add(1, Ordering::SeqCst);
            }
            RunOutcome::Failed => {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
            RunOutcome::Cancelled => {}
        }
    }
}
