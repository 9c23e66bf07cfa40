//! Task result handles.
//!
//! A [`TaskHandle`] is the caller-visible half of a submitted task: it can be
//! waited on (with or without a timeout), polled, cancelled, and composed
//! with follow-up computations. The executing worker owns the other half, a
//! write-once promise, and records the terminal outcome exactly once; the
//! handle can be read any number of times from any thread.
//!
//! Continuations registered through [`TaskHandle::map`] or
//! [`TaskHandle::zip`] run on the completing thread, strictly after the
//! handle's internal lock has been released, so a continuation may safely
//! re-enter the pool.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::TaskError;

/// Shared terminal outcome of a task.
type Outcome<T> = Arc<Result<T, TaskError>>;

type Callback<T> = Box<dyn FnOnce(Outcome<T>) + Send>;

/// Cooperative cancellation flag a running task body may observe.
///
/// The flag is advisory: setting it never preempts the task. Bodies that
/// want to stop early check [`is_cancelled`](CancelToken::is_cancelled) at
/// convenient points.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

enum Stage<T> {
    Pending,
    Running,
    Done(Outcome<T>),
}

struct Cell<T> {
    stage: Stage<T>,
    callbacks: Vec<Callback<T>>,
}

struct Shared<T> {
    cell: Mutex<Cell<T>>,
    done: Condvar,
    cancel: CancelToken,
}

/// Create a connected promise/handle pair.
pub(crate) fn pair<T>() -> (Promise<T>, TaskHandle<T>) {
    let shared = Arc::new(Shared {
        cell: Mutex::new(Cell {
            stage: Stage::Pending,
            callbacks: Vec::new(),
        }),
        done: Condvar::new(),
        cancel: CancelToken::new(),
    });
    (
        Promise {
            shared: Arc::clone(&shared),
        },
        TaskHandle { shared },
    )
}

/// Write-once completion side of a task, held by the executing worker.
pub(crate) struct Promise<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Promise<T> {
    /// Transition SUBMITTED/QUEUED -> RUNNING. Fails if the task reached a
    /// terminal state first (cancelled while queued).
    pub(crate) fn try_start(&self) -> bool {
        let mut cell = self.shared.cell.lock().unwrap();
        match cell.stage {
            Stage::Pending => {
                cell.stage = Stage::Running;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn complete_ok(&self, value: T) {
        self.complete(Ok(value));
    }

    pub(crate) fn complete_err(&self, error: TaskError) {
        self.complete(Err(error));
    }

    /// Resolve the task CANCELLED if it has not started. Returns whether the
    /// transition happened.
    pub(crate) fn cancel_if_pending(&self) -> bool {
        let (cancelled, callbacks, outcome) = {
            let mut cell = self.shared.cell.lock().unwrap();
            match cell.stage {
                Stage::Pending => {
                    let outcome: Outcome<T> = Arc::new(Err(TaskError::Cancelled));
                    cell.stage = Stage::Done(Arc::clone(&outcome));
                    (true, std::mem::take(&mut cell.callbacks), Some(outcome))
                }
                _ => (false, Vec::new(), None),
            }
        };
        if cancelled {
            self.shared.done.notify_all();
            if let Some(outcome) = outcome {
                for cb in callbacks {
                    cb(Arc::clone(&outcome));
                }
            }
        }
        cancelled
    }

    pub(crate) fn token(&self) -> CancelToken {
        self.shared.cancel.clone()
    }

    /// Record the terminal outcome. First writer wins; later writes are
    /// ignored. Registered continuations run after the lock is released.
    fn complete(&self, result: Result<T, TaskError>) {
        let (callbacks, outcome) = {
            let mut cell = self.shared.cell.lock().unwrap();
            if let Stage::Done(_) = cell.stage {
                return;
            }
            let outcome: Outcome<T> = Arc::new(result);
            cell.stage = Stage::Done(Arc::clone(&outcome));
            (std::mem::take(&mut cell.callbacks), outcome)
        };
        self.shared.done.notify_all();
        for cb in callbacks {
            cb(Arc::clone(&outcome));
        }
    }
}

/// Caller-visible handle to a task's eventual outcome.
///
/// Handles are cheap to clone; every clone observes the same task. Value
/// reads (`get`, `get_timeout`) clone the stored result and therefore
/// require `T: Clone`; `wait`/`wait_timeout` work for any payload.
pub struct TaskHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.shared.cell.lock() {
            Ok(cell) => match cell.stage {
                Stage::Pending => "pending",
                Stage::Running => "running",
                Stage::Done(_) => "done",
            },
            Err(_) => "poisoned",
        };
        f.debug_struct("TaskHandle").field("state", &state).finish()
    }
}

impl<T> TaskHandle<T> {
    /// Check whether the task has reached a terminal state. Non-blocking.
    pub fn is_done(&self) -> bool {
        matches!(self.shared.cell.lock().unwrap().stage, Stage::Done(_))
    }

    /// Request cancellation.
    ///
    /// If the task has not started it transitions straight to CANCELLED and
    /// its body will never run; this returns `true`. If the task is already
    /// running, the cooperative flag is set and this returns `false` — the
    /// body keeps running until it observes the flag or finishes, at which
    /// point the outcome is recorded as cancelled. Cancelling a finished
    /// task has no effect.
    pub fn cancel(&self) -> bool {
        let (cancelled_before_start, callbacks, outcome) = {
            let mut cell = self.shared.cell.lock().unwrap();
            match cell.stage {
                Stage::Pending => {
                    let outcome: Outcome<T> = Arc::new(Err(TaskError::Cancelled));
                    cell.stage = Stage::Done(Arc::clone(&outcome));
                    (true, std::mem::take(&mut cell.callbacks), Some(outcome))
                }
                Stage::Running => {
                    self.shared.cancel.set();
                    (false, Vec::new(), None)
                }
                Stage::Done(_) => (false, Vec::new(), None),
            }
        };
        if let Some(outcome) = outcome {
            self.shared.done.notify_all();
            for cb in callbacks {
                cb(Arc::clone(&outcome));
            }
        }
        cancelled_before_start
    }

    /// Block until the task reaches a terminal state, without reading the
    /// value.
    pub fn wait(&self) -> Result<(), TaskError> {
        let mut cell = self.shared.cell.lock().unwrap();
        loop {
            if let Stage::Done(outcome) = &cell.stage {
                return outcome.as_ref().as_ref().map(|_| ()).map_err(Clone::clone);
            }
            cell = self.shared.done.wait(cell).unwrap();
        }
    }

    /// Block up to `timeout` for a terminal state. Fails with
    /// [`TaskError::Timeout`] if the task is still live; the task keeps
    /// running.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), TaskError> {
        let deadline = Instant::now() + timeout;
        let mut cell = self.shared.cell.lock().unwrap();
        loop {
            if let Stage::Done(outcome) = &cell.stage {
                return outcome.as_ref().as_ref().map(|_| ()).map_err(Clone::clone);
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Err(TaskError::Timeout(timeout));
            };
            let (guard, _) = self.shared.done.wait_timeout(cell, remaining).unwrap();
            cell = guard;
        }
    }

    /// The cooperative cancellation token shared with the task body.
    pub fn cancel_token(&self) -> CancelToken {
        self.shared.cancel.clone()
    }
}

impl<T: Clone> TaskHandle<T> {
    /// Block until completion and return a clone of the task's value.
    pub fn get(&self) -> Result<T, TaskError> {
        let mut cell = self.shared.cell.lock().unwrap();
        loop {
            if let Stage::Done(outcome) = &cell.stage {
                return outcome.as_ref().clone();
            }
            cell = self.shared.done.wait(cell).unwrap();
        }
    }

    /// Block up to `timeout` for the task's value.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T, TaskError> {
        self.wait_timeout(timeout)?;
        self.get()
    }
}

impl<T: Send + Sync + 'static> TaskHandle<T> {
    fn register(&self, cb: Callback<T>) {
        let outcome = {
            let mut cell = self.shared.cell.lock().unwrap();
            match &cell.stage {
                Stage::Done(outcome) => Arc::clone(outcome),
                _ => {
                    cell.callbacks.push(cb);
                    return;
                }
            }
        };
        // Already complete: run the continuation here, outside the lock.
        cb(outcome);
    }

    /// Derive a handle whose value is `f` applied to this task's value.
    ///
    /// `f` runs exactly once, on whichever thread completes this handle, and
    /// never while the handle's lock is held. Errors and cancellation
    /// propagate to the derived handle without invoking `f`; a panic inside
    /// `f` resolves the derived handle as failed.
    pub fn map<U, F>(&self, f: F) -> TaskHandle<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        let (promise, derived) = pair::<U>();
        self.register(Box::new(move |outcome: Outcome<T>| {
            match outcome.as_ref() {
                Ok(value) => match catch_unwind(AssertUnwindSafe(|| f(value))) {
                    Ok(mapped) => promise.complete_ok(mapped),
                    Err(panic) => {
                        let msg = panic_message(&*panic);
                        tracing::error!(error = %msg, "continuation panicked");
                        promise.complete_err(TaskError::Failed(msg));
                    }
                },
                Err(err) => promise.complete_err(err.clone()),
            }
        }));
        derived
    }
}

impl<T: Clone + Send + Sync + 'static> TaskHandle<T> {
    /// Combine two handles into one that yields both values once both tasks
    /// complete. The first error or cancellation wins.
    pub fn zip<U>(&self, other: &TaskHandle<U>) -> TaskHandle<(T, U)>
    where
        U: Clone + Send + Sync + 'static,
    {
        let (promise, combined) = pair::<(T, U)>();
        let promise = Arc::new(promise);
        let slot: Arc<Mutex<(Option<T>, Option<U>)>> = Arc::new(Mutex::new((None, None)));

        let left_promise = Arc::clone(&promise);
        let left_slot = Arc::clone(&slot);
        self.register(Box::new(move |outcome: Outcome<T>| {
            match outcome.as_ref() {
                Ok(value) => {
                    let ready = {
                        let mut slot = left_slot.lock().unwrap();
                        slot.0 = Some(value.clone());
                        if slot.1.is_some() {
                            slot.0.take().zip(slot.1.take())
                        } else {
                            None
                        }
                    };
                    if let Some(both) = ready {
                        left_promise.complete_ok(both);
                    }
                }
                Err(err) => left_promise.complete_err(err.clone()),
            }
        }));

        let right_slot = slot;
        other.register(Box::new(move |outcome: Outcome<U>| {
            match outcome.as_ref() {
                Ok(value) => {
                    let ready = {
                        let mut slot = right_slot.lock().unwrap();
                        slot.1 = Some(value.clone());
                        if slot.0.is_some() {
                            slot.0.take().zip(slot.1.take())
                        } else {
                            None
                        }
                    };
                    if let Some(both) = ready {
                        promise.complete_ok(both);
                    }
                }
                Err(err) => promise.complete_err(err.clone()),
            }
        }));

        combined
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_complete_then_get() {
        let (promise, handle) = pair::<i32>();
        assert!(!handle.is_done());
        promise.complete_ok(42);
        assert!(handle.is_done());
        assert_eq!(handle.get().unwrap(), 42);
        // Handles are multi-read.
        assert_eq!(handle.get().unwrap(), 42);
    }

    #[test]
    fn test_get_blocks_until_complete() {
        let (promise, handle) = pair::<&'static str>();
        let completer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            promise.complete_ok("done");
        });
        assert_eq!(handle.get().unwrap(), "done");
        completer.join().unwrap();
    }

    #[test]
    fn test_get_timeout_expires() {
        let (promise, handle) = pair::<i32>();
        let err = handle.get_timeout(Duration::from_millis(20)).unwrap_err();
        assert!(err.is_timeout());
        // The task is unaffected by the expired wait.
        promise.complete_ok(1);
        assert_eq!(handle.get().unwrap(), 1);
    }

    #[test]
    fn test_cancel_before_start() {
        let (promise, handle) = pair::<i32>();
        assert!(handle.cancel());
        assert!(!promise.try_start());
        assert!(handle.get().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_cancel_running_sets_flag_only() {
        let (promise, handle) = pair::<i32>();
        assert!(promise.try_start());
        assert!(!handle.cancel());
        assert!(!handle.is_done());
        assert!(promise.token().is_cancelled());
    }

    #[test]
    fn test_first_write_wins() {
        let (promise, handle) = pair::<i32>();
        promise.complete_ok(1);
        promise.complete_ok(2);
        promise.complete_err(TaskError::Cancelled);
        assert_eq!(handle.get().unwrap(), 1);
    }

    #[test]
    fn test_map_after_completion() {
        let (promise, handle) = pair::<i32>();
        promise.complete_ok(21);
        let doubled = handle.map(|v| v * 2);
        assert_eq!(doubled.get().unwrap(), 42);
    }

    #[test]
    fn test_map_before_completion() {
        let (promise, handle) = pair::<i32>();
        let doubled = handle.map(|v| v * 2);
        promise.complete_ok(10);
        assert_eq!(doubled.get().unwrap(), 20);
    }

    #[test]
    fn test_map_propagates_error() {
        let (promise, handle) = pair::<i32>();
        let derived = handle.map(|v| v + 1);
        promise.complete_err(TaskError::Cancelled);
        assert!(derived.get().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_map_panic_becomes_failure() {
        let (promise, handle) = pair::<i32>();
        let derived: TaskHandle<i32> = handle.map(|_| panic!("bad transform"));
        promise.complete_ok(1);
        match derived.get().unwrap_err() {
            TaskError::Failed(msg) => assert!(msg.contains("bad transform")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_zip_both_values() {
        let (pa, ha) = pair::<i32>();
        let (pb, hb) = pair::<&'static str>();
        let both = ha.zip(&hb);
        pb.complete_ok("hi");
        pa.complete_ok(5);
        assert_eq!(both.get().unwrap(), (5, "hi"));
    }

    #[test]
    fn test_zip_first_error_wins() {
        let (pa, ha) = pair::<i32>();
        let (pb, hb) = pair::<i32>();
        let both = ha.zip(&hb);
        pa.complete_err(TaskError::Cancelled);
        pb.complete_ok(2);
        assert!(both.get().unwrap_err().is_cancelled());
    }
}
