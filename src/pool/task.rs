//! Type-erased task wrappers queued between submitters and workers.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::TaskError;
use crate::handle::{panic_message, CancelToken, Promise};

/// What running a task amounted to, for the pool's accounting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// A unit of queued work. Implementations must not unwind out of `run`.
pub(crate) trait Runnable: Send {
    /// Execute the task, recording its terminal outcome.
    fn run(self: Box<Self>) -> RunOutcome;

    /// Resolve the task cancelled without running it (queue eviction or
    /// purge).
    fn abandon(self: Box<Self>);

    /// The task's cooperative cancellation token.
    fn token(&self) -> CancelToken;
}

/// A task with a result handle attached.
pub(crate) struct Job<T, F> {
    promise: Promise<T>,
    body: Option<F>,
}

impl<T, F> Job<T, F> {
    pub(crate) fn new(promise: Promise<T>, body: F) -> Self {
        Self {
            promise,
            body: Some(body),
        }
    }
}

impl<T, F> Runnable for Job<T, F>
where
    T: Send + Sync + 'static,
    F: FnOnce(&CancelToken) -> T + Send + 'static,
{
    fn run(mut self: Box<Self>) -> RunOutcome {
        if !self.promise.try_start() {
            // Cancelled while queued; the body must never run.
            return RunOutcome::Cancelled;
        }
        let Some(body) = self.body.take() else {
            self.promise.complete_err(TaskError::Cancelled);
            return RunOutcome::Cancelled;
        };
        let token = self.promise.token();
        match catch_unwind(AssertUnwindSafe(|| body(&token))) {
            Ok(_) if token.is_cancelled() => {
                self.promise.complete_err(TaskError::Cancelled);
                RunOutcome::Cancelled
            }
            Ok(value) => {
                self.promise.complete_ok(value);
                RunOutcome::Completed
            }
            Err(panic) => {
                self.promise
                    .complete_err(TaskError::Failed(panic_message(&*panic)));
                RunOutcome::Failed
            }
        }
    }

    fn abandon(mut self: Box<Self>) {
        self.body = None;
        self.promise.cancel_if_pending();
    }

    fn token(&self) -> CancelToken {
        self.promise.token()
    }
}

impl<T, F> Drop for Job<T, F> {
    fn drop(&mut self) {
        // A job dropped without running (pool teardown, failed hand-off)
        // must still resolve its handle so no waiter hangs.
        self.promise.cancel_if_pending();
    }
}

/// A task submitted through `execute`: no handle, failures surface only via
/// the error log and the failure counter.
pub(crate) struct FireAndForget<F> {
    body: Option<F>,
    token: CancelToken,
}

impl<F> FireAndForget<F> {
    pub(crate) fn new(body: F) -> Self {
        Self {
            body: Some(body),
            token: CancelToken::new(),
        }
    }
}

impl<F> Runnable for FireAndForget<F>
where
    F: FnOnce() + Send + 'static,
{
    fn run(mut self: Box<Self>) -> RunOutcome {
        let Some(body) = self.body.take() else {
            return RunOutcome::Cancelled;
        };
        if self.token.is_cancelled() {
            return RunOutcome::Cancelled;
        }
        match catch_unwind(AssertUnwindSafe(body)) {
            Ok(()) => RunOutcome::Completed,
            Err(panic) => {
                tracing::error!(error = %panic_message(&*panic), "uncaught task failure");
                RunOutcome::Failed
            }
        }
    }

    fn abandon(mut self: Box<Self>) {
        self.body = None;
    }

    fn token(&self) -> CancelToken {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::pair;

    #[test]
    fn test_job_completes_handle() {
        let (promise, handle) = pair::<i32>();
        let job: Box<dyn Runnable> = Box::new(Job::new(promise, |_: &CancelToken| 7));
        assert_eq!(job.run(), RunOutcome::Completed);
        assert_eq!(handle.get().unwrap(), 7);
    }

    #[test]
    fn test_job_captures_panic() {
        let (promise, handle) = pair::<i32>();
        let job: Box<dyn Runnable> =
            Box::new(Job::new(promise, |_: &CancelToken| panic!("kaboom")));
        assert_eq!(job.run(), RunOutcome::Failed);
        match handle.get().unwrap_err() {
            TaskError::Failed(msg) => assert!(msg.contains("kaboom")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_job_never_runs() {
        let (promise, handle) = pair::<i32>();
        handle.cancel();
        let job: Box<dyn Runnable> = Box::new(Job::new(promise, |_: &CancelToken| {
            unreachable!("body must not run")
        }));
        assert_eq!(job.run(), RunOutcome::Cancelled);
        assert!(handle.get().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_abandon_resolves_cancelled() {
        let (promise, handle) = pair::<i32>();
        let job: Box<dyn Runnable> = Box::new(Job::new(promise, |_: &CancelToken| 1));
        job.abandon();
        assert!(handle.get().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_dropped_job_resolves_cancelled() {
        let (promise, handle) = pair::<i32>();
        let job: Box<dyn Runnable> = Box::new(Job::new(promise, |_: &CancelToken| 1));
        drop(job);
        assert!(handle.get().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_fire_and_forget_swallows_panic() {
        let job: Box<dyn Runnable> = Box::new(FireAndForget::new(|| panic!("ignored")));
        assert_eq!(job.run(), RunOutcome::Failed);
    }
}
