//! Pool, task, and queue error types.

use std::fmt;
use std::time::Duration;

/// Errors returned when handing work to a [`WorkerPool`](crate::pool::WorkerPool).
#[derive(Debug, Clone)]
pub enum SubmitError {
    /// The queue is full, the pool is at its maximum size, and the admission
    /// policy rejects new work.
    Overload {
        /// Maximum queue capacity.
        capacity: usize,
        /// Number of tasks queued when the submission was refused.
        queued: usize,
    },

    /// Shutdown has been initiated; the pool accepts no further work.
    ShutDown,
}

impl SubmitError {
    /// Check if this is an overload rejection.
    pub fn is_overload(&self) -> bool {
        matches!(self, SubmitError::Overload { .. })
    }

    /// Check if this is a post-shutdown rejection.
    pub fn is_shut_down(&self) -> bool {
        matches!(self, SubmitError::ShutDown)
    }
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Overload { capacity, queued } => {
                write!(f, "pool overloaded: {}/{} tasks queued", queued, capacity)
            }
            SubmitError::ShutDown => {
                write!(f, "pool is shut down")
            }
        }
    }
}

impl std::error::Error for SubmitError {}

/// Terminal failure of a single task, observed through its
/// [`TaskHandle`](crate::handle::TaskHandle).
#[derive(Debug, Clone)]
pub enum TaskError {
    /// A bounded wait expired. The task itself keeps running and may still
    /// complete later.
    Timeout(Duration),

    /// The task was cancelled before it started, evicted from the queue, or
    /// stopped cooperatively mid-run.
    Cancelled,

    /// The task body panicked. The payload is the captured panic message.
    Failed(String),
}

impl TaskError {
    /// Check if this is a wait timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout(_))
    }

    /// Check if the task was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }

    /// Check if the task body failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskError::Failed(_))
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Timeout(d) => {
                write!(f, "wait timed out after {}ms", d.as_millis())
            }
            TaskError::Cancelled => {
                write!(f, "task was cancelled")
            }
            TaskError::Failed(msg) => {
                write!(f, "task failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for TaskError {}

/// Errors returned by the insertion side of a
/// [`BoundedQueue`](crate::queue::BoundedQueue). Every variant gives the
/// rejected item back to the caller.
#[derive(Debug)]
pub enum PutError<T> {
    /// The queue is at capacity.
    Full(T),
    /// The bounded wait expired while the queue stayed full.
    TimedOut(T),
    /// The queue has been closed.
    Closed(T),
}

impl<T> PutError<T> {
    /// Recover the item that could not be inserted.
    pub fn into_inner(self) -> T {
        match self {
            PutError::Full(item) | PutError::TimedOut(item) | PutError::Closed(item) => item,
        }
    }

    /// Check if the queue was full.
    pub fn is_full(&self) -> bool {
        matches!(self, PutError::Full(_))
    }

    /// Check if the insert timed out.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, PutError::TimedOut(_))
    }

    /// Check if the queue was closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, PutError::Closed(_))
    }
}

impl<T> fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutError::Full(_) => write!(f, "queue is full"),
            PutError::TimedOut(_) => write!(f, "insert timed out"),
            PutError::Closed(_) => write!(f, "queue is closed"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for PutError<T> {}

/// Errors returned by the removal side of a
/// [`BoundedQueue`](crate::queue::BoundedQueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeError {
    /// The queue is empty (non-blocking remove only).
    Empty,
    /// The bounded wait expired while the queue stayed empty.
    TimedOut,
    /// The queue has been closed and fully drained.
    Closed,
}

impl fmt::Display for TakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TakeError::Empty => write!(f, "queue is empty"),
            TakeError::TimedOut => write!(f, "remove timed out"),
            TakeError::Closed => write!(f, "queue is closed and drained"),
        }
    }
}

impl std::error::Error for TakeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overload_display() {
        let err = SubmitError::Overload {
            capacity: 8,
            queued: 8,
        };
        assert!(err.is_overload());
        assert!(!err.is_shut_down());
        assert!(err.to_string().contains("8/8"));
    }

    #[test]
    fn test_task_error_predicates() {
        assert!(TaskError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(TaskError::Cancelled.is_cancelled());
        assert!(TaskError::Failed("boom".into()).is_failed());
        assert!(!TaskError::Cancelled.is_failed());
    }

    #[test]
    fn test_put_error_into_inner() {
        let err = PutError::Full(42);
        assert!(err.is_full());
        assert_eq!(err.into_inner(), 42);

        let err = PutError::Closed("task");
        assert!(err.is_closed());
        assert_eq!(err.into_inner(), "task");
    }
}
