//! Bounded FIFO task queue.
//!
//! [`BoundedQueue`] is the buffering primitive both the worker pool and the
//! producer-consumer pipeline are built on: a fixed-capacity queue with
//! blocking, timed, and non-blocking variants of insert and remove.
//!
//! Insertion order is service order. A successful insert wakes at most one
//! waiting consumer and a successful remove wakes at most one waiting
//! producer; no operation ever wakes both sides.
//!
//! A capacity of zero turns the queue into a hand-off: an insert only
//! succeeds while a consumer is already blocked in [`take`](BoundedQueue::take)
//! or [`take_timeout`](BoundedQueue::take_timeout).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{PutError, TakeError};

struct Buffer<T> {
    items: VecDeque<T>,
    /// Consumers currently blocked waiting for an item. Used to match
    /// hand-off producers with a ready taker when capacity is zero.
    waiting_takers: usize,
    closed: bool,
}

/// A fixed-capacity FIFO queue shared between threads.
pub struct BoundedQueue<T> {
    buf: Mutex<Buffer<T>>,
    capacity: usize,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items. A capacity of zero
    /// creates a hand-off queue with no buffering.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Mutex::new(Buffer {
                items: VecDeque::with_capacity(capacity),
                waiting_takers: 0,
                closed: false,
            }),
            capacity,
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn has_room(&self, buf: &Buffer<T>) -> bool {
        if self.capacity == 0 {
            buf.items.len() < buf.waiting_takers
        } else {
            buf.items.len() < self.capacity
        }
    }

    /// Insert an item, blocking while the queue is full.
    pub fn put(&self, item: T) -> Result<(), PutError<T>> {
        let mut buf = self.buf.lock().unwrap();
        loop {
            if buf.closed {
                return Err(PutError::Closed(item));
            }
            if self.has_room(&buf) {
                break;
            }
            buf = self.not_full.wait(buf).unwrap();
        }
        buf.items.push_back(item);
        drop(buf);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Insert an item, blocking up to `timeout` while the queue is full.
    pub fn put_timeout(&self, item: T, timeout: Duration) -> Result<(), PutError<T>> {
        let deadline = Instant::now() + timeout;
        let mut buf = self.buf.lock().unwrap();
        loop {
            if buf.closed {
                return Err(PutError::Closed(item));
            }
            if self.has_room(&buf) {
                break;
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Err(PutError::TimedOut(item));
            };
            let (guard, _) = self.not_full.wait_timeout(buf, remaining).unwrap();
            buf = guard;
        }
        buf.items.push_back(item);
        drop(buf);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Insert an item without blocking, failing immediately if the queue is
    /// full.
    pub fn try_put(&self, item: T) -> Result<(), PutError<T>> {
        let mut buf = self.buf.lock().unwrap();
        if buf.closed {
            return Err(PutError::Closed(item));
        }
        if !self.has_room(&buf) {
            return Err(PutError::Full(item));
        }
        buf.items.push_back(item);
        drop(buf);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Insert an item, evicting the queue head to make room if the queue is
    /// full. Returns the evicted item, if any.
    ///
    /// With a capacity of zero there is no head to evict; the insert then
    /// fails as [`PutError::Full`] unless a consumer is already waiting.
    pub fn force_put(&self, item: T) -> Result<Option<T>, PutError<T>> {
        let mut buf = self.buf.lock().unwrap();
        if buf.closed {
            return Err(PutError::Closed(item));
        }
        if self.has_room(&buf) {
            buf.items.push_back(item);
            drop(buf);
            self.not_empty.notify_one();
            return Ok(None);
        }
        if self.capacity == 0 {
            return Err(PutError::Full(item));
        }
        let evicted = buf.items.pop_front();
        buf.items.push_back(item);
        drop(buf);
        self.not_empty.notify_one();
        Ok(evicted)
    }

    /// Remove the oldest item, blocking while the queue is empty.
    ///
    /// Only fails with [`TakeError::Closed`], once the queue is closed and
    /// every buffered item has been drained.
    pub fn take(&self) -> Result<T, TakeError> {
        let mut buf = self.buf.lock().unwrap();
        loop {
            if let Some(item) = buf.items.pop_front() {
                drop(buf);
                self.not_full.notify_one();
                return Ok(item);
            }
            if buf.closed {
                return Err(TakeError::Closed);
            }
            buf.waiting_takers += 1;
            if self.capacity == 0 {
                // A registered taker is what makes room for a hand-off
                // producer.
                self.not_full.notify_one();
            }
            buf = self.not_empty.wait(buf).unwrap();
            buf.waiting_takers -= 1;
        }
    }

    /// Remove the oldest item, blocking up to `timeout` while the queue is
    /// empty.
    pub fn take_timeout(&self, timeout: Duration) -> Result<T, TakeError> {
        let deadline = Instant::now() + timeout;
        let mut buf = self.buf.lock().unwrap();
        loop {
            if let Some(item) = buf.items.pop_front() {
                drop(buf);
                self.not_full.notify_one();
                return Ok(item);
            }
            if buf.closed {
                return Err(TakeError::Closed);
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Err(TakeError::TimedOut);
            };
            buf.waiting_takers += 1;
            if self.capacity == 0 {
                self.not_full.notify_one();
            }
            let (guard, _) = self.not_empty.wait_timeout(buf, remaining).unwrap();
            buf = guard;
            buf.waiting_takers -= 1;
        }
    }

    /// Remove the oldest item without blocking.
    pub fn try_take(&self) -> Result<T, TakeError> {
        let mut buf = self.buf.lock().unwrap();
        if let Some(item) = buf.items.pop_front() {
            drop(buf);
            self.not_full.notify_one();
            return Ok(item);
        }
        if buf.closed {
            Err(TakeError::Closed)
        } else {
            Err(TakeError::Empty)
        }
    }

    /// Close the queue. Further inserts fail with [`PutError::Closed`];
    /// removes keep draining buffered items and report
    /// [`TakeError::Closed`] once empty. Wakes every blocked thread.
    /// Idempotent.
    pub fn close(&self) {
        {
            let mut buf = self.buf.lock().unwrap();
            if buf.closed {
                return;
            }
            buf.closed = true;
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Atomically remove and return every buffered item.
    pub fn drain(&self) -> Vec<T> {
        let drained: Vec<T> = {
            let mut buf = self.buf.lock().unwrap();
            buf.items.drain(..).collect()
        };
        if !drained.is_empty() {
            self.not_full.notify_all();
        }
        drained
    }

    /// Current number of buffered items. Point-in-time value, for monitoring
    /// only.
    pub fn len(&self) -> usize {
        self.buf.lock().unwrap().items.len()
    }

    /// Check whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of buffered items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.buf.lock().unwrap().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(4);
        queue.put(1).unwrap();
        queue.put(2).unwrap();
        queue.put(3).unwrap();
        assert_eq!(queue.take().unwrap(), 1);
        assert_eq!(queue.take().unwrap(), 2);
        assert_eq!(queue.take().unwrap(), 3);
    }

    #[test]
    fn test_try_put_full() {
        let queue = BoundedQueue::new(1);
        queue.try_put("a").unwrap();
        let err = queue.try_put("b").unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.into_inner(), "b");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_put_timeout_returns_item() {
        let queue = BoundedQueue::new(1);
        queue.put(1).unwrap();
        let err = queue
            .put_timeout(2, Duration::from_millis(20))
            .unwrap_err();
        assert!(err.is_timed_out());
        assert_eq!(err.into_inner(), 2);
    }

    #[test]
    fn test_take_timeout_empty() {
        let queue: BoundedQueue<i32> = BoundedQueue::new(4);
        let err = queue.take_timeout(Duration::from_millis(20)).unwrap_err();
        assert_eq!(err, TakeError::TimedOut);
    }

    #[test]
    fn test_try_take_empty() {
        let queue: BoundedQueue<i32> = BoundedQueue::new(4);
        assert_eq!(queue.try_take().unwrap_err(), TakeError::Empty);
    }

    #[test]
    fn test_blocking_put_unblocks_on_take() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.put(1).unwrap();

        let q = Arc::clone(&queue);
        let producer = thread::spawn(move || q.put(2));

        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.take().unwrap(), 1);
        producer.join().unwrap().unwrap();
        assert_eq!(queue.take().unwrap(), 2);
    }

    #[test]
    fn test_close_drains_then_reports_closed() {
        let queue = BoundedQueue::new(4);
        queue.put(1).unwrap();
        queue.put(2).unwrap();
        queue.close();

        assert!(queue.put(3).unwrap_err().is_closed());
        assert_eq!(queue.take().unwrap(), 1);
        assert_eq!(queue.take().unwrap(), 2);
        assert_eq!(queue.take().unwrap_err(), TakeError::Closed);
    }

    #[test]
    fn test_close_wakes_blocked_taker() {
        let queue: Arc<BoundedQueue<i32>> = Arc::new(BoundedQueue::new(4));
        let q = Arc::clone(&queue);
        let taker = thread::spawn(move || q.take());

        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(taker.join().unwrap().unwrap_err(), TakeError::Closed);
    }

    #[test]
    fn test_force_put_evicts_head() {
        let queue = BoundedQueue::new(2);
        queue.put("a").unwrap();
        queue.put("b").unwrap();

        let evicted = queue.force_put("c").unwrap();
        assert_eq!(evicted, Some("a"));
        assert_eq!(queue.take().unwrap(), "b");
        assert_eq!(queue.take().unwrap(), "c");
    }

    #[test]
    fn test_drain() {
        let queue = BoundedQueue::new(4);
        queue.put(1).unwrap();
        queue.put(2).unwrap();
        assert_eq!(queue.drain(), vec![1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_handoff_requires_waiting_taker() {
        let queue: Arc<BoundedQueue<i32>> = Arc::new(BoundedQueue::new(0));

        // No consumer waiting: non-blocking insert must fail.
        assert!(queue.try_put(1).unwrap_err().is_full());

        let q = Arc::clone(&queue);
        let taker = thread::spawn(move || q.take());

        // The blocked consumer makes the rendezvous possible.
        queue.put(7).unwrap();
        assert_eq!(taker.join().unwrap().unwrap(), 7);
    }
}
