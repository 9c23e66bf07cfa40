//! Producer-consumer pipeline with sentinel termination.
//!
//! A [`Pipeline`] couples producer threads to a fixed set of consumer
//! threads through a [`BoundedQueue`]. Shutdown is signaled by enqueuing
//! exactly one sentinel per consumer instead of flipping a shared flag: a
//! flag can be read stale by a consumer blocked in `take`, while a sentinel
//! is a queue item and is therefore observed in FIFO order relative to real
//! work. Consumers terminate on their first sentinel and never hand one to
//! the user handler.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::PutError;
use crate::queue::BoundedQueue;

/// Queue item: real work or the termination signal.
enum Envelope<T> {
    Item(T),
    Sentinel,
}

/// A fixed set of consumers processing items produced into a bounded queue.
pub struct Pipeline<T: Send + 'static> {
    queue: Arc<BoundedQueue<Envelope<T>>>,
    stop: Arc<AtomicBool>,
    consumers: Mutex<Vec<JoinHandle<()>>>,
    producers: Mutex<Vec<JoinHandle<()>>>,
    consumer_count: usize,
    down: AtomicBool,
    name: String,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Start `consumers` consumer threads running `handler` over a queue of
    /// the given capacity.
    pub fn new<H>(name: impl Into<String>, capacity: usize, consumers: usize, handler: H) -> Self
    where
        H: Fn(T) + Send + Sync + 'static,
    {
        let name = name.into();
        let queue = Arc::new(BoundedQueue::new(capacity));
        let handler = Arc::new(handler);

        let mut threads = Vec::with_capacity(consumers);
        for id in 0..consumers {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);
            let thread_name = format!("{}-consumer-{}", name, id);
            let handle = thread::Builder::new()
                .name(thread_name)
                .spawn(move || loop {
                    match queue.take() {
                        Ok(Envelope::Item(item)) => {
                            // A panicking handler must not take the consumer
                            // down with it.
                            if catch_unwind(AssertUnwindSafe(|| handler(item))).is_err() {
                                tracing::error!(consumer = id, "handler panicked");
                            }
                        }
                        Ok(Envelope::Sentinel) => {
                            tracing::debug!(consumer = id, "sentinel received, stopping");
                            break;
                        }
                        Err(_) => break,
                    }
                })
                .expect("failed to spawn consumer thread");
            threads.push(handle);
        }

        tracing::info!(
            pipeline = %name,
            consumers,
            capacity,
            "pipeline started"
        );

        Self {
            queue,
            stop: Arc::new(AtomicBool::new(false)),
            consumers: Mutex::new(threads),
            producers: Mutex::new(Vec::new()),
            consumer_count: consumers,
            down: AtomicBool::new(false),
            name,
        }
    }

    /// Insert one item from the calling thread, blocking while the queue is
    /// full.
    pub fn send(&self, item: T) -> Result<(), PutError<T>> {
        self.queue.put(Envelope::Item(item)).map_err(unwrap_envelope)
    }

    /// Spawn a producer thread feeding `items` into the pipeline. The
    /// producer stops early when the pipeline's stop flag is set.
    pub fn spawn_producer<I>(&self, label: impl Into<String>, items: I)
    where
        I: IntoIterator<Item = T> + Send + 'static,
        I::IntoIter: Send,
    {
        let label = label.into();
        let queue = Arc::clone(&self.queue);
        let stop = Arc::clone(&self.stop);
        let thread_name = format!("{}-producer-{}", self.name, label);
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                for item in items {
                    if stop.load(Ordering::SeqCst) {
                        tracing::debug!(producer = %label, "stop flag set, producer exiting");
                        break;
                    }
                    if queue.put(Envelope::Item(item)).is_err() {
                        break;
                    }
                }
            })
            .expect("failed to spawn producer thread");
        self.producers.lock().unwrap().push(handle);
    }

    /// Shut the pipeline down: stop producers, enqueue one sentinel per
    /// consumer, and join every thread. Blocks until all consumers have
    /// terminated. Idempotent.
    pub fn shutdown(&self) {
        if self.down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop.store(true, Ordering::SeqCst);

        // Producers drain first so no real item can land behind a sentinel.
        let producers: Vec<_> = self.producers.lock().unwrap().drain(..).collect();
        for handle in producers {
            let _ = handle.join();
        }

        for _ in 0..self.consumer_count {
            if self.queue.put(Envelope::Sentinel).is_err() {
                break;
            }
        }

        let consumers: Vec<_> = self.consumers.lock().unwrap().drain(..).collect();
        for handle in consumers {
            let _ = handle.join();
        }

        self.queue.close();
        tracing::info!(pipeline = %self.name, "pipeline shut down");
    }

    /// Number of consumer threads.
    pub fn consumer_count(&self) -> usize {
        self.consumer_count
    }

    /// Items currently buffered. Monitoring only.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl<T: Send + 'static> Drop for Pipeline<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn unwrap_envelope<T>(err: PutError<Envelope<T>>) -> PutError<T> {
    let rewrap = |envelope: Envelope<T>| match envelope {
        Envelope::Item(item) => item,
        // Only `send` maps errors; it only ever inserts items.
        Envelope::Sentinel => unreachable!("sentinel rejected from send"),
    };
    match err {
        PutError::Full(envelope) => PutError::Full(rewrap(envelope)),
        PutError::TimedOut(envelope) => PutError::TimedOut(rewrap(envelope)),
        PutError::Closed(envelope) => PutError::Closed(rewrap(envelope)),
    }
}
