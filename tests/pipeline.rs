//! Integration tests for the producer-consumer pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use workpool::Pipeline;

/// Poll `condition` until it holds or `deadline_ms` elapses.
fn eventually(deadline_ms: u64, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn all_consumers_terminate_and_no_sentinel_reaches_handler() {
    workpool::logging::init();
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&processed);
    let pipeline = Pipeline::new("sentinel", 4, 3, move |_item: u32| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    for i in 0..10 {
        pipeline.send(i).unwrap();
    }

    // shutdown() joins all three consumers; returning at all proves each
    // observed exactly one termination signal.
    pipeline.shutdown();

    // Exactly the real items were handled: a leaked sentinel would either
    // inflate the count or panic the handler.
    assert_eq!(processed.load(Ordering::SeqCst), 10);
}

#[test]
fn producer_threads_feed_consumers() {
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&processed);
    let pipeline = Pipeline::new("producers", 8, 2, move |_item: usize| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    pipeline.spawn_producer("left", 0..20);
    pipeline.spawn_producer("right", 100..120);

    assert!(eventually(2000, || processed.load(Ordering::SeqCst) == 40));
    pipeline.shutdown();
    assert_eq!(processed.load(Ordering::SeqCst), 40);
}

#[test]
fn stop_flag_halts_infinite_producer() {
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&processed);
    let pipeline = Pipeline::new("endless", 2, 1, move |_item: u64| {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1));
    });

    pipeline.spawn_producer("unbounded", 0..);

    assert!(eventually(2000, || processed.load(Ordering::SeqCst) > 0));
    // Returning at all proves the stop flag broke the infinite production
    // loop and the consumer saw its sentinel.
    pipeline.shutdown();
    assert!(processed.load(Ordering::SeqCst) > 0);
}

#[test]
fn single_consumer_preserves_fifo_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let pipeline = Pipeline::new("fifo", 4, 1, move |item: u32| {
        sink.lock().unwrap().push(item);
    });

    for i in 0..20 {
        pipeline.send(i).unwrap();
    }
    pipeline.shutdown();

    assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<_>>());
}

#[test]
fn handler_panic_does_not_kill_consumer() {
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&processed);
    let pipeline = Pipeline::new("resilient", 4, 1, move |item: u32| {
        if item == 0 {
            panic!("poisoned item");
        }
        counter.fetch_add(1, Ordering::SeqCst);
    });

    pipeline.send(0).unwrap();
    pipeline.send(1).unwrap();
    pipeline.send(2).unwrap();
    pipeline.shutdown();

    assert_eq!(processed.load(Ordering::SeqCst), 2);
}
