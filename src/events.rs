//! Pool lifecycle events.
//!
//! Lifecycle transitions are published to subscribers as an event stream so
//! operators and test harnesses can observe shutdown progress without
//! polling.

use std::sync::mpsc;
use std::sync::Mutex;

use serde::Serialize;

/// Lifecycle state of a pool instance. Transitions are one-way; a terminated
/// pool cannot be reactivated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    /// Accepting and executing work.
    Running,
    /// No new submissions; queued work still drains.
    ShuttingDown,
    /// Queued work discarded, in-flight tasks asked to cancel.
    Stopping,
    /// All workers retired.
    Terminated,
}

/// A lifecycle transition, published when the pool enters `state`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PoolEvent {
    /// The state the pool just entered.
    pub state: PoolState,
}

/// Fan-out of lifecycle events to any number of subscribers.
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<mpsc::Sender<PoolEvent>>>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> mpsc::Receiver<PoolEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber, pruning the dropped ones.
    pub(crate) fn emit(&self, event: PoolEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_and_emit() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        bus.emit(PoolEvent {
            state: PoolState::ShuttingDown,
        });
        assert_eq!(rx.recv().unwrap().state, PoolState::ShuttingDown);
    }

    #[test]
    fn test_dropped_subscriber_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);
        bus.emit(PoolEvent {
            state: PoolState::Terminated,
        });
        assert!(bus.subscribers.lock().unwrap().is_empty());
    }
}
