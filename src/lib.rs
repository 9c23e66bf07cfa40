//! workpool - Bounded worker pool with admission-policy backpressure.
//!
//! This crate provides a thread pool with a fixed task queue, configurable
//! overload behavior, and coordinated shutdown, plus a sentinel-terminated
//! producer-consumer pipeline built on the same queue primitive.
//!
//! # Features
//!
//! - **Bounded everywhere**: queue capacity and maximum worker count are
//!   mandatory, finite construction parameters
//! - **Elastic sizing**: `core` standing workers, bursting up to `max` under
//!   load, idle workers retired after a keep-alive timeout
//! - **Admission policies**: reject, run on the caller, drop newest, or drop
//!   oldest when fully saturated
//! - **Result handles**: blocking and timed waits, cooperative cancellation,
//!   `map`/`zip` combinators
//! - **Coordinated shutdown**: graceful drain or immediate purge, with an
//!   observable lifecycle event stream
//! - **Sentinel pipeline**: per-consumer termination signals traveling
//!   through the work queue itself, immune to stale-flag races
//!
//! # Example
//!
//! ```rust,ignore
//! use workpool::{AdmissionPolicy, PoolConfig, WorkerPool};
//!
//! let pool = WorkerPool::new(
//!     PoolConfig::builder()
//!         .core(2)
//!         .max(4)
//!         .queue_capacity(64)
//!         .admission(AdmissionPolicy::CallerRuns)
//!         .build()?,
//! )?;
//!
//! let handle = pool.submit(|| expensive_computation())?;
//! let result = handle.get()?;
//!
//! pool.shutdown();
//! pool.await_termination(std::time::Duration::from_secs(5));
//! ```

/// Package version from Cargo.toml
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod admission;
pub mod config;
pub mod error;
pub mod events;
pub mod handle;
pub mod logging;
pub mod pipeline;
pub mod pool;
pub mod queue;

// Re-exports for convenience
pub use admission::AdmissionPolicy;
pub use config::{ConfigError, PoolBuilder, PoolConfig};
pub use error::{PutError, SubmitError, TakeError, TaskError};
pub use events::{PoolEvent, PoolState};
pub use handle::{CancelToken, TaskHandle};
pub use pipeline::Pipeline;
pub use pool::{PoolStats, WorkerPool};
pub use queue::BoundedQueue;
