//! Pool configuration.
//!
//! This module provides validated construction options for a
//! [`WorkerPool`](crate::pool::WorkerPool), either through the fluent
//! [`PoolBuilder`] or from environment variables.
//!
//! # Example
//!
//! ```rust,ignore
//! use workpool::{AdmissionPolicy, PoolConfig};
//!
//! let config = PoolConfig::builder()
//!     .core(2)
//!     .max(8)
//!     .queue_capacity(64)
//!     .admission(AdmissionPolicy::CallerRuns)
//!     .name("ingest")
//!     .build()?;
//! ```

mod error;
mod parse;

pub use error::ConfigError;
pub use parse::{env_duration, env_or, env_parse, parse_duration};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::admission::AdmissionPolicy;

/// Naming function applied to worker ids for thread diagnostics.
pub type WorkerNamer = Arc<dyn Fn(usize) -> String + Send + Sync>;

/// Default idle lifetime for workers above the core count.
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Default queue capacity multiplier per core worker.
const DEFAULT_QUEUE_MULTIPLIER: usize = 64;

/// Validated worker pool configuration.
#[derive(Clone)]
pub struct PoolConfig {
    /// Minimum number of standing workers.
    pub core: usize,
    /// Ceiling on concurrent workers.
    pub max: usize,
    /// Idle lifetime for workers above `core`.
    pub keep_alive: Duration,
    /// Task queue capacity. Zero means an unbuffered hand-off.
    pub queue_capacity: usize,
    /// Behavior when the queue is full and the pool is at `max`.
    pub admission: AdmissionPolicy,
    /// Pool name, used for logs and default worker thread names.
    pub name: String,
    /// Optional naming function for worker threads. Diagnostics only.
    pub namer: Option<WorkerNamer>,
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("core", &self.core)
            .field("max", &self.max)
            .field("keep_alive", &self.keep_alive)
            .field("queue_capacity", &self.queue_capacity)
            .field("admission", &self.admission)
            .field("name", &self.name)
            .field("namer", &self.namer.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        let core = num_cpus::get();
        Self {
            core,
            max: core * 2,
            keep_alive: DEFAULT_KEEP_ALIVE,
            queue_capacity: core * DEFAULT_QUEUE_MULTIPLIER,
            admission: AdmissionPolicy::default(),
            name: "workpool".to_string(),
            namer: None,
        }
    }
}

impl PoolConfig {
    /// Get a builder pre-seeded with the defaults.
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// Recognized variables: `WORKPOOL_CORE` (0 = CPU count),
    /// `WORKPOOL_MAX` (0 = 2x core), `WORKPOOL_KEEP_ALIVE` (duration string),
    /// `WORKPOOL_QUEUE_CAPACITY` (0 = 64x core), `WORKPOOL_ADMISSION`
    /// (`reject` | `caller-runs` | `drop-newest` | `drop-oldest`), and
    /// `WORKPOOL_NAME`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let core_raw: usize = env_parse("WORKPOOL_CORE", 0)?;
        let core = if core_raw == 0 {
            num_cpus::get()
        } else {
            core_raw
        };

        let max_raw: usize = env_parse("WORKPOOL_MAX", 0)?;
        let max = if max_raw == 0 { core * 2 } else { max_raw };

        let keep_alive = env_duration("WORKPOOL_KEEP_ALIVE", "60s")?;

        let capacity_raw: usize = env_parse("WORKPOOL_QUEUE_CAPACITY", 0)?;
        let queue_capacity = if capacity_raw == 0 {
            core * DEFAULT_QUEUE_MULTIPLIER
        } else {
            capacity_raw
        };

        let admission_raw = env_or("WORKPOOL_ADMISSION", "reject");
        let admission =
            admission_raw
                .parse::<AdmissionPolicy>()
                .map_err(|e| ConfigError::Parse {
                    key: "WORKPOOL_ADMISSION".into(),
                    value: admission_raw,
                    error: e,
                })?;

        let config = Self {
            core,
            max,
            keep_alive,
            queue_capacity,
            admission,
            name: env_or("WORKPOOL_NAME", "workpool"),
            namer: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency of the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max == 0 {
            return Err(ConfigError::Invalid {
                key: "max".into(),
                message: "maximum worker count must be non-zero".into(),
            });
        }
        if self.core > self.max {
            return Err(ConfigError::Invalid {
                key: "core".into(),
                message: format!("core ({}) must not exceed max ({})", self.core, self.max),
            });
        }
        if self.name.is_empty() {
            return Err(ConfigError::Invalid {
                key: "name".into(),
                message: "pool name must not be empty".into(),
            });
        }
        if self.name.as_bytes().contains(&0) {
            return Err(ConfigError::Invalid {
                key: "name".into(),
                message: "pool name must not contain null bytes".into(),
            });
        }
        Ok(())
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use tracing::info;

        info!(
            pool = %self.name,
            core = self.core,
            max = self.max,
            keep_alive_ms = self.keep_alive.as_millis() as u64,
            queue_capacity = self.queue_capacity,
            admission = %self.admission,
            "pool configuration"
        );
    }
}

/// Builder for creating pool configurations with a fluent API.
#[derive(Default)]
pub struct PoolBuilder {
    config: PoolConfig,
}

impl PoolBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
        }
    }

    /// Set the minimum number of standing workers.
    pub fn core(mut self, core: usize) -> Self {
        self.config.core = core;
        self
    }

    /// Set the ceiling on concurrent workers.
    pub fn max(mut self, max: usize) -> Self {
        self.config.max = max;
        self
    }

    /// Set the idle lifetime for workers above the core count.
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.config.keep_alive = keep_alive;
        self
    }

    /// Set the task queue capacity. Zero means an unbuffered hand-off.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the saturation admission policy.
    pub fn admission(mut self, policy: AdmissionPolicy) -> Self {
        self.config.admission = policy;
        self
    }

    /// Set the pool name used for logs and worker thread names.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set a custom naming function for worker threads.
    pub fn worker_namer<F>(mut self, namer: F) -> Self
    where
        F: Fn(usize) -> String + Send + Sync + 'static,
    {
        self.config.namer = Some(Arc::new(namer));
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<PoolConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
