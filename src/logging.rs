//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is the embedding application's choice. [`init`] is a convenience for
//! binaries and test harnesses that just want readable output filtered by
//! `RUST_LOG`.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber filtered by `RUST_LOG` (default level:
/// `info`). Safe to call more than once; only the first call installs.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
