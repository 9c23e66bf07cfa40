//! Saturation admission policies.
//!
//! A policy is consulted only once the pool is fully saturated: the queue is
//! full and the worker count has reached `max`. Exactly one policy is active
//! per pool, chosen at construction.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Behavior applied to a submission that arrives while the queue is full and
/// the pool is at its maximum size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdmissionPolicy {
    /// Refuse the submission with an overload error.
    ///
    /// Use when:
    /// - The caller can retry or shed load itself
    /// - Losing work silently is unacceptable
    #[default]
    Reject,

    /// Execute the task synchronously on the submitting thread.
    ///
    /// Use when:
    /// - Producers should be throttled by doing the work themselves
    /// - Every task must eventually run
    CallerRuns,

    /// Discard the incoming task; its handle resolves cancelled.
    ///
    /// Use when:
    /// - Stale work is worthless under overload
    /// - Queued tasks are more valuable than new ones
    DropNewest,

    /// Evict the oldest queued task (its handle resolves cancelled) and
    /// enqueue the new one.
    ///
    /// Use when:
    /// - The newest submission carries the freshest state
    /// - Example: periodic snapshots where only the latest matters
    DropOldest,
}

impl AdmissionPolicy {
    /// Stable name used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionPolicy::Reject => "reject",
            AdmissionPolicy::CallerRuns => "caller-runs",
            AdmissionPolicy::DropNewest => "drop-newest",
            AdmissionPolicy::DropOldest => "drop-oldest",
        }
    }
}

impl fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdmissionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" | "abort" => Ok(AdmissionPolicy::Reject),
            "caller-runs" | "caller_runs" => Ok(AdmissionPolicy::CallerRuns),
            "drop-newest" | "drop_newest" | "discard" => Ok(AdmissionPolicy::DropNewest),
            "drop-oldest" | "drop_oldest" | "discard-oldest" => Ok(AdmissionPolicy::DropOldest),
            other => Err(format!("unknown admission policy: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_reject() {
        assert_eq!(AdmissionPolicy::default(), AdmissionPolicy::Reject);
    }

    #[test]
    fn test_parse_round_trip() {
        for policy in [
            AdmissionPolicy::Reject,
            AdmissionPolicy::CallerRuns,
            AdmissionPolicy::DropNewest,
            AdmissionPolicy::DropOldest,
        ] {
            assert_eq!(policy.as_str().parse::<AdmissionPolicy>().unwrap(), policy);
        }
    }

    #[test]
    fn test_parse_unknown() {
        assert!("shrug".parse::<AdmissionPolicy>().is_err());
    }
}
