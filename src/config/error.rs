//! Configuration error types.

use std::fmt;

/// Error type for pool configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to parse a configuration value.
    Parse {
        key: String,
        value: String,
        error: String,
    },
    /// A value was parseable but out of range or inconsistent.
    Invalid { key: String, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse { key, value, error } => {
                write!(f, "failed to parse {}='{}': {}", key, value, error)
            }
            ConfigError::Invalid { key, message } => {
                write!(f, "invalid value for {}: {}", key, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ConfigError::Invalid {
            key: "core".into(),
            message: "core must not exceed max".into(),
        };
        assert!(err.to_string().contains("core"));
    }
}
