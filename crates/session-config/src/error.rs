//! Error types for configuration loading.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating [`crate::EngineConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// A required environment variable was not set and has no default.
    MissingEnv {
        /// Name of the missing environment variable.
        name: &'static str,
    },
    /// An environment variable was set but could not be parsed or failed validation.
    InvalidField {
        /// Name of the field that failed validation.
        field: &'static str,
        /// The raw value that was rejected.
        value: String,
        /// Human-readable description of why the value was rejected.
        reason: &'static str,
    },
}

impl Display for ConfigError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEnv { name } => write!(formatter, "missing environment variable {name}"),
            Self::InvalidField {
                field,
                value,
                reason,
            } => write!(formatter, "invalid value '{value}' for {field}: {reason}"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let missing = ConfigError::MissingEnv {
            name: "SESSION_DATA_DIR",
        };
        assert_eq!(
            missing.to_string(),
            "missing environment variable SESSION_DATA_DIR"
        );

        let invalid = ConfigError::InvalidField {
            field: "max_sessions",
            value: "abc".to_string(),
            reason: "must be a non-negative integer",
        };
        assert_eq!(
            invalid.to_string(),
            "invalid value 'abc' for max_sessions: must be a non-negative integer"
        );
    }
}
