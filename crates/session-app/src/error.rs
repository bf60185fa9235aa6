//! # Design
//!
//! - Centralize application-level errors for bootstrap.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Environment configuration was missing.
    #[error("missing environment configuration")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: &'static str,
    },
    /// Configuration loading failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: session_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying telemetry error.
        error: anyhow::Error,
    },
    /// Repository connection setup failed.
    #[error("repository operation failed")]
    Repository {
        /// Operation identifier.
        operation: &'static str,
        /// Source repository error.
        source: session_data::DataError,
    },
    /// Database pool setup failed.
    #[error("database connection failed")]
    Database {
        /// Operation identifier.
        operation: &'static str,
        /// Source sqlx error.
        source: sqlx::Error,
    },
}

impl AppError {
    pub(crate) fn config(operation: &'static str, source: session_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) fn telemetry(operation: &'static str, error: anyhow::Error) -> Self {
        Self::Telemetry { operation, error }
    }

    pub(crate) fn repository(operation: &'static str, source: session_data::DataError) -> Self {
        Self::Repository { operation, source }
    }

    pub(crate) fn database(operation: &'static str, source: sqlx::Error) -> Self {
        Self::Database { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_error_helpers_build_variants() {
        let config = AppError::config(
            "load",
            session_config::ConfigError::MissingEnv {
                name: "SESSION_DATA_DIR",
            },
        );
        assert!(matches!(config, AppError::Config { .. }));

        let telemetry = AppError::telemetry("init", anyhow::anyhow!("boom"));
        assert!(matches!(telemetry, AppError::Telemetry { .. }));
    }
}
