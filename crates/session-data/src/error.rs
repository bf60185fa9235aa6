//! Error types for the data access layer.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use session_core::{RepositoryError, TorrentId};

/// Result alias for data layer operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised by the data access layer.
#[derive(Debug)]
pub enum DataError {
    /// Schema bootstrap failed.
    BootstrapFailed {
        /// Underlying SQL error.
        source: sqlx::Error,
    },
    /// A database operation failed.
    QueryFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying SQL error.
        source: sqlx::Error,
    },
    /// No record exists for the requested id.
    NotFound {
        /// The id that was looked up.
        id: TorrentId,
    },
    /// A stored `source` or `tags` column could not be decoded.
    Malformed {
        /// Column that failed to decode.
        column: &'static str,
        /// Underlying decode error.
        source: serde_json::Error,
    },
}

impl Display for DataError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::BootstrapFailed { .. } => formatter.write_str("schema bootstrap failed"),
            Self::QueryFailed { operation, .. } => {
                write!(formatter, "database operation failed: {operation}")
            }
            Self::NotFound { id } => write!(formatter, "no record for session {id}"),
            Self::Malformed { column, .. } => {
                write!(formatter, "column {column} contained malformed data")
            }
        }
    }
}

impl Error for DataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::BootstrapFailed { source } | Self::QueryFailed { source, .. } => Some(source),
            Self::Malformed { source, .. } => Some(source),
            Self::NotFound { .. } => None,
        }
    }
}

impl From<DataError> for RepositoryError {
    fn from(error: DataError) -> Self {
        match error {
            DataError::NotFound { id } => Self::NotFound { id },
            other => Self::Backend {
                source: Box::new(other),
            },
        }
    }
}
