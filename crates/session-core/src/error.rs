//! Error sentinels for the session engine (spec §7).

use std::error::Error;

use thiserror::Error;

use crate::model::TorrentId;

/// Primary error type surfaced by the session engine's public verbs.
///
/// These are sentinels, not exception types: callers match on the variant to
/// decide HTTP-class mapping upstream (unknown id -> 404-class, busy ->
/// 503-class, limit -> 429-class, invalid transition -> 409-class).
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session is registered under the given id.
    #[error("session not found")]
    SessionNotFound {
        /// The id that was looked up.
        id: TorrentId,
    },
    /// A session already exists where the caller expected to create one.
    #[error("session already exists")]
    AlreadyExists {
        /// The id that already exists.
        id: TorrentId,
    },
    /// The requested transition is not in the state machine's adjacency list.
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Mode the session was in.
        from: session_events::SessionMode,
        /// Mode the caller requested.
        to: session_events::SessionMode,
        /// The session the transition was attempted on.
        id: TorrentId,
    },
    /// Admission would exceed `max_sessions` and no eviction candidate exists.
    #[error("session limit reached")]
    SessionLimitReached,
    /// The torrent client primitive did not accept a source within its
    /// admission guard window.
    #[error("engine busy accepting source")]
    EngineBusy,
    /// The underlying torrent client primitive does not support the
    /// requested operation.
    #[error("operation unsupported by client")]
    Unsupported {
        /// Name of the unsupported operation.
        operation: &'static str,
    },
    /// The injected repository failed.
    #[error("repository operation failed")]
    RepositoryFailure {
        /// Underlying repository failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The torrent client primitive failed.
    #[error("client operation failed")]
    ClientFailure {
        /// Underlying client failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The supplied `TorrentSource` failed validation.
    #[error("invalid source: {reason}")]
    InvalidSource {
        /// Human-readable reason the source was rejected.
        reason: &'static str,
    },
}

/// Convenience alias for session engine operation results.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use session_events::SessionMode;

    #[test]
    fn invalid_transition_renders_from_and_to() {
        let id = TorrentId::parse("a".repeat(40)).expect("valid id");
        let err = SessionError::InvalidTransition {
            from: SessionMode::Idle,
            to: SessionMode::Focused,
            id,
        };
        assert!(err.to_string().contains("Idle"));
        assert!(err.to_string().contains("Focused"));
    }
}
