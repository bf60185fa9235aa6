//! Event payload types carried across the session engine.

use chrono::{DateTime, Utc};

/// Identifier assigned to each event emitted by the platform.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// The six lifecycle modes a session can occupy.
///
/// See the state machine's adjacency graph for the legal transitions between
/// these modes; this type only carries the value, not the graph.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Registered but not yet downloading or focused.
    Idle,
    /// Actively downloading with normal bandwidth allowances.
    Downloading,
    /// Holds the fleet's exclusive bandwidth focus.
    Focused,
    /// Hard-paused, typically because another session is Focused.
    Paused,
    /// Stopped by the caller; disallowed from downloading or uploading.
    Stopped,
    /// All bytes accounted for; may still seed.
    Completed,
}

impl SessionMode {
    /// Render the mode as its lowercase string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Downloading => "downloading",
            Self::Focused => "focused",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
        }
    }
}

/// Persisted status derived one-way from `SessionMode`.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PersistedStatus {
    /// Mapped from `Idle`.
    Pending,
    /// Mapped from `Downloading`, `Focused`, or `Paused`.
    Active,
    /// Mapped from `Stopped`.
    Stopped,
    /// Mapped from `Completed`.
    Completed,
    /// Mapped from any mode not covered above.
    Error,
}

impl From<SessionMode> for PersistedStatus {
    fn from(mode: SessionMode) -> Self {
        match mode {
            SessionMode::Idle => Self::Pending,
            SessionMode::Downloading | SessionMode::Focused | SessionMode::Paused => Self::Active,
            SessionMode::Stopped => Self::Stopped,
            SessionMode::Completed => Self::Completed,
        }
    }
}

/// Transfer phase reported only while a session's persisted status is
/// `Active` and its mode is not `Stopped`/`Completed`.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransferPhase {
    /// Pieces are being fetched from peers.
    Downloading,
    /// A post-restart re-hash scan is in progress.
    Verifying,
}

/// Typed domain events surfaced across the session engine.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A session was registered with the engine.
    SessionOpened {
        /// 40-hex info-hash identifying the session.
        id: String,
    },
    /// A session's metadata resolved, producing a file listing.
    MetadataResolved {
        /// 40-hex info-hash identifying the session.
        id: String,
        /// Number of files discovered in the torrent's metainfo.
        file_count: u32,
        /// Total number of pieces declared by the metainfo.
        piece_count: u32,
    },
    /// A session's metadata wait expired before resolution.
    MetadataTimedOut {
        /// 40-hex info-hash identifying the session.
        id: String,
    },
    /// A session transitioned from one mode to another.
    ModeChanged {
        /// 40-hex info-hash identifying the session.
        id: String,
        /// Mode prior to the transition.
        from: SessionMode,
        /// Mode after the transition.
        to: SessionMode,
    },
    /// Periodic state-reporter sample for a session.
    StateSampled {
        /// 40-hex info-hash identifying the session.
        id: String,
        /// Fraction of bytes completed, in `[0, 1]`.
        progress: f64,
        /// Download rate in bytes per second.
        download_bps: u64,
        /// Upload rate in bytes per second.
        upload_bps: u64,
        /// Current persisted status.
        status: PersistedStatus,
        /// Current transfer phase, when applicable.
        phase: Option<TransferPhase>,
    },
    /// A session was removed from the registry.
    SessionRemoved {
        /// 40-hex info-hash identifying the session.
        id: String,
    },
    /// A session was evicted to admit a new one under the session cap.
    SessionEvicted {
        /// 40-hex info-hash identifying the evicted session.
        id: String,
    },
    /// System health status changed (degraded or restored components).
    HealthChanged {
        /// Components currently considered degraded.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator for observers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SessionOpened { .. } => "session_opened",
            Self::MetadataResolved { .. } => "metadata_resolved",
            Self::MetadataTimedOut { .. } => "metadata_timed_out",
            Self::ModeChanged { .. } => "mode_changed",
            Self::StateSampled { .. } => "state_sampled",
            Self::SessionRemoved { .. } => "session_removed",
            Self::SessionEvicted { .. } => "session_evicted",
            Self::HealthChanged { .. } => "health_changed",
        }
    }
}

/// Envelope wrapping an `Event` with its assigned id and timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Monotonically increasing identifier assigned at publish time.
    pub id: EventId,
    /// Wall-clock time the event was published.
    pub timestamp: DateTime<Utc>,
    /// The event payload.
    pub event: Event,
}
