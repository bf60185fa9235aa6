//! Core data model for the session engine.
//!
//! # Design
//! - Pure data carriers with no IO; traits that depend on these types live in
//!   `client.rs` and `repository.rs`.
//! - `SessionMode`, `PersistedStatus`, and `TransferPhase` are re-exported
//!   from `session_events` so the wire format and the domain model never
//!   drift apart.

use std::fmt;

pub use session_events::{PersistedStatus, SessionMode, TransferPhase};

use crate::error::SessionError;

/// A 40-character lowercase hex string (the torrent info-hash). Unique key
/// of the registry; immutable for a session's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TorrentId(String);

impl TorrentId {
    /// Parse and validate a 40-character lowercase hex info-hash.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidSource` if the value is not exactly 40
    /// lowercase hex characters.
    pub fn parse(value: impl Into<String>) -> Result<Self, SessionError> {
        let value = value.into();
        let valid = value.len() == 40
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(value))
        } else {
            Err(SessionError::InvalidSource {
                reason: "info-hash must be 40 lowercase hex characters",
            })
        }
    }

    /// Borrow the underlying hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TorrentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Input describing how to obtain a torrent's metainfo.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TorrentSource {
    /// A magnet URI containing at least the info-hash.
    Magnet(String),
    /// A filesystem path to a `.torrent` metainfo file.
    MetainfoPath(String),
}

impl TorrentSource {
    /// Validate that the source carries a non-empty payload.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidSource` if both variants would be empty.
    pub fn validate(&self) -> Result<(), SessionError> {
        let empty = match self {
            Self::Magnet(value) | Self::MetainfoPath(value) => value.trim().is_empty(),
        };
        if empty {
            Err(SessionError::InvalidSource {
                reason: "source must carry a non-empty magnet URI or metainfo path",
            })
        } else {
            Ok(())
        }
    }
}

/// A file within a torrent's metainfo, with its piece-range mapping.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileRef {
    /// Index of the file within the torrent's metainfo.
    pub index: u32,
    /// Slash-separated relative path.
    pub path: String,
    /// Total length of the file in bytes.
    pub length: u64,
    /// Bytes completed so far; always `<= length`.
    pub bytes_completed: u64,
    /// First piece (inclusive) covering this file.
    pub piece_start: u32,
    /// Last piece (exclusive) covering this file.
    pub piece_end: u32,
}

/// A byte range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Range {
    /// Offset from the start of the file.
    pub offset: u64,
    /// Number of bytes in the range.
    pub length: u64,
}

impl Range {
    /// Validate the range against its owning file's length.
    #[must_use]
    pub fn is_valid_for(&self, file_length: u64) -> bool {
        self.length > 0 && self.offset.saturating_add(self.length) <= file_length
    }
}

/// Total-ordered piece-priority level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// The client should not fetch this piece at all.
    None,
    /// Collapses to the client's Normal priority if it lacks a distinct Low.
    Low,
    /// Default priority for pieces not otherwise biased.
    Normal,
    /// Slightly favored: just ahead of the current read position.
    Readahead,
    /// Favored: the very next pieces a reader will need.
    Next,
    /// Maximum priority.
    High,
}

/// A half-open piece range raised for streaming, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FocusedPieceRange {
    /// First piece (inclusive).
    pub start: u32,
    /// Last piece (exclusive); always `> start`.
    pub end: u32,
}

/// One speed sample recorded for a session, used to derive bytes/sec deltas.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpeedSample {
    /// Wall-clock time the sample was taken.
    pub at: chrono::DateTime<chrono::Utc>,
    /// Cumulative useful bytes read (downloaded) at sample time.
    pub bytes_read: u64,
    /// Cumulative bytes written (uploaded) at sample time.
    pub bytes_written: u64,
}

/// Derived, read-only snapshot of a session's observable state.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionState {
    /// The session's info-hash.
    pub id: TorrentId,
    /// Persisted status derived from `mode`.
    pub status: PersistedStatus,
    /// Current lifecycle mode.
    pub mode: SessionMode,
    /// Fraction of bytes completed, in `[0, 1]`.
    pub progress: f64,
    /// Number of connected peers.
    pub peer_count: u32,
    /// Download rate in bytes per second.
    pub download_bps: u64,
    /// Upload rate in bytes per second.
    pub upload_bps: u64,
    /// File list for the torrent.
    pub files: Vec<FileRef>,
    /// Total number of pieces declared by the metainfo.
    pub piece_count: u32,
    /// Base64-encoded, high-water-marked completion bitfield.
    pub bitfield: String,
    /// Transfer phase, defined only while `status == Active` and
    /// `mode` is neither `Stopped` nor `Completed`.
    pub phase: Option<TransferPhase>,
    /// Wall-clock time this snapshot was produced.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Registry-level view of a session: its admission source and bookkeeping
/// fields, as distinct from [`SessionState`]'s client-sampled transfer
/// stats. Returned by the engine's `GetSession` verb (spec §6).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionSnapshot {
    /// The session's info-hash.
    pub id: TorrentId,
    /// Current lifecycle mode.
    pub mode: SessionMode,
    /// The source this session was opened with.
    pub source: TorrentSource,
    /// Advisory per-session download rate cap in bytes/sec; `0` = no cap.
    pub rate_limit_bps: u64,
    /// Caller-assigned tags mirrored from the repository.
    pub tags: Vec<String>,
}

/// Default maximum established peer connections per torrent handle.
///
/// The source deployment documents both 35 and 55 for this tunable; the
/// current production default is 35 (see `DESIGN.md`'s Open Question
/// resolution).
pub const DEFAULT_MAX_CONNECTIONS: u32 = 35;
