//! The in-memory session map (spec §3, §4.2). Guarded by the engine's
//! registry lock; speed samples and focused-piece ranges live in their own
//! locks so sampling and streaming never block state readers.

use std::collections::HashMap;
use std::time::Instant;

use session_core::{ClientHandle, SessionMode, TorrentId, TorrentSource};
use std::sync::Arc;

/// One registered torrent's live state.
pub(crate) struct SessionEntry {
    /// The live handle into the torrent client primitive.
    pub handle: Arc<dyn ClientHandle>,
    /// How this session was admitted, retained so the repository record can
    /// be rebuilt on every reconciliation write.
    pub source: TorrentSource,
    /// Current lifecycle mode.
    pub mode: SessionMode,
    /// Last time an externally-driven read touched this session (I5).
    pub last_access: Instant,
    /// Monotonic high-water mark of completed bytes (I3).
    pub peak_completed: u64,
    /// Monotonic high-water mark of the completion bitfield (I4), one bit
    /// per piece, big-endian within each byte.
    pub peak_bitfield: Vec<u8>,
    /// Advisory per-session download rate cap in bytes/sec; `0` = no cap.
    pub rate_limit_bps: u64,
    /// Caller-assigned tags mirrored from the repository.
    pub tags: Vec<String>,
}

impl SessionEntry {
    /// Construct a freshly-registered entry in mode `Idle`.
    #[must_use]
    pub(crate) fn new(handle: Arc<dyn ClientHandle>, source: TorrentSource) -> Self {
        Self {
            handle,
            source,
            mode: SessionMode::Idle,
            last_access: Instant::now(),
            peak_completed: 0,
            peak_bitfield: Vec::new(),
            rate_limit_bps: 0,
            tags: Vec::new(),
        }
    }

    /// Touch `last_access` to now.
    pub(crate) fn touch(&mut self) {
        self.last_access = Instant::now();
    }
}

/// The registry's map plus the cached focused id (I2).
#[derive(Default)]
pub(crate) struct Registry {
    /// All registered sessions, keyed by info-hash.
    pub sessions: HashMap<TorrentId, SessionEntry>,
    /// The currently-focused session, if any.
    pub focused_id: Option<TorrentId>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }
}
