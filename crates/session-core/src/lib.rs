#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Engine-agnostic data model, error sentinels, and the two external
//! contracts (torrent client primitive, persisted-catalog repository) shared
//! across the session engine workspace.
//!
//! `session-engine` depends on this crate for its vocabulary; it never
//! reaches into `session-client` or `session-data` directly.

pub mod client;
pub mod error;
pub mod model;
pub mod repository;

pub use client::{ClientError, ClientFileEntry, ClientHandle, ClientResult, ClientStats, TorrentClient, TorrentReader};
pub use error::{SessionError, SessionResult};
pub use model::{
    DEFAULT_MAX_CONNECTIONS, FileRef, FocusedPieceRange, PersistedStatus, Priority, Range,
    SessionMode, SessionSnapshot, SessionState, SpeedSample, TorrentId, TorrentSource,
    TransferPhase,
};
pub use repository::{RepositoryError, RepositoryResult, SessionFilter, SessionRecord, SessionRepository};
