//! The torrent client primitive contract (spec §6), external to the engine.
//!
//! This module defines only the interface. `session-client` supplies the one
//! concrete implementation this workspace ships: an in-process stub. No real
//! BitTorrent wire protocol implementation is part of this crate.

use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncSeek};
use tokio::sync::Notify;

use crate::model::{Priority, TorrentSource};

/// Errors raised by the torrent client primitive.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client does not recognise the requested torrent handle.
    #[error("unknown client handle")]
    UnknownHandle,
    /// The requested file index does not exist in the torrent's metainfo.
    #[error("file index out of range")]
    FileOutOfRange {
        /// The index that was requested.
        index: u32,
    },
    /// The requested piece index does not exist.
    #[error("piece index out of range")]
    PieceOutOfRange {
        /// The index that was requested.
        piece: u32,
    },
    /// The client rejected the source outright (malformed magnet/path, etc).
    #[error("client rejected source")]
    Rejected {
        /// Underlying rejection detail.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Result alias for client primitive operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Aggregate transfer statistics for a torrent handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Cumulative useful (non-redundant) bytes read from peers.
    pub bytes_read_useful: u64,
    /// Cumulative bytes written to peers.
    pub bytes_written_data: u64,
    /// Number of currently connected peers.
    pub active_peers: u32,
}

/// A file entry as reported by the client's metainfo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientFileEntry {
    /// Slash-separated relative path.
    pub path: String,
    /// Total length of the file in bytes.
    pub length: u64,
    /// Absolute byte offset of this file within the torrent's piece stream.
    pub offset: u64,
}

/// A seekable byte stream over a torrent's file contents.
///
/// Readers cooperate with engine cancellation: the engine does not
/// force-terminate a reader, but revokes piece priorities on `StopSession`
/// and expects the upstream caller to drop the reader in response.
pub trait TorrentReader: AsyncRead + AsyncSeek + Send + Unpin {
    /// Install a cancellation token the reader should observe.
    fn set_cancellation(&mut self, cancellation: Arc<Notify>);

    /// Configure how many bytes ahead of the read cursor the client should
    /// prefetch speculatively.
    fn set_readahead(&mut self, bytes: u64);
}

/// A single torrent's live handle into the client primitive.
#[async_trait]
pub trait ClientHandle: Send + Sync {
    /// The torrent's info-hash, as 40 lowercase hex characters.
    fn info_hash(&self) -> &str;

    /// Whether metadata (file list, piece count/length) has resolved.
    fn metadata_ready(&self) -> bool;

    /// A notifier that fires (at least once) when metadata resolves.
    fn metadata_notify(&self) -> Arc<Notify>;

    /// A notifier that fires when the client considers the handle closed.
    fn closed_notify(&self) -> Arc<Notify>;

    /// Current transfer statistics.
    async fn stats(&self) -> ClientStats;

    /// Total number of pieces declared by the metainfo. Zero before metadata
    /// resolves.
    fn num_pieces(&self) -> u32;

    /// Uniform piece length in bytes. Zero before metadata resolves.
    fn piece_length(&self) -> u64;

    /// File list with offsets, as declared by the metainfo.
    fn files(&self) -> Vec<ClientFileEntry>;

    /// Whether the given piece is fully downloaded and verified.
    fn piece_complete(&self, piece: u32) -> bool;

    /// Raise or lower a single piece's priority.
    async fn set_piece_priority(&self, piece: u32, priority: Priority) -> ClientResult<()>;

    /// Raise or lower an entire file's priority.
    async fn set_file_priority(&self, file_index: u32, priority: Priority) -> ClientResult<()>;

    /// Allow or disallow downloading data for this handle.
    async fn set_download_allowed(&self, allowed: bool);

    /// Allow or disallow uploading data for this handle.
    async fn set_upload_allowed(&self, allowed: bool);

    /// Set the maximum number of established peer connections.
    async fn set_max_connections(&self, max: u32);

    /// Request that every piece be downloaded (undoes a prior priority
    /// reset performed for streaming focus).
    async fn start_download_all(&self);

    /// Open a new seekable reader for the given file starting at `offset`.
    async fn new_reader(&self, file_index: u32, offset: u64)
    -> ClientResult<Box<dyn TorrentReader>>;
}

/// Factory accepting new torrent sources and producing live handles.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Accept a magnet/metainfo source and begin resolving it.
    ///
    /// Implementations should return as soon as the underlying primitive has
    /// registered the source; the caller (the engine) is responsible for
    /// bounding this call with its own 10-second admission guard.
    async fn accept(&self, source: &TorrentSource) -> ClientResult<Box<dyn ClientHandle>>;
}
