//! An in-process `TorrentClient` that never touches the network.
//!
//! Grounded on the teacher's `StubSession` test double
//! (`session/stub.rs`'s in-memory `HashMap<Uuid, StubTorrent>` with
//! `async_trait` command handlers): the same shape, generalized from
//! command/event plumbing to `session-core`'s client primitive. Progress is
//! derived from wall-clock time spent with `download_allowed` set, rather
//! than from simulated peer traffic, so the stub stays deterministic under
//! test without a background polling task.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use session_core::{
    ClientError, ClientFileEntry, ClientHandle, ClientResult, ClientStats, Priority, TorrentClient,
    TorrentReader, TorrentSource,
};
use tokio::sync::{Mutex, Notify};

use crate::reader::ZeroReader;

/// Tunables for the simulated transfer a `StubClient` produces.
#[derive(Debug, Clone, Copy)]
pub struct StubClientConfig {
    /// Total synthesized file length in bytes.
    pub file_length: u64,
    /// Uniform piece length in bytes.
    pub piece_length: u64,
    /// Simulated download throughput in bytes/sec while downloading.
    pub download_bps: u64,
    /// Simulated upload throughput in bytes/sec while uploading is allowed.
    pub upload_bps: u64,
}

impl Default for StubClientConfig {
    fn default() -> Self {
        Self {
            file_length: 16 * 1024 * 1024,
            piece_length: 256 * 1024,
            download_bps: 4 * 1024 * 1024,
            upload_bps: 1024 * 1024,
        }
    }
}

/// Factory producing `StubHandle`s. Holds no cross-handle state; each
/// `accept` call is independent.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubClient {
    config: StubClientConfig,
}

impl StubClient {
    /// Construct a client with custom simulated transfer parameters.
    #[must_use]
    pub const fn new(config: StubClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TorrentClient for StubClient {
    async fn accept(&self, source: &TorrentSource) -> ClientResult<Box<dyn ClientHandle>> {
        let info_hash = derive_info_hash(source);
        Ok(Box::new(StubHandle::new(info_hash, self.config)))
    }
}

/// Extract the 40-hex info-hash from a `btih:` magnet, or deterministically
/// synthesize one from the source's bytes otherwise.
fn derive_info_hash(source: &TorrentSource) -> String {
    let raw = match source {
        TorrentSource::Magnet(value) | TorrentSource::MetainfoPath(value) => value.as_str(),
    };

    if let TorrentSource::Magnet(_) = source {
        if let Some(start) = raw.to_ascii_lowercase().find("btih:") {
            let candidate = &raw[start + "btih:".len()..];
            let candidate: String = candidate
                .chars()
                .take_while(|c| c.is_ascii_hexdigit())
                .map(|c| c.to_ascii_lowercase())
                .collect();
            if candidate.len() == 40 {
                return candidate;
            }
        }
    }

    let mut hasher = DefaultHasher::new();
    raw.hash(&mut hasher);
    let mut digest = hasher.finish();
    let mut hex = String::with_capacity(40);
    while hex.len() < 40 {
        hex.push_str(&format!("{digest:016x}"));
        digest = digest.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(1);
    }
    hex.truncate(40);
    hex
}

struct StubHandle {
    info_hash: String,
    config: StubClientConfig,
    num_pieces: u32,
    download_allowed: AtomicBool,
    upload_allowed: AtomicBool,
    max_connections: AtomicU32,
    active_accum: Mutex<Duration>,
    active_since: Mutex<Option<Instant>>,
    upload_accum: Mutex<Duration>,
    upload_since: Mutex<Option<Instant>>,
    priorities: Mutex<std::collections::HashMap<u32, Priority>>,
    metadata_notify: Arc<Notify>,
    closed_notify: Arc<Notify>,
    bytes_written_floor: AtomicU64,
}

impl StubHandle {
    fn new(info_hash: String, config: StubClientConfig) -> Self {
        let num_pieces = u32::try_from(config.file_length.div_ceil(config.piece_length.max(1)))
            .unwrap_or(u32::MAX)
            .max(1);
        Self {
            info_hash,
            config,
            num_pieces,
            download_allowed: AtomicBool::new(false),
            upload_allowed: AtomicBool::new(false),
            max_connections: AtomicU32::new(0),
            active_accum: Mutex::new(Duration::ZERO),
            active_since: Mutex::new(None),
            upload_accum: Mutex::new(Duration::ZERO),
            upload_since: Mutex::new(None),
            priorities: Mutex::new(std::collections::HashMap::new()),
            metadata_notify: Arc::new(Notify::new()),
            closed_notify: Arc::new(Notify::new()),
            bytes_written_floor: AtomicU64::new(0),
        }
    }

    async fn active_duration(accum: &Mutex<Duration>, since: &Mutex<Option<Instant>>) -> Duration {
        let base = *accum.lock().await;
        match *since.lock().await {
            Some(started) => base + started.elapsed(),
            None => base,
        }
    }

    async fn set_active(enabled: bool, accum: &Mutex<Duration>, since: &Mutex<Option<Instant>>) {
        let mut since_guard = since.lock().await;
        match (enabled, *since_guard) {
            (true, None) => *since_guard = Some(Instant::now()),
            (false, Some(started)) => {
                *accum.lock().await += started.elapsed();
                *since_guard = None;
            }
            _ => {}
        }
    }

    fn bytes_completed(&self, active: Duration) -> u64 {
        #[allow(clippy::cast_precision_loss)]
        let bytes = active.as_secs_f64() * self.config.download_bps as f64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let bytes = bytes as u64;
        bytes.min(self.config.file_length)
    }
}

#[async_trait]
impl ClientHandle for StubHandle {
    fn info_hash(&self) -> &str {
        &self.info_hash
    }

    fn metadata_ready(&self) -> bool {
        true
    }

    fn metadata_notify(&self) -> Arc<Notify> {
        Arc::clone(&self.metadata_notify)
    }

    fn closed_notify(&self) -> Arc<Notify> {
        Arc::clone(&self.closed_notify)
    }

    async fn stats(&self) -> ClientStats {
        let active = Self::active_duration(&self.active_accum, &self.active_since).await;
        let uploading = Self::active_duration(&self.upload_accum, &self.upload_since).await;
        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let uploaded = (uploading.as_secs_f64() * self.config.upload_bps as f64) as u64;
        let uploaded = uploaded.max(self.bytes_written_floor.load(Ordering::SeqCst));

        let connected = self.max_connections.load(Ordering::SeqCst) > 0
            && (self.download_allowed.load(Ordering::SeqCst) || self.upload_allowed.load(Ordering::SeqCst));

        ClientStats {
            bytes_read_useful: self.bytes_completed(active),
            bytes_written_data: uploaded,
            active_peers: u32::from(connected) * 3,
        }
    }

    fn num_pieces(&self) -> u32 {
        self.num_pieces
    }

    fn piece_length(&self) -> u64 {
        self.config.piece_length
    }

    fn files(&self) -> Vec<ClientFileEntry> {
        vec![ClientFileEntry {
            path: "payload.bin".to_owned(),
            length: self.config.file_length,
            offset: 0,
        }]
    }

    fn piece_complete(&self, piece: u32) -> bool {
        // Synchronous trait method over async-derived state: approximate
        // using the accumulated duration without the running remainder,
        // which under-reports by at most one in-flight interval.
        let accum = self
            .active_accum
            .try_lock()
            .map(|guard| *guard)
            .unwrap_or(Duration::ZERO);
        let completed_bytes = self.bytes_completed(accum);
        let completed_pieces = completed_bytes / self.config.piece_length.max(1);
        u64::from(piece) < completed_pieces
    }

    async fn set_piece_priority(&self, piece: u32, priority: Priority) -> ClientResult<()> {
        if piece >= self.num_pieces {
            return Err(ClientError::PieceOutOfRange { piece });
        }
        self.priorities.lock().await.insert(piece, priority);
        Ok(())
    }

    async fn set_file_priority(&self, file_index: u32, _priority: Priority) -> ClientResult<()> {
        if file_index != 0 {
            return Err(ClientError::FileOutOfRange { index: file_index });
        }
        Ok(())
    }

    async fn set_download_allowed(&self, allowed: bool) {
        self.download_allowed.store(allowed, Ordering::SeqCst);
        Self::set_active(allowed, &self.active_accum, &self.active_since).await;
    }

    async fn set_upload_allowed(&self, allowed: bool) {
        self.upload_allowed.store(allowed, Ordering::SeqCst);
        Self::set_active(allowed, &self.upload_accum, &self.upload_since).await;
    }

    async fn set_max_connections(&self, max: u32) {
        self.max_connections.store(max, Ordering::SeqCst);
    }

    async fn start_download_all(&self) {
        let mut priorities = self.priorities.lock().await;
        for piece in 0..self.num_pieces {
            priorities.insert(piece, Priority::Normal);
        }
    }

    async fn new_reader(
        &self,
        file_index: u32,
        offset: u64,
    ) -> ClientResult<Box<dyn TorrentReader>> {
        if file_index != 0 {
            return Err(ClientError::FileOutOfRange { index: file_index });
        }
        Ok(Box::new(ZeroReader::new(self.config.file_length, offset)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnet_btih_hash_is_extracted_verbatim() {
        let hash = "a".repeat(40);
        let source = TorrentSource::Magnet(format!("magnet:?xt=urn:btih:{hash}&dn=example"));
        assert_eq!(derive_info_hash(&source), hash);
    }

    #[test]
    fn non_magnet_sources_synthesize_a_stable_forty_hex_hash() {
        let source = TorrentSource::MetainfoPath("/data/example.torrent".to_owned());
        let first = derive_info_hash(&source);
        let second = derive_info_hash(&source);
        assert_eq!(first, second);
        assert_eq!(first.len(), 40);
        assert!(first.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn download_progresses_only_while_allowed() {
        let handle = StubHandle::new(
            "a".repeat(40),
            StubClientConfig {
                file_length: 1_000_000,
                piece_length: 10_000,
                download_bps: 1_000_000,
                upload_bps: 0,
            },
        );

        let before = handle.stats().await.bytes_read_useful;
        assert_eq!(before, 0);

        handle.set_download_allowed(true).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.set_download_allowed(false).await;

        let after = handle.stats().await.bytes_read_useful;
        assert!(after > 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let later = handle.stats().await.bytes_read_useful;
        assert_eq!(after, later, "progress must not advance while paused");
    }

    #[tokio::test]
    async fn set_piece_priority_rejects_out_of_range_pieces() {
        let handle = StubHandle::new("b".repeat(40), StubClientConfig::default());
        let err = handle
            .set_piece_priority(handle.num_pieces(), Priority::High)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::PieceOutOfRange { .. }));
    }
}
