//! The session engine: registry, lifecycle verbs, and the background tasks
//! that drive it (spec §4.2-§4.7).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use session_core::{
    ClientHandle, FocusedPieceRange, PersistedStatus, Priority, Range, RepositoryResult,
    SessionError, SessionMode, SessionRecord, SessionRepository, SessionResult, SessionSnapshot,
    SessionState, SpeedSample, TorrentClient, TorrentId, TorrentSource,
};
use session_events::{Event, EventBus, EventStream};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::eviction;
use crate::focus::{hard_pause, resume_for_streaming, resume_normal};
use crate::registry::{Registry, SessionEntry};
use crate::reporter;
use crate::state_machine::is_allowed;

/// How long `Open` waits for the client to accept a source before returning
/// `EngineBusy` (spec §4.2).
const ACCEPT_GUARD: Duration = Duration::from_secs(10);
/// How long `Open` waits for metadata before returning a pending session.
const METADATA_WAIT: Duration = Duration::from_secs(5);
/// Ceiling after which a pending session's metadata wait is abandoned.
const METADATA_CEILING: Duration = Duration::from_secs(600);
/// Floor applied to the idle reaper's scan interval.
const IDLE_SCAN_FLOOR: Duration = Duration::from_secs(10);

/// The engine's narrow configuration surface (spec §6).
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Maximum concurrent sessions; `0` means unlimited.
    pub max_sessions: usize,
    /// Idle-reap threshold; `0` disables the idle reaper.
    pub idle_timeout: Duration,
}

/// Owns every live torrent session: the registry, the three independent
/// locks guarding it, and the injected collaborators.
pub struct SessionEngine {
    client: Arc<dyn TorrentClient>,
    repository: Arc<dyn SessionRepository>,
    events: EventBus,
    registry: RwLock<Registry>,
    speed_samples: Mutex<HashMap<TorrentId, SpeedSample>>,
    focused_ranges: Mutex<HashMap<TorrentId, FocusedPieceRange>>,
    health: Mutex<BTreeSet<String>>,
    config: EngineConfig,
}

impl SessionEngine {
    /// Construct a new engine. Returned as `Arc` since background tasks
    /// (metadata waiter, idle reaper) hold a strong reference back to it.
    #[must_use]
    pub fn new(
        client: Arc<dyn TorrentClient>,
        repository: Arc<dyn SessionRepository>,
        events: EventBus,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            repository,
            events,
            registry: RwLock::new(Registry::new()),
            speed_samples: Mutex::new(HashMap::new()),
            focused_ranges: Mutex::new(HashMap::new()),
            health: Mutex::new(BTreeSet::new()),
            config,
        })
    }

    /// Subscribe to the engine's event stream.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe(None)
    }

    // -- Open / admission (§4.2) --------------------------------------

    /// Admit a torrent source. Idempotent: re-opening an already-registered
    /// id refreshes its `last_access` and returns the same id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSource`, `EngineBusy`, `ClientFailure`, or
    /// `SessionLimitReached`.
    pub async fn open(self: &Arc<Self>, source: TorrentSource) -> SessionResult<TorrentId> {
        source.validate()?;

        let client = Arc::clone(&self.client);
        let accept_source = source.clone();
        let task: JoinHandle<_> =
            tokio::spawn(async move { client.accept(&accept_source).await });

        let handle: Arc<dyn ClientHandle> = match tokio::time::timeout(ACCEPT_GUARD, task).await {
            Ok(Ok(Ok(handle))) => {
                self.mark_recovered("client").await;
                Arc::from(handle)
            }
            Ok(Ok(Err(err))) => {
                self.mark_degraded("client").await;
                return Err(SessionError::ClientFailure {
                    source: Box::new(err),
                });
            }
            Ok(Err(_join_err)) => {
                self.mark_degraded("client").await;
                return Err(SessionError::ClientFailure {
                    source: Box::new(std::io::Error::other("accept task panicked")),
                });
            }
            Err(_elapsed) => {
                warn!("client accept exceeded admission guard; treating as busy");
                self.mark_degraded("client").await;
                return Err(SessionError::EngineBusy);
            }
        };

        let id = TorrentId::parse(handle.info_hash())?;

        {
            let mut registry = self.registry.write().await;
            if let Some(entry) = registry.sessions.get_mut(&id) {
                entry.touch();
                return Ok(id);
            }

            if self.config.max_sessions > 0 && registry.sessions.len() >= self.config.max_sessions {
                match eviction::pick_victim(&registry) {
                    Some(victim) => {
                        registry.sessions.remove(&victim);
                        let _ = self.events.publish(Event::SessionEvicted {
                            id: victim.to_string(),
                        });
                    }
                    None => return Err(SessionError::SessionLimitReached),
                }
            }

            registry.sessions.insert(
                id.clone(),
                SessionEntry::new(Arc::clone(&handle), source.clone()),
            );
        }

        let _ = self.events.publish(Event::SessionOpened { id: id.to_string() });

        let now = chrono::Utc::now();
        let create_result = self
            .repository
            .create(SessionRecord {
                id: id.clone(),
                source,
                status: PersistedStatus::Pending,
                progress: 0.0,
                tags: Vec::new(),
                created_at: now,
                updated_at: now,
            })
            .await;
        if let Err(err) = create_result {
            warn!(id = %id, error = %err, "failed to persist new session record");
            self.mark_degraded("repository").await;
        } else {
            self.mark_recovered("repository").await;
        }

        if handle.metadata_ready() {
            self.resolve_metadata(&id, &handle).await;
            return Ok(id);
        }

        let notify = handle.metadata_notify();
        if tokio::time::timeout(METADATA_WAIT, notify.notified())
            .await
            .is_ok()
            || handle.metadata_ready()
        {
            self.resolve_metadata(&id, &handle).await;
        } else {
            self.spawn_metadata_waiter(id.clone(), handle);
        }

        Ok(id)
    }

    fn spawn_metadata_waiter(self: &Arc<Self>, id: TorrentId, handle: Arc<dyn ClientHandle>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let notify = handle.metadata_notify();
            let remaining = METADATA_CEILING.saturating_sub(METADATA_WAIT);
            let arrived = tokio::time::timeout(remaining, notify.notified())
                .await
                .is_ok()
                || handle.metadata_ready();

            let mode = {
                let registry = engine.registry.read().await;
                registry.sessions.get(&id).map(|entry| entry.mode)
            };

            match mode {
                None | Some(SessionMode::Stopped) => {}
                Some(_) if arrived => engine.resolve_metadata(&id, &handle).await,
                Some(_) => engine.expire_metadata(&id).await,
            }
        });
    }

    /// Settle a session's mode once metadata arrives, but only if no other
    /// verb has already moved it past `Idle` in the meantime.
    async fn resolve_metadata(self: &Arc<Self>, id: &TorrentId, handle: &Arc<dyn ClientHandle>) {
        let target = {
            let mut registry = self.registry.write().await;
            let focused_elsewhere = registry
                .focused_id
                .as_ref()
                .is_some_and(|focused| focused != id);
            match registry.sessions.get_mut(id) {
                Some(entry) if entry.mode == SessionMode::Idle => {
                    let target = if focused_elsewhere {
                        SessionMode::Paused
                    } else {
                        SessionMode::Downloading
                    };
                    entry.mode = target;
                    Some(target)
                }
                _ => None,
            }
        };

        if let Some(target) = target {
            if target == SessionMode::Downloading {
                resume_normal(handle.as_ref()).await;
            } else {
                hard_pause(handle.as_ref()).await;
            }
            self.publish_mode_changed(id, SessionMode::Idle, target).await;
        }

        let _ = self.events.publish(Event::MetadataResolved {
            id: id.to_string(),
            file_count: u32::try_from(handle.files().len()).unwrap_or(u32::MAX),
            piece_count: handle.num_pieces(),
        });
    }

    async fn expire_metadata(&self, id: &TorrentId) {
        {
            let mut registry = self.registry.write().await;
            registry.sessions.remove(id);
        }
        self.speed_samples.lock().await.remove(id);
        self.focused_ranges.lock().await.remove(id);
        let _ = self.events.publish(Event::MetadataTimedOut { id: id.to_string() });
        info!(id = %id, "metadata wait ceiling reached; session dropped");
    }

    // -- Lifecycle verbs (§4.1, §4.2) ----------------------------------

    /// Transition a session to `Downloading` (or `Paused`, if another is
    /// focused) and resume its handle accordingly.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or `InvalidTransition`.
    pub async fn start_session(&self, id: &TorrentId) -> SessionResult<()> {
        let (from, target, handle) = {
            let mut registry = self.registry.write().await;
            let focused_elsewhere = registry
                .focused_id
                .as_ref()
                .is_some_and(|focused| focused != id);
            let entry = registry
                .sessions
                .get_mut(id)
                .ok_or_else(|| SessionError::SessionNotFound { id: id.clone() })?;
            let from = entry.mode;
            let target = if focused_elsewhere {
                SessionMode::Paused
            } else {
                SessionMode::Downloading
            };
            if !is_allowed(from, target) {
                return Err(SessionError::InvalidTransition {
                    from,
                    to: target,
                    id: id.clone(),
                });
            }
            entry.mode = target;
            entry.touch();
            (from, target, Arc::clone(&entry.handle))
        };

        if target == SessionMode::Downloading {
            resume_normal(handle.as_ref()).await;
        } else {
            hard_pause(handle.as_ref()).await;
        }

        self.publish_mode_changed(id, from, target).await;
        Ok(())
    }

    /// Transition a session to `Stopped`.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or `InvalidTransition`.
    pub async fn stop_session(&self, id: &TorrentId) -> SessionResult<()> {
        let (from, handle, resume_peers) = {
            let mut registry = self.registry.write().await;
            let from = registry
                .sessions
                .get(id)
                .map(|entry| entry.mode)
                .ok_or_else(|| SessionError::SessionNotFound { id: id.clone() })?;
            if !is_allowed(from, SessionMode::Stopped) {
                return Err(SessionError::InvalidTransition {
                    from,
                    to: SessionMode::Stopped,
                    id: id.clone(),
                });
            }

            let was_focused = registry.focused_id.as_ref() == Some(id);
            if was_focused {
                registry.focused_id = None;
            }
            let resume_peers = if was_focused {
                take_paused_to_resume(&mut registry, Some(id))
            } else {
                Vec::new()
            };

            let entry = registry.sessions.get_mut(id).expect("checked above");
            entry.mode = SessionMode::Stopped;
            (from, Arc::clone(&entry.handle), resume_peers)
        };

        self.focused_ranges.lock().await.remove(id);
        handle.set_download_allowed(false).await;
        handle.set_max_connections(session_core::DEFAULT_MAX_CONNECTIONS).await;
        handle.set_upload_allowed(true).await;

        for (peer_id, peer_handle) in &resume_peers {
            resume_normal(peer_handle.as_ref()).await;
            self.publish_mode_changed(peer_id, SessionMode::Paused, SessionMode::Downloading).await;
        }

        self.publish_mode_changed(id, from, SessionMode::Stopped).await;
        Ok(())
    }

    /// Drop a session's handle and erase its registry entries.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`.
    pub async fn remove_session(&self, id: &TorrentId) -> SessionResult<()> {
        let (handle, resume_peers) = {
            let mut registry = self.registry.write().await;
            let was_focused = registry.focused_id.as_ref() == Some(id);
            if was_focused {
                registry.focused_id = None;
            }
            let resume_peers = if was_focused {
                take_paused_to_resume(&mut registry, Some(id))
            } else {
                Vec::new()
            };
            let entry = registry
                .sessions
                .remove(id)
                .ok_or_else(|| SessionError::SessionNotFound { id: id.clone() })?;
            (entry.handle, resume_peers)
        };

        self.speed_samples.lock().await.remove(id);
        self.focused_ranges.lock().await.remove(id);
        drop(handle);
        request_memory_release_hint(id);

        for (peer_id, peer_handle) in &resume_peers {
            resume_normal(peer_handle.as_ref()).await;
            self.publish_mode_changed(peer_id, SessionMode::Paused, SessionMode::Downloading).await;
        }

        if let Err(err) = self.repository.delete(id).await {
            warn!(id = %id, error = %err, "failed to delete session record");
            self.mark_degraded("repository").await;
        } else {
            self.mark_recovered("repository").await;
        }
        let _ = self.events.publish(Event::SessionRemoved { id: id.to_string() });
        Ok(())
    }

    /// Grant focus to a session: fan out a hard-pause to every other
    /// active peer, then resume the target for streaming (§4.3).
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or `InvalidTransition`.
    pub async fn focus_session(&self, id: &TorrentId) -> SessionResult<()> {
        let (from, focused_handle, paused) = {
            let mut registry = self.registry.write().await;
            let from = registry
                .sessions
                .get(id)
                .map(|entry| entry.mode)
                .ok_or_else(|| SessionError::SessionNotFound { id: id.clone() })?;
            if !is_allowed(from, SessionMode::Focused) {
                return Err(SessionError::InvalidTransition {
                    from,
                    to: SessionMode::Focused,
                    id: id.clone(),
                });
            }

            registry.focused_id = Some(id.clone());
            let mut paused = Vec::new();
            for (other_id, entry) in &mut registry.sessions {
                if other_id == id {
                    continue;
                }
                if matches!(entry.mode, SessionMode::Downloading | SessionMode::Focused) {
                    entry.mode = SessionMode::Paused;
                    paused.push((other_id.clone(), Arc::clone(&entry.handle)));
                }
            }

            let entry = registry.sessions.get_mut(id).expect("checked above");
            entry.mode = SessionMode::Focused;
            (from, Arc::clone(&entry.handle), paused)
        };

        for (peer_id, peer_handle) in &paused {
            hard_pause(peer_handle.as_ref()).await;
            self.publish_mode_changed(peer_id, SessionMode::Downloading, SessionMode::Paused).await;
        }

        resume_for_streaming(focused_handle.as_ref()).await;
        self.publish_mode_changed(id, from, SessionMode::Focused).await;
        Ok(())
    }

    /// Demote the focused session (if any) and resume every paused peer.
    pub async fn unfocus_all(&self) {
        let (demoted, resumed) = {
            let mut registry = self.registry.write().await;
            let demoted = registry.focused_id.take().and_then(|focused| {
                registry
                    .sessions
                    .get_mut(&focused)
                    .map(|entry| {
                        entry.mode = SessionMode::Downloading;
                        (focused, Arc::clone(&entry.handle))
                    })
            });
            let resumed = take_paused_to_resume(&mut registry, None);
            (demoted, resumed)
        };

        if let Some((id, handle)) = &demoted {
            resume_normal(handle.as_ref()).await;
            self.publish_mode_changed(id, SessionMode::Focused, SessionMode::Downloading).await;
        }
        for (peer_id, peer_handle) in &resumed {
            resume_normal(peer_handle.as_ref()).await;
            self.publish_mode_changed(peer_id, SessionMode::Paused, SessionMode::Downloading).await;
        }
    }

    /// Publish a `ModeChanged` event and mirror the new persisted status
    /// into the repository, best-effort (spec §6's reconciliation note).
    async fn publish_mode_changed(&self, id: &TorrentId, from: SessionMode, to: SessionMode) {
        if from == to {
            return;
        }
        let _ = self.events.publish(Event::ModeChanged {
            id: id.to_string(),
            from,
            to,
        });

        let record = {
            let registry = self.registry.read().await;
            registry.sessions.get(id).map(|entry| SessionRecord {
                id: id.clone(),
                source: entry.source.clone(),
                status: PersistedStatus::from(to),
                progress: 0.0,
                tags: entry.tags.clone(),
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            })
        };
        if let Some(record) = record {
            if let Err(err) = self.repository.update(record).await {
                warn!(id = %id, error = %err, "failed to reconcile session status");
                self.mark_degraded("repository").await;
            } else {
                self.mark_recovered("repository").await;
            }
        }
    }

    /// Mark a component degraded, publishing `HealthChanged` only on the
    /// transition into degradation (spec §9 health-tracking note).
    async fn mark_degraded(&self, component: &str) {
        let mut health = self.health.lock().await;
        if health.insert(component.to_string()) {
            let degraded: Vec<String> = health.iter().cloned().collect();
            drop(health);
            let _ = self.events.publish(Event::HealthChanged { degraded });
        }
    }

    /// Clear a component's degraded status, publishing `HealthChanged` only
    /// on the transition back to healthy.
    async fn mark_recovered(&self, component: &str) {
        let mut health = self.health.lock().await;
        if health.remove(component) {
            let degraded: Vec<String> = health.iter().cloned().collect();
            drop(health);
            let _ = self.events.publish(Event::HealthChanged { degraded });
        }
    }

    // -- Streaming reader / piece-priority window (§4.4) ---------------

    /// Bias the client toward the pieces covering `[file.offset + range)`.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if the id is unknown, metadata is not
    /// ready, or `file_index` is out of range.
    pub async fn set_piece_priority(
        &self,
        id: &TorrentId,
        file_index: u32,
        range: Range,
        priority: Priority,
    ) -> SessionResult<()> {
        let handle = {
            let registry = self.registry.read().await;
            let entry = registry
                .sessions
                .get(id)
                .ok_or_else(|| SessionError::SessionNotFound { id: id.clone() })?;
            if matches!(entry.mode, SessionMode::Stopped | SessionMode::Paused) {
                return Ok(());
            }
            Arc::clone(&entry.handle)
        };

        if !handle.metadata_ready() {
            return Err(SessionError::SessionNotFound { id: id.clone() });
        }
        let files = handle.files();
        let file = files
            .get(file_index as usize)
            .ok_or_else(|| SessionError::SessionNotFound { id: id.clone() })?;

        if !range.is_valid_for(file.length) {
            return Ok(());
        }

        let piece_length = handle.piece_length();
        let num_pieces = handle.num_pieces();
        let abs_offset = file.offset.saturating_add(range.offset);
        let Some((start, end)) = piece_window(abs_offset, range.length, piece_length, num_pieces)
        else {
            return Ok(());
        };

        for piece in start..end {
            let piece_handle = Arc::clone(&handle);
            match tokio::spawn(async move { piece_handle.set_piece_priority(piece, priority).await })
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(piece, error = %err, "piece priority call failed"),
                Err(join_err) if join_err.is_panic() => {
                    warn!(piece, "piece priority call panicked; contained");
                }
                Err(_) => {}
            }
        }

        self.focused_ranges
            .lock()
            .await
            .insert(id.clone(), FocusedPieceRange { start, end });
        Ok(())
    }

    /// Install or clear (`bps == 0`) an advisory per-session download cap.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`.
    pub async fn set_download_rate_limit(&self, id: &TorrentId, bps: u64) -> SessionResult<()> {
        let mut registry = self.registry.write().await;
        let entry = registry
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::SessionNotFound { id: id.clone() })?;
        entry.rate_limit_bps = bps;
        Ok(())
    }

    /// Read back the advisory per-session download cap.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`.
    pub async fn get_download_rate_limit(&self, id: &TorrentId) -> SessionResult<u64> {
        let registry = self.registry.read().await;
        registry
            .sessions
            .get(id)
            .map(|entry| entry.rate_limit_bps)
            .ok_or_else(|| SessionError::SessionNotFound { id: id.clone() })
    }

    // -- State reporter (§4.6) ------------------------------------------

    /// Sample one session and fold its derived state against its high-water
    /// marks, touching `last_access` (I5).
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`.
    pub async fn get_session_state(&self, id: &TorrentId) -> SessionResult<SessionState> {
        let (handle, mode, mut peak_completed, mut peak_bitfield) = {
            let mut registry = self.registry.write().await;
            let entry = registry
                .sessions
                .get_mut(id)
                .ok_or_else(|| SessionError::SessionNotFound { id: id.clone() })?;
            entry.touch();
            (
                Arc::clone(&entry.handle),
                entry.mode,
                entry.peak_completed,
                entry.peak_bitfield.clone(),
            )
        };

        let previous = self.speed_samples.lock().await.get(id).copied();
        let outcome = reporter::sample_session(
            id,
            handle.as_ref(),
            mode,
            &mut peak_completed,
            &mut peak_bitfield,
            previous,
        )
        .await;

        {
            let mut registry = self.registry.write().await;
            if let Some(entry) = registry.sessions.get_mut(id) {
                entry.peak_completed = entry.peak_completed.max(peak_completed);
                merge_bitfield(&mut entry.peak_bitfield, &peak_bitfield);
            }
        }
        self.speed_samples.lock().await.insert(id.clone(), outcome.sample);

        if let Err(err) = self.repository.update_progress(id, outcome.state.progress).await {
            warn!(id = %id, error = %err, "failed to reconcile session progress");
        }

        if outcome.reached_completion {
            self.complete_session(id).await;
        }

        let _ = self.events.publish(Event::StateSampled {
            id: id.to_string(),
            progress: outcome.state.progress,
            download_bps: outcome.state.download_bps,
            upload_bps: outcome.state.upload_bps,
            status: outcome.state.status,
            phase: outcome.state.phase,
        });

        Ok(outcome.state)
    }

    async fn complete_session(&self, id: &TorrentId) {
        let resume_peers = {
            let mut registry = self.registry.write().await;
            let Some(from) = registry.sessions.get(id).map(|entry| entry.mode) else {
                return;
            };
            if !is_allowed(from, SessionMode::Completed) {
                return;
            }
            let was_focused = registry.focused_id.as_ref() == Some(id);
            if was_focused {
                registry.focused_id = None;
            }
            let resume_peers = if was_focused {
                take_paused_to_resume(&mut registry, Some(id))
            } else {
                Vec::new()
            };
            if let Some(entry) = registry.sessions.get_mut(id) {
                entry.mode = SessionMode::Completed;
            }
            resume_peers
        };

        for (peer_id, peer_handle) in &resume_peers {
            resume_normal(peer_handle.as_ref()).await;
            self.publish_mode_changed(peer_id, SessionMode::Paused, SessionMode::Downloading).await;
        }
    }

    /// Registry-level view of a session: its source, mode, rate limit, and
    /// tags, distinct from `GetSessionState`'s client-sampled snapshot.
    /// Touches `last_access` (I5).
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`.
    pub async fn get_session(&self, id: &TorrentId) -> SessionResult<SessionSnapshot> {
        let mut registry = self.registry.write().await;
        let entry = registry
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::SessionNotFound { id: id.clone() })?;
        entry.touch();
        Ok(SessionSnapshot {
            id: id.clone(),
            mode: entry.mode,
            source: entry.source.clone(),
            rate_limit_bps: entry.rate_limit_bps,
            tags: entry.tags.clone(),
        })
    }

    /// Current lifecycle mode for a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`.
    pub async fn get_session_mode(&self, id: &TorrentId) -> SessionResult<SessionMode> {
        let registry = self.registry.read().await;
        registry
            .sessions
            .get(id)
            .map(|entry| entry.mode)
            .ok_or_else(|| SessionError::SessionNotFound { id: id.clone() })
    }

    /// List every session whose persisted status is `Active`.
    pub async fn list_active_sessions(&self) -> Vec<TorrentId> {
        let registry = self.registry.read().await;
        registry
            .sessions
            .iter()
            .filter(|(_, entry)| matches!(PersistedStatus::from(entry.mode), PersistedStatus::Active))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// List every registered session id.
    pub async fn list_sessions(&self) -> Vec<TorrentId> {
        self.registry.read().await.sessions.keys().cloned().collect()
    }

    // -- Shutdown --------------------------------------------------------

    /// Stop every non-stopped session. Leaves registry entries intact so a
    /// subsequent `StartSession` (or process restart via the repository)
    /// can resume them.
    pub async fn close(&self) {
        let ids: Vec<TorrentId> = {
            let registry = self.registry.read().await;
            registry
                .sessions
                .iter()
                .filter(|(_, entry)| entry.mode != SessionMode::Stopped)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in ids {
            if let Err(err) = self.stop_session(&id).await {
                warn!(id = %id, error = %err, "failed to stop session during shutdown");
            }
        }
    }

    // -- Background tasks (§4.7, §9) -------------------------------------

    /// Spawn the idle reaper. Returns `None` if `idle_timeout` is zero.
    pub fn spawn_idle_reaper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.config.idle_timeout.is_zero() {
            return None;
        }
        let engine = Arc::clone(self);
        let scan_interval = (self.config.idle_timeout / 2).max(IDLE_SCAN_FLOOR);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scan_interval);
            loop {
                ticker.tick().await;
                let now = tokio::time::Instant::now();
                let idle: Vec<TorrentId> = {
                    let registry = engine.registry.read().await;
                    registry
                        .sessions
                        .iter()
                        .filter(|(_, entry)| {
                            !matches!(
                                entry.mode,
                                SessionMode::Focused | SessionMode::Stopped | SessionMode::Completed
                            ) && now.duration_since(entry.last_access.into())
                                > engine.config.idle_timeout
                        })
                        .map(|(id, _)| id.clone())
                        .collect()
                };
                for id in idle {
                    if let Err(err) = engine.stop_session(&id).await {
                        warn!(id = %id, error = %err, "idle reaper failed to stop session");
                    }
                }
            }
        }))
    }

    /// Restore pending and active sessions from the repository at boot,
    /// best-effort: a failing record is logged and skipped (spec §7).
    pub async fn restore_from_repository(self: &Arc<Self>) {
        let pending = self.list_records(PersistedStatus::Pending).await;
        let active = self.list_records(PersistedStatus::Active).await;
        for record in pending.into_iter().chain(active) {
            match self.open(record.source.clone()).await {
                Ok(id) => {
                    if let Err(err) = self.start_session(&id).await {
                        warn!(id = %id, error = %err, "failed to resume session at boot");
                    }
                }
                Err(err) => warn!(
                    id = %record.id,
                    error = %err,
                    "failed to reopen session at boot; skipping"
                ),
            }
        }
    }

    async fn list_records(&self, status: PersistedStatus) -> Vec<SessionRecord> {
        let filter = session_core::SessionFilter {
            status: Some(status),
            tag: None,
        };
        let result: RepositoryResult<Vec<SessionRecord>> =
            self.repository.list_by_filter(&filter).await;
        match result {
            Ok(records) => {
                self.mark_recovered("repository").await;
                records
            }
            Err(err) => {
                warn!(error = %err, "failed to list repository records at boot");
                self.mark_degraded("repository").await;
                Vec::new()
            }
        }
    }
}

/// Ask the OS to release freed heap pages back after a session's handle is
/// dropped. Advisory and best-effort: logged, never fails the removal it
/// follows. A no-op on platforms without a suitable call.
#[cfg(target_os = "linux")]
fn request_memory_release_hint(id: &TorrentId) {
    #[allow(unsafe_code)]
    let released = unsafe { libc::malloc_trim(0) };
    debug!(id = %id, released = released != 0, "requested OS memory-release hint");
}

#[cfg(not(target_os = "linux"))]
fn request_memory_release_hint(_id: &TorrentId) {}

/// Demote every `Paused` session (other than `exclude`) to `Downloading`,
/// returning the handles so the caller can resume them outside the lock.
fn take_paused_to_resume(
    registry: &mut Registry,
    exclude: Option<&TorrentId>,
) -> Vec<(TorrentId, Arc<dyn ClientHandle>)> {
    let mut resumed = Vec::new();
    for (id, entry) in &mut registry.sessions {
        if Some(id) == exclude {
            continue;
        }
        if entry.mode == SessionMode::Paused {
            entry.mode = SessionMode::Downloading;
            resumed.push((id.clone(), Arc::clone(&entry.handle)));
        }
    }
    resumed
}

fn merge_bitfield(peak: &mut Vec<u8>, sampled: &[u8]) {
    if peak.len() < sampled.len() {
        peak.resize(sampled.len(), 0);
    }
    for (p, s) in peak.iter_mut().zip(sampled.iter()) {
        *p |= s;
    }
}

/// The piece range `(start, end)` covering `[abs_offset, abs_offset+length)`
/// (spec §4.4), or `None` if the range is empty after clamping.
fn piece_window(
    abs_offset: u64,
    length: u64,
    piece_length: u64,
    num_pieces: u32,
) -> Option<(u32, u32)> {
    if length == 0 || piece_length == 0 || num_pieces == 0 {
        return None;
    }
    let start = u32::try_from(abs_offset / piece_length).unwrap_or(u32::MAX);
    let raw_end = abs_offset.saturating_add(length).div_ceil(piece_length);
    let mut end = u32::try_from(raw_end).unwrap_or(u32::MAX);
    if end == start {
        end = start + 1;
    }

    let start = start.min(num_pieces);
    let end = end.min(num_pieces);
    if end <= start {
        None
    } else {
        Some((start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_range_is_empty() {
        assert_eq!(piece_window(0, 0, 16_384, 10), None);
    }

    #[test]
    fn single_byte_read_covers_one_piece() {
        assert_eq!(piece_window(0, 1, 16_384, 10), Some((0, 1)));
    }

    #[test]
    fn range_clamps_to_num_pieces() {
        assert_eq!(piece_window(16_384 * 9, 16_384 * 5, 16_384, 10), Some((9, 10)));
    }
}

#[cfg(test)]
mod engine_tests {
    use super::*;
    use session_core::{ClientError, ClientFileEntry, ClientResult, ClientStats, TorrentReader};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Inner {
        download_allowed: AtomicBool,
        upload_allowed: AtomicBool,
        max_connections: AtomicU32,
        priorities: StdMutex<HashMap<u32, Priority>>,
        complete: StdMutex<HashSet<u32>>,
        stats: StdMutex<ClientStats>,
    }

    struct MockHandle {
        info_hash: String,
        inner: Arc<Inner>,
        metadata_notify: Arc<Notify>,
        closed_notify: Arc<Notify>,
        files: Vec<ClientFileEntry>,
        num_pieces: u32,
        piece_length: u64,
    }

    #[async_trait::async_trait]
    impl ClientHandle for MockHandle {
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
            *self.inner.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
        }

        fn num_pieces(&self) -> u32 {
            self.num_pieces
        }

        fn piece_length(&self) -> u64 {
            self.piece_length
        }

        fn files(&self) -> Vec<ClientFileEntry> {
            self.files.clone()
        }

        fn piece_complete(&self, piece: u32) -> bool {
            self.inner
                .complete
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .contains(&piece)
        }

        async fn set_piece_priority(&self, piece: u32, priority: Priority) -> ClientResult<()> {
            self.inner
                .priorities
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(piece, priority);
            Ok(())
        }

        async fn set_file_priority(&self, _file_index: u32, _priority: Priority) -> ClientResult<()> {
            Ok(())
        }

        async fn set_download_allowed(&self, allowed: bool) {
            self.inner.download_allowed.store(allowed, Ordering::SeqCst);
        }

        async fn set_upload_allowed(&self, allowed: bool) {
            self.inner.upload_allowed.store(allowed, Ordering::SeqCst);
        }

        async fn set_max_connections(&self, max: u32) {
            self.inner.max_connections.store(max, Ordering::SeqCst);
        }

        async fn start_download_all(&self) {}

        async fn new_reader(
            &self,
            _file_index: u32,
            _offset: u64,
        ) -> ClientResult<Box<dyn TorrentReader>> {
            Err(ClientError::UnknownHandle)
        }
    }

    #[derive(Default)]
    struct MockClient {
        created: StdMutex<HashMap<String, Arc<Inner>>>,
    }

    impl MockClient {
        fn inner_for(&self, hash: &str) -> Arc<Inner> {
            Arc::clone(
                self.created
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .get(hash)
                    .expect("handle was accepted"),
            )
        }
    }

    #[async_trait::async_trait]
    impl TorrentClient for MockClient {
        async fn accept(&self, source: &TorrentSource) -> ClientResult<Box<dyn ClientHandle>> {
            let hash = match source {
                TorrentSource::Magnet(value) | TorrentSource::MetainfoPath(value) => value.clone(),
            };
            let inner = Arc::new(Inner::default());
            self.created
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(hash.clone(), Arc::clone(&inner));
            Ok(Box::new(MockHandle {
                info_hash: hash,
                inner,
                metadata_notify: Arc::new(Notify::new()),
                closed_notify: Arc::new(Notify::new()),
                files: vec![ClientFileEntry {
                    path: "movie.mkv".into(),
                    length: 16_384 * 4,
                    offset: 0,
                }],
                num_pieces: 4,
                piece_length: 16_384,
            }))
        }
    }

    #[derive(Default)]
    struct MockRepository {
        records: StdMutex<HashMap<TorrentId, SessionRecord>>,
    }

    #[async_trait::async_trait]
    impl SessionRepository for MockRepository {
        async fn create(&self, record: SessionRecord) -> RepositoryResult<()> {
            self.records
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .entry(record.id.clone())
                .or_insert(record);
            Ok(())
        }

        async fn update(&self, record: SessionRecord) -> RepositoryResult<()> {
            let mut records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            match records.get_mut(&record.id) {
                Some(existing) => {
                    existing.status = record.status;
                    existing.tags = record.tags;
                    existing.updated_at = record.updated_at;
                    Ok(())
                }
                None => Err(session_core::RepositoryError::NotFound { id: record.id }),
            }
        }

        async fn update_progress(&self, id: &TorrentId, progress: f64) -> RepositoryResult<()> {
            let mut records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let record = records
                .get_mut(id)
                .ok_or_else(|| session_core::RepositoryError::NotFound { id: id.clone() })?;
            record.progress = record.progress.max(progress);
            Ok(())
        }

        async fn get_by_id(&self, id: &TorrentId) -> RepositoryResult<SessionRecord> {
            self.records
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(id)
                .cloned()
                .ok_or_else(|| session_core::RepositoryError::NotFound { id: id.clone() })
        }

        async fn list_by_filter(
            &self,
            filter: &session_core::SessionFilter,
        ) -> RepositoryResult<Vec<SessionRecord>> {
            Ok(self
                .records
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .values()
                .filter(|record| filter.status.is_none_or(|status| record.status == status))
                .cloned()
                .collect())
        }

        async fn get_many(&self, ids: &[TorrentId]) -> RepositoryResult<Vec<SessionRecord>> {
            let records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
        }

        async fn delete(&self, id: &TorrentId) -> RepositoryResult<()> {
            self.records
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .remove(id);
            Ok(())
        }

        async fn update_tags(&self, id: &TorrentId, tags: Vec<String>) -> RepositoryResult<()> {
            if let Some(record) = self
                .records
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get_mut(id)
            {
                record.tags = tags;
            }
            Ok(())
        }
    }

    fn test_engine(max_sessions: usize) -> (Arc<SessionEngine>, Arc<MockClient>) {
        let (engine, client, _repository) = test_engine_with_repository(max_sessions);
        (engine, client)
    }

    fn test_engine_with_repository(
        max_sessions: usize,
    ) -> (Arc<SessionEngine>, Arc<MockClient>, Arc<MockRepository>) {
        let client = Arc::new(MockClient::default());
        let repository = Arc::new(MockRepository::default());
        let engine = SessionEngine::new(
            Arc::clone(&client) as Arc<dyn TorrentClient>,
            Arc::clone(&repository) as Arc<dyn SessionRepository>,
            EventBus::new(),
            EngineConfig {
                max_sessions,
                idle_timeout: Duration::ZERO,
            },
        );
        (engine, client, repository)
    }

    fn hash(byte: u8) -> String {
        String::from_utf8(vec![byte; 40]).expect("ascii hex digit")
    }

    #[tokio::test]
    async fn open_auto_starts_once_metadata_is_ready() {
        let (engine, _client) = test_engine(0);
        let id = engine
            .open(TorrentSource::Magnet(hash(b'a')))
            .await
            .expect("open succeeds");
        assert_eq!(engine.get_session_mode(&id).await.unwrap(), SessionMode::Downloading);
    }

    #[tokio::test]
    async fn stop_then_start_resumes_downloading() {
        let (engine, _client) = test_engine(0);
        let id = engine.open(TorrentSource::Magnet(hash(b'a'))).await.unwrap();
        engine.stop_session(&id).await.unwrap();
        assert_eq!(engine.get_session_mode(&id).await.unwrap(), SessionMode::Stopped);
        engine.start_session(&id).await.unwrap();
        assert_eq!(engine.get_session_mode(&id).await.unwrap(), SessionMode::Downloading);
    }

    #[tokio::test]
    async fn focus_pauses_other_active_sessions() {
        let (engine, _client) = test_engine(0);
        let first = engine.open(TorrentSource::Magnet(hash(b'a'))).await.unwrap();
        let second = engine.open(TorrentSource::Magnet(hash(b'b'))).await.unwrap();

        engine.focus_session(&first).await.unwrap();

        assert_eq!(engine.get_session_mode(&first).await.unwrap(), SessionMode::Focused);
        assert_eq!(engine.get_session_mode(&second).await.unwrap(), SessionMode::Paused);
    }

    #[tokio::test]
    async fn unfocus_resumes_every_paused_peer() {
        let (engine, _client) = test_engine(0);
        let first = engine.open(TorrentSource::Magnet(hash(b'a'))).await.unwrap();
        let second = engine.open(TorrentSource::Magnet(hash(b'b'))).await.unwrap();
        engine.focus_session(&first).await.unwrap();

        engine.unfocus_all().await;

        assert_eq!(engine.get_session_mode(&first).await.unwrap(), SessionMode::Downloading);
        assert_eq!(engine.get_session_mode(&second).await.unwrap(), SessionMode::Downloading);
    }

    #[tokio::test]
    async fn focus_on_a_stopped_session_is_an_invalid_transition() {
        let (engine, _client) = test_engine(0);
        let id = engine.open(TorrentSource::Magnet(hash(b'a'))).await.unwrap();
        engine.stop_session(&id).await.unwrap();

        let err = engine.focus_session(&id).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn eviction_reclaims_the_least_recently_used_eligible_session() {
        let (engine, _client) = test_engine(1);
        let first = engine.open(TorrentSource::Magnet(hash(b'a'))).await.unwrap();
        engine.stop_session(&first).await.unwrap();

        let second = engine.open(TorrentSource::Magnet(hash(b'b'))).await.unwrap();

        let ids = engine.list_sessions().await;
        assert_eq!(ids, vec![second]);
        assert!(engine.get_session_mode(&first).await.is_err());
    }

    #[tokio::test]
    async fn set_piece_priority_biases_only_the_covered_pieces() {
        let (engine, client) = test_engine(0);
        let source_hash = hash(b'a');
        let id = engine
            .open(TorrentSource::Magnet(source_hash.clone()))
            .await
            .unwrap();

        engine
            .set_piece_priority(
                &id,
                0,
                Range {
                    offset: 0,
                    length: 1,
                },
                Priority::High,
            )
            .await
            .unwrap();

        let inner = client.inner_for(&source_hash);
        let priorities = inner.priorities.lock().unwrap();
        assert_eq!(priorities.get(&0), Some(&Priority::High));
        assert_eq!(priorities.get(&1), None);
    }

    #[tokio::test]
    async fn get_session_returns_snapshot_and_touches_last_access() {
        let (engine, _client) = test_engine(0);
        let id = engine.open(TorrentSource::Magnet(hash(b'a'))).await.unwrap();

        let before = {
            let registry = engine.registry.read().await;
            registry.sessions.get(&id).unwrap().last_access
        };
        tokio::time::sleep(Duration::from_millis(1)).await;

        let snapshot = engine.get_session(&id).await.unwrap();
        assert_eq!(snapshot.id, id);
        assert_eq!(snapshot.mode, SessionMode::Downloading);
        assert_eq!(snapshot.rate_limit_bps, 0);
        assert!(snapshot.tags.is_empty());

        let after = {
            let registry = engine.registry.read().await;
            registry.sessions.get(&id).unwrap().last_access
        };
        assert!(after > before);
    }

    #[tokio::test]
    async fn get_session_on_unknown_id_is_not_found() {
        let (engine, _client) = test_engine(0);
        let err = engine.get_session(&TorrentId::parse(hash(b'f')).unwrap()).await;
        assert!(matches!(err, Err(SessionError::SessionNotFound { .. })));
    }

    #[tokio::test]
    async fn rate_limit_round_trips() {
        let (engine, _client) = test_engine(0);
        let id = engine.open(TorrentSource::Magnet(hash(b'a'))).await.unwrap();

        assert_eq!(engine.get_download_rate_limit(&id).await.unwrap(), 0);
        engine.set_download_rate_limit(&id, 1_000_000).await.unwrap();
        assert_eq!(engine.get_download_rate_limit(&id).await.unwrap(), 1_000_000);
    }

    #[tokio::test]
    async fn remove_unknown_session_is_not_found() {
        let (engine, _client) = test_engine(0);
        let err = engine.remove_session(&TorrentId::parse(hash(b'f')).unwrap()).await;
        assert!(matches!(err, Err(SessionError::SessionNotFound { .. })));
    }

    #[tokio::test]
    async fn opening_a_session_persists_a_record() {
        let (engine, _client, repository) = test_engine_with_repository(0);
        let id = engine.open(TorrentSource::Magnet(hash(b'a'))).await.unwrap();

        let record = repository.get_by_id(&id).await.unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.status, PersistedStatus::Active);
    }

    #[tokio::test]
    async fn mode_changes_reconcile_persisted_status() {
        let (engine, _client, repository) = test_engine_with_repository(0);
        let id = engine.open(TorrentSource::Magnet(hash(b'a'))).await.unwrap();
        assert_eq!(
            repository.get_by_id(&id).await.unwrap().status,
            PersistedStatus::Active
        );

        engine.stop_session(&id).await.unwrap();
        assert_eq!(
            repository.get_by_id(&id).await.unwrap().status,
            PersistedStatus::Stopped
        );
    }

    #[tokio::test]
    async fn sampling_state_reconciles_persisted_progress() {
        let (engine, client, repository) = test_engine_with_repository(0);
        let id = engine.open(TorrentSource::Magnet(hash(b'a'))).await.unwrap();
        client.inner_for(id.as_str()).stats.lock().unwrap().bytes_read_useful = 32_768;

        engine.get_session_state(&id).await.unwrap();
        assert_eq!(repository.get_by_id(&id).await.unwrap().progress, 0.5);
    }

    #[tokio::test]
    async fn removing_a_session_deletes_its_record() {
        let (engine, _client, repository) = test_engine_with_repository(0);
        let id = engine.open(TorrentSource::Magnet(hash(b'a'))).await.unwrap();
        engine.remove_session(&id).await.unwrap();

        let err = repository.get_by_id(&id).await;
        assert!(matches!(err, Err(session_core::RepositoryError::NotFound { .. })));
    }
}
