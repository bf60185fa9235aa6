//! End-to-end scenarios (spec §8) exercised against the real `StubClient`
//! and `MemoryRepository` rather than the in-module mocks `engine.rs` uses
//! for its narrower unit tests.

use std::sync::Arc;
use std::time::Duration;

use session_client::{StubClient, StubClientConfig};
use session_core::{Priority, Range, SessionError, SessionMode, TorrentSource};
use session_data::MemoryRepository;
use session_engine::{EngineConfig, SessionEngine};
use session_events::EventBus;

fn fast_client() -> Arc<StubClient> {
    Arc::new(StubClient::new(StubClientConfig {
        file_length: 4096,
        piece_length: 1024,
        download_bps: 1024 * 1024,
        upload_bps: 1024 * 1024,
    }))
}

fn engine(max_sessions: usize) -> Arc<SessionEngine> {
    SessionEngine::new(
        fast_client(),
        Arc::new(MemoryRepository::new()),
        EventBus::new(),
        EngineConfig {
            max_sessions,
            idle_timeout: Duration::ZERO,
        },
    )
}

#[tokio::test]
async fn admit_focus_stream_complete() {
    let engine = engine(0);

    let id = engine
        .open(TorrentSource::Magnet("magnet:?xt=urn:btih:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into()))
        .await
        .unwrap();
    assert_eq!(engine.get_session_mode(&id).await.unwrap(), SessionMode::Downloading);

    engine.focus_session(&id).await.unwrap();
    assert_eq!(engine.get_session_mode(&id).await.unwrap(), SessionMode::Focused);

    engine
        .set_piece_priority(&id, 0, Range { offset: 0, length: 1 << 21 }, Priority::High)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let state = engine.get_session_state(&id).await.unwrap();
    assert!(state.progress >= 1.0);
    assert_eq!(engine.get_session_mode(&id).await.unwrap(), SessionMode::Completed);
}

#[tokio::test]
async fn focus_arbitration_demotes_and_promotes() {
    let engine = engine(0);

    let a = engine
        .open(TorrentSource::Magnet("magnet:?xt=urn:btih:1111111111111111111111111111111111111111".into()))
        .await
        .unwrap();
    let b = engine
        .open(TorrentSource::Magnet("magnet:?xt=urn:btih:2222222222222222222222222222222222222222".into()))
        .await
        .unwrap();

    engine.focus_session(&a).await.unwrap();
    assert_eq!(engine.get_session_mode(&a).await.unwrap(), SessionMode::Focused);
    assert_eq!(engine.get_session_mode(&b).await.unwrap(), SessionMode::Paused);

    engine.focus_session(&b).await.unwrap();
    assert_eq!(engine.get_session_mode(&a).await.unwrap(), SessionMode::Downloading);
    assert_eq!(engine.get_session_mode(&b).await.unwrap(), SessionMode::Focused);
}

#[tokio::test]
async fn eviction_removes_least_recently_accessed_non_focused_session() {
    let engine = engine(2);

    let a = engine
        .open(TorrentSource::Magnet("magnet:?xt=urn:btih:3333333333333333333333333333333333333333".into()))
        .await
        .unwrap();
    let b = engine
        .open(TorrentSource::Magnet("magnet:?xt=urn:btih:4444444444444444444444444444444444444444".into()))
        .await
        .unwrap();

    engine.get_session_state(&b).await.unwrap();

    let c = engine
        .open(TorrentSource::Magnet("magnet:?xt=urn:btih:5555555555555555555555555555555555555555".into()))
        .await
        .unwrap();

    let active = engine.list_sessions().await;
    assert!(!active.contains(&a));
    assert!(active.contains(&b));
    assert!(active.contains(&c));
}

#[tokio::test]
async fn invalid_transition_rejected_and_leaves_state_unchanged() {
    let engine = engine(0);
    let a = engine
        .open(TorrentSource::Magnet("magnet:?xt=urn:btih:6666666666666666666666666666666666666666".into()))
        .await
        .unwrap();

    engine.stop_session(&a).await.unwrap();
    assert_eq!(engine.get_session_mode(&a).await.unwrap(), SessionMode::Stopped);

    let err = engine.focus_session(&a).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidTransition {
            from: SessionMode::Stopped,
            to: SessionMode::Focused,
            ..
        }
    ));
    assert_eq!(engine.get_session_mode(&a).await.unwrap(), SessionMode::Stopped);
}
