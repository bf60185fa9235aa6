//! The persisted-catalog repository contract (spec §6), external to the
//! engine. The engine calls this only to restore sessions at boot and to
//! mirror `SessionState` into the persisted record during reconciliation.

use std::error::Error as StdError;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{PersistedStatus, TorrentId, TorrentSource};

/// Errors raised by a `SessionRepository` implementation.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No record exists for the requested id.
    #[error("record not found")]
    NotFound {
        /// The id that was looked up.
        id: TorrentId,
    },
    /// The underlying store failed.
    #[error("repository backend failed")]
    Backend {
        /// Underlying failure.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Result alias for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// A persisted catalog record mirroring spec §3's `SessionState` fields plus
/// a cached `progress` float used for ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    /// The session's info-hash.
    pub id: TorrentId,
    /// How to re-admit this session at boot (magnet URI or metainfo path).
    /// Not part of spec §3's `SessionState` snapshot, but required for the
    /// repository to be useful at restore time.
    pub source: TorrentSource,
    /// Persisted status.
    pub status: PersistedStatus,
    /// Cached progress fraction, `[0, 1]`, used for ordering queries.
    pub progress: f64,
    /// Arbitrary caller-assigned tags.
    pub tags: Vec<String>,
    /// Wall-clock time the record was created.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Wall-clock time the record was last updated.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Filter applied to `list_by_filter`.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    /// Restrict to records with this persisted status, if set.
    pub status: Option<PersistedStatus>,
    /// Restrict to records carrying this tag, if set.
    pub tag: Option<String>,
}

/// Persisted-catalog contract injected into the engine.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new record.
    async fn create(&self, record: SessionRecord) -> RepositoryResult<()>;

    /// Replace an existing record's status/tags wholesale.
    async fn update(&self, record: SessionRecord) -> RepositoryResult<()>;

    /// Atomically advance `progress` to `max(current, progress)`. The
    /// repository guarantees the stored value only increases.
    async fn update_progress(&self, id: &TorrentId, progress: f64) -> RepositoryResult<()>;

    /// Fetch a single record by id.
    async fn get_by_id(&self, id: &TorrentId) -> RepositoryResult<SessionRecord>;

    /// List records matching a filter.
    async fn list_by_filter(&self, filter: &SessionFilter) -> RepositoryResult<Vec<SessionRecord>>;

    /// Fetch multiple records by id; missing ids are silently omitted.
    async fn get_many(&self, ids: &[TorrentId]) -> RepositoryResult<Vec<SessionRecord>>;

    /// Delete a record.
    async fn delete(&self, id: &TorrentId) -> RepositoryResult<()>;

    /// Replace a record's tags.
    async fn update_tags(&self, id: &TorrentId, tags: Vec<String>) -> RepositoryResult<()>;
}
