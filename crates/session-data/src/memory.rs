//! In-memory `SessionRepository`, used wherever a Postgres connection isn't
//! configured (tests, or a `session-app` run with no `DATABASE_URL`).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use session_core::{
    RepositoryResult, SessionFilter, SessionRecord, SessionRepository, TorrentId,
};

use crate::error::DataError;

/// Non-persistent [`SessionRepository`] backed by a guarded `HashMap`.
#[derive(Default)]
pub struct MemoryRepository {
    records: Mutex<HashMap<TorrentId, SessionRecord>>,
}

impl MemoryRepository {
    /// An empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TorrentId, SessionRecord>> {
        self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionRepository for MemoryRepository {
    async fn create(&self, record: SessionRecord) -> RepositoryResult<()> {
        self.lock().entry(record.id.clone()).or_insert(record);
        Ok(())
    }

    async fn update(&self, record: SessionRecord) -> RepositoryResult<()> {
        let mut records = self.lock();
        let existing = records
            .get_mut(&record.id)
            .ok_or_else(|| DataError::NotFound { id: record.id.clone() })?;
        existing.status = record.status;
        existing.tags = record.tags;
        existing.updated_at = record.updated_at;
        Ok(())
    }

    async fn update_progress(&self, id: &TorrentId, progress: f64) -> RepositoryResult<()> {
        let mut records = self.lock();
        let existing = records
            .get_mut(id)
            .ok_or_else(|| DataError::NotFound { id: id.clone() })?;
        existing.progress = existing.progress.max(progress);
        existing.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn get_by_id(&self, id: &TorrentId) -> RepositoryResult<SessionRecord> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| DataError::NotFound { id: id.clone() }.into())
    }

    async fn list_by_filter(&self, filter: &SessionFilter) -> RepositoryResult<Vec<SessionRecord>> {
        Ok(self
            .lock()
            .values()
            .filter(|record| filter.status.is_none_or(|status| record.status == status))
            .filter(|record| {
                filter
                    .tag
                    .as_ref()
                    .is_none_or(|tag| record.tags.iter().any(|owned| owned == tag))
            })
            .cloned()
            .collect())
    }

    async fn get_many(&self, ids: &[TorrentId]) -> RepositoryResult<Vec<SessionRecord>> {
        let records = self.lock();
        Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
    }

    async fn delete(&self, id: &TorrentId) -> RepositoryResult<()> {
        self.lock().remove(id);
        Ok(())
    }

    async fn update_tags(&self, id: &TorrentId, tags: Vec<String>) -> RepositoryResult<()> {
        let mut records = self.lock();
        let existing = records
            .get_mut(id)
            .ok_or_else(|| DataError::NotFound { id: id.clone() })?;
        existing.tags = tags;
        existing.updated_at = chrono::Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use session_core::{PersistedStatus, TorrentSource};

    fn sample(id: &str) -> SessionRecord {
        let now = chrono::Utc::now();
        SessionRecord {
            id: TorrentId::parse(id.repeat(40 / id.len())).unwrap(),
            source: TorrentSource::Magnet("magnet:?xt=urn:btih:abc".into()),
            status: PersistedStatus::Pending,
            progress: 0.0,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let repo = MemoryRepository::new();
        let record = sample("a");
        repo.create(record.clone()).await.unwrap();
        repo.update_progress(&record.id, 0.4).await.unwrap();
        repo.create(record).await.unwrap();

        assert_eq!(repo.get_by_id(&TorrentId::parse("a".repeat(40)).unwrap()).await.unwrap().progress, 0.4);
    }

    #[tokio::test]
    async fn update_progress_never_regresses() {
        let repo = MemoryRepository::new();
        let record = sample("a");
        repo.create(record.clone()).await.unwrap();
        repo.update_progress(&record.id, 0.6).await.unwrap();
        repo.update_progress(&record.id, 0.2).await.unwrap();

        assert_eq!(repo.get_by_id(&record.id).await.unwrap().progress, 0.6);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let repo = MemoryRepository::new();
        let record = sample("a");
        repo.create(record.clone()).await.unwrap();
        repo.delete(&record.id).await.unwrap();

        let err = repo.get_by_id(&record.id).await;
        assert!(matches!(err, Err(session_core::RepositoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn list_by_filter_matches_status_and_tag() {
        let repo = MemoryRepository::new();
        let mut tagged = sample("b");
        tagged.tags = vec!["movies".into()];
        repo.create(tagged.clone()).await.unwrap();
        repo.create(sample("c")).await.unwrap();

        let filter = SessionFilter {
            status: Some(PersistedStatus::Pending),
            tag: Some("movies".into()),
        };
        let matches = repo.list_by_filter(&filter).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, tagged.id);
    }
}
