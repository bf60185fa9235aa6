use std::future::Future;

use anyhow::{Context, Result};
use session_core::{PersistedStatus, SessionFilter, SessionRecord, SessionRepository, TorrentId, TorrentSource};
use session_data::PostgresRepository;
use session_test_support::postgres::start_postgres;
use sqlx::postgres::PgPoolOptions;

async fn with_repository<F, Fut>(test: F) -> Result<()>
where
    F: FnOnce(PostgresRepository) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let database = match start_postgres() {
        Ok(database) => database,
        Err(err) => {
            eprintln!("skipping postgres repository tests: {err}");
            return Ok(());
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database.connection_string())
        .await
        .context("failed to connect to ephemeral postgres")?;

    let repository = PostgresRepository::new(pool.clone())
        .await
        .context("failed to bootstrap session catalog")?;

    let result = test(repository).await;
    pool.close().await;
    result
}

fn sample(id: char) -> SessionRecord {
    let now = chrono::Utc::now();
    SessionRecord {
        id: TorrentId::parse(id.to_string().repeat(40)).unwrap(),
        source: TorrentSource::Magnet("magnet:?xt=urn:btih:abc".into()),
        status: PersistedStatus::Pending,
        progress: 0.0,
        tags: vec!["movies".into()],
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn create_then_get_round_trips() -> Result<()> {
    with_repository(|repository| async move {
        let record = sample('a');
        repository.create(record.clone()).await?;

        let fetched = repository.get_by_id(&record.id).await?;
        assert_eq!(fetched.status, PersistedStatus::Pending);
        assert_eq!(fetched.tags, vec!["movies".to_string()]);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn update_replaces_status_and_tags_only() -> Result<()> {
    with_repository(|repository| async move {
        let mut record = sample('b');
        repository.create(record.clone()).await?;
        repository.update_progress(&record.id, 0.75).await?;

        record.status = PersistedStatus::Active;
        record.tags = vec!["focused".into()];
        repository.update(record.clone()).await?;

        let fetched = repository.get_by_id(&record.id).await?;
        assert_eq!(fetched.status, PersistedStatus::Active);
        assert_eq!(fetched.tags, vec!["focused".to_string()]);
        assert_eq!(fetched.progress, 0.75, "update must not clobber progress");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn update_progress_never_regresses() -> Result<()> {
    with_repository(|repository| async move {
        let record = sample('c');
        repository.create(record.clone()).await?;
        repository.update_progress(&record.id, 0.5).await?;
        repository.update_progress(&record.id, 0.2).await?;

        let fetched = repository.get_by_id(&record.id).await?;
        assert_eq!(fetched.progress, 0.5);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn delete_removes_the_record() -> Result<()> {
    with_repository(|repository| async move {
        let record = sample('d');
        repository.create(record.clone()).await?;
        repository.delete(&record.id).await?;

        let err = repository.get_by_id(&record.id).await;
        assert!(matches!(err, Err(session_core::RepositoryError::NotFound { .. })));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn list_by_filter_matches_status_and_tag() -> Result<()> {
    with_repository(|repository| async move {
        let mut active = sample('e');
        active.status = PersistedStatus::Active;
        repository.create(active.clone()).await?;
        repository.create(sample('f')).await?;

        let matches = repository
            .list_by_filter(&SessionFilter {
                status: Some(PersistedStatus::Active),
                tag: Some("movies".into()),
            })
            .await?;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, active.id);
        Ok(())
    })
    .await
}
