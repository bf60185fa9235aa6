//! Postgres-backed `SessionRepository` (spec §6).
//!
//! The catalog lives in a single table bootstrapped with `CREATE TABLE IF NOT
//! EXISTS` rather than a migration runner: there is no `migrations/` directory
//! for this crate, and the schema is small and stable enough that a runner
//! would add ceremony without benefit.

use async_trait::async_trait;
use session_core::{
    PersistedStatus, RepositoryResult, SessionFilter, SessionRecord, SessionRepository, TorrentId,
    TorrentSource,
};
use sqlx::{FromRow, PgPool, types::Json};

use crate::error::DataError;

const BOOTSTRAP_SQL: &str = r"
    CREATE TABLE IF NOT EXISTS session_catalog (
        id TEXT PRIMARY KEY,
        source JSONB NOT NULL,
        status TEXT NOT NULL,
        progress DOUBLE PRECISION NOT NULL,
        tags TEXT[] NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
";

/// Database-backed implementation of [`SessionRepository`].
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Connect the repository to an already-bootstrapped pool, creating the
    /// catalog table if it does not yet exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the bootstrap statement fails.
    pub async fn new(pool: PgPool) -> crate::error::Result<Self> {
        sqlx::query(BOOTSTRAP_SQL)
            .execute(&pool)
            .await
            .map_err(|source| DataError::BootstrapFailed { source })?;
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: String,
    source: Json<TorrentSource>,
    status: String,
    progress: f64,
    tags: Vec<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl SessionRow {
    fn into_record(self) -> SessionRecord {
        SessionRecord {
            id: TorrentId::parse(self.id).expect("id column always holds a valid info-hash"),
            source: self.source.0,
            status: deserialize_status(&self.status),
            progress: self.progress,
            tags: self.tags,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn serialize_status(status: PersistedStatus) -> &'static str {
    match status {
        PersistedStatus::Pending => "pending",
        PersistedStatus::Active => "active",
        PersistedStatus::Stopped => "stopped",
        PersistedStatus::Completed => "completed",
        PersistedStatus::Error => "error",
    }
}

fn deserialize_status(label: &str) -> PersistedStatus {
    match label {
        "active" => PersistedStatus::Active,
        "stopped" => PersistedStatus::Stopped,
        "completed" => PersistedStatus::Completed,
        "error" => PersistedStatus::Error,
        other => {
            if other != "pending" {
                tracing::warn!(status = %other, "unknown persisted status encountered in catalog");
            }
            PersistedStatus::Pending
        }
    }
}

#[async_trait]
impl SessionRepository for PostgresRepository {
    async fn create(&self, record: SessionRecord) -> RepositoryResult<()> {
        let source = Json(record.source);
        sqlx::query(
            r"
            INSERT INTO session_catalog (id, source, status, progress, tags, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(record.id.as_str())
        .bind(source)
        .bind(serialize_status(record.status))
        .bind(record.progress)
        .bind(&record.tags)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|source| DataError::QueryFailed {
            operation: "create",
            source,
        })?;
        Ok(())
    }

    async fn update(&self, record: SessionRecord) -> RepositoryResult<()> {
        let result = sqlx::query(
            r"
            UPDATE session_catalog
            SET status = $2, tags = $3, updated_at = $4
            WHERE id = $1
            ",
        )
        .bind(record.id.as_str())
        .bind(serialize_status(record.status))
        .bind(&record.tags)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|source| DataError::QueryFailed {
            operation: "update",
            source,
        })?;
        if result.rows_affected() == 0 {
            return Err(DataError::NotFound { id: record.id }.into());
        }
        Ok(())
    }

    async fn update_progress(&self, id: &TorrentId, progress: f64) -> RepositoryResult<()> {
        let result = sqlx::query(
            r"
            UPDATE session_catalog
            SET progress = GREATEST(progress, $2), updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id.as_str())
        .bind(progress)
        .execute(&self.pool)
        .await
        .map_err(|source| DataError::QueryFailed {
            operation: "update_progress",
            source,
        })?;
        if result.rows_affected() == 0 {
            return Err(DataError::NotFound { id: id.clone() }.into());
        }
        Ok(())
    }

    async fn get_by_id(&self, id: &TorrentId) -> RepositoryResult<SessionRecord> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM session_catalog WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| DataError::QueryFailed {
                operation: "get_by_id",
                source,
            })?
            .ok_or_else(|| DataError::NotFound { id: id.clone() })?;
        Ok(row.into_record())
    }

    async fn list_by_filter(&self, filter: &SessionFilter) -> RepositoryResult<Vec<SessionRecord>> {
        let status = filter.status.map(serialize_status);
        let rows = sqlx::query_as::<_, SessionRow>(
            r"
            SELECT * FROM session_catalog
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR $2 = ANY(tags))
            ",
        )
        .bind(status)
        .bind(filter.tag.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(|source| DataError::QueryFailed {
            operation: "list_by_filter",
            source,
        })?;
        Ok(rows.into_iter().map(SessionRow::into_record).collect())
    }

    async fn get_many(&self, ids: &[TorrentId]) -> RepositoryResult<Vec<SessionRecord>> {
        let ids: Vec<&str> = ids.iter().map(TorrentId::as_str).collect();
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM session_catalog WHERE id = ANY($1)",
        )
        .bind(&ids as &[&str])
        .fetch_all(&self.pool)
        .await
        .map_err(|source| DataError::QueryFailed {
            operation: "get_many",
            source,
        })?;
        Ok(rows.into_iter().map(SessionRow::into_record).collect())
    }

    async fn delete(&self, id: &TorrentId) -> RepositoryResult<()> {
        sqlx::query("DELETE FROM session_catalog WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|source| DataError::QueryFailed {
                operation: "delete",
                source,
            })?;
        Ok(())
    }

    async fn update_tags(&self, id: &TorrentId, tags: Vec<String>) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE session_catalog SET tags = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(&tags)
        .execute(&self.pool)
        .await
        .map_err(|source| DataError::QueryFailed {
            operation: "update_tags",
            source,
        })?;
        if result.rows_affected() == 0 {
            return Err(DataError::NotFound { id: id.clone() }.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_its_text_label() {
        for status in [
            PersistedStatus::Pending,
            PersistedStatus::Active,
            PersistedStatus::Stopped,
            PersistedStatus::Completed,
            PersistedStatus::Error,
        ] {
            let label = serialize_status(status);
            assert_eq!(deserialize_status(label), status);
        }
    }

    #[test]
    fn unknown_status_label_falls_back_to_pending() {
        assert_eq!(deserialize_status("quarantined"), PersistedStatus::Pending);
    }
}
