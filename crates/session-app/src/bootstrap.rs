use std::sync::Arc;

use session_client::StubClient;
use session_config::EngineConfig as LoadedConfig;
use session_core::{SessionRepository, TorrentClient};
use session_data::{MemoryRepository, PostgresRepository};
use session_engine::{EngineConfig, SessionEngine};
use session_events::{Event, EventBus, SessionMode};
use session_telemetry::{GlobalContextGuard, LoggingConfig, Metrics};
use sqlx::postgres::PgPoolOptions;
use tokio_stream::StreamExt;
use tracing::info;

use crate::error::{AppError, AppResult};

/// Dependencies required to bootstrap the session application.
pub(crate) struct BootstrapDependencies {
    logging: LoggingConfig<'static>,
    engine_config: EngineConfig,
    repository: Arc<dyn SessionRepository>,
    client: Arc<dyn TorrentClient>,
    events: EventBus,
    telemetry: Metrics,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the environment for the binary entrypoint.
    pub(crate) async fn from_env() -> AppResult<Self> {
        let logging = LoggingConfig::default();

        let loaded = LoadedConfig::from_env().map_err(|err| AppError::config("engine_config.from_env", err))?;
        let engine_config = EngineConfig {
            max_sessions: loaded.max_sessions,
            idle_timeout: loaded.idle_timeout,
        };

        let repository: Arc<dyn SessionRepository> = match std::env::var("DATABASE_URL") {
            Ok(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect(&url)
                    .await
                    .map_err(|err| AppError::database("pg_pool.connect", err))?;
                let repository = PostgresRepository::new(pool)
                    .await
                    .map_err(|err| AppError::repository("postgres_repository.new", err))?;
                Arc::new(repository)
            }
            Err(_) => Arc::new(MemoryRepository::new()),
        };

        let client: Arc<dyn TorrentClient> = Arc::new(StubClient::default());
        let events = EventBus::new();
        let telemetry =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;

        Ok(Self {
            logging,
            engine_config,
            repository,
            client,
            events,
            telemetry,
        })
    }
}

/// Entry point for the session application boot sequence.
///
/// # Errors
///
/// Returns an error if dependency construction or application startup fails.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env().await?;
    run_app_with(dependencies).await
}

/// Boot sequence that relies entirely on injected dependencies to simplify testing.
pub(crate) async fn run_app_with(dependencies: BootstrapDependencies) -> AppResult<()> {
    session_telemetry::init_logging(&dependencies.logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("bootstrap");

    info!("session application bootstrap starting");

    let BootstrapDependencies {
        logging: _,
        engine_config,
        repository,
        client,
        events,
        telemetry,
    } = dependencies;

    let engine = SessionEngine::new(client, repository, events, engine_config);
    engine.restore_from_repository().await;
    let idle_reaper = engine.spawn_idle_reaper();
    telemetry.set_active_sessions(0);
    let telemetry_task = spawn_telemetry_bridge(Arc::clone(&engine), telemetry.clone());

    info!("session engine ready; awaiting shutdown signal");
    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::telemetry("signal.ctrl_c", err.into()))?;
    info!("shutdown signal received");

    if let Some(reaper) = idle_reaper {
        reaper.abort();
        let _ = reaper.await;
    }
    telemetry_task.abort();
    let _ = telemetry_task.await;

    info!("session application shutdown complete");
    Ok(())
}

/// Bridge the engine's event stream into telemetry counters: focus changes,
/// evictions, and health-degradation transitions (spec §9 observability note).
fn spawn_telemetry_bridge(
    engine: Arc<SessionEngine>,
    telemetry: Metrics,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = engine.subscribe();
        let mut known_degraded = 0_usize;
        while let Some(item) = stream.next().await {
            let Ok(envelope) = item else {
                continue;
            };
            let refresh_active_count = matches!(
                envelope.event,
                Event::SessionOpened { .. } | Event::SessionRemoved { .. } | Event::SessionEvicted { .. }
            );
            match &envelope.event {
                Event::ModeChanged { to: SessionMode::Focused, .. } => {
                    telemetry.inc_focus_change();
                }
                Event::SessionEvicted { .. } => {
                    telemetry.inc_eviction();
                }
                Event::HealthChanged { degraded } => {
                    if degraded.len() > known_degraded {
                        telemetry.inc_health_degradation();
                    }
                    known_degraded = degraded.len();
                }
                _ => {}
            }
            if refresh_active_count {
                let count = i64::try_from(engine.list_sessions().await.len()).unwrap_or(i64::MAX);
                telemetry.set_active_sessions(count);
            }
        }
    })
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dependencies_from_env_default_to_memory_repository() {
        unsafe {
            std::env::remove_var("DATABASE_URL");
        }
        let dependencies = BootstrapDependencies::from_env().await.unwrap();
        assert_eq!(dependencies.engine_config.max_sessions, 0);
    }
}
