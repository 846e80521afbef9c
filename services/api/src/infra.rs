use async_trait::async_trait;
use ippis_registration::config::DatabaseConfig;
use ippis_registration::error::AppError;
use ippis_registration::workflows::registration::{
    HistoryEntry, MemoryRegistrationStore, NewHistoryEntry, PgRegistrationStore, Registration,
    RegistrationAggregate, RegistrationFilter, RegistrationId, RegistrationStore, RepositoryError,
    StepRecord, TransitionCommand,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Store selected at startup: PostgreSQL when `DATABASE_URL` is set, memory otherwise.
#[derive(Clone)]
pub(crate) enum RegistrationBackend {
    Memory(MemoryRegistrationStore),
    Postgres(PgRegistrationStore),
}

impl RegistrationBackend {
    pub(crate) async fn from_config(config: &DatabaseConfig) -> Result<Self, AppError> {
        if config.url.is_none() {
            warn!("DATABASE_URL not set; registrations are kept in memory only");
            return Ok(Self::Memory(MemoryRegistrationStore::default()));
        }

        let store = PgRegistrationStore::connect(config).await?;
        if config.run_migrations {
            store.migrate().await?;
        }
        Ok(Self::Postgres(store))
    }

    /// Connect and apply the schema regardless of `DATABASE_RUN_MIGRATIONS`.
    pub(crate) async fn migrate(config: &DatabaseConfig) -> Result<(), AppError> {
        let store = PgRegistrationStore::connect(config).await?;
        store.migrate().await?;
        store.close().await;
        info!("registration schema migrated");
        Ok(())
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            RegistrationBackend::Memory(_) => "memory",
            RegistrationBackend::Postgres(_) => "postgres",
        }
    }
}

#[async_trait]
impl RegistrationStore for RegistrationBackend {
    async fn insert_registration(
        &self,
        registration: &Registration,
        history: &NewHistoryEntry,
    ) -> Result<Registration, RepositoryError> {
        match self {
            RegistrationBackend::Memory(store) => {
                store.insert_registration(registration, history).await
            }
            RegistrationBackend::Postgres(store) => {
                store.insert_registration(registration, history).await
            }
        }
    }

    async fn save_step(
        &self,
        record: StepRecord,
        command: &TransitionCommand,
    ) -> Result<(StepRecord, Registration), RepositoryError> {
        match self {
            RegistrationBackend::Memory(store) => store.save_step(record, command).await,
            RegistrationBackend::Postgres(store) => store.save_step(record, command).await,
        }
    }

    async fn transition(
        &self,
        registration_id: &RegistrationId,
        command: &TransitionCommand,
    ) -> Result<Registration, RepositoryError> {
        match self {
            RegistrationBackend::Memory(store) => store.transition(registration_id, command).await,
            RegistrationBackend::Postgres(store) => {
                store.transition(registration_id, command).await
            }
        }
    }

    async fn fetch_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Option<Registration>, RepositoryError> {
        match self {
            RegistrationBackend::Memory(store) => store.fetch_registration(registration_id).await,
            RegistrationBackend::Postgres(store) => {
                store.fetch_registration(registration_id).await
            }
        }
    }

    async fn fetch_aggregate(
        &self,
        registration_id: &RegistrationId,
        include_history: bool,
    ) -> Result<RegistrationAggregate, RepositoryError> {
        match self {
            RegistrationBackend::Memory(store) => {
                store.fetch_aggregate(registration_id, include_history).await
            }
            RegistrationBackend::Postgres(store) => {
                store.fetch_aggregate(registration_id, include_history).await
            }
        }
    }

    async fn history(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Vec<HistoryEntry>, RepositoryError> {
        match self {
            RegistrationBackend::Memory(store) => store.history(registration_id).await,
            RegistrationBackend::Postgres(store) => store.history(registration_id).await,
        }
    }

    async fn list(&self, filter: &RegistrationFilter) -> Result<Vec<Registration>, RepositoryError> {
        match self {
            RegistrationBackend::Memory(store) => store.list(filter).await,
            RegistrationBackend::Postgres(store) => store.list(filter).await,
        }
    }

    async fn close(&self) {
        match self {
            RegistrationBackend::Memory(store) => store.close().await,
            RegistrationBackend::Postgres(store) => store.close().await,
        }
    }
}
