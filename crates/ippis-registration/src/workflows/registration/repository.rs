use async_trait::async_trait;

use super::domain::{
    HistoryEntry, NewHistoryEntry, Registration, RegistrationAggregate, RegistrationFilter,
    RegistrationId, StepRecord,
};
use super::transition::{TransitionCommand, ValidationError};

/// Persistence contract for the registration workflow.
///
/// Every write method is atomic: the row change, any step upsert, and the history append
/// commit together or not at all.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Insert a new root row and its `created` history entry.
    ///
    /// Returns [`RepositoryError::Conflict`] when the id is already taken.
    async fn insert_registration(
        &self,
        registration: &Registration,
        history: &NewHistoryEntry,
    ) -> Result<Registration, RepositoryError>;

    /// Upsert a step record keyed on its registration id and apply `command` to the root row.
    async fn save_step(
        &self,
        record: StepRecord,
        command: &TransitionCommand,
    ) -> Result<(StepRecord, Registration), RepositoryError>;

    /// Apply a status transition that carries no step data.
    async fn transition(
        &self,
        registration_id: &RegistrationId,
        command: &TransitionCommand,
    ) -> Result<Registration, RepositoryError>;

    async fn fetch_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Option<Registration>, RepositoryError>;

    /// Fan-out read of the root row and every step section from one consistent view.
    async fn fetch_aggregate(
        &self,
        registration_id: &RegistrationId,
        include_history: bool,
    ) -> Result<RegistrationAggregate, RepositoryError>;

    async fn history(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Vec<HistoryEntry>, RepositoryError>;

    async fn list(&self, filter: &RegistrationFilter) -> Result<Vec<Registration>, RepositoryError>;

    /// Release pooled resources during graceful shutdown.
    async fn close(&self) {}
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("{0} returned no row")]
    NoRowReturned(&'static str),
    #[error(transparent)]
    Rejected(#[from] ValidationError),
    #[error("stored value is invalid: {0}")]
    Corrupt(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl RepositoryError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RepositoryError::Unavailable(_))
    }
}
