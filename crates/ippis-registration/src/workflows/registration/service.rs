use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{
    DocumentSet, DocumentUploads, EmploymentDetails, EmploymentInfo, HistoryAction, HistoryEntry,
    NewHistoryEntry, PersonalDetails, PersonalInfo, Registration, RegistrationAggregate,
    RegistrationFilter, RegistrationId, StepPayload, VerificationData, VerificationDetails,
};
use super::identifier::RegistrationIdGenerator;
use super::repository::{RegistrationStore, RepositoryError};
use super::transition::{Transition, TransitionCommand, ValidationError};
use crate::config::RegistrationConfig;

/// Result of a step save: the stored record plus the root row after the pointer moved.
#[derive(Debug, Clone, Serialize)]
pub struct SavedStep<T> {
    pub record: T,
    pub registration: Registration,
}

/// Workflow engine orchestrating step saves, submission, and review.
pub struct RegistrationWorkflow<S> {
    store: Arc<S>,
    ids: RegistrationIdGenerator,
    max_id_attempts: u8,
    require_complete_steps: bool,
}

impl<S> RegistrationWorkflow<S>
where
    S: RegistrationStore + 'static,
{
    pub fn new(store: Arc<S>, config: &RegistrationConfig) -> Self {
        Self::with_generator(store, RegistrationIdGenerator::from_config(config), config)
    }

    pub fn with_generator(
        store: Arc<S>,
        ids: RegistrationIdGenerator,
        config: &RegistrationConfig,
    ) -> Self {
        Self {
            store,
            ids,
            max_id_attempts: config.max_id_attempts.max(1),
            require_complete_steps: config.require_complete_steps,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create a draft registration, retrying with a fresh id when the store reports a clash.
    pub async fn create_registration(&self) -> Result<Registration, RegistrationError> {
        for attempt in 1..=self.max_id_attempts {
            let registration = Registration::draft(self.ids.generate(), Utc::now());
            let history = NewHistoryEntry::new(
                HistoryAction::Created,
                format!("registration {} created", registration.registration_id),
            );

            match self.store.insert_registration(&registration, &history).await {
                Ok(stored) => {
                    info!(registration_id = %stored.registration_id, "registration created");
                    return Ok(stored);
                }
                Err(RepositoryError::Conflict) => {
                    warn!(
                        registration_id = %registration.registration_id,
                        attempt,
                        "registration id collision, regenerating"
                    );
                }
                Err(err) => {
                    warn!(error = %err, "failed to create registration");
                    return Err(RegistrationError::Persistence(err));
                }
            }
        }

        Err(RegistrationError::DuplicateIdentifier {
            attempts: self.max_id_attempts,
        })
    }

    pub async fn save_verification_data(
        &self,
        registration_id: &RegistrationId,
        details: VerificationDetails,
    ) -> Result<SavedStep<VerificationData>, RegistrationError> {
        self.save_step(registration_id, details).await
    }

    pub async fn save_personal_info(
        &self,
        registration_id: &RegistrationId,
        details: PersonalDetails,
    ) -> Result<SavedStep<PersonalInfo>, RegistrationError> {
        self.save_step(registration_id, details).await
    }

    pub async fn save_employment_info(
        &self,
        registration_id: &RegistrationId,
        details: EmploymentDetails,
    ) -> Result<SavedStep<EmploymentInfo>, RegistrationError> {
        self.save_step(registration_id, details).await
    }

    pub async fn save_document_uploads(
        &self,
        registration_id: &RegistrationId,
        documents: DocumentSet,
    ) -> Result<SavedStep<DocumentUploads>, RegistrationError> {
        self.save_step(registration_id, documents).await
    }

    async fn save_step<P>(
        &self,
        registration_id: &RegistrationId,
        payload: P,
    ) -> Result<SavedStep<P::Record>, RegistrationError>
    where
        P: StepPayload,
    {
        payload.validate()?;

        let now = Utc::now();
        let completes = payload.completes_step();
        let details = if completes {
            format!("{} saved", P::KIND)
        } else {
            format!("{} saved, awaiting verification", P::KIND)
        };
        let command = TransitionCommand::new(
            Transition::SaveStep {
                step: P::KIND,
                completes,
            },
            now,
            details,
        );
        let record = payload.into_record(registration_id.clone(), now);

        let (stored, registration) = self
            .store
            .save_step(record, &command)
            .await
            .map_err(|err| self.fail(registration_id, "save step", err))?;

        let record = P::extract(stored).ok_or_else(|| {
            RegistrationError::Persistence(RepositoryError::Corrupt(format!(
                "store returned a different step than {}",
                P::KIND
            )))
        })?;

        debug!(
            registration_id = %registration_id,
            step = %P::KIND,
            current_step = %registration.current_step,
            "step saved"
        );
        Ok(SavedStep {
            record,
            registration,
        })
    }

    /// Submit for approval. A false declaration is rejected without touching the store.
    pub async fn submit_registration(
        &self,
        registration_id: &RegistrationId,
        declaration: bool,
    ) -> Result<Registration, RegistrationError> {
        if !declaration {
            return Err(ValidationError::DeclarationRequired.into());
        }

        let command = TransitionCommand::new(
            Transition::Submit {
                declaration,
                require_complete_steps: self.require_complete_steps,
            },
            Utc::now(),
            "submitted for approval with declaration accepted",
        );
        let registration = self
            .store
            .transition(registration_id, &command)
            .await
            .map_err(|err| self.fail(registration_id, "submit", err))?;

        info!(registration_id = %registration_id, "registration submitted");
        Ok(registration)
    }

    pub async fn approve_registration(
        &self,
        registration_id: &RegistrationId,
        reviewer: &str,
    ) -> Result<Registration, RegistrationError> {
        require_review_field("reviewer", reviewer)?;
        let command = TransitionCommand::new(
            Transition::Approve,
            Utc::now(),
            format!("approved by {}", reviewer.trim()),
        );
        self.review(registration_id, command).await
    }

    pub async fn reject_registration(
        &self,
        registration_id: &RegistrationId,
        reviewer: &str,
        reason: &str,
    ) -> Result<Registration, RegistrationError> {
        require_review_field("reviewer", reviewer)?;
        require_review_field("reason", reason)?;
        let command = TransitionCommand::new(
            Transition::Reject {
                reason: reason.trim().to_string(),
            },
            Utc::now(),
            format!("rejected by {}: {}", reviewer.trim(), reason.trim()),
        );
        self.review(registration_id, command).await
    }

    /// Send a submission back to the applicant for corrections.
    pub async fn mark_incomplete(
        &self,
        registration_id: &RegistrationId,
        reviewer: &str,
        reason: &str,
    ) -> Result<Registration, RegistrationError> {
        require_review_field("reviewer", reviewer)?;
        require_review_field("reason", reason)?;
        let command = TransitionCommand::new(
            Transition::MarkIncomplete {
                reason: reason.trim().to_string(),
            },
            Utc::now(),
            format!("returned by {}: {}", reviewer.trim(), reason.trim()),
        );
        self.review(registration_id, command).await
    }

    async fn review(
        &self,
        registration_id: &RegistrationId,
        command: TransitionCommand,
    ) -> Result<Registration, RegistrationError> {
        let registration = self
            .store
            .transition(registration_id, &command)
            .await
            .map_err(|err| self.fail(registration_id, "review", err))?;
        info!(
            registration_id = %registration_id,
            status = %registration.status,
            "registration reviewed"
        );
        Ok(registration)
    }

    /// Read the full registration. Unknown ids yield an aggregate with every section empty.
    pub async fn get_registration(
        &self,
        registration_id: &RegistrationId,
        include_history: bool,
    ) -> Result<RegistrationAggregate, RegistrationError> {
        self.store
            .fetch_aggregate(registration_id, include_history)
            .await
            .map_err(|err| self.fail(registration_id, "read", err))
    }

    pub async fn registration_history(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Vec<HistoryEntry>, RegistrationError> {
        if self
            .store
            .fetch_registration(registration_id)
            .await
            .map_err(|err| self.fail(registration_id, "read", err))?
            .is_none()
        {
            return Err(RegistrationError::NotFound(registration_id.clone()));
        }

        self.store
            .history(registration_id)
            .await
            .map_err(|err| self.fail(registration_id, "read history", err))
    }

    pub async fn list_registrations(
        &self,
        filter: RegistrationFilter,
    ) -> Result<Vec<Registration>, RegistrationError> {
        self.store.list(&filter).await.map_err(|err| {
            warn!(error = %err, "failed to list registrations");
            RegistrationError::Persistence(err)
        })
    }

    fn fail(
        &self,
        registration_id: &RegistrationId,
        operation: &'static str,
        err: RepositoryError,
    ) -> RegistrationError {
        match err {
            RepositoryError::NotFound => RegistrationError::NotFound(registration_id.clone()),
            RepositoryError::Rejected(reason) => {
                debug!(registration_id = %registration_id, operation, %reason, "request rejected");
                RegistrationError::Validation(reason)
            }
            other => {
                warn!(
                    registration_id = %registration_id,
                    operation,
                    error = %other,
                    "registration store failure"
                );
                RegistrationError::Persistence(other)
            }
        }
    }
}

fn require_review_field(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::BlankReviewField { field });
    }
    Ok(())
}

/// Error raised by the registration workflow.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("registration {0} not found")]
    NotFound(RegistrationId),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("could not allocate a unique registration id after {attempts} attempts")]
    DuplicateIdentifier { attempts: u8 },
    #[error(transparent)]
    Persistence(RepositoryError),
}
