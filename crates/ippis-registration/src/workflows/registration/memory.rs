use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::domain::{
    DocumentUploads, EmploymentInfo, HistoryEntry, NewHistoryEntry, PersonalInfo, Registration,
    RegistrationAggregate, RegistrationFilter, RegistrationId, StepKind, StepRecord,
    VerificationData,
};
use super::repository::{RegistrationStore, RepositoryError};
use super::transition::TransitionCommand;

/// Process-local store used for demos, tests, and deployments without `DATABASE_URL`.
///
/// One mutex covers every table, so each operation is atomic with respect to the others.
#[derive(Default, Clone)]
pub struct MemoryRegistrationStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    registrations: BTreeMap<RegistrationId, Registration>,
    verification: HashMap<RegistrationId, VerificationData>,
    personal_info: HashMap<RegistrationId, PersonalInfo>,
    employment_info: HashMap<RegistrationId, EmploymentInfo>,
    documents: HashMap<RegistrationId, DocumentUploads>,
    history: Vec<HistoryEntry>,
}

impl MemoryState {
    fn append_history(&mut self, registration_id: &RegistrationId, entry: &NewHistoryEntry) {
        let id = self.history.len() as i64 + 1;
        self.history.push(HistoryEntry {
            id,
            registration_id: registration_id.clone(),
            action: entry.action,
            details: entry.details.clone(),
            performed_at: Utc::now(),
        });
    }

    fn existing_step(&self, registration_id: &RegistrationId, step: StepKind) -> Option<StepRecord> {
        match step {
            StepKind::Verification => self
                .verification
                .get(registration_id)
                .cloned()
                .map(StepRecord::Verification),
            StepKind::PersonalInfo => self
                .personal_info
                .get(registration_id)
                .cloned()
                .map(StepRecord::PersonalInfo),
            StepKind::EmploymentInfo => self
                .employment_info
                .get(registration_id)
                .cloned()
                .map(StepRecord::EmploymentInfo),
            StepKind::Documents => self
                .documents
                .get(registration_id)
                .cloned()
                .map(StepRecord::Documents),
        }
    }

    fn upsert_step(&mut self, record: StepRecord) {
        match record {
            StepRecord::Verification(record) => {
                self.verification
                    .insert(record.registration_id.clone(), record);
            }
            StepRecord::PersonalInfo(record) => {
                self.personal_info
                    .insert(record.registration_id.clone(), record);
            }
            StepRecord::EmploymentInfo(record) => {
                self.employment_info
                    .insert(record.registration_id.clone(), record);
            }
            StepRecord::Documents(record) => {
                self.documents.insert(record.registration_id.clone(), record);
            }
        }
    }
}

impl MemoryRegistrationStore {
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Number of stored rows for a step across all registrations.
    pub fn step_row_count(&self, step: StepKind) -> usize {
        let Ok(state) = self.lock() else {
            return 0;
        };
        match step {
            StepKind::Verification => state.verification.len(),
            StepKind::PersonalInfo => state.personal_info.len(),
            StepKind::EmploymentInfo => state.employment_info.len(),
            StepKind::Documents => state.documents.len(),
        }
    }

    pub fn history_len(&self, registration_id: &RegistrationId) -> usize {
        let Ok(state) = self.lock() else {
            return 0;
        };
        state
            .history
            .iter()
            .filter(|entry| &entry.registration_id == registration_id)
            .count()
    }
}

#[async_trait]
impl RegistrationStore for MemoryRegistrationStore {
    async fn insert_registration(
        &self,
        registration: &Registration,
        history: &NewHistoryEntry,
    ) -> Result<Registration, RepositoryError> {
        let mut state = self.lock()?;
        if state
            .registrations
            .contains_key(&registration.registration_id)
        {
            return Err(RepositoryError::Conflict);
        }
        state
            .registrations
            .insert(registration.registration_id.clone(), registration.clone());
        state.append_history(&registration.registration_id, history);
        Ok(registration.clone())
    }

    async fn save_step(
        &self,
        mut record: StepRecord,
        command: &TransitionCommand,
    ) -> Result<(StepRecord, Registration), RepositoryError> {
        let mut state = self.lock()?;
        let registration_id = record.registration_id().clone();
        let current = state
            .registrations
            .get(&registration_id)
            .ok_or(RepositoryError::NotFound)?;
        let updated = command.apply(current)?;

        if let Some(existing) = state.existing_step(&registration_id, record.kind()) {
            record.preserve_created_at(existing.created_at());
        }
        state.upsert_step(record.clone());
        state
            .registrations
            .insert(registration_id.clone(), updated.clone());
        state.append_history(&registration_id, &command.history);

        Ok((record, updated))
    }

    async fn transition(
        &self,
        registration_id: &RegistrationId,
        command: &TransitionCommand,
    ) -> Result<Registration, RepositoryError> {
        let mut state = self.lock()?;
        let current = state
            .registrations
            .get(registration_id)
            .ok_or(RepositoryError::NotFound)?;
        let updated = command.apply(current)?;
        state
            .registrations
            .insert(registration_id.clone(), updated.clone());
        state.append_history(registration_id, &command.history);
        Ok(updated)
    }

    async fn fetch_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Option<Registration>, RepositoryError> {
        let state = self.lock()?;
        Ok(state.registrations.get(registration_id).cloned())
    }

    async fn fetch_aggregate(
        &self,
        registration_id: &RegistrationId,
        include_history: bool,
    ) -> Result<RegistrationAggregate, RepositoryError> {
        let state = self.lock()?;
        let Some(registration) = state.registrations.get(registration_id).cloned() else {
            return Ok(RegistrationAggregate::default());
        };
        let history = include_history.then(|| {
            state
                .history
                .iter()
                .filter(|entry| &entry.registration_id == registration_id)
                .cloned()
                .collect()
        });

        Ok(RegistrationAggregate {
            registration: Some(registration),
            verification: state.verification.get(registration_id).cloned(),
            personal_info: state.personal_info.get(registration_id).cloned(),
            employment_info: state.employment_info.get(registration_id).cloned(),
            documents: state.documents.get(registration_id).cloned(),
            history,
        })
    }

    async fn history(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Vec<HistoryEntry>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .history
            .iter()
            .filter(|entry| &entry.registration_id == registration_id)
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &RegistrationFilter) -> Result<Vec<Registration>, RepositoryError> {
        let state = self.lock()?;
        let mut registrations: Vec<Registration> = state
            .registrations
            .values()
            .filter(|registration| {
                filter
                    .status
                    .map_or(true, |status| registration.status == status)
            })
            .cloned()
            .collect();
        registrations.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.registration_id.cmp(&a.registration_id))
        });
        registrations.truncate(filter.effective_limit());
        Ok(registrations)
    }
}
