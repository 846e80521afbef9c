use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;
use axum::Router;
use chrono::NaiveDate;
use serde_json::Value;

use crate::config::RegistrationConfig;
use crate::workflows::registration::domain::{
    DocumentSet, EmploymentDetails, HistoryEntry, NewHistoryEntry, PersonalDetails, Registration,
    RegistrationAggregate, RegistrationFilter, RegistrationId, StepRecord, VerificationDetails,
};
use crate::workflows::registration::repository::{RegistrationStore, RepositoryError};
use crate::workflows::registration::transition::TransitionCommand;
use crate::workflows::registration::{
    registration_router, MemoryRegistrationStore, RegistrationWorkflow,
};

pub(super) fn config() -> RegistrationConfig {
    RegistrationConfig::default()
}

pub(super) fn verification(verified: bool) -> VerificationDetails {
    VerificationDetails {
        bvn: "22212345678".to_string(),
        bvn_verified: verified,
        nin: "12345678901".to_string(),
        nin_verified: verified,
    }
}

pub(super) fn personal_details() -> PersonalDetails {
    PersonalDetails {
        title: "Mrs".to_string(),
        first_name: "Adaeze".to_string(),
        middle_name: Some("Ngozi".to_string()),
        last_name: "Okafor".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1991, 4, 12).expect("valid date"),
        gender: "female".to_string(),
        marital_status: "married".to_string(),
        phone_number: "+2348031234567".to_string(),
        email: "adaeze.okafor@example.gov.ng".to_string(),
        residential_address: "14 Ahmadu Bello Way, Garki, Abuja".to_string(),
        state_of_origin: "Anambra".to_string(),
        local_government_area: "Awka South".to_string(),
        next_of_kin_name: "Chinedu Okafor".to_string(),
        next_of_kin_phone: "+2348057654321".to_string(),
        next_of_kin_relationship: "spouse".to_string(),
    }
}

pub(super) fn employment_details() -> EmploymentDetails {
    EmploymentDetails {
        ministry: "Federal Ministry of Finance".to_string(),
        department: "Human Resources".to_string(),
        designation: "Administrative Officer II".to_string(),
        grade_level: 8,
        grade_step: 2,
        employment_type: "permanent".to_string(),
        date_of_first_appointment: NaiveDate::from_ymd_opt(2019, 2, 1).expect("valid date"),
        date_of_confirmation: Some(NaiveDate::from_ymd_opt(2021, 2, 1).expect("valid date")),
        salary_structure: "CONPSS".to_string(),
        bank_name: "First Bank".to_string(),
        account_number: "3012345678".to_string(),
        pension_administrator: "Stanbic IBTC Pension".to_string(),
        pension_pin: Some("PEN100123456789".to_string()),
    }
}

pub(super) fn document_set() -> DocumentSet {
    DocumentSet {
        passport_photograph: "uploads/ippis/passport.jpg".to_string(),
        birth_certificate: "uploads/ippis/birth-certificate.pdf".to_string(),
        appointment_letter: "uploads/ippis/appointment-letter.pdf".to_string(),
        educational_certificates: vec![
            "uploads/ippis/bsc.pdf".to_string(),
            "uploads/ippis/waec.pdf".to_string(),
        ],
        other_documents: Vec::new(),
    }
}

pub(super) fn build_workflow() -> (
    Arc<RegistrationWorkflow<MemoryRegistrationStore>>,
    Arc<MemoryRegistrationStore>,
) {
    let store = Arc::new(MemoryRegistrationStore::default());
    let workflow = Arc::new(RegistrationWorkflow::new(store.clone(), &config()));
    (workflow, store)
}

/// Walk a fresh registration through all four data steps.
pub(super) async fn completed_registration(
    workflow: &RegistrationWorkflow<MemoryRegistrationStore>,
) -> Registration {
    let registration = workflow
        .create_registration()
        .await
        .expect("registration created");
    let id = registration.registration_id.clone();
    workflow
        .save_verification_data(&id, verification(true))
        .await
        .expect("verification saved");
    workflow
        .save_personal_info(&id, personal_details())
        .await
        .expect("personal info saved");
    workflow
        .save_employment_info(&id, employment_details())
        .await
        .expect("employment info saved");
    workflow
        .save_document_uploads(&id, document_set())
        .await
        .expect("documents saved")
        .registration
}

pub(super) async fn submitted_registration(
    workflow: &RegistrationWorkflow<MemoryRegistrationStore>,
) -> Registration {
    let registration = completed_registration(workflow).await;
    workflow
        .submit_registration(&registration.registration_id, true)
        .await
        .expect("submission accepted")
}

pub(super) fn router_with<S>(store: Arc<S>) -> Router
where
    S: RegistrationStore + 'static,
{
    registration_router(Arc::new(RegistrationWorkflow::new(store, &config())))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Reports a clash for the first `conflicts` inserts, then delegates to memory.
#[derive(Default)]
pub(super) struct CollidingStore {
    inner: MemoryRegistrationStore,
    conflicts: usize,
    attempts: AtomicUsize,
}

impl CollidingStore {
    pub(super) fn new(conflicts: usize) -> Self {
        Self {
            conflicts,
            ..Self::default()
        }
    }

    pub(super) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistrationStore for CollidingStore {
    async fn insert_registration(
        &self,
        registration: &Registration,
        history: &NewHistoryEntry,
    ) -> Result<Registration, RepositoryError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.conflicts {
            return Err(RepositoryError::Conflict);
        }
        self.inner.insert_registration(registration, history).await
    }

    async fn save_step(
        &self,
        record: StepRecord,
        command: &TransitionCommand,
    ) -> Result<(StepRecord, Registration), RepositoryError> {
        self.inner.save_step(record, command).await
    }

    async fn transition(
        &self,
        registration_id: &RegistrationId,
        command: &TransitionCommand,
    ) -> Result<Registration, RepositoryError> {
        self.inner.transition(registration_id, command).await
    }

    async fn fetch_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Option<Registration>, RepositoryError> {
        self.inner.fetch_registration(registration_id).await
    }

    async fn fetch_aggregate(
        &self,
        registration_id: &RegistrationId,
        include_history: bool,
    ) -> Result<RegistrationAggregate, RepositoryError> {
        self.inner
            .fetch_aggregate(registration_id, include_history)
            .await
    }

    async fn history(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Vec<HistoryEntry>, RepositoryError> {
        self.inner.history(registration_id).await
    }

    async fn list(&self, filter: &RegistrationFilter) -> Result<Vec<Registration>, RepositoryError> {
        self.inner.list(filter).await
    }
}

pub(super) struct UnavailableStore;

fn unavailable() -> RepositoryError {
    RepositoryError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl RegistrationStore for UnavailableStore {
    async fn insert_registration(
        &self,
        _registration: &Registration,
        _history: &NewHistoryEntry,
    ) -> Result<Registration, RepositoryError> {
        Err(unavailable())
    }

    async fn save_step(
        &self,
        _record: StepRecord,
        _command: &TransitionCommand,
    ) -> Result<(StepRecord, Registration), RepositoryError> {
        Err(unavailable())
    }

    async fn transition(
        &self,
        _registration_id: &RegistrationId,
        _command: &TransitionCommand,
    ) -> Result<Registration, RepositoryError> {
        Err(unavailable())
    }

    async fn fetch_registration(
        &self,
        _registration_id: &RegistrationId,
    ) -> Result<Option<Registration>, RepositoryError> {
        Err(unavailable())
    }

    async fn fetch_aggregate(
        &self,
        _registration_id: &RegistrationId,
        _include_history: bool,
    ) -> Result<RegistrationAggregate, RepositoryError> {
        Err(unavailable())
    }

    async fn history(
        &self,
        _registration_id: &RegistrationId,
    ) -> Result<Vec<HistoryEntry>, RepositoryError> {
        Err(unavailable())
    }

    async fn list(
        &self,
        _filter: &RegistrationFilter,
    ) -> Result<Vec<Registration>, RepositoryError> {
        Err(unavailable())
    }
}
