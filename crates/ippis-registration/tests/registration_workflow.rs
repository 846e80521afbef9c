//! End-to-end scenarios for the registration workflow through its public facade, backed by
//! the in-memory store.

mod common {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use ippis_registration::config::RegistrationConfig;
    use ippis_registration::workflows::registration::{
        DocumentSet, EmploymentDetails, MemoryRegistrationStore, PersonalDetails,
        RegistrationWorkflow, VerificationDetails,
    };

    pub(super) fn workflow() -> (
        Arc<RegistrationWorkflow<MemoryRegistrationStore>>,
        Arc<MemoryRegistrationStore>,
    ) {
        let store = Arc::new(MemoryRegistrationStore::default());
        let workflow = RegistrationWorkflow::new(store.clone(), &RegistrationConfig::default());
        (Arc::new(workflow), store)
    }

    pub(super) fn verification() -> VerificationDetails {
        VerificationDetails {
            bvn: "22298765432".to_string(),
            bvn_verified: true,
            nin: "70123456789".to_string(),
            nin_verified: true,
        }
    }

    pub(super) fn personal(first_name: &str) -> PersonalDetails {
        PersonalDetails {
            title: "Mr".to_string(),
            first_name: first_name.to_string(),
            middle_name: None,
            last_name: "Bello".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1988, 11, 3).expect("valid date"),
            gender: "male".to_string(),
            marital_status: "single".to_string(),
            phone_number: "+2348021112233".to_string(),
            email: "musa.bello@example.gov.ng".to_string(),
            residential_address: "7 Lugard Road, Kaduna".to_string(),
            state_of_origin: "Kaduna".to_string(),
            local_government_area: "Kaduna North".to_string(),
            next_of_kin_name: "Amina Bello".to_string(),
            next_of_kin_phone: "+2348024445566".to_string(),
            next_of_kin_relationship: "sister".to_string(),
        }
    }

    pub(super) fn employment() -> EmploymentDetails {
        EmploymentDetails {
            ministry: "Federal Ministry of Health".to_string(),
            department: "Public Health".to_string(),
            designation: "Medical Officer".to_string(),
            grade_level: 10,
            grade_step: 1,
            employment_type: "permanent".to_string(),
            date_of_first_appointment: NaiveDate::from_ymd_opt(2022, 6, 1).expect("valid date"),
            date_of_confirmation: None,
            salary_structure: "CONMESS".to_string(),
            bank_name: "Zenith Bank".to_string(),
            account_number: "2087654321".to_string(),
            pension_administrator: "ARM Pension".to_string(),
            pension_pin: None,
        }
    }

    pub(super) fn documents() -> DocumentSet {
        DocumentSet {
            passport_photograph: "uploads/bello/passport.jpg".to_string(),
            birth_certificate: "uploads/bello/birth.pdf".to_string(),
            appointment_letter: "uploads/bello/appointment.pdf".to_string(),
            educational_certificates: vec!["uploads/bello/mbbs.pdf".to_string()],
            other_documents: vec!["uploads/bello/nysc.pdf".to_string()],
        }
    }
}

use std::collections::HashSet;

use common::*;
use ippis_registration::workflows::registration::{
    HistoryAction, RegistrationError, RegistrationFilter, RegistrationStatus, RegistrationStep,
    StepKind, ValidationError,
};

#[tokio::test]
async fn applicant_completes_every_step_and_is_approved() {
    let (workflow, _) = workflow();
    let registration = workflow.create_registration().await.expect("created");
    let id = registration.registration_id.clone();

    let pointer = [
        workflow
            .save_verification_data(&id, verification())
            .await
            .expect("verification")
            .registration
            .current_step,
        workflow
            .save_personal_info(&id, personal("Musa"))
            .await
            .expect("personal")
            .registration
            .current_step,
        workflow
            .save_employment_info(&id, employment())
            .await
            .expect("employment")
            .registration
            .current_step,
        workflow
            .save_document_uploads(&id, documents())
            .await
            .expect("documents")
            .registration
            .current_step,
    ];
    assert_eq!(
        pointer,
        [
            RegistrationStep::PersonalInfo,
            RegistrationStep::EmploymentInfo,
            RegistrationStep::Documents,
            RegistrationStep::Review,
        ]
    );

    workflow
        .submit_registration(&id, true)
        .await
        .expect("submitted");
    let approved = workflow
        .approve_registration(&id, "permanent.secretary")
        .await
        .expect("approved");
    assert_eq!(approved.status, RegistrationStatus::Approved);

    let aggregate = workflow.get_registration(&id, true).await.expect("read");
    assert_eq!(aggregate.registration, Some(approved));
    let documents = aggregate.documents.expect("documents stored");
    assert_eq!(documents.documents.other_documents.len(), 1);
    let history = aggregate.history.expect("history requested");
    assert_eq!(history.first().map(|entry| entry.action), Some(HistoryAction::Created));
    assert_eq!(history.last().map(|entry| entry.action), Some(HistoryAction::Approved));
    assert!(history.windows(2).all(|pair| pair[0].id < pair[1].id));
}

#[tokio::test]
async fn submission_without_declaration_is_refused() {
    let (workflow, _) = workflow();
    let registration = workflow.create_registration().await.expect("created");

    let result = workflow
        .submit_registration(&registration.registration_id, false)
        .await;

    assert!(matches!(
        result,
        Err(RegistrationError::Validation(ValidationError::DeclarationRequired))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_yield_unique_ids() {
    let (workflow, _) = workflow();

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let workflow = workflow.clone();
            tokio::spawn(async move { workflow.create_registration().await })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        let registration = handle
            .await
            .expect("task joins")
            .expect("registration created");
        ids.insert(registration.registration_id);
    }
    assert_eq!(ids.len(), 32);

    let listed = workflow
        .list_registrations(RegistrationFilter {
            status: Some(RegistrationStatus::Draft),
            limit: 100,
        })
        .await
        .expect("list");
    assert_eq!(listed.len(), 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_keep_one_row_per_step() {
    let (workflow, store) = workflow();
    let registration = workflow.create_registration().await.expect("created");
    let id = registration.registration_id;

    let names = ["Musa", "Ibrahim", "Sani", "Yusuf", "Umar", "Aliyu"];
    let handles: Vec<_> = names
        .into_iter()
        .map(|name| {
            let workflow = workflow.clone();
            let id = id.clone();
            tokio::spawn(async move { workflow.save_personal_info(&id, personal(name)).await })
        })
        .collect();
    for handle in handles {
        handle.await.expect("task joins").expect("save succeeds");
    }

    assert_eq!(store.step_row_count(StepKind::PersonalInfo), 1);
    assert_eq!(store.history_len(&id), 1 + names.len());

    let aggregate = workflow.get_registration(&id, false).await.expect("read");
    let stored = aggregate.personal_info.expect("personal info stored");
    assert!(names.contains(&stored.details.first_name.as_str()));
    let root = aggregate.registration.expect("root stored");
    assert_eq!(root.current_step, RegistrationStep::EmploymentInfo);
    assert_eq!(root.completed_steps.missing().len(), 3);
}

#[tokio::test]
async fn returned_registration_round_trip() {
    let (workflow, _) = workflow();
    let registration = workflow.create_registration().await.expect("created");
    let id = registration.registration_id;
    workflow
        .save_verification_data(&id, verification())
        .await
        .expect("verification");
    workflow
        .save_personal_info(&id, personal("Musa"))
        .await
        .expect("personal");
    workflow
        .save_employment_info(&id, employment())
        .await
        .expect("employment");
    workflow
        .save_document_uploads(&id, documents())
        .await
        .expect("documents");
    workflow.submit_registration(&id, true).await.expect("submitted");

    let returned = workflow
        .mark_incomplete(&id, "hr.desk", "confirmation date missing")
        .await
        .expect("returned");
    assert_eq!(returned.review_note.as_deref(), Some("confirmation date missing"));

    let queue = workflow
        .list_registrations(RegistrationFilter {
            status: Some(RegistrationStatus::Incomplete),
            ..RegistrationFilter::default()
        })
        .await
        .expect("list");
    assert_eq!(queue.len(), 1);

    let resubmitted = workflow.submit_registration(&id, true).await.expect("resubmitted");
    assert_eq!(resubmitted.status, RegistrationStatus::PendingApproval);
    assert!(resubmitted.submitted_at >= returned.submitted_at);
}

#[tokio::test]
async fn early_submission_names_the_missing_steps() {
    let (workflow, store) = workflow();
    let registration = workflow.create_registration().await.expect("created");
    let id = registration.registration_id.clone();

    let parts: Vec<&str> = id.as_str().split('-').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "IPPIS");
    assert_eq!(parts[1].len(), 17);
    assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
    assert_eq!(registration.status, RegistrationStatus::Draft);
    assert_eq!(registration.current_step, RegistrationStep::Verification);

    let saved = workflow
        .save_verification_data(&id, verification())
        .await
        .expect("verification");
    assert_eq!(saved.registration.current_step, RegistrationStep::PersonalInfo);
    let saved = workflow
        .save_personal_info(&id, personal("Musa"))
        .await
        .expect("personal");
    assert_eq!(saved.registration.current_step, RegistrationStep::EmploymentInfo);
    let history_before = store.history_len(&id);

    match workflow.submit_registration(&id, true).await {
        Err(RegistrationError::Validation(ValidationError::IncompleteSteps { missing })) => {
            assert_eq!(missing, vec![StepKind::EmploymentInfo, StepKind::Documents]);
        }
        other => panic!("expected incomplete steps, got {other:?}"),
    }
    assert_eq!(store.history_len(&id), history_before);
}
