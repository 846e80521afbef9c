use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::workflows::registration::domain::{
    CompletedSteps, HistoryAction, Registration, RegistrationId, RegistrationStatus,
    RegistrationStep, StepKind,
};
use crate::workflows::registration::transition::{Transition, TransitionCommand, ValidationError};

fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0)
        .single()
        .expect("valid instant")
}

fn draft() -> Registration {
    Registration::draft(
        RegistrationId("IPPIS-20261019090000000-0001".to_string()),
        created_at(),
    )
}

fn complete_draft() -> Registration {
    let mut registration = draft();
    registration.completed_steps = StepKind::ALL
        .into_iter()
        .fold(CompletedSteps::default(), CompletedSteps::with);
    registration.current_step = RegistrationStep::Review;
    registration
}

fn with_status(status: RegistrationStatus) -> Registration {
    let mut registration = complete_draft();
    registration.status = status;
    registration
}

fn submit() -> Transition {
    Transition::Submit {
        declaration: true,
        require_complete_steps: true,
    }
}

#[test]
fn save_step_marks_completion_and_advances_pointer() {
    let at = created_at() + Duration::minutes(5);
    let next = Transition::SaveStep {
        step: StepKind::Verification,
        completes: true,
    }
    .apply(&draft(), at)
    .expect("save allowed");

    assert_eq!(next.current_step, RegistrationStep::PersonalInfo);
    assert!(next.completed_steps.contains(StepKind::Verification));
    assert_eq!(next.updated_at, at);
    assert_eq!(next.created_at, created_at());
}

#[test]
fn incomplete_save_only_touches_updated_at() {
    let current = draft();
    let at = created_at() + Duration::minutes(1);
    let next = Transition::SaveStep {
        step: StepKind::Verification,
        completes: false,
    }
    .apply(&current, at)
    .expect("save allowed");

    assert_eq!(next.current_step, current.current_step);
    assert_eq!(next.completed_steps, current.completed_steps);
    assert_eq!(next.updated_at, at);
}

#[test]
fn saves_are_locked_outside_editable_statuses() {
    for status in [
        RegistrationStatus::PendingApproval,
        RegistrationStatus::Approved,
        RegistrationStatus::Rejected,
    ] {
        let result = Transition::SaveStep {
            step: StepKind::Documents,
            completes: true,
        }
        .apply(&with_status(status), created_at());
        assert_eq!(result, Err(ValidationError::Locked { status }));
    }

    assert!(Transition::SaveStep {
        step: StepKind::Documents,
        completes: true,
    }
    .apply(&with_status(RegistrationStatus::Incomplete), created_at())
    .is_ok());
}

#[test]
fn declaration_is_checked_before_status() {
    let result = Transition::Submit {
        declaration: false,
        require_complete_steps: true,
    }
    .apply(&with_status(RegistrationStatus::Approved), created_at());

    assert_eq!(result, Err(ValidationError::DeclarationRequired));
}

#[test]
fn submit_stamps_submission_and_clears_review_note() {
    let mut current = with_status(RegistrationStatus::Incomplete);
    current.review_note = Some("missing signature".to_string());
    let at = created_at() + Duration::hours(2);

    let next = submit().apply(&current, at).expect("submission allowed");

    assert_eq!(next.status, RegistrationStatus::PendingApproval);
    assert_eq!(next.current_step, RegistrationStep::Submitted);
    assert_eq!(next.submitted_at, Some(at));
    assert!(next.declaration);
    assert!(next.review_note.is_none());
}

#[test]
fn submit_lists_missing_steps() {
    let mut current = draft();
    current.completed_steps = CompletedSteps::default().with(StepKind::PersonalInfo);

    let result = submit().apply(&current, created_at());

    match result {
        Err(err @ ValidationError::IncompleteSteps { .. }) => {
            assert_eq!(
                err.to_string(),
                "registration is missing completed steps: verification, employment_info, documents"
            );
        }
        other => panic!("expected incomplete steps, got {other:?}"),
    }
}

#[test]
fn review_transitions_require_pending_approval() {
    let pending = with_status(RegistrationStatus::PendingApproval);
    let at = created_at() + Duration::days(1);

    let approved = Transition::Approve.apply(&pending, at).expect("approve");
    assert_eq!(approved.status, RegistrationStatus::Approved);
    assert_eq!(approved.approved_at, Some(at));

    let rejected = Transition::Reject {
        reason: "duplicate record".to_string(),
    }
    .apply(&pending, at)
    .expect("reject");
    assert_eq!(rejected.status, RegistrationStatus::Rejected);
    assert_eq!(rejected.rejected_at, Some(at));
    assert_eq!(rejected.review_note.as_deref(), Some("duplicate record"));

    let returned = Transition::MarkIncomplete {
        reason: "blurred photograph".to_string(),
    }
    .apply(&pending, at)
    .expect("return");
    assert_eq!(returned.status, RegistrationStatus::Incomplete);

    assert_eq!(
        Transition::Approve.apply(&draft(), at),
        Err(ValidationError::InvalidStatus {
            action: "approve",
            status: RegistrationStatus::Draft,
        })
    );
    assert_eq!(
        Transition::MarkIncomplete {
            reason: "again".to_string(),
        }
        .apply(&with_status(RegistrationStatus::Incomplete), at),
        Err(ValidationError::InvalidStatus {
            action: "return",
            status: RegistrationStatus::Incomplete,
        })
    );
}

#[test]
fn commands_carry_matching_history_actions() {
    let command = TransitionCommand::new(Transition::Approve, created_at(), "approved by hr");
    assert_eq!(command.history.action, HistoryAction::Approved);
    assert_eq!(command.history.details, "approved by hr");

    let command = TransitionCommand::new(
        Transition::SaveStep {
            step: StepKind::Documents,
            completes: true,
        },
        created_at(),
        "documents saved",
    );
    assert_eq!(command.history.action, HistoryAction::StepSaved);
    let next = command.apply(&draft()).expect("apply");
    assert_eq!(next.current_step, RegistrationStep::Review);
}
