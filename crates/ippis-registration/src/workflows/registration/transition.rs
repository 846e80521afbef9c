//! Pure state-machine rules for the registration aggregate.
//!
//! Stores call [`Transition::apply`] on the locked current row inside their atomic unit, so
//! every backend enforces the same rules and a rejected transition writes nothing.

use chrono::{DateTime, Utc};

use super::domain::{
    HistoryAction, NewHistoryEntry, Registration, RegistrationStatus, RegistrationStep, StepKind,
};

/// Caller-correctable rejection of a workflow request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("the declaration must be accepted before submitting")]
    DeclarationRequired,
    #[error("registration is {status} and can no longer be edited")]
    Locked { status: RegistrationStatus },
    #[error("cannot {action} a registration that is {status}")]
    InvalidStatus {
        action: &'static str,
        status: RegistrationStatus,
    },
    #[error("registration is missing completed steps: {}", labels(.missing))]
    IncompleteSteps { missing: Vec<StepKind> },
    #[error("{step} field '{field}' must not be blank")]
    BlankField { step: StepKind, field: &'static str },
    #[error("review field '{field}' must not be blank")]
    BlankReviewField { field: &'static str },
}

fn labels(steps: &[StepKind]) -> String {
    steps
        .iter()
        .map(|step| step.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Requested change to a registration row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    SaveStep { step: StepKind, completes: bool },
    Submit {
        declaration: bool,
        require_complete_steps: bool,
    },
    Approve,
    Reject { reason: String },
    MarkIncomplete { reason: String },
}

impl Transition {
    pub fn history_action(&self) -> HistoryAction {
        match self {
            Transition::SaveStep { .. } => HistoryAction::StepSaved,
            Transition::Submit { .. } => HistoryAction::Submitted,
            Transition::Approve => HistoryAction::Approved,
            Transition::Reject { .. } => HistoryAction::Rejected,
            Transition::MarkIncomplete { .. } => HistoryAction::MarkedIncomplete,
        }
    }

    /// Compute the updated row, or explain why the change is not allowed.
    pub fn apply(
        &self,
        current: &Registration,
        at: DateTime<Utc>,
    ) -> Result<Registration, ValidationError> {
        let mut next = current.clone();
        next.updated_at = at;

        match self {
            Transition::SaveStep { step, completes } => {
                if !current.status.is_editable() {
                    return Err(ValidationError::Locked {
                        status: current.status,
                    });
                }
                if *completes {
                    next.completed_steps = current.completed_steps.with(*step);
                    next.current_step = current.current_step.advance_to(step.next_step());
                }
            }
            Transition::Submit {
                declaration,
                require_complete_steps,
            } => {
                if !declaration {
                    return Err(ValidationError::DeclarationRequired);
                }
                if !current.status.is_editable() {
                    return Err(ValidationError::InvalidStatus {
                        action: "submit",
                        status: current.status,
                    });
                }
                if *require_complete_steps && !current.completed_steps.is_complete() {
                    return Err(ValidationError::IncompleteSteps {
                        missing: current.completed_steps.missing(),
                    });
                }
                next.declaration = true;
                next.status = RegistrationStatus::PendingApproval;
                next.current_step = current.current_step.advance_to(RegistrationStep::Submitted);
                next.submitted_at = Some(at);
                next.review_note = None;
            }
            Transition::Approve => {
                require_pending("approve", current)?;
                next.status = RegistrationStatus::Approved;
                next.approved_at = Some(at);
            }
            Transition::Reject { reason } => {
                require_pending("reject", current)?;
                next.status = RegistrationStatus::Rejected;
                next.rejected_at = Some(at);
                next.review_note = Some(reason.clone());
            }
            Transition::MarkIncomplete { reason } => {
                require_pending("return", current)?;
                next.status = RegistrationStatus::Incomplete;
                next.review_note = Some(reason.clone());
            }
        }

        Ok(next)
    }
}

fn require_pending(action: &'static str, current: &Registration) -> Result<(), ValidationError> {
    if current.status != RegistrationStatus::PendingApproval {
        return Err(ValidationError::InvalidStatus {
            action,
            status: current.status,
        });
    }
    Ok(())
}

/// A transition together with its timestamp and the history row it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionCommand {
    pub transition: Transition,
    pub at: DateTime<Utc>,
    pub history: NewHistoryEntry,
}

impl TransitionCommand {
    pub fn new(transition: Transition, at: DateTime<Utc>, details: impl Into<String>) -> Self {
        let history = NewHistoryEntry::new(transition.history_action(), details);
        Self {
            transition,
            at,
            history,
        }
    }

    pub fn apply(&self, current: &Registration) -> Result<Registration, ValidationError> {
        self.transition.apply(current, self.at)
    }
}
