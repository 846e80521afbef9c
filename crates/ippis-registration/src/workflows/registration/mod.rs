//! Multi-step employee registration: identity verification, personal and employment
//! details, document uploads, then submission for reviewer approval.

pub mod domain;
pub mod identifier;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod router;
pub mod service;
pub mod transition;

#[cfg(test)]
mod tests;

pub use domain::{
    CompletedSteps, DocumentSet, DocumentUploads, EmploymentDetails, EmploymentInfo,
    HistoryAction, HistoryEntry, NewHistoryEntry, PersonalDetails, PersonalInfo, Registration,
    RegistrationAggregate, RegistrationFilter, RegistrationId, RegistrationStatus,
    RegistrationStep, StepKind, StepPayload, StepRecord, VerificationData, VerificationDetails,
};
pub use identifier::{IdFormat, RegistrationIdGenerator};
pub use memory::MemoryRegistrationStore;
pub use postgres::PgRegistrationStore;
pub use repository::{RegistrationStore, RepositoryError};
pub use router::registration_router;
pub use service::{RegistrationError, RegistrationWorkflow, SavedStep};
pub use transition::{Transition, TransitionCommand, ValidationError};
