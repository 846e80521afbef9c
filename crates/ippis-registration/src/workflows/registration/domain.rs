use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};

use super::transition::ValidationError;

/// External handle for a registration, generated once at creation.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct RegistrationId(pub String);

impl RegistrationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Overall lifecycle status of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    Incomplete,
}

impl RegistrationStatus {
    pub const ALL: [RegistrationStatus; 5] = [
        RegistrationStatus::Draft,
        RegistrationStatus::PendingApproval,
        RegistrationStatus::Approved,
        RegistrationStatus::Rejected,
        RegistrationStatus::Incomplete,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            RegistrationStatus::Draft => "draft",
            RegistrationStatus::PendingApproval => "pending_approval",
            RegistrationStatus::Approved => "approved",
            RegistrationStatus::Rejected => "rejected",
            RegistrationStatus::Incomplete => "incomplete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(raw))
    }

    /// Applicants may only change step data while the registration is with them.
    pub const fn is_editable(self) -> bool {
        matches!(
            self,
            RegistrationStatus::Draft | RegistrationStatus::Incomplete
        )
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pointer into the fixed step sequence. Declaration order is the sequence order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStep {
    Verification,
    PersonalInfo,
    EmploymentInfo,
    Documents,
    Review,
    Submitted,
}

impl RegistrationStep {
    pub const SEQUENCE: [RegistrationStep; 6] = [
        RegistrationStep::Verification,
        RegistrationStep::PersonalInfo,
        RegistrationStep::EmploymentInfo,
        RegistrationStep::Documents,
        RegistrationStep::Review,
        RegistrationStep::Submitted,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            RegistrationStep::Verification => "verification",
            RegistrationStep::PersonalInfo => "personal_info",
            RegistrationStep::EmploymentInfo => "employment_info",
            RegistrationStep::Documents => "documents",
            RegistrationStep::Review => "review",
            RegistrationStep::Submitted => "submitted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::SEQUENCE
            .into_iter()
            .find(|step| step.label().eq_ignore_ascii_case(raw))
    }

    /// Move the pointer to `target` unless it is already at or past it.
    pub fn advance_to(self, target: RegistrationStep) -> RegistrationStep {
        self.max(target)
    }
}

impl fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The four steps that carry applicant data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Verification,
    PersonalInfo,
    EmploymentInfo,
    Documents,
}

impl StepKind {
    pub const ALL: [StepKind; 4] = [
        StepKind::Verification,
        StepKind::PersonalInfo,
        StepKind::EmploymentInfo,
        StepKind::Documents,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            StepKind::Verification => "verification",
            StepKind::PersonalInfo => "personal_info",
            StepKind::EmploymentInfo => "employment_info",
            StepKind::Documents => "documents",
        }
    }

    /// Pointer position once this step has been completed.
    pub const fn next_step(self) -> RegistrationStep {
        match self {
            StepKind::Verification => RegistrationStep::PersonalInfo,
            StepKind::PersonalInfo => RegistrationStep::EmploymentInfo,
            StepKind::EmploymentInfo => RegistrationStep::Documents,
            StepKind::Documents => RegistrationStep::Review,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            StepKind::Verification => 0b0001,
            StepKind::PersonalInfo => 0b0010,
            StepKind::EmploymentInfo => 0b0100,
            StepKind::Documents => 0b1000,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bit set of data steps that have been completed. Bits are only ever added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletedSteps(u8);

impl CompletedSteps {
    const MASK: u8 = 0b1111;

    pub fn from_bits(bits: i16) -> Self {
        Self((bits as u8) & Self::MASK)
    }

    pub fn bits(self) -> i16 {
        i16::from(self.0)
    }

    pub fn contains(self, step: StepKind) -> bool {
        self.0 & step.bit() != 0
    }

    pub fn with(self, step: StepKind) -> Self {
        Self(self.0 | step.bit())
    }

    pub fn iter(self) -> impl Iterator<Item = StepKind> {
        StepKind::ALL
            .into_iter()
            .filter(move |step| self.contains(*step))
    }

    pub fn missing(self) -> Vec<StepKind> {
        StepKind::ALL
            .into_iter()
            .filter(|step| !self.contains(*step))
            .collect()
    }

    pub fn is_complete(self) -> bool {
        self.0 == Self::MASK
    }
}

impl Serialize for CompletedSteps {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Root aggregate tracking an employee's onboarding progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    pub registration_id: RegistrationId,
    pub status: RegistrationStatus,
    pub current_step: RegistrationStep,
    pub completed_steps: CompletedSteps,
    pub declaration: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

impl Registration {
    pub fn draft(registration_id: RegistrationId, now: DateTime<Utc>) -> Self {
        Self {
            registration_id,
            status: RegistrationStatus::Draft,
            current_step: RegistrationStep::Verification,
            completed_steps: CompletedSteps::default(),
            declaration: false,
            review_note: None,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            approved_at: None,
            rejected_at: None,
        }
    }
}

/// Identity check results captured in the first step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VerificationDetails {
    pub bvn: String,
    #[serde(default)]
    pub bvn_verified: bool,
    pub nin: String,
    #[serde(default)]
    pub nin_verified: bool,
}

impl VerificationDetails {
    pub fn is_verified(&self) -> bool {
        self.bvn_verified && self.nin_verified
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PersonalDetails {
    pub title: String,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub marital_status: String,
    pub phone_number: String,
    pub email: String,
    pub residential_address: String,
    pub state_of_origin: String,
    pub local_government_area: String,
    pub next_of_kin_name: String,
    pub next_of_kin_phone: String,
    pub next_of_kin_relationship: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmploymentDetails {
    pub ministry: String,
    pub department: String,
    pub designation: String,
    pub grade_level: i16,
    pub grade_step: i16,
    pub employment_type: String,
    pub date_of_first_appointment: NaiveDate,
    #[serde(default)]
    pub date_of_confirmation: Option<NaiveDate>,
    pub salary_structure: String,
    pub bank_name: String,
    pub account_number: String,
    pub pension_administrator: String,
    #[serde(default)]
    pub pension_pin: Option<String>,
}

/// Storage keys for uploaded documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DocumentSet {
    pub passport_photograph: String,
    pub birth_certificate: String,
    pub appointment_letter: String,
    #[serde(default)]
    pub educational_certificates: Vec<String>,
    #[serde(default)]
    pub other_documents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct VerificationData {
    pub registration_id: RegistrationId,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub details: VerificationDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PersonalInfo {
    pub registration_id: RegistrationId,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub details: PersonalDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct EmploymentInfo {
    pub registration_id: RegistrationId,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub details: EmploymentDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DocumentUploads {
    pub registration_id: RegistrationId,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub documents: DocumentSet,
    pub upload_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One stored step record, used where stores handle all four steps uniformly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepRecord {
    Verification(VerificationData),
    PersonalInfo(PersonalInfo),
    EmploymentInfo(EmploymentInfo),
    Documents(DocumentUploads),
}

impl StepRecord {
    pub fn kind(&self) -> StepKind {
        match self {
            StepRecord::Verification(_) => StepKind::Verification,
            StepRecord::PersonalInfo(_) => StepKind::PersonalInfo,
            StepRecord::EmploymentInfo(_) => StepKind::EmploymentInfo,
            StepRecord::Documents(_) => StepKind::Documents,
        }
    }

    pub fn registration_id(&self) -> &RegistrationId {
        match self {
            StepRecord::Verification(record) => &record.registration_id,
            StepRecord::PersonalInfo(record) => &record.registration_id,
            StepRecord::EmploymentInfo(record) => &record.registration_id,
            StepRecord::Documents(record) => &record.registration_id,
        }
    }

    /// Keep the original creation time when a save replaces an existing row.
    pub fn preserve_created_at(&mut self, created_at: DateTime<Utc>) {
        match self {
            StepRecord::Verification(record) => record.created_at = created_at,
            StepRecord::PersonalInfo(record) => record.created_at = created_at,
            StepRecord::EmploymentInfo(record) => record.created_at = created_at,
            StepRecord::Documents(record) => record.created_at = created_at,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            StepRecord::Verification(record) => record.created_at,
            StepRecord::PersonalInfo(record) => record.created_at,
            StepRecord::EmploymentInfo(record) => record.created_at,
            StepRecord::Documents(record) => record.created_at,
        }
    }
}

/// Payload accepted for one of the data steps.
pub trait StepPayload: Sized {
    type Record: Sized;

    const KIND: StepKind;

    /// Blank required fields are rejected before anything is written.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Whether this payload completes the step and moves the pointer on.
    fn completes_step(&self) -> bool {
        true
    }

    fn into_record(self, registration_id: RegistrationId, now: DateTime<Utc>) -> StepRecord;

    fn extract(record: StepRecord) -> Option<Self::Record>;
}

fn require(step: StepKind, field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::BlankField { step, field });
    }
    Ok(())
}

impl StepPayload for VerificationDetails {
    type Record = VerificationData;

    const KIND: StepKind = StepKind::Verification;

    fn validate(&self) -> Result<(), ValidationError> {
        require(Self::KIND, "bvn", &self.bvn)?;
        require(Self::KIND, "nin", &self.nin)
    }

    fn completes_step(&self) -> bool {
        self.is_verified()
    }

    fn into_record(self, registration_id: RegistrationId, now: DateTime<Utc>) -> StepRecord {
        StepRecord::Verification(VerificationData {
            registration_id,
            details: self,
            created_at: now,
            updated_at: now,
        })
    }

    fn extract(record: StepRecord) -> Option<Self::Record> {
        match record {
            StepRecord::Verification(record) => Some(record),
            _ => None,
        }
    }
}

impl StepPayload for PersonalDetails {
    type Record = PersonalInfo;

    const KIND: StepKind = StepKind::PersonalInfo;

    fn validate(&self) -> Result<(), ValidationError> {
        require(Self::KIND, "title", &self.title)?;
        require(Self::KIND, "first_name", &self.first_name)?;
        require(Self::KIND, "last_name", &self.last_name)?;
        require(Self::KIND, "gender", &self.gender)?;
        require(Self::KIND, "marital_status", &self.marital_status)?;
        require(Self::KIND, "phone_number", &self.phone_number)?;
        require(Self::KIND, "email", &self.email)?;
        require(Self::KIND, "residential_address", &self.residential_address)?;
        require(Self::KIND, "state_of_origin", &self.state_of_origin)?;
        require(Self::KIND, "local_government_area", &self.local_government_area)?;
        require(Self::KIND, "next_of_kin_name", &self.next_of_kin_name)?;
        require(Self::KIND, "next_of_kin_phone", &self.next_of_kin_phone)?;
        require(Self::KIND, "next_of_kin_relationship", &self.next_of_kin_relationship)
    }

    fn into_record(self, registration_id: RegistrationId, now: DateTime<Utc>) -> StepRecord {
        StepRecord::PersonalInfo(PersonalInfo {
            registration_id,
            details: self,
            created_at: now,
            updated_at: now,
        })
    }

    fn extract(record: StepRecord) -> Option<Self::Record> {
        match record {
            StepRecord::PersonalInfo(record) => Some(record),
            _ => None,
        }
    }
}

impl StepPayload for EmploymentDetails {
    type Record = EmploymentInfo;

    const KIND: StepKind = StepKind::EmploymentInfo;

    fn validate(&self) -> Result<(), ValidationError> {
        require(Self::KIND, "ministry", &self.ministry)?;
        require(Self::KIND, "department", &self.department)?;
        require(Self::KIND, "designation", &self.designation)?;
        require(Self::KIND, "employment_type", &self.employment_type)?;
        require(Self::KIND, "salary_structure", &self.salary_structure)?;
        require(Self::KIND, "bank_name", &self.bank_name)?;
        require(Self::KIND, "account_number", &self.account_number)?;
        require(Self::KIND, "pension_administrator", &self.pension_administrator)
    }

    fn into_record(self, registration_id: RegistrationId, now: DateTime<Utc>) -> StepRecord {
        StepRecord::EmploymentInfo(EmploymentInfo {
            registration_id,
            details: self,
            created_at: now,
            updated_at: now,
        })
    }

    fn extract(record: StepRecord) -> Option<Self::Record> {
        match record {
            StepRecord::EmploymentInfo(record) => Some(record),
            _ => None,
        }
    }
}

impl StepPayload for DocumentSet {
    type Record = DocumentUploads;

    const KIND: StepKind = StepKind::Documents;

    fn validate(&self) -> Result<(), ValidationError> {
        require(Self::KIND, "passport_photograph", &self.passport_photograph)?;
        require(Self::KIND, "birth_certificate", &self.birth_certificate)?;
        require(Self::KIND, "appointment_letter", &self.appointment_letter)
    }

    // upload_date is refreshed on every save, including re-saves.
    fn into_record(self, registration_id: RegistrationId, now: DateTime<Utc>) -> StepRecord {
        StepRecord::Documents(DocumentUploads {
            registration_id,
            documents: self,
            upload_date: now,
            created_at: now,
            updated_at: now,
        })
    }

    fn extract(record: StepRecord) -> Option<Self::Record> {
        match record {
            StepRecord::Documents(record) => Some(record),
            _ => None,
        }
    }
}

/// Action recorded in the append-only history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    StepSaved,
    Submitted,
    Approved,
    Rejected,
    MarkedIncomplete,
}

impl HistoryAction {
    pub const ALL: [HistoryAction; 6] = [
        HistoryAction::Created,
        HistoryAction::StepSaved,
        HistoryAction::Submitted,
        HistoryAction::Approved,
        HistoryAction::Rejected,
        HistoryAction::MarkedIncomplete,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::StepSaved => "step_saved",
            HistoryAction::Submitted => "submitted",
            HistoryAction::Approved => "approved",
            HistoryAction::Rejected => "rejected",
            HistoryAction::MarkedIncomplete => "marked_incomplete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.label() == raw)
    }
}

/// History row waiting to be appended; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub action: HistoryAction,
    pub details: String,
}

impl NewHistoryEntry {
    pub fn new(action: HistoryAction, details: impl Into<String>) -> Self {
        Self {
            action,
            details: details.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub registration_id: RegistrationId,
    pub action: HistoryAction,
    pub details: String,
    pub performed_at: DateTime<Utc>,
}

/// Read-side view joining the root record with every step section.
///
/// Sections are `None` until the step has been saved; an unknown id yields a view with
/// every section `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistrationAggregate {
    pub registration: Option<Registration>,
    pub verification: Option<VerificationData>,
    pub personal_info: Option<PersonalInfo>,
    pub employment_info: Option<EmploymentInfo>,
    pub documents: Option<DocumentUploads>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
}

impl RegistrationAggregate {
    pub fn exists(&self) -> bool {
        self.registration.is_some()
    }
}

/// Listing filter for reviewer queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationFilter {
    pub status: Option<RegistrationStatus>,
    pub limit: usize,
}

impl RegistrationFilter {
    pub const DEFAULT_LIMIT: usize = 50;
    pub const MAX_LIMIT: usize = 500;

    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, Self::MAX_LIMIT)
    }
}

impl Default for RegistrationFilter {
    fn default() -> Self {
        Self {
            status: None,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}
