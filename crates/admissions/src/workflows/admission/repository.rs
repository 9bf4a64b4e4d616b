use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, ParentAccountId, ReferenceNumber, Standard,
    StatusTransitionEvent, Student, StudentId, TrackingToken,
};
use super::numbering::SequenceScope;

/// Shown on the tracking page until staff record their own remark.
pub const DEFAULT_APPLICANT_REMARK: &str = "We will contact you within 2-3 business days";

/// Stored application plus its optimistic-concurrency version and audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application: Application,
    /// Version the record was read at. Stores bump it on every successful update.
    pub version: u64,
    pub history: Vec<StatusTransitionEvent>,
    /// Held by the admit currently working on this application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_claim: Option<AdmissionClaim>,
}

/// Marker written with a version check before an admit touches students or
/// parent accounts. While it is live no other admit may start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionClaim {
    pub attempt: String,
    pub claimed_at: DateTime<Utc>,
}

impl ApplicationRecord {
    pub fn status(&self) -> ApplicationStatus {
        self.application.status
    }

    /// Sanitized snapshot for the token-gated public endpoints.
    pub fn tracking_view(&self) -> TrackingView {
        let application = &self.application;
        TrackingView {
            reference_number: application.reference_number.clone(),
            student_name: application.applicant.student_name.clone(),
            applying_for_class: application.applicant.applying_for_class,
            branch: application.applicant.branch.clone(),
            status: application.status.label(),
            status_message: application.status.applicant_message(),
            remarks: application
                .remarks
                .clone()
                .unwrap_or_else(|| DEFAULT_APPLICANT_REMARK.to_string()),
            documents_link: application.documents_link.clone(),
            payment_receipt_link: application.payment_receipt_link.clone(),
            roll_number: application
                .enrollment
                .as_ref()
                .map(|enrollment| enrollment.roll_number.clone()),
            submitted_on: application.created_at.date_naive(),
        }
    }
}

/// Public view of an application. Contact details and internal ids are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingView {
    pub reference_number: ReferenceNumber,
    pub student_name: String,
    pub applying_for_class: Standard,
    pub branch: String,
    pub status: &'static str,
    pub status_message: &'static str,
    pub remarks: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_receipt_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll_number: Option<String>,
    pub submitted_on: NaiveDate,
}

/// Storage for application rows. `update` is a compare-and-swap on `version`.
pub trait ApplicationRepository: Send + Sync {
    /// Fails with `Conflict` when the id, reference number or token is taken.
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    /// Persist `record` if the stored version still equals `record.version`.
    /// Returns the stored record carrying the bumped version.
    fn update(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn find_by_reference(
        &self,
        reference: &ReferenceNumber,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn find_by_token(
        &self,
        token: &TrackingToken,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn list(&self) -> Result<Vec<ApplicationRecord>, RepositoryError>;
}

/// Student rows and the atomic counters behind admission and roll numbers.
pub trait StudentRegistry: Send + Sync {
    /// Atomically reserve the next value (starting at 1) for `scope`.
    fn next_sequence(&self, scope: &SequenceScope) -> Result<u32, RepositoryError>;
    /// Fails with `Conflict` when a student already exists for the application.
    fn insert(&self, student: Student) -> Result<Student, RepositoryError>;
    fn remove(&self, id: &StudentId) -> Result<(), RepositoryError>;
    fn find_by_application(&self, id: &ApplicationId) -> Result<Option<Student>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record was modified concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Parent login to create (or link) when a student is admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentAccountRequest {
    pub email: String,
    pub full_name: String,
    pub mobile: String,
    /// Plaintext initial password. Issuers store only a hash.
    pub initial_password: String,
}

/// Result of provisioning a parent account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedAccount {
    pub account_id: ParentAccountId,
    pub login_email: String,
    /// `false` when an existing account (e.g. for a sibling) was linked instead.
    pub created: bool,
}

/// External auth store for parent logins.
pub trait CredentialIssuer: Send + Sync {
    fn provision(&self, request: &ParentAccountRequest)
        -> Result<ProvisionedAccount, CredentialError>;
    /// Delete an account created during an admit that was later rolled back.
    fn revoke(&self, account: &ParentAccountId) -> Result<(), CredentialError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("auth store unavailable: {0}")]
    Unavailable(String),
}

/// Templates the parent-facing mailer knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    ApplicationOnHold,
    ApplicationRejected,
    AdmissionConfirmed,
}

/// Outbound notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub template: NotificationTemplate,
    pub application_id: ApplicationId,
    pub recipient: String,
    pub details: BTreeMap<String, String>,
}

/// Email or SMS transport.
pub trait NotificationSender: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Per-status counts for the admissions dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub total: usize,
    /// New, hot and warm enquiries plus applications awaiting documents.
    pub active_enquiries: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    pub generated_at: DateTime<Utc>,
}
