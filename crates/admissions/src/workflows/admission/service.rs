use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AdmissionsConfig;

use super::domain::{
    AcademicYear, Actor, Application, ApplicationId, ApplicationStatus, ApplicationSubmission,
    Enrollment, ParentAccountId, ReferenceNumber, StatusTransitionEvent, Student, StudentId,
    TrackingToken,
};
use super::intake::{self, IntakeValidator, ValidationError};
use super::numbering::{self, NumberingPolicy};
use super::repository::{
    AdmissionClaim, ApplicationRecord, ApplicationRepository, CredentialIssuer, Notification,
    NotificationSender, NotificationTemplate, ParentAccountRequest, PipelineSummary,
    RepositoryError, StudentRegistry,
};
use super::transitions::{self, SideEffect, TransitionError};

/// Attempts at drawing an unused reference number before giving up.
const REFERENCE_ATTEMPTS: usize = 5;
/// An admission claim older than this belongs to an admit that died mid-way.
const ADMISSION_CLAIM_TTL_SECS: i64 = 300;

/// Adapters the workflow talks to.
#[derive(Clone)]
pub struct AdmissionPorts {
    pub applications: Arc<dyn ApplicationRepository>,
    pub students: Arc<dyn StudentRegistry>,
    pub credentials: Arc<dyn CredentialIssuer>,
    pub notifications: Arc<dyn NotificationSender>,
}

/// Which applicant link is being captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Documents,
    PaymentReceipt,
}

impl LinkKind {
    fn field(self) -> &'static str {
        match self {
            LinkKind::Documents => "documents_link",
            LinkKind::PaymentReceipt => "payment_receipt_link",
        }
    }
}

/// Section and academic year chosen at admit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionRequest {
    pub section: String,
    pub academic_year: String,
}

/// Staff request to move an application to a new status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: ApplicationStatus,
    #[serde(default)]
    pub remarks: Option<String>,
    /// Used when `status` is `admitted`; configured defaults apply when absent.
    #[serde(default)]
    pub admission: Option<AdmissionRequest>,
}

/// Parent login details surfaced once, at admit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentCredentials {
    pub account_id: ParentAccountId,
    pub login_email: String,
    /// Present only when a new account was created by this admit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_password: Option<String>,
}

/// Everything staff need to hand over after a successful admit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmissionOutcome {
    pub application: Application,
    pub student_id: StudentId,
    pub admission_number: String,
    pub roll_number: String,
    pub parent_credentials: ParentCredentials,
}

/// Whether the parent was told about a committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    NotRequired,
    Sent,
    Failed,
}

/// Result of a committed status update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub application: Application,
    pub notification: NotificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admission: Option<AdmissionOutcome>,
}

impl StatusChange {
    pub fn notification_sent(&self) -> bool {
        self.notification == NotificationStatus::Sent
    }
}

/// Sortable scalar fields for staff listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    StudentName,
    ReferenceNumber,
    Status,
    DateOfBirth,
    ApplyingForClass,
    Branch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Filter and ordering for [`AdmissionService::list`]. Newest first by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationQuery {
    #[serde(default)]
    pub status: Option<ApplicationStatus>,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Admit step that failed and was rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStep {
    NumberGeneration,
    CredentialProvisioning,
    StudentCreation,
    StatusCommit,
    Notification,
}

impl fmt::Display for AdmissionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AdmissionStep::NumberGeneration => "number generation",
            AdmissionStep::CredentialProvisioning => "credential provisioning",
            AdmissionStep::StudentCreation => "student creation",
            AdmissionStep::StatusCommit => "status commit",
            AdmissionStep::Notification => "notification",
        };
        f.write_str(label)
    }
}

/// Error raised by the admission service.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("application not found")]
    NotFound,
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("application was modified concurrently; re-fetch and retry")]
    Conflict,
    #[error("admission failed during {step}: {reason}")]
    AdmissionFailed { step: AdmissionStep, reason: String },
    #[error("admission store unavailable: {0}")]
    Unavailable(String),
}

impl From<RepositoryError> for AdmissionError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict => AdmissionError::Conflict,
            RepositoryError::NotFound => AdmissionError::NotFound,
            RepositoryError::Unavailable(reason) => AdmissionError::Unavailable(reason),
        }
    }
}

fn failed(step: AdmissionStep, err: impl fmt::Display) -> AdmissionError {
    AdmissionError::AdmissionFailed {
        step,
        reason: err.to_string(),
    }
}

/// Undo log for the admit sequence; entries are replayed newest first.
enum Compensation {
    ReleaseClaim {
        application_id: ApplicationId,
        attempt: String,
    },
    RemoveStudent(StudentId),
    RevokeAccount(ParentAccountId),
    RestoreApplication(ApplicationRecord),
}

/// Owns the application status field and every transition applied to it.
pub struct AdmissionService {
    ports: AdmissionPorts,
    intake: IntakeValidator,
    numbering: NumberingPolicy,
    default_section: String,
    academic_year: Option<AcademicYear>,
}

impl AdmissionService {
    pub fn new(ports: AdmissionPorts, config: &AdmissionsConfig) -> Self {
        Self {
            ports,
            intake: IntakeValidator::new(config.default_branch.clone()),
            numbering: NumberingPolicy::new(&config.reference_prefix, &config.admission_prefix),
            default_section: config.default_section.clone(),
            academic_year: config.academic_year,
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// Public application form. New applications start as `enquiry_new`.
    pub fn submit(
        &self,
        submission: ApplicationSubmission,
    ) -> Result<Application, AdmissionError> {
        self.create(submission, ApplicationStatus::EnquiryNew, Actor::Applicant)
    }

    /// Walk-in desk registration with a staff-chosen lead classification.
    pub fn register_walk_in(
        &self,
        submission: ApplicationSubmission,
        lead: ApplicationStatus,
        actor: Actor,
    ) -> Result<Application, AdmissionError> {
        if !lead.is_lead() {
            return Err(ValidationError::InitialStatus(lead.label().to_string()).into());
        }
        self.create(submission, lead, actor)
    }

    fn create(
        &self,
        submission: ApplicationSubmission,
        initial: ApplicationStatus,
        actor: Actor,
    ) -> Result<Application, AdmissionError> {
        let applicant = self
            .intake
            .applicant_from_submission(&submission, Self::today())?;
        let documents_link = submission
            .documents_link
            .as_deref()
            .map(|link| intake::absolute_url("documents_link", link))
            .transpose()?;
        let payment_receipt_link = submission
            .payment_receipt_link
            .as_deref()
            .map(|link| intake::absolute_url("payment_receipt_link", link))
            .transpose()?;
        let remarks = intake::remarks(submission.remarks.as_deref());

        let now = Utc::now();
        let id = ApplicationId(Uuid::new_v4().to_string());
        let creation = StatusTransitionEvent {
            application_id: id.clone(),
            from: None,
            to: initial,
            remarks: remarks.clone(),
            actor,
            at: now,
        };
        let mut record = ApplicationRecord {
            application: Application {
                id,
                reference_number: self.numbering.reference_number(now.year()),
                tracking_token: self.numbering.tracking_token(),
                applicant,
                status: initial,
                remarks,
                documents_link,
                payment_receipt_link,
                enrollment: None,
                created_at: now,
                updated_at: now,
            },
            version: 0,
            history: vec![creation],
            admission_claim: None,
        };

        for attempt in 1..=REFERENCE_ATTEMPTS {
            match self.ports.applications.insert(record.clone()) {
                Ok(stored) => {
                    info!(
                        application_id = %stored.application.id.0,
                        reference = %stored.application.reference_number.0,
                        status = %initial,
                        "application created"
                    );
                    return Ok(stored.application);
                }
                Err(RepositoryError::Conflict) if attempt < REFERENCE_ATTEMPTS => {
                    warn!(attempt, "reference number collision, drawing a new one");
                    record.application.reference_number = self
                        .numbering
                        .reference_number(now.year());
                    record.application.tracking_token = self.numbering.tracking_token();
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(AdmissionError::Conflict)
    }

    /// Swap a reference number and birth date for the tracking token.
    pub fn resolve_tracking_token(
        &self,
        reference_number: &str,
        date_of_birth: &str,
    ) -> Result<TrackingToken, AdmissionError> {
        let date_of_birth = NaiveDate::parse_from_str(date_of_birth.trim(), "%Y-%m-%d")
            .map_err(|_| AdmissionError::NotFound)?;
        let reference = ReferenceNumber(reference_number.trim().to_ascii_uppercase());

        match self.ports.applications.find_by_reference(&reference)? {
            Some(record) if record.application.applicant.date_of_birth == date_of_birth => {
                Ok(record.application.tracking_token)
            }
            _ => Err(AdmissionError::NotFound),
        }
    }

    pub fn get_by_tracking_token(
        &self,
        token: &TrackingToken,
    ) -> Result<ApplicationRecord, AdmissionError> {
        self.ports
            .applications
            .find_by_token(token)?
            .ok_or(AdmissionError::NotFound)
    }

    pub fn submit_documents_link(
        &self,
        token: &TrackingToken,
        url: &str,
    ) -> Result<Application, AdmissionError> {
        let record = self.get_by_tracking_token(token)?;
        self.write_link(record, LinkKind::Documents, url)
    }

    pub fn submit_payment_receipt_link(
        &self,
        token: &TrackingToken,
        url: &str,
    ) -> Result<Application, AdmissionError> {
        let record = self.get_by_tracking_token(token)?;
        self.write_link(record, LinkKind::PaymentReceipt, url)
    }

    /// Staff capture of an applicant link on their behalf.
    pub fn attach_link(
        &self,
        id: &ApplicationId,
        kind: LinkKind,
        url: &str,
        actor: &Actor,
    ) -> Result<Application, AdmissionError> {
        let record = self.get(id)?;
        let application = self.write_link(record, kind, url)?;
        info!(application_id = %id.0, ?kind, ?actor, "link recorded by staff");
        Ok(application)
    }

    /// Replace the stored link. Status is left untouched.
    fn write_link(
        &self,
        mut record: ApplicationRecord,
        kind: LinkKind,
        url: &str,
    ) -> Result<Application, AdmissionError> {
        let url = intake::absolute_url(kind.field(), url)?;
        match kind {
            LinkKind::Documents => record.application.documents_link = Some(url),
            LinkKind::PaymentReceipt => record.application.payment_receipt_link = Some(url),
        }
        record.application.updated_at = Utc::now();
        let stored = self.ports.applications.update(record)?;
        Ok(stored.application)
    }

    pub fn get(&self, id: &ApplicationId) -> Result<ApplicationRecord, AdmissionError> {
        self.ports
            .applications
            .fetch(id)?
            .ok_or(AdmissionError::NotFound)
    }

    pub fn history(
        &self,
        id: &ApplicationId,
    ) -> Result<Vec<StatusTransitionEvent>, AdmissionError> {
        Ok(self.get(id)?.history)
    }

    pub fn list(&self, query: &ApplicationQuery) -> Result<Vec<Application>, AdmissionError> {
        let mut applications: Vec<Application> = self
            .ports
            .applications
            .list()?
            .into_iter()
            .map(|record| record.application)
            .filter(|application| query.status.map_or(true, |status| application.status == status))
            .collect();

        applications.sort_by(|left, right| {
            let ordering = match query.sort {
                SortField::CreatedAt => left.created_at.cmp(&right.created_at),
                SortField::UpdatedAt => left.updated_at.cmp(&right.updated_at),
                SortField::StudentName => left
                    .applicant
                    .student_name
                    .to_lowercase()
                    .cmp(&right.applicant.student_name.to_lowercase()),
                SortField::ReferenceNumber => left.reference_number.cmp(&right.reference_number),
                SortField::Status => left.status.label().cmp(right.status.label()),
                SortField::DateOfBirth => left
                    .applicant
                    .date_of_birth
                    .cmp(&right.applicant.date_of_birth),
                SortField::ApplyingForClass => left
                    .applicant
                    .applying_for_class
                    .cmp(&right.applicant.applying_for_class),
                SortField::Branch => left.applicant.branch.cmp(&right.applicant.branch),
            }
            .then_with(|| left.id.cmp(&right.id));

            match query.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        Ok(applications)
    }

    pub fn pipeline_summary(&self) -> Result<PipelineSummary, AdmissionError> {
        let records = self.ports.applications.list()?;
        let mut by_status: BTreeMap<&'static str, usize> = ApplicationStatus::ALL
            .into_iter()
            .map(|status| (status.label(), 0))
            .collect();
        for record in &records {
            *by_status.entry(record.status().label()).or_default() += 1;
        }
        let active_enquiries = records
            .iter()
            .filter(|record| {
                matches!(
                    record.status(),
                    ApplicationStatus::EnquiryNew
                        | ApplicationStatus::EnquiryHot
                        | ApplicationStatus::EnquiryWarm
                        | ApplicationStatus::DocumentsPending
                )
            })
            .count();

        Ok(PipelineSummary {
            total: records.len(),
            active_enquiries,
            by_status,
            generated_at: Utc::now(),
        })
    }

    /// Apply a staff status change through the transition table.
    pub fn update_status(
        &self,
        id: &ApplicationId,
        update: StatusUpdate,
        actor: Actor,
    ) -> Result<StatusChange, AdmissionError> {
        let record = self.get(id)?;
        let from = record.status();
        let to = update.status;
        transitions::ensure(from, to)?;

        let remarks = intake::remarks(update.remarks.as_deref());
        if to == ApplicationStatus::OnHold && remarks.is_none() {
            return Err(ValidationError::RemarksRequired.into());
        }

        if transitions::side_effect(to) == SideEffect::Admit {
            let request = update.admission.unwrap_or_else(|| AdmissionRequest {
                section: self.default_section.clone(),
                academic_year: self.default_academic_year().to_string(),
            });
            let outcome = self.admit_record(record, request, remarks, actor)?;
            return Ok(StatusChange {
                application: outcome.application.clone(),
                notification: NotificationStatus::Sent,
                admission: Some(outcome),
            });
        }

        let next = Self::with_transition(record, to, remarks, actor, None);
        let stored = self.ports.applications.update(next)?;
        info!(application_id = %id.0, %from, %to, "application status updated");

        let notification = match transitions::side_effect(to) {
            SideEffect::Notify => self.notify_status(&stored.application),
            SideEffect::None | SideEffect::Admit => NotificationStatus::NotRequired,
        };

        Ok(StatusChange {
            application: stored.application,
            notification,
            admission: None,
        })
    }

    /// Admit an application: numbers, parent account, student row, status, welcome email.
    /// Any failure rolls back the steps already taken.
    pub fn admit(
        &self,
        id: &ApplicationId,
        request: AdmissionRequest,
        actor: Actor,
    ) -> Result<AdmissionOutcome, AdmissionError> {
        let record = self.get(id)?;
        transitions::ensure(record.status(), ApplicationStatus::Admitted)?;
        self.admit_record(record, request, None, actor)
    }

    fn default_academic_year(&self) -> AcademicYear {
        self.academic_year
            .unwrap_or_else(AcademicYear::current)
    }

    fn admit_record(
        &self,
        record: ApplicationRecord,
        request: AdmissionRequest,
        remarks: Option<String>,
        actor: Actor,
    ) -> Result<AdmissionOutcome, AdmissionError> {
        let section = intake::section(&request.section)?;
        let academic_year = intake::academic_year(&request.academic_year)?;
        let application_id = record.application.id.clone();

        let (record, attempt) = self.claim(record)?;
        let mut undo = vec![Compensation::ReleaseClaim {
            application_id: application_id.clone(),
            attempt,
        }];
        let result = self
            .remove_orphan(&application_id)
            .and_then(|()| {
                self.run_admission(record, &section, academic_year, remarks, actor, &mut undo)
            });
        if let Err(err) = &result {
            warn!(application_id = %application_id.0, error = %err, "admission rolled back");
            self.unwind(undo);
        }
        result
    }

    /// Take the application for this admit with a version-checked write. A
    /// second admit fails here before it has created anything.
    fn claim(
        &self,
        mut record: ApplicationRecord,
    ) -> Result<(ApplicationRecord, String), AdmissionError> {
        let now = Utc::now();
        if let Some(claim) = &record.admission_claim {
            if now - claim.claimed_at < TimeDelta::seconds(ADMISSION_CLAIM_TTL_SECS) {
                return Err(AdmissionError::Conflict);
            }
            warn!(
                application_id = %record.application.id.0,
                stale_attempt = %claim.attempt,
                "taking over expired admission claim"
            );
        }

        let attempt = Uuid::new_v4().to_string();
        record.admission_claim = Some(AdmissionClaim {
            attempt: attempt.clone(),
            claimed_at: now,
        });
        let claimed = self.ports.applications.update(record)?;
        Ok((claimed, attempt))
    }

    /// A student left by an admit that never committed. Only called under a claim.
    fn remove_orphan(&self, application_id: &ApplicationId) -> Result<(), AdmissionError> {
        if let Some(orphan) = self.ports.students.find_by_application(application_id)? {
            warn!(
                application_id = %application_id.0,
                student_id = %orphan.id.0,
                "removing orphaned student before admit retry"
            );
            self.ports.students.remove(&orphan.id)?;
        }
        Ok(())
    }

    fn run_admission(
        &self,
        record: ApplicationRecord,
        section: &str,
        academic_year: AcademicYear,
        remarks: Option<String>,
        actor: Actor,
        undo: &mut Vec<Compensation>,
    ) -> Result<AdmissionOutcome, AdmissionError> {
        let applicant = record.application.applicant.clone();
        let from = record.status();

        let admission_scope = self
            .numbering
            .admission_scope(&applicant.branch, academic_year);
        let roll_scope = self.numbering.roll_scope(
            &applicant.branch,
            applicant.applying_for_class,
            section,
            academic_year,
        );
        let admission_seq = self
            .ports
            .students
            .next_sequence(&admission_scope)
            .map_err(|err| failed(AdmissionStep::NumberGeneration, err))?;
        let roll_seq = self
            .ports
            .students
            .next_sequence(&roll_scope)
            .map_err(|err| failed(AdmissionStep::NumberGeneration, err))?;
        let admission_number =
            self.numbering
                .admission_number(&applicant.branch, academic_year, admission_seq);
        let roll_number = self.numbering.roll_number(
            applicant.applying_for_class,
            section,
            academic_year,
            roll_seq,
        );

        let initial_password = numbering::default_password();
        let account = self
            .ports
            .credentials
            .provision(&ParentAccountRequest {
                email: applicant.parent.email.clone(),
                full_name: applicant.parent.name.clone(),
                mobile: applicant.parent.mobile.clone(),
                initial_password: initial_password.clone(),
            })
            .map_err(|err| failed(AdmissionStep::CredentialProvisioning, err))?;
        if account.created {
            undo.push(Compensation::RevokeAccount(account.account_id.clone()));
        }

        let now = Utc::now();
        let student = Student {
            id: StudentId(Uuid::new_v4().to_string()),
            application_id: record.application.id.clone(),
            admission_number: admission_number.clone(),
            roll_number: roll_number.clone(),
            student_name: applicant.student_name.clone(),
            gender: applicant.gender,
            date_of_birth: applicant.date_of_birth,
            class: applicant.applying_for_class,
            section: section.to_string(),
            academic_year,
            branch: applicant.branch.clone(),
            parent_account: account.account_id.clone(),
            created_at: now,
        };
        let student = self
            .ports
            .students
            .insert(student)
            .map_err(|err| failed(AdmissionStep::StudentCreation, err))?;
        undo.push(Compensation::RemoveStudent(student.id.clone()));

        let enrollment = Enrollment {
            student_id: student.id.clone(),
            admission_number: admission_number.clone(),
            roll_number: roll_number.clone(),
            section: section.to_string(),
            academic_year,
        };
        let prior = record.clone();
        let mut next = Self::with_transition(
            record,
            ApplicationStatus::Admitted,
            remarks,
            actor,
            Some(enrollment),
        );
        next.admission_claim = None;
        let stored = match self.ports.applications.update(next) {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict) => return Err(AdmissionError::Conflict),
            Err(err) => return Err(failed(AdmissionStep::StatusCommit, err)),
        };
        undo.push(Compensation::RestoreApplication(ApplicationRecord {
            version: stored.version,
            ..prior
        }));

        let default_password = account.created.then_some(initial_password);
        let mut details = BTreeMap::new();
        details.insert("student_name".to_string(), applicant.student_name.clone());
        details.insert("admission_number".to_string(), admission_number.clone());
        details.insert("roll_number".to_string(), roll_number.clone());
        details.insert("login_email".to_string(), account.login_email.clone());
        if let Some(password) = &default_password {
            details.insert("default_password".to_string(), password.clone());
        }
        self.ports
            .notifications
            .send(Notification {
                template: NotificationTemplate::AdmissionConfirmed,
                application_id: stored.application.id.clone(),
                recipient: applicant.parent.email.clone(),
                details,
            })
            .map_err(|err| failed(AdmissionStep::Notification, err))?;

        info!(
            application_id = %stored.application.id.0,
            %from,
            to = %ApplicationStatus::Admitted,
            %admission_number,
            %roll_number,
            new_parent_account = account.created,
            "application admitted"
        );

        Ok(AdmissionOutcome {
            application: stored.application,
            student_id: student.id,
            admission_number,
            roll_number,
            parent_credentials: ParentCredentials {
                account_id: account.account_id,
                login_email: account.login_email,
                default_password,
            },
        })
    }

    fn unwind(&self, undo: Vec<Compensation>) {
        for step in undo.into_iter().rev() {
            match step {
                Compensation::ReleaseClaim {
                    application_id,
                    attempt,
                } => {
                    if let Err(err) = self.release_claim(&application_id, &attempt) {
                        error!(application_id = %application_id.0, error = %err, "failed to release admission claim");
                    }
                }
                Compensation::RestoreApplication(prior) => {
                    let id = prior.application.id.clone();
                    if let Err(err) = self.restore_application(prior) {
                        error!(application_id = %id.0, error = %err, "failed to restore application status");
                    }
                }
                Compensation::RemoveStudent(student_id) => {
                    if let Err(err) = self.ports.students.remove(&student_id) {
                        error!(student_id = %student_id.0, error = %err, "failed to remove student");
                    }
                }
                Compensation::RevokeAccount(account_id) => {
                    if let Err(err) = self.ports.credentials.revoke(&account_id) {
                        error!(account_id = %account_id.0, error = %err, "failed to revoke parent account");
                    }
                }
            }
        }
    }

    /// Put status, remarks, enrollment and history back. Links written by the
    /// applicant in the meantime are kept.
    fn release_claim(
        &self,
        application_id: &ApplicationId,
        attempt: &str,
    ) -> Result<(), RepositoryError> {
        let mut current = self
            .ports
            .applications
            .fetch(application_id)?
            .ok_or(RepositoryError::NotFound)?;
        let held = current
            .admission_claim
            .as_ref()
            .is_some_and(|claim| claim.attempt == attempt);
        if !held {
            return Ok(());
        }
        current.admission_claim = None;
        self.ports.applications.update(current).map(|_| ())
    }

    fn restore_application(&self, prior: ApplicationRecord) -> Result<(), RepositoryError> {
        let mut current = self
            .ports
            .applications
            .fetch(&prior.application.id)?
            .ok_or(RepositoryError::NotFound)?;
        current.application.status = prior.application.status;
        current.application.remarks = prior.application.remarks;
        current.application.enrollment = prior.application.enrollment;
        current.application.updated_at = prior.application.updated_at;
        current.history = prior.history;
        self.ports.applications.update(current).map(|_| ())
    }

    fn with_transition(
        mut record: ApplicationRecord,
        to: ApplicationStatus,
        remarks: Option<String>,
        actor: Actor,
        enrollment: Option<Enrollment>,
    ) -> ApplicationRecord {
        let now = Utc::now();
        record.history.push(StatusTransitionEvent {
            application_id: record.application.id.clone(),
            from: Some(record.application.status),
            to,
            remarks: remarks.clone(),
            actor,
            at: now,
        });
        record.application.status = to;
        if remarks.is_some() {
            record.application.remarks = remarks;
        }
        if enrollment.is_some() {
            record.application.enrollment = enrollment;
        }
        record.application.updated_at = now;
        record
    }

    fn notify_status(&self, application: &Application) -> NotificationStatus {
        let template = match application.status {
            ApplicationStatus::OnHold => NotificationTemplate::ApplicationOnHold,
            _ => NotificationTemplate::ApplicationRejected,
        };
        let mut details = BTreeMap::new();
        details.insert(
            "student_name".to_string(),
            application.applicant.student_name.clone(),
        );
        details.insert(
            "reference_number".to_string(),
            application.reference_number.0.clone(),
        );
        if let Some(remarks) = &application.remarks {
            details.insert("remarks".to_string(), remarks.clone());
        }

        let notification = Notification {
            template,
            application_id: application.id.clone(),
            recipient: application.applicant.parent.email.clone(),
            details,
        };
        match self.ports.notifications.send(notification) {
            Ok(()) => NotificationStatus::Sent,
            Err(err) => {
                warn!(
                    application_id = %application.id.0,
                    error = %err,
                    "status committed but parent notification failed"
                );
                NotificationStatus::Failed
            }
        }
    }
}
