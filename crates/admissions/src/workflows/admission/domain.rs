use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for stored applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Human readable reference handed to the applicant (`KSIS-2025-3F9A1C`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceNumber(pub String);

/// Opaque token gating the public tracking endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackingToken(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentAccountId(pub String);

/// Status of an application as it moves from enquiry to enrolment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    EnquiryNew,
    EnquiryHot,
    EnquiryWarm,
    EnquiryCold,
    DocumentsPending,
    DocumentsVerified,
    PaymentPending,
    Admitted,
    Rejected,
    OnHold,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 10] = [
        ApplicationStatus::EnquiryNew,
        ApplicationStatus::EnquiryHot,
        ApplicationStatus::EnquiryWarm,
        ApplicationStatus::EnquiryCold,
        ApplicationStatus::DocumentsPending,
        ApplicationStatus::DocumentsVerified,
        ApplicationStatus::PaymentPending,
        ApplicationStatus::Admitted,
        ApplicationStatus::Rejected,
        ApplicationStatus::OnHold,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::EnquiryNew => "enquiry_new",
            ApplicationStatus::EnquiryHot => "enquiry_hot",
            ApplicationStatus::EnquiryWarm => "enquiry_warm",
            ApplicationStatus::EnquiryCold => "enquiry_cold",
            ApplicationStatus::DocumentsPending => "documents_pending",
            ApplicationStatus::DocumentsVerified => "documents_verified",
            ApplicationStatus::PaymentPending => "payment_pending",
            ApplicationStatus::Admitted => "admitted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::OnHold => "on_hold",
        }
    }

    /// Lead classifications are the four enquiry buckets staff sort walk-ins into.
    pub const fn is_lead(self) -> bool {
        matches!(
            self,
            ApplicationStatus::EnquiryNew
                | ApplicationStatus::EnquiryHot
                | ApplicationStatus::EnquiryWarm
                | ApplicationStatus::EnquiryCold
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, ApplicationStatus::Admitted | ApplicationStatus::Rejected)
    }

    /// Applicant facing explanation shown on the tracking page.
    pub const fn applicant_message(self) -> &'static str {
        match self {
            ApplicationStatus::EnquiryNew => {
                "Your application has been received and is under review."
            }
            ApplicationStatus::EnquiryHot => {
                "Your application is being prioritized. We will contact you soon."
            }
            ApplicationStatus::EnquiryWarm => {
                "Your application is being reviewed. We will contact you shortly."
            }
            ApplicationStatus::EnquiryCold => {
                "Your application is on file. We will contact you if needed."
            }
            ApplicationStatus::DocumentsPending => {
                "We require additional documents to proceed with your application. Please submit them as soon as possible."
            }
            ApplicationStatus::DocumentsVerified => {
                "Your documents have been verified. We will proceed with the next steps."
            }
            ApplicationStatus::PaymentPending => {
                "Your documents are verified. Please complete the fee payment to proceed."
            }
            ApplicationStatus::Admitted => {
                "Congratulations! Your application has been accepted."
            }
            ApplicationStatus::Rejected => {
                "We regret to inform you that your application was not accepted."
            }
            ApplicationStatus::OnHold => {
                "Your application is currently on hold. We will contact you with updates."
            }
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classes the school admits into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Standard {
    PlayGroup,
    PreKg,
    Lkg,
    Ukg,
}

impl Standard {
    pub const fn label(self) -> &'static str {
        match self {
            Standard::PlayGroup => "play_group",
            Standard::PreKg => "pre_kg",
            Standard::Lkg => "lkg",
            Standard::Ukg => "ukg",
        }
    }

    /// Segment used inside roll numbers.
    pub const fn code(self) -> &'static str {
        match self {
            Standard::PlayGroup => "PLAY_GROUP",
            Standard::PreKg => "PRE_KG",
            Standard::Lkg => "LKG",
            Standard::Ukg => "UKG",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

/// How the family heard about the school.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Newspapers,
    SiblingReference,
    SocialMedia,
    SchoolBanners,
    FriendsRelatives,
    WalkIn,
    Others,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentType {
    Father,
    Mother,
    Guardian,
}

/// Raw form payload from the public application form or the walk-in desk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSubmission {
    #[serde(default)]
    pub branch: Option<String>,
    pub student_name: String,
    pub gender: Gender,
    /// `YYYY-MM-DD`; kept as text so malformed dates surface as validation errors.
    pub date_of_birth: String,
    pub applying_for_class: Standard,
    pub source: LeadSource,
    pub parent_type: ParentType,
    pub parent_name: String,
    pub mobile: String,
    pub email: String,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub documents_link: Option<String>,
    #[serde(default)]
    pub payment_receipt_link: Option<String>,
}

/// Parent or guardian contact captured at intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentContact {
    pub parent_type: ParentType,
    pub name: String,
    pub mobile: String,
    pub email: String,
}

/// Validated applicant details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantDetails {
    pub branch: String,
    pub student_name: String,
    pub gender: Gender,
    pub date_of_birth: NaiveDate,
    pub applying_for_class: Standard,
    pub source: LeadSource,
    pub parent: ParentContact,
}

/// Academic year such as `2025-2026`, stored by its starting calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AcademicYear {
    start: i32,
}

/// Month the school year rolls over.
const ACADEMIC_YEAR_START_MONTH: u32 = 6;

impl AcademicYear {
    pub fn new(start: i32) -> Self {
        Self { start }
    }

    pub fn start(self) -> i32 {
        self.start
    }

    /// Academic year in progress (or about to start) on `today`.
    pub fn containing(today: NaiveDate) -> Self {
        if today.month() >= ACADEMIC_YEAR_START_MONTH {
            Self::new(today.year())
        } else {
            Self::new(today.year() - 1)
        }
    }

    /// Year containing today's UTC date. Every default-year decision goes through here.
    pub fn current() -> Self {
        Self::containing(Utc::now().date_naive())
    }
}

impl fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.start + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("academic year must be two consecutive years such as 2025-2026 (found '{0}')")]
pub struct InvalidAcademicYear(pub String);

impl FromStr for AcademicYear {
    type Err = InvalidAcademicYear;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidAcademicYear(value.to_string());
        let (start, end) = value.trim().split_once('-').ok_or_else(invalid)?;
        if start.len() != 4 || end.len() != 4 {
            return Err(invalid());
        }
        let start: i32 = start.parse().map_err(|_| invalid())?;
        let end: i32 = end.parse().map_err(|_| invalid())?;
        if end != start + 1 {
            return Err(invalid());
        }
        Ok(Self::new(start))
    }
}

impl Serialize for AcademicYear {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AcademicYear {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Numbers assigned when an application is admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub student_id: StudentId,
    pub admission_number: String,
    pub roll_number: String,
    pub section: String,
    pub academic_year: AcademicYear,
}

/// One admission enquiry tracked from first contact through admit or reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub reference_number: ReferenceNumber,
    pub tracking_token: TrackingToken,
    pub applicant: ApplicantDetails,
    pub status: ApplicationStatus,
    pub remarks: Option<String>,
    pub documents_link: Option<String>,
    pub payment_receipt_link: Option<String>,
    pub enrollment: Option<Enrollment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Student provisioned by a successful admit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub application_id: ApplicationId,
    pub admission_number: String,
    pub roll_number: String,
    pub student_name: String,
    pub gender: Gender,
    pub date_of_birth: NaiveDate,
    pub class: Standard,
    pub section: String,
    pub academic_year: AcademicYear,
    pub branch: String,
    pub parent_account: ParentAccountId,
    pub created_at: DateTime<Utc>,
}

/// Who requested a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    Applicant,
    Staff { name: String },
    System,
}

impl Actor {
    pub fn staff(name: impl Into<String>) -> Self {
        Actor::Staff { name: name.into() }
    }
}

/// Audit entry for a committed status change. `from` is empty for creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransitionEvent {
    pub application_id: ApplicationId,
    pub from: Option<ApplicationStatus>,
    pub to: ApplicationStatus,
    pub remarks: Option<String>,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}
