use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use url::Url;

use super::domain::{
    AcademicYear, ApplicantDetails, ApplicationSubmission, ParentContact,
};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern compiles")
});

static MOBILE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{10}$").expect("mobile pattern compiles"));

static SECTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{1,3}$").expect("section pattern compiles"));

/// Input rejected before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("date_of_birth must be a past date formatted YYYY-MM-DD")]
    DateOfBirth,
    #[error("email address is malformed")]
    Email,
    #[error("mobile number must be exactly 10 digits")]
    Mobile,
    #[error("{field} must be an absolute http(s) URL")]
    Url { field: &'static str },
    #[error("remarks are required when placing an application on hold")]
    RemarksRequired,
    #[error("section must be 1-3 letters or digits")]
    Section,
    #[error("academic year must look like 2025-2026")]
    AcademicYear,
    #[error("walk-in registrations must start in a lead classification (got {0})")]
    InitialStatus(String),
}

/// Turns raw form payloads into validated applicant details.
#[derive(Debug, Clone)]
pub struct IntakeValidator {
    default_branch: String,
}

impl IntakeValidator {
    pub fn new(default_branch: impl Into<String>) -> Self {
        Self {
            default_branch: default_branch.into(),
        }
    }

    /// Validate every required field. Optional links are checked when present.
    pub fn applicant_from_submission(
        &self,
        submission: &ApplicationSubmission,
        today: NaiveDate,
    ) -> Result<ApplicantDetails, ValidationError> {
        let student_name = required("student_name", &submission.student_name)?;
        let date_of_birth = parse_date_of_birth(&submission.date_of_birth, today)?;
        let parent_name = required("parent_name", &submission.parent_name)?;

        let mobile = required("mobile", &submission.mobile)?;
        if !MOBILE_PATTERN.is_match(&mobile) {
            return Err(ValidationError::Mobile);
        }

        let email = required("email", &submission.email)?.to_ascii_lowercase();
        if !EMAIL_PATTERN.is_match(&email) {
            return Err(ValidationError::Email);
        }

        if let Some(link) = &submission.documents_link {
            absolute_url("documents_link", link)?;
        }
        if let Some(link) = &submission.payment_receipt_link {
            absolute_url("payment_receipt_link", link)?;
        }

        let branch = submission
            .branch
            .as_deref()
            .map(str::trim)
            .filter(|branch| !branch.is_empty())
            .unwrap_or(&self.default_branch)
            .to_string();

        Ok(ApplicantDetails {
            branch,
            student_name,
            gender: submission.gender,
            date_of_birth,
            applying_for_class: submission.applying_for_class,
            source: submission.source,
            parent: ParentContact {
                parent_type: submission.parent_type,
                name: parent_name,
                mobile,
                email,
            },
        })
    }
}

fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::Missing { field })
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn parse_date_of_birth(raw: &str, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::Missing {
            field: "date_of_birth",
        });
    }
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::DateOfBirth)?;
    if date >= today {
        return Err(ValidationError::DateOfBirth);
    }
    Ok(date)
}

/// Accept only absolute `http`/`https` URLs, returning the normalized form.
pub fn absolute_url(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let url = Url::parse(raw.trim()).map_err(|_| ValidationError::Url { field })?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url.to_string()),
        _ => Err(ValidationError::Url { field }),
    }
}

/// Normalize free-text remarks; blank input counts as absent.
pub fn remarks(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn section(raw: &str) -> Result<String, ValidationError> {
    let section = raw.trim().to_ascii_uppercase();
    if SECTION_PATTERN.is_match(&section) {
        Ok(section)
    } else {
        Err(ValidationError::Section)
    }
}

pub fn academic_year(raw: &str) -> Result<AcademicYear, ValidationError> {
    raw.parse().map_err(|_| ValidationError::AcademicYear)
}
