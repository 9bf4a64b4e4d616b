use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::domain::{AcademicYear, ReferenceNumber, Standard, TrackingToken};

const REFERENCE_SUFFIX_LEN: usize = 6;
const BRANCH_CODE_LEN: usize = 4;
const DEFAULT_PASSWORD_LEN: usize = 12;

/// Counter namespace handed to the store's atomic sequence allocator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SequenceScope {
    /// Keyed by the printed branch code, so branches sharing a code share a counter.
    Admission {
        branch_code: String,
        academic_year: AcademicYear,
    },
    Roll {
        branch: String,
        class: Standard,
        section: String,
        academic_year: AcademicYear,
    },
}

/// Formats for every identifier the workflow hands out.
#[derive(Debug, Clone)]
pub struct NumberingPolicy {
    reference_prefix: String,
    admission_prefix: String,
}

impl NumberingPolicy {
    /// Prefixes are stored uppercased; reference lookups uppercase their input too.
    pub fn new(reference_prefix: &str, admission_prefix: &str) -> Self {
        Self {
            reference_prefix: reference_prefix.trim().to_ascii_uppercase(),
            admission_prefix: admission_prefix.trim().to_ascii_uppercase(),
        }
    }

    /// `PREFIX-YEAR-XXXXXX` with a random uppercase hex suffix.
    pub fn reference_number(&self, year: i32) -> ReferenceNumber {
        let suffix: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(REFERENCE_SUFFIX_LEN)
            .collect();
        ReferenceNumber(format!(
            "{}-{year}-{}",
            self.reference_prefix,
            suffix.to_ascii_uppercase()
        ))
    }

    pub fn tracking_token(&self) -> TrackingToken {
        TrackingToken(Uuid::new_v4().simple().to_string())
    }

    pub fn admission_scope(&self, branch: &str, academic_year: AcademicYear) -> SequenceScope {
        SequenceScope::Admission {
            branch_code: branch_code(branch),
            academic_year,
        }
    }

    pub fn roll_scope(
        &self,
        branch: &str,
        class: Standard,
        section: &str,
        academic_year: AcademicYear,
    ) -> SequenceScope {
        SequenceScope::Roll {
            branch: branch.to_string(),
            class,
            section: section.to_string(),
            academic_year,
        }
    }

    /// `ADM-2025-MEDA-0007`
    pub fn admission_number(&self, branch: &str, academic_year: AcademicYear, seq: u32) -> String {
        format!(
            "{}-{}-{}-{seq:04}",
            self.admission_prefix,
            academic_year.start(),
            branch_code(branch)
        )
    }

    /// `2025-LKG-A-003`
    pub fn roll_number(
        &self,
        class: Standard,
        section: &str,
        academic_year: AcademicYear,
        seq: u32,
    ) -> String {
        format!(
            "{}-{}-{section}-{seq:03}",
            academic_year.start(),
            class.code()
        )
    }
}

/// Uppercased alphanumerics of the branch's first word, at most four characters.
pub fn branch_code(branch: &str) -> String {
    let code: String = branch
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find(|word| !word.is_empty())
        .unwrap_or("MAIN")
        .chars()
        .take(BRANCH_CODE_LEN)
        .collect();
    code.to_ascii_uppercase()
}

/// Random initial password for a newly provisioned parent account.
pub fn default_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(DEFAULT_PASSWORD_LEN)
        .map(char::from)
        .collect()
}
