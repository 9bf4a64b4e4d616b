//! Admission workflow: public intake, tracking, staff status changes and the
//! admit sequence that turns an application into an enrolled student.
//!
//! The service is the only writer of an application's status. Legality of every
//! move is decided by [`transitions::is_allowed`].

pub mod domain;
pub mod intake;
pub mod memory;
pub mod numbering;
pub mod repository;
pub mod router;
pub mod service;
pub mod transitions;

#[cfg(test)]
mod tests;

pub use domain::{
    AcademicYear, Actor, ApplicantDetails, Application, ApplicationId, ApplicationStatus,
    ApplicationSubmission, Enrollment, Gender, LeadSource, ParentAccountId, ParentContact,
    ParentType, ReferenceNumber, Standard, StatusTransitionEvent, Student, StudentId,
    TrackingToken,
};
pub use intake::ValidationError;
pub use memory::{InMemoryAdmissionStore, InMemoryParentAccounts, OutboxNotifier};
pub use repository::{
    AdmissionClaim, ApplicationRecord, ApplicationRepository, CredentialError, CredentialIssuer,
    Notification, NotificationError, NotificationSender, NotificationTemplate, PipelineSummary,
    RepositoryError, StudentRegistry, TrackingView,
};
pub use router::{admission_router, public_router, staff_router, STAFF_HEADER};
pub use service::{
    AdmissionError, AdmissionOutcome, AdmissionPorts, AdmissionRequest, AdmissionService,
    AdmissionStep, ApplicationQuery, LinkKind, NotificationStatus, SortDirection, SortField,
    StatusChange, StatusUpdate,
};
pub use transitions::{SideEffect, TransitionError};
