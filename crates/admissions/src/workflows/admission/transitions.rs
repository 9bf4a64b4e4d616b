//! The admission status graph. Every status change in the service goes through
//! [`ensure`]; nothing else decides whether a move is legal.

use super::domain::ApplicationStatus;

/// Work that has to happen alongside a committed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    None,
    /// Email the parent. Failure is reported but does not undo the change.
    Notify,
    /// Provision numbers, student, and parent credentials inside one unit.
    Admit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move application from {from} to {to}")]
pub struct TransitionError {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
}

const fn is_document_stage(status: ApplicationStatus) -> bool {
    matches!(
        status,
        ApplicationStatus::DocumentsPending
            | ApplicationStatus::DocumentsVerified
            | ApplicationStatus::PaymentPending
    )
}

pub fn is_allowed(from: ApplicationStatus, to: ApplicationStatus) -> bool {
    use ApplicationStatus::*;

    if from.is_terminal() || from == to {
        return false;
    }

    match (from, to) {
        (_, Rejected) => true,
        (f, t) if f.is_lead() => t.is_lead() || t == DocumentsPending,
        (DocumentsPending, DocumentsVerified) => true,
        (DocumentsVerified, PaymentPending) => true,
        (f, OnHold) => is_document_stage(f),
        (DocumentsVerified | PaymentPending, Admitted) => true,
        (OnHold, t) => t.is_lead() || is_document_stage(t),
        _ => false,
    }
}

pub fn ensure(from: ApplicationStatus, to: ApplicationStatus) -> Result<(), TransitionError> {
    if is_allowed(from, to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Statuses reachable from `from`, in declaration order.
pub fn next_statuses(from: ApplicationStatus) -> Vec<ApplicationStatus> {
    ApplicationStatus::ALL
        .into_iter()
        .filter(|to| is_allowed(from, *to))
        .collect()
}

pub fn side_effect(to: ApplicationStatus) -> SideEffect {
    match to {
        ApplicationStatus::OnHold | ApplicationStatus::Rejected => SideEffect::Notify,
        ApplicationStatus::Admitted => SideEffect::Admit,
        _ => SideEffect::None,
    }
}
