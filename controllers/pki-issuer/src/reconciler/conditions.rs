//! Condition texts and the condition-level decisions of the request lifecycle.

use crate::error::ControllerError;
use chrono::{DateTime, Utc};
use crds::{
    CONDITION_DENIED, CONDITION_INVALID_REQUEST, CONDITION_READY, CertificateRequestStatus, ConditionStatus, GROUP,
    REASON_DENIED, REASON_FAILED, REASON_PENDING,
};

/// Reason set by this controller on Approved and Denied
pub const REASON_PKI: &str = GROUP;

/// `Ready=False/Pending` after a submission
pub const MESSAGE_SUBMITTED: &str = "Submitted request to the PKI";
/// `Approved=True` once the PKI completed the request
pub const MESSAGE_APPROVED: &str = "Request approved on the PKI";
/// `Ready=True/Issued`
pub const MESSAGE_SIGNED: &str = "Signed";
/// `Denied=True` after the PKI denied or canceled the request
pub const MESSAGE_PKI_DENIED: &str = "Request denied on the PKI";
/// `Ready=False/Denied` after an approval controller denied the request
pub const MESSAGE_LOCALLY_DENIED: &str = "The CertificateRequest was denied by an approval controller";
/// `Ready=False/Failed` for requests marked invalid
pub const MESSAGE_INVALID_REQUEST: &str = "Invalid request";

/// Issuer seen for the first time
pub const REASON_FIRST_SEEN: &str = "FirstSeen";
/// Issuer probe succeeded
pub const REASON_SUCCESS: &str = "Success";
/// Issuer probe failed
pub const REASON_ERROR: &str = "Error";
/// Message paired with [`REASON_FIRST_SEEN`]
pub const MESSAGE_FIRST_SEEN: &str = "First seen";
/// Message paired with [`REASON_SUCCESS`]
pub const MESSAGE_HEALTHY: &str = "Health check succeeded";

/// Why a request needs no further work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// `Ready=True`
    Issued,
    /// `Ready=False/Failed`
    Failed,
    /// `Ready=False/Denied`
    Denied,
    /// `Denied=True` set after the PKI refused the request
    DeniedByPki,
}

/// Returns why reconciling `status` would be a no-op, if it would be
pub fn terminal_state(status: &CertificateRequestStatus) -> Option<Terminal> {
    if status.condition(CONDITION_READY).is_some_and(|c| c.is_true()) {
        return Some(Terminal::Issued);
    }
    if status.ready_is(ConditionStatus::False, REASON_FAILED) {
        return Some(Terminal::Failed);
    }
    if status.ready_is(ConditionStatus::False, REASON_DENIED) {
        return Some(Terminal::Denied);
    }
    if status
        .condition(CONDITION_DENIED)
        .is_some_and(|c| c.is_true() && c.reason() == REASON_PKI)
    {
        return Some(Terminal::DeniedByPki);
    }
    None
}

/// Whether an approval controller denied the request
pub fn is_denied_by_approver(status: &CertificateRequestStatus) -> bool {
    status
        .condition(CONDITION_DENIED)
        .is_some_and(|c| c.is_true() && c.reason() != REASON_PKI)
}

/// Records the local denial: `Ready=False/Denied` and the first failure time
pub fn apply_local_denial(status: &mut CertificateRequestStatus, now: DateTime<Utc>) {
    status.mark_failed_once(now);
    status.set_condition(
        CONDITION_READY,
        ConditionStatus::False,
        REASON_DENIED,
        MESSAGE_LOCALLY_DENIED,
        now,
    );
}

/// Marks a submission the PKI will never accept
pub fn apply_invalid_request(status: &mut CertificateRequestStatus, error: &ControllerError, now: DateTime<Utc>) {
    status.set_condition(
        CONDITION_INVALID_REQUEST,
        ConditionStatus::True,
        REASON_FAILED,
        &error.to_string(),
        now,
    );
}

/// Reflects a failed reconcile on `Ready`.
///
/// An invalid request ends as `Ready=False/Failed`; anything else stays
/// `Ready=False/Pending` with the error text.
pub fn apply_error(status: &mut CertificateRequestStatus, error: &ControllerError, now: DateTime<Utc>) {
    let invalid = status
        .condition(CONDITION_INVALID_REQUEST)
        .is_some_and(|c| c.is_true() && c.reason() == REASON_FAILED);
    if invalid {
        status.mark_failed_once(now);
        status.set_condition(
            CONDITION_READY,
            ConditionStatus::False,
            REASON_FAILED,
            MESSAGE_INVALID_REQUEST,
            now,
        );
    } else {
        status.set_condition(
            CONDITION_READY,
            ConditionStatus::False,
            REASON_PENDING,
            &error.to_string(),
            now,
        );
    }
}
