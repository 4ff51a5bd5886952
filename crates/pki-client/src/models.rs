//! PKI API data models
//!
//! Request/response types for the `/api/v1/requests` workflow endpoints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle status of a PKI request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Waiting for an operator or policy
    Pending,
    /// Approved, certificate not issued yet
    Approved,
    /// Certificate issued
    Completed,
    /// Refused by the PKI
    Denied,
    /// Withdrawn
    Canceled,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Completed => "completed",
            RequestStatus::Denied => "denied",
            RequestStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Request workflow
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Workflow {
    /// New certificate from a CSR
    Enroll,
    /// New certificate replacing an existing one
    Renew,
    /// Revocation of an existing certificate
    Revoke,
}

/// RFC 5280 revocation reason
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevocationReason {
    /// No reason given
    Unspecified,
    /// Private key compromised
    KeyCompromise,
    /// Replaced by another certificate
    Superseded,
    /// No longer in use
    CessationOfOperation,
}

/// Enrollment input, as resolved by the caller
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnrollRequest {
    /// Enrollment profile
    pub profile: String,
    /// PEM encoded CSR
    pub csr: String,
    /// Labels attached to the certificate
    pub labels: BTreeMap<String, String>,
    /// Certificate owner
    pub owner: Option<String>,
    /// Owning team
    pub team: Option<String>,
    /// Contact email
    pub contact_email: Option<String>,
}

/// Label as sent on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelElement {
    /// Label name
    pub label: String,
    /// Label value
    pub value: String,
}

/// Certificate template of an enroll/renew request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RequestTemplate {
    /// PEM encoded CSR
    pub csr: String,
    /// Labels
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LabelElement>,
    /// Owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Team
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    /// Contact email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
}

/// Body of `POST /api/v1/requests/submit`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Workflow
    pub workflow: Workflow,
    /// Profile (enroll only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Certificate to renew
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
    /// Certificate to revoke
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_pem: Option<String>,
    /// Revocation reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<RevocationReason>,
    /// Enroll/renew template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<RequestTemplate>,
}

impl SubmitRequest {
    /// Enroll request body
    pub fn enroll(request: &EnrollRequest) -> Self {
        Self {
            workflow: Workflow::Enroll,
            profile: Some(request.profile.clone()),
            certificate_id: None,
            certificate_pem: None,
            revocation_reason: None,
            template: Some(RequestTemplate {
                csr: request.csr.clone(),
                labels: request
                    .labels
                    .iter()
                    .map(|(label, value)| LabelElement {
                        label: label.clone(),
                        value: value.clone(),
                    })
                    .collect(),
                owner: request.owner.clone(),
                team: request.team.clone(),
                contact_email: request.contact_email.clone(),
            }),
        }
    }

    /// Renew request body
    pub fn renew(certificate_id: &str, csr: &str) -> Self {
        Self {
            workflow: Workflow::Renew,
            profile: None,
            certificate_id: Some(certificate_id.to_string()),
            certificate_pem: None,
            revocation_reason: None,
            template: Some(RequestTemplate {
                csr: csr.to_string(),
                ..Default::default()
            }),
        }
    }

    /// Revoke request body
    pub fn revoke(certificate_pem: &str, reason: RevocationReason) -> Self {
        Self {
            workflow: Workflow::Revoke,
            profile: None,
            certificate_id: None,
            certificate_pem: Some(certificate_pem.to_string()),
            revocation_reason: Some(reason),
            template: None,
        }
    }
}

/// Certificate attached to a completed request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCertificate {
    /// PKI-side certificate identifier
    pub id: String,
    /// PEM of the certificate, possibly followed by its chain
    pub pem: String,
}

/// A request as returned by the PKI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PkiRequest {
    /// Request identifier
    pub id: String,
    /// Workflow of the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<Workflow>,
    /// Current status
    pub status: RequestStatus,
    /// Issued certificate, once completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<IssuedCertificate>,
}

/// Structured error body returned by the PKI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    /// Error code
    pub error: String,
    /// Error message
    #[serde(default)]
    pub message: String,
}
