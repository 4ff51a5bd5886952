//! Typed subset of the cert-manager resources this controller works with
//!
//! Only the fields read or written by the issuer are modelled. Unknown fields
//! are dropped on deserialization, so these types are never used to create
//! the resources, only to read them and to replace their status and metadata.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::issuer::ConditionStatus;
use crate::references::IssuerReference;

/// Request is ready (or not) and why
pub const CONDITION_READY: &str = "Ready";
/// Set by an approval controller when the request may be signed
pub const CONDITION_APPROVED: &str = "Approved";
/// Set by an approval controller (or the PKI) when the request must not be signed
pub const CONDITION_DENIED: &str = "Denied";
/// The request is malformed and will never be signed
pub const CONDITION_INVALID_REQUEST: &str = "InvalidRequest";
/// Condition on a Certificate while a new request is in flight
pub const CONDITION_ISSUING: &str = "Issuing";

/// `Ready=False` while awaiting the PKI
pub const REASON_PENDING: &str = "Pending";
/// `Ready=True` once signed
pub const REASON_ISSUED: &str = "Issued";
/// `Ready=False` when the request can never be signed
pub const REASON_FAILED: &str = "Failed";
/// `Ready=False` after a denial
pub const REASON_DENIED: &str = "Denied";

/// CertificateRequestSpec (subset of `cert-manager.io/v1`)
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "CertificateRequest",
    namespaced,
    status = "CertificateRequestStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequestSpec {
    /// Base64 encoded PEM CSR
    pub request: String,

    /// Issuer that should sign the request
    pub issuer_ref: IssuerReference,

    /// Requested certificate lifetime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    /// Whether a CA certificate is requested
    #[serde(default, rename = "isCA", skip_serializing_if = "std::ops::Not::not")]
    pub is_ca: bool,
}

/// CertificateRequestStatus (subset)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequestStatus {
    /// Ready, Approved, Denied and InvalidRequest conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<RequestCondition>,

    /// Base64 encoded PEM of the signed certificate (leaf plus intermediates)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,

    /// Base64 encoded PEM of the root CA, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,

    /// Time the request failed permanently
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_time: Option<DateTime<Utc>>,
}

/// Condition on a CertificateRequest or Certificate
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestCondition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,

    /// Condition status
    pub status: ConditionStatus,

    /// Machine readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the status changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl RequestCondition {
    /// Whether the condition status is True
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    /// Reason, empty if unset
    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or_default()
    }
}

fn find<'a>(conditions: &'a [RequestCondition], type_: &str) -> Option<&'a RequestCondition> {
    conditions.iter().find(|c| c.type_ == type_)
}

impl CertificateRequestStatus {
    /// Returns the condition of the given type
    pub fn condition(&self, type_: &str) -> Option<&RequestCondition> {
        find(&self.conditions, type_)
    }

    /// Whether the condition of the given type is True
    pub fn has_true(&self, type_: &str) -> bool {
        self.condition(type_).is_some_and(RequestCondition::is_true)
    }

    /// Whether `Ready` has the given status and reason
    pub fn ready_is(&self, status: ConditionStatus, reason: &str) -> bool {
        self.condition(CONDITION_READY)
            .is_some_and(|c| c.status == status && c.reason() == reason)
    }

    /// Sets a condition.
    ///
    /// `lastTransitionTime` is only updated when the status changes.
    pub fn set_condition(
        &mut self,
        type_: &str,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        now: DateTime<Utc>,
    ) {
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            if existing.status != status {
                existing.status = status;
                existing.last_transition_time = Some(now);
            }
            existing.reason = Some(reason.to_string());
            existing.message = Some(message.to_string());
            return;
        }
        self.conditions.push(RequestCondition {
            type_: type_.to_string(),
            status,
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            last_transition_time: Some(now),
        });
    }

    /// Records the failure time unless one is already set
    pub fn mark_failed_once(&mut self, now: DateTime<Utc>) {
        if self.failure_time.is_none() {
            self.failure_time = Some(now);
        }
    }

    /// Stores the PEM certificate and optional CA PEM, base64 encoded
    pub fn set_issued(&mut self, certificate_pem: &[u8], ca_pem: Option<&[u8]>) {
        self.certificate = Some(STANDARD.encode(certificate_pem));
        self.ca = ca_pem.map(|ca| STANDARD.encode(ca));
    }

    /// Decoded PEM certificate, if any was issued
    pub fn certificate_pem(&self) -> Result<Option<Vec<u8>>, base64::DecodeError> {
        self.certificate
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(|c| STANDARD.decode(c))
            .transpose()
    }
}

impl CertificateRequestSpec {
    /// Decoded PEM CSR
    pub fn csr_pem(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.request)
    }
}

/// CertificateSpec (subset of `cert-manager.io/v1`)
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Certificate",
    namespaced,
    status = "CertificateStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    /// Secret receiving the signed key pair
    pub secret_name: String,

    /// Issuer of the certificate
    pub issuer_ref: IssuerReference,

    /// Requested common name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,

    /// Requested DNS names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,
}

/// CertificateStatus (subset)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateStatus {
    /// Ready and Issuing conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<RequestCondition>,
}

impl CertificateStatus {
    /// Returns the condition of the given type
    pub fn condition(&self, type_: &str) -> Option<&RequestCondition> {
        find(&self.conditions, type_)
    }

    /// Reason of the `Issuing` condition, if the Certificate is issuing
    pub fn issuing_reason(&self) -> Option<&str> {
        self.condition(CONDITION_ISSUING)
            .filter(|c| c.is_true())
            .map(RequestCondition::reason)
    }
}
