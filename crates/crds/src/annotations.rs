//! Annotation keys and the typed request ledger
//!
//! The controller keeps its cross-reconcile state in annotations. Reads and
//! writes go through [`RequestLedger`]; nothing in this crate removes a
//! ledger entry.

use kube::api::ObjectMeta;

/// PKI-side identifier of the submitted request
pub const REQUEST_ID: &str = "pki.microscaler.io/request-id";
/// PKI-side identifier of the issued certificate
pub const CERTIFICATE_ID: &str = "pki.microscaler.io/certificate-id";
/// Identifier of the last certificate issued for a Certificate, used to renew it
pub const LAST_CERTIFICATE_ID: &str = "pki.microscaler.io/last-certificate-id";

/// Certificate owner attribute
pub const OWNER: &str = "pki.microscaler.io/owner";
/// Owning team attribute
pub const TEAM: &str = "pki.microscaler.io/team";
/// Contact email attribute
pub const CONTACT_EMAIL: &str = "pki.microscaler.io/contact-email";
/// Prefix of label attributes (`pki.microscaler.io/labels.<key>`)
pub const LABELS_PREFIX: &str = "pki.microscaler.io/labels.";

/// Set by cert-manager on each CertificateRequest, names the parent Certificate
pub const CERTIFICATE_NAME: &str = "cert-manager.io/certificate-name";

/// Finalizer guarding revocation on delete
pub const FINALIZER: &str = "pki.microscaler.io/finalizer";

fn get<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

fn put(meta: &mut ObjectMeta, key: &str, value: &str) -> bool {
    let annotations = meta.annotations.get_or_insert_with(Default::default);
    if annotations.get(key).map(String::as_str) == Some(value) {
        return false;
    }
    annotations.insert(key.to_string(), value.to_string());
    true
}

/// Typed view over the request side-channel annotations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestLedger {
    /// PKI request id, present once submitted
    pub request_id: Option<String>,
    /// PKI certificate id, present once issued
    pub certificate_id: Option<String>,
}

impl RequestLedger {
    /// Reads the ledger from object metadata
    pub fn read(meta: &ObjectMeta) -> Self {
        Self {
            request_id: get(meta, REQUEST_ID).map(str::to_string),
            certificate_id: get(meta, CERTIFICATE_ID).map(str::to_string),
        }
    }

    /// Records the PKI request id.
    ///
    /// An existing id is kept; returns whether the metadata changed.
    pub fn record_request_id(meta: &mut ObjectMeta, request_id: &str) -> bool {
        if request_id.is_empty() || get(meta, REQUEST_ID).is_some() {
            return false;
        }
        put(meta, REQUEST_ID, request_id)
    }

    /// Records the PKI certificate id; returns whether the metadata changed
    pub fn record_certificate_id(meta: &mut ObjectMeta, certificate_id: &str) -> bool {
        if certificate_id.is_empty() {
            return false;
        }
        put(meta, CERTIFICATE_ID, certificate_id)
    }

    /// Last certificate id linked on a parent Certificate
    pub fn last_certificate_id(parent: &ObjectMeta) -> Option<&str> {
        get(parent, LAST_CERTIFICATE_ID)
    }

    /// Links a parent Certificate to a newly issued certificate id.
    ///
    /// Returns whether the metadata changed.
    pub fn link_last_certificate_id(parent: &mut ObjectMeta, certificate_id: &str) -> bool {
        if certificate_id.is_empty() {
            return false;
        }
        put(parent, LAST_CERTIFICATE_ID, certificate_id)
    }
}

/// Name of the parent Certificate recorded on a CertificateRequest
pub fn parent_certificate_name(meta: &ObjectMeta) -> Option<&str> {
    get(meta, CERTIFICATE_NAME)
}

/// Whether the object carries the revocation finalizer
pub fn has_finalizer(meta: &ObjectMeta) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == FINALIZER))
}
