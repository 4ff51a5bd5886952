//! Controller-specific error types.
//!
//! `ControllerError` carries context; `ErrorKind` is the closed classification
//! the reconcilers branch on.

use kube::Error as KubeError;
use pki_client::PkiError;
use thiserror::Error;

/// Errors that can occur in the PKI issuer controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// PKI API error
    #[error("PKI error: {0}")]
    Pki(#[from] PkiError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Issuer reference cannot be used
    #[error("Invalid issuer reference: {0}")]
    IssuerRef(#[from] crds::ReferenceError),

    /// Referenced issuer does not exist
    #[error("Issuer not found: {0}")]
    IssuerNotFound(String),

    /// Credential Secret missing or unusable
    #[error("Invalid credentials: {0}")]
    Credentials(String),

    /// CSR cannot be decoded or parsed
    #[error("Invalid CSR: {0}")]
    InvalidCsr(String),

    /// A subject name failed the DNS ownership check
    #[error("Certificate failed the DNS validation: {0}")]
    DnsValidation(String),

    /// Parent Certificate referenced by a request is missing
    #[error("Parent certificate not found: {0}")]
    MissingParent(String),

    /// Write rejected because the object changed since it was read
    #[error("Update conflict: {0}")]
    Conflict(String),

    /// Original failure plus persistence failures that followed it
    #[error("{source}; additionally failed to persist: {}", .persistence.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Aggregate {
        /// The reconcile failure
        source: Box<ControllerError>,
        /// Failures while persisting the outcome
        persistence: Vec<ControllerError>,
    },

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

/// Classification of failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad issuer, Secret or client settings; fixed by editing them
    Configuration,
    /// Network or server trouble; retried
    Transient,
    /// Input the PKI or the controller will never accept
    MalformedRequest,
    /// Structured refusal by the PKI
    PkiRejection,
    /// Writing back to the API server failed
    Persistence,
}

impl ControllerError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControllerError::Kube(_) | ControllerError::Conflict(_) => ErrorKind::Persistence,
            ControllerError::Pki(e) => match e {
                PkiError::Rejected { .. } => ErrorKind::PkiRejection,
                PkiError::InvalidConfig(_) | PkiError::Authentication(_) => ErrorKind::Configuration,
                PkiError::Http(_)
                | PkiError::NotFound(_)
                | PkiError::Serialization(_)
                | PkiError::InvalidResponse(_) => ErrorKind::Transient,
            },
            ControllerError::InvalidConfig(_)
            | ControllerError::IssuerRef(_)
            | ControllerError::IssuerNotFound(_)
            | ControllerError::Credentials(_) => ErrorKind::Configuration,
            ControllerError::InvalidCsr(_) => ErrorKind::MalformedRequest,
            ControllerError::DnsValidation(_)
            | ControllerError::MissingParent(_)
            | ControllerError::Watch(_) => ErrorKind::Transient,
            ControllerError::Aggregate { source, .. } => source.kind(),
        }
    }

    /// Attach persistence failures to this error
    pub fn aggregate(self, persistence: Vec<ControllerError>) -> ControllerError {
        if persistence.is_empty() {
            return self;
        }
        ControllerError::Aggregate {
            source: Box::new(self),
            persistence,
        }
    }
}
