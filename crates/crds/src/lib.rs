//! PKIops CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the PKI issuer controller, plus
//! the subset of the cert-manager resources it reads and updates.

pub mod annotations;
pub mod cert_manager;
pub mod issuer;
pub mod references;

pub use annotations::RequestLedger;
pub use cert_manager::*;
pub use issuer::*;
pub use references::*;
