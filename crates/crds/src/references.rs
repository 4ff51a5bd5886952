//! Issuer references and issuer scope
//!
//! A CertificateRequest names its issuer with a `{name, kind, group}` triple.
//! This module turns that triple into a typed scope so the reconcilers never
//! compare kind strings themselves.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::issuer::GROUP;

/// Kind name of the namespaced issuer
pub const ISSUER_KIND: &str = "Issuer";

/// Kind name of the cluster-scoped issuer
pub const CLUSTER_ISSUER_KIND: &str = "ClusterIssuer";

/// Reference from a CertificateRequest to its issuer
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IssuerReference {
    /// Name of the issuer
    pub name: String,

    /// Kind of the issuer (`Issuer` when empty)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// API group of the issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Reference errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// Kind is neither Issuer nor ClusterIssuer
    #[error("unknown issuer kind {0:?}")]
    UnknownKind(String),

    /// Empty issuer name
    #[error("issuer reference has no name")]
    MissingName,
}

impl IssuerReference {
    /// Whether this reference targets the `pki.microscaler.io` group
    pub fn targets_this_group(&self) -> bool {
        self.group.as_deref() == Some(GROUP)
    }

    /// Resolve the referenced kind into a scope
    pub fn scope(&self) -> Result<IssuerScope, ReferenceError> {
        if self.name.is_empty() {
            return Err(ReferenceError::MissingName);
        }
        match self.kind.as_deref() {
            None | Some("") | Some(ISSUER_KIND) => Ok(IssuerScope::Namespaced),
            Some(CLUSTER_ISSUER_KIND) => Ok(IssuerScope::Cluster),
            Some(other) => Err(ReferenceError::UnknownKind(other.to_string())),
        }
    }
}

/// Issuer scope discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssuerScope {
    /// `Issuer`, lives next to its requests
    Namespaced,
    /// `ClusterIssuer`, serves every namespace
    Cluster,
}

impl IssuerScope {
    /// Namespace in which an issuer of this scope is looked up.
    ///
    /// Returns None for cluster-scoped issuers.
    pub fn issuer_namespace<'a>(&self, request_namespace: &'a str) -> Option<&'a str> {
        match self {
            IssuerScope::Namespaced => Some(request_namespace),
            IssuerScope::Cluster => None,
        }
    }

    /// Namespace holding the issuer's credential Secret
    pub fn secret_namespace<'a>(
        &self,
        issuer_namespace: Option<&'a str>,
        cluster_resource_namespace: &'a str,
    ) -> &'a str {
        match (self, issuer_namespace) {
            (IssuerScope::Namespaced, Some(ns)) => ns,
            _ => cluster_resource_namespace,
        }
    }

    /// Kind name of this scope
    pub fn kind(&self) -> &'static str {
        match self {
            IssuerScope::Namespaced => ISSUER_KIND,
            IssuerScope::Cluster => CLUSTER_ISSUER_KIND,
        }
    }
}
