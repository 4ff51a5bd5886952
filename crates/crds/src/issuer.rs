//! Issuer and ClusterIssuer Custom Resource Definitions
//!
//! Both kinds share one spec and one status shape. They differ only in scope,
//! which decides where the credential Secret is looked up (see [`IssuerScope`]).

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::references::IssuerScope;

/// API group served by this controller
pub const GROUP: &str = "pki.microscaler.io";

/// IssuerSpec describes how to reach the PKI and which enrollment attributes to apply
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "pki.microscaler.io",
    version = "v1alpha1",
    kind = "Issuer",
    namespaced,
    derive = "PartialEq",
    status = "IssuerStatus",
    printcolumn = r#"{"name":"Profile","type":"string","jsonPath":".spec.profile"}"#,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".spec.url"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSpec {
    /// Base URL of the PKI (e.g., "https://pki.example.com")
    pub url: String,

    /// Proxy URL used to reach the PKI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// Enrollment profile on the PKI side
    pub profile: String,

    /// Name of the Secret holding the PKI credentials.
    ///
    /// For an Issuer the Secret lives in the Issuer's namespace; for a
    /// ClusterIssuer it lives in the cluster resource namespace.
    pub auth_secret_name: String,

    /// PEM bundle used to trust the PKI endpoint certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,

    /// Accept untrusted PKI endpoint certificates
    #[serde(default, rename = "skipTLSVerify")]
    pub skip_tls_verify: bool,

    /// Revoke the issued certificate when its CertificateRequest is deleted
    #[serde(default)]
    pub revoke_certificates: bool,

    /// Attributes applied unless a Certificate (or its Ingress) sets them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_template: Option<AttributeTemplate>,

    /// Attributes that always win over annotations and defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_template: Option<AttributeTemplate>,

    /// Require every subject name of a CSR to resolve before submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_checker: Option<DnsChecker>,
}

/// Enrollment attributes attached to issued certificates
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttributeTemplate {
    /// Labels attached to the certificate on the PKI side
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Certificate owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Owning team
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,

    /// Contact email for the certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
}

/// DNS server used for subject-name ownership checks
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DnsChecker {
    /// Address of the DNS server ("10.0.0.53" or "10.0.0.53:53")
    pub server: String,
}

/// IssuerStatus holds the issuer readiness condition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerStatus {
    /// Known condition types are `Ready`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<IssuerCondition>,
}

/// Issuer condition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerCondition {
    /// Condition type (only `Ready` is used)
    #[serde(rename = "type")]
    pub type_: String,

    /// True, False or Unknown
    pub status: ConditionStatus,

    /// Last time the status changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    /// Machine readable reason
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Human readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Kubernetes condition status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    /// The condition holds
    True,
    /// The condition does not hold
    False,
    /// Not known yet
    #[default]
    Unknown,
}

/// Condition type for issuer readiness
pub const ISSUER_CONDITION_READY: &str = "Ready";

impl IssuerStatus {
    /// Returns the `Ready` condition, if any
    pub fn ready_condition(&self) -> Option<&IssuerCondition> {
        self.conditions.iter().find(|c| c.type_ == ISSUER_CONDITION_READY)
    }

    /// Whether the issuer reports `Ready=True`
    pub fn is_ready(&self) -> bool {
        self.ready_condition()
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Sets the `Ready` condition.
    ///
    /// The transition time only moves when the status changes.
    pub fn set_ready_condition(
        &mut self,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        now: DateTime<Utc>,
    ) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.type_ == ISSUER_CONDITION_READY)
        {
            Some(ready) => {
                if ready.status != status {
                    ready.status = status;
                    ready.last_transition_time = Some(now);
                }
                ready.reason = reason.to_string();
                ready.message = message.to_string();
            }
            None => self.conditions.push(IssuerCondition {
                type_: ISSUER_CONDITION_READY.to_string(),
                status,
                last_transition_time: Some(now),
                reason: reason.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

/// ClusterIssuer is the cluster-scoped twin of [`Issuer`]
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "pki.microscaler.io",
    version = "v1alpha1",
    kind = "ClusterIssuer",
    derive = "PartialEq",
    status = "IssuerStatus",
    printcolumn = r#"{"name":"Profile","type":"string","jsonPath":".spec.profile"}"#,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".spec.url"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#
)]
#[serde(transparent)]
pub struct ClusterIssuerSpec(pub IssuerSpec);

/// Either issuer kind, tagged by its scope.
///
/// The reconcilers work on this type so that Issuer and ClusterIssuer share
/// every code path.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyIssuer {
    /// Namespaced issuer
    Namespaced(Issuer),
    /// Cluster-scoped issuer
    Cluster(ClusterIssuer),
}

impl AnyIssuer {
    /// Scope of the wrapped issuer
    pub fn scope(&self) -> IssuerScope {
        match self {
            AnyIssuer::Namespaced(_) => IssuerScope::Namespaced,
            AnyIssuer::Cluster(_) => IssuerScope::Cluster,
        }
    }

    /// Object name
    pub fn name(&self) -> &str {
        let name = match self {
            AnyIssuer::Namespaced(i) => i.metadata.name.as_deref(),
            AnyIssuer::Cluster(i) => i.metadata.name.as_deref(),
        };
        name.unwrap_or_default()
    }

    /// Object namespace (None for cluster-scoped issuers)
    pub fn namespace(&self) -> Option<&str> {
        match self {
            AnyIssuer::Namespaced(i) => i.metadata.namespace.as_deref(),
            AnyIssuer::Cluster(_) => None,
        }
    }

    /// Shared spec
    pub fn spec(&self) -> &IssuerSpec {
        match self {
            AnyIssuer::Namespaced(i) => &i.spec,
            AnyIssuer::Cluster(i) => &i.spec.0,
        }
    }

    /// Current status, or an empty one if none was persisted yet
    pub fn status(&self) -> IssuerStatus {
        match self {
            AnyIssuer::Namespaced(i) => i.status.clone(),
            AnyIssuer::Cluster(i) => i.status.clone(),
        }
        .unwrap_or_default()
    }

    /// Replaces the status
    pub fn set_status(&mut self, status: IssuerStatus) {
        match self {
            AnyIssuer::Namespaced(i) => i.status = Some(status),
            AnyIssuer::Cluster(i) => i.status = Some(status),
        }
    }

    /// Whether the issuer reports `Ready=True`
    pub fn is_ready(&self) -> bool {
        self.status().is_ready()
    }

    /// Namespace holding the credential Secret for this issuer
    pub fn secret_namespace<'a>(&'a self, cluster_resource_namespace: &'a str) -> &'a str {
        self.scope()
            .secret_namespace(self.namespace(), cluster_resource_namespace)
    }
}
