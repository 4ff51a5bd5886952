//! Access to the declarative resource store.
//!
//! Reconcilers read and write Kubernetes objects only through
//! [`ResourceStore`]. Every write carries the `resourceVersion` it was based
//! on, so concurrent edits surface as [`ControllerError::Conflict`].

use crate::error::ControllerError;
use crds::annotations::FINALIZER;
use crds::{AnyIssuer, Certificate, CertificateRequest, ClusterIssuer, Issuer, IssuerScope};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use tracing::debug;

/// Reads and writes of the objects the reconcilers work on
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch an issuer of the given scope (`namespace` is ignored for ClusterIssuers)
    async fn get_issuer(
        &self,
        scope: IssuerScope,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AnyIssuer>, ControllerError>;

    /// Fetch a Secret
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, ControllerError>;

    /// Fetch a cert-manager Certificate
    async fn get_certificate(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Certificate>, ControllerError>;

    /// Fetch an Ingress
    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, ControllerError>;

    /// Write the annotation and status changes between `before` and `after`
    async fn persist_certificate_request(
        &self,
        before: &CertificateRequest,
        after: &CertificateRequest,
    ) -> Result<(), ControllerError>;

    /// Add the revocation finalizer, returning the updated request
    async fn add_finalizer(&self, request: &CertificateRequest) -> Result<CertificateRequest, ControllerError>;

    /// Remove the revocation finalizer
    async fn remove_finalizer(&self, request: &CertificateRequest) -> Result<(), ControllerError>;

    /// Write the annotations of a Certificate
    async fn persist_certificate_annotations(&self, certificate: &Certificate) -> Result<(), ControllerError>;

    /// Write the status of an issuer
    async fn persist_issuer_status(&self, issuer: &AnyIssuer) -> Result<(), ControllerError>;
}

fn not_found_as_none<T>(result: Result<T, kube::Error>) -> Result<Option<T>, ControllerError> {
    match result {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
        Err(e) => Err(map_write_error(e)),
    }
}

fn map_write_error(error: kube::Error) -> ControllerError {
    match error {
        kube::Error::Api(e) if e.code == 409 => ControllerError::Conflict(e.message),
        other => ControllerError::Kube(other),
    }
}

fn object_key(meta: &kube::api::ObjectMeta) -> (String, String) {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

/// Finalizer list after adding or removing ours
pub fn finalizers_with(meta: &kube::api::ObjectMeta, present: bool) -> Vec<String> {
    let mut finalizers: Vec<String> = meta
        .finalizers
        .clone()
        .unwrap_or_default()
        .into_iter()
        .filter(|f| f != FINALIZER)
        .collect();
    if present {
        finalizers.push(FINALIZER.to_string());
    }
    finalizers
}

/// [`ResourceStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a store on top of a Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn requests(&self, namespace: &str) -> Api<CertificateRequest> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl ResourceStore for KubeStore {
    async fn get_issuer(
        &self,
        scope: IssuerScope,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AnyIssuer>, ControllerError> {
        match scope {
            IssuerScope::Namespaced => {
                let api: Api<Issuer> = Api::namespaced(self.client.clone(), namespace);
                Ok(api.get_opt(name).await?.map(AnyIssuer::Namespaced))
            }
            IssuerScope::Cluster => {
                let api: Api<ClusterIssuer> = Api::all(self.client.clone());
                Ok(api.get_opt(name).await?.map(AnyIssuer::Cluster))
            }
        }
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, ControllerError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        not_found_as_none(api.get(name).await)
    }

    async fn get_certificate(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Certificate>, ControllerError> {
        let api: Api<Certificate> = Api::namespaced(self.client.clone(), namespace);
        not_found_as_none(api.get(name).await)
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, ControllerError> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        not_found_as_none(api.get(name).await)
    }

    async fn persist_certificate_request(
        &self,
        before: &CertificateRequest,
        after: &CertificateRequest,
    ) -> Result<(), ControllerError> {
        let (namespace, name) = object_key(&after.metadata);
        let api = self.requests(&namespace);
        let mut resource_version = after.metadata.resource_version.clone();

        if before.metadata.annotations != after.metadata.annotations {
            debug!("Updating annotations of CertificateRequest {}/{}", namespace, name);
            let patch = json!({
                "metadata": {
                    "resourceVersion": resource_version,
                    "annotations": after.metadata.annotations,
                }
            });
            let updated = api
                .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
                .map_err(map_write_error)?;
            resource_version = updated.metadata.resource_version;
        }

        if before.status != after.status {
            debug!("Updating status of CertificateRequest {}/{}", namespace, name);
            let patch = json!({
                "metadata": { "resourceVersion": resource_version },
                "status": after.status,
            });
            api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
                .map_err(map_write_error)?;
        }

        Ok(())
    }

    async fn add_finalizer(&self, request: &CertificateRequest) -> Result<CertificateRequest, ControllerError> {
        let (namespace, name) = object_key(&request.metadata);
        let patch = json!({
            "metadata": {
                "resourceVersion": request.metadata.resource_version,
                "finalizers": finalizers_with(&request.metadata, true),
            }
        });
        self.requests(&namespace)
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(map_write_error)
    }

    async fn remove_finalizer(&self, request: &CertificateRequest) -> Result<(), ControllerError> {
        let (namespace, name) = object_key(&request.metadata);
        let patch = json!({
            "metadata": {
                "resourceVersion": request.metadata.resource_version,
                "finalizers": finalizers_with(&request.metadata, false),
            }
        });
        self.requests(&namespace)
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn persist_certificate_annotations(&self, certificate: &Certificate) -> Result<(), ControllerError> {
        let (namespace, name) = object_key(&certificate.metadata);
        let api: Api<Certificate> = Api::namespaced(self.client.clone(), &namespace);
        let patch = json!({
            "metadata": {
                "resourceVersion": certificate.metadata.resource_version,
                "annotations": certificate.metadata.annotations,
            }
        });
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn persist_issuer_status(&self, issuer: &AnyIssuer) -> Result<(), ControllerError> {
        let patch = json!({ "status": issuer.status() });
        match issuer {
            AnyIssuer::Namespaced(i) => {
                let (namespace, name) = object_key(&i.metadata);
                let api: Api<Issuer> = Api::namespaced(self.client.clone(), &namespace);
                api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await
                    .map_err(map_write_error)?;
            }
            AnyIssuer::Cluster(i) => {
                let api: Api<ClusterIssuer> = Api::all(self.client.clone());
                api.patch_status(i.metadata.name.as_deref().unwrap_or_default(), &PatchParams::default(), &Patch::Merge(&patch))
                    .await
                    .map_err(map_write_error)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    #[test]
    fn test_finalizers_with_keeps_foreign_entries() {
        let meta = ObjectMeta {
            finalizers: Some(vec!["other.io/keep".to_string(), FINALIZER.to_string()]),
            ..Default::default()
        };
        assert_eq!(finalizers_with(&meta, false), vec!["other.io/keep".to_string()]);
        assert_eq!(
            finalizers_with(&meta, true),
            vec!["other.io/keep".to_string(), FINALIZER.to_string()]
        );
        assert_eq!(finalizers_with(&ObjectMeta::default(), true), vec![FINALIZER.to_string()]);
    }
}
