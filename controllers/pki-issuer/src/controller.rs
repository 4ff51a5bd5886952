//! Controller wiring.
//!
//! Runs one kube-runtime controller per watched kind:
//! - CertificateRequest: request lifecycle and revocation guard
//! - Issuer and ClusterIssuer: health probes
//!
//! Failed reconciles are retried with a per-object Fibonacci backoff that is
//! reset by the next successful reconcile of the same object.

use crate::error::ControllerError;
use crate::reconciler::{Context, certificate_request, issuer as issuer_health};
use crds::{AnyIssuer, CertificateRequest, ClusterIssuer, Issuer};
use futures::StreamExt;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::{self, Action, Controller};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

type ReconcileResult<K> = Result<(ObjectRef<K>, Action), controller::Error<ControllerError, watcher::Error>>;

/// Backoff key of an object
fn object_key<K: Resource<DynamicType = ()>>(obj: &K) -> String {
    match obj.meta().namespace.as_deref() {
        Some(namespace) => format!("{}/{}/{}", K::kind(&()), namespace, obj.name_any()),
        None => format!("{}/{}", K::kind(&()), obj.name_any()),
    }
}

fn settle<K: Resource<DynamicType = ()>>(
    obj: &K,
    ctx: &Context,
    result: Result<Action, ControllerError>,
) -> Result<Action, ControllerError> {
    if result.is_ok() {
        ctx.reset_backoff(&object_key(obj));
    }
    result
}

async fn reconcile_request(request: Arc<CertificateRequest>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let result = certificate_request::reconcile(&request, &ctx).await;
    settle(request.as_ref(), &ctx, result)
}

async fn reconcile_issuer(issuer: Arc<Issuer>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let result = issuer_health::reconcile(AnyIssuer::Namespaced(issuer.as_ref().clone()), &ctx).await;
    settle(issuer.as_ref(), &ctx, result)
}

async fn reconcile_cluster_issuer(issuer: Arc<ClusterIssuer>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let result = issuer_health::reconcile(AnyIssuer::Cluster(issuer.as_ref().clone()), &ctx).await;
    settle(issuer.as_ref(), &ctx, result)
}

/// Requeue a failed object after its next backoff delay
fn error_policy<K: Resource<DynamicType = ()>>(obj: Arc<K>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    let key = object_key(obj.as_ref());
    let delay = ctx.next_backoff(&key);
    warn!(
        "Reconcile of {} failed ({:?}), retrying in {}s: {}",
        key,
        error.kind(),
        delay.as_secs(),
        error
    );
    Action::requeue(delay)
}

fn report<K: Resource<DynamicType = ()>>(result: ReconcileResult<K>) {
    match result {
        Ok((obj, action)) => debug!("Reconciled {} ({:?})", obj, action),
        Err(controller::Error::ReconcilerFailed(e, obj)) => error!("Reconcile of {} failed: {}", obj, e),
        Err(e) => error!("{}", ControllerError::Watch(e.to_string())),
    }
}

/// Runs the controllers until a shutdown signal is received
pub async fn run(client: Client, ctx: Arc<Context>) {
    let (requests, issuers): (Api<CertificateRequest>, Api<Issuer>) = match ctx.config.watch_namespace.as_deref() {
        Some(namespace) => (
            Api::namespaced(client.clone(), namespace),
            Api::namespaced(client.clone(), namespace),
        ),
        None => (Api::all(client.clone()), Api::all(client.clone())),
    };
    let cluster_issuers: Api<ClusterIssuer> = Api::all(client);

    info!("Starting controllers:");
    info!("  - CertificateRequest controller");
    info!("  - Issuer controller");
    info!("  - ClusterIssuer controller");

    let request_controller = Controller::new(requests, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile_request, error_policy::<CertificateRequest>, Arc::clone(&ctx))
        .for_each(|result| async move { report(result) });

    let issuer_controller = Controller::new(issuers, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile_issuer, error_policy::<Issuer>, Arc::clone(&ctx))
        .for_each(|result| async move { report(result) });

    let cluster_issuer_controller = Controller::new(cluster_issuers, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile_cluster_issuer, error_policy::<ClusterIssuer>, ctx)
        .for_each(|result| async move { report(result) });

    tokio::join!(request_controller, issuer_controller, cluster_issuer_controller);
    info!("Controllers stopped");
}
