//! Issuer health.
//!
//! A new issuer is first marked `Unknown/FirstSeen` without contacting the
//! PKI. Later passes build a client from the issuer settings and make one
//! authenticated call; the result becomes the `Ready` condition.

use super::Context;
use super::conditions::{MESSAGE_FIRST_SEEN, MESSAGE_HEALTHY, REASON_ERROR, REASON_FIRST_SEEN, REASON_SUCCESS};
use crate::error::ControllerError;
use chrono::Utc;
use crds::{AnyIssuer, ConditionStatus};
use kube_runtime::controller::Action;
use tracing::{error, info};

/// Reconciles one Issuer or ClusterIssuer
pub async fn reconcile(issuer: AnyIssuer, ctx: &Context) -> Result<Action, ControllerError> {
    let mut issuer = issuer;
    let kind = issuer.scope().kind();
    let before = issuer.status();
    let mut status = before.clone();

    if status.ready_condition().is_none() {
        info!("{} {} seen for the first time", kind, issuer.name());
        status.set_ready_condition(
            ConditionStatus::Unknown,
            REASON_FIRST_SEEN,
            MESSAGE_FIRST_SEEN,
            Utc::now(),
        );
        issuer.set_status(status);
        ctx.store.persist_issuer_status(&issuer).await?;
        return Ok(Action::await_change());
    }

    let probe = async {
        let client = ctx.client_for(&issuer).await?;
        client.check_health().await?;
        Ok::<(), ControllerError>(())
    }
    .await;

    let outcome = match probe {
        Ok(()) => {
            info!("{} {} is healthy", kind, issuer.name());
            status.set_ready_condition(ConditionStatus::True, REASON_SUCCESS, MESSAGE_HEALTHY, Utc::now());
            Ok(Action::requeue(ctx.config.health_check_interval))
        }
        Err(e) => {
            error!("Health check of {} {} failed: {}", kind, issuer.name(), e);
            status.set_ready_condition(ConditionStatus::False, REASON_ERROR, &e.to_string(), Utc::now());
            Err(e)
        }
    };

    if status == before {
        return outcome;
    }
    issuer.set_status(status);
    let persisted = ctx.store.persist_issuer_status(&issuer).await;
    match (outcome, persisted) {
        (Ok(action), Ok(())) => Ok(action),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(persistence)) => Err(e.aggregate(vec![persistence])),
    }
}
