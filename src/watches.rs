// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller wiring.
//!
//! The controller watches `CDI` resources and every kind the operator deploys.
//! Events on an owned object map to its controlling `CDI` resource, so drift
//! in any deployed object triggers a reconcile. Platform specific kinds are
//! probed once at startup and only watched when the cluster serves them.

use crate::cluster::ClusterApi;
use crate::constants::ERROR_REQUEUE_DURATION_SECS;
use crate::context::Context;
use crate::crd::CDI;
use crate::kinds::KindRegistry;
use crate::reconcilers::reconcile_instance;
use anyhow::{Context as _, Result};
use futures::StreamExt;
use kube::api::DynamicObject;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config;
use kube::runtime::Controller;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ReconcileError(#[from] anyhow::Error);

/// Resolve which optional kinds the cluster serves.
///
/// Each optional kind is probed with a single item LIST. A kind the server
/// does not know is skipped.
///
/// # Errors
///
/// Any probe failure other than "not found" is fatal.
pub async fn probe_kinds(cluster: &dyn ClusterApi) -> Result<KindRegistry> {
    let registry = KindRegistry::new();
    let mut present = Vec::new();
    for info in registry.optional_kinds() {
        let served = cluster
            .kind_exists(info)
            .await
            .with_context(|| format!("failed to probe for kind {}", info.kind()))?;
        if served {
            info!(kind = %info.kind(), "Optional kind is served, watching it");
            present.push(info.kind().to_string());
        } else {
            info!(kind = %info.kind(), "Optional kind is not served, skipping");
        }
    }
    Ok(registry.with_present(present))
}

/// Run the `CDI` controller until shutdown.
///
/// # Errors
///
/// Returns an error only if the controller cannot be started.
pub async fn run_controller(client: Client, ctx: Arc<Context>) -> Result<()> {
    info!("Starting CDI controller");

    let api = Api::<CDI>::all(client.clone());
    let mut controller = Controller::new(api, Config::default());
    for info in ctx.kinds.dependant_kinds() {
        debug!(kind = %info.kind(), "Watching owned kind");
        let owned = Api::<DynamicObject>::all_with(client.clone(), &info.api_resource);
        controller = controller.owns_with(owned, info.api_resource.clone(), Config::default());
    }

    controller
        .shutdown_on_signal()
        .run(reconcile_wrapper, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(cdi = %object.name, "Reconciled CDI"),
                Err(e) => warn!(error = %e, "CDI reconcile failed"),
            }
        })
        .await;

    info!("CDI controller stopped");
    Ok(())
}

/// Reconcile wrapper for `CDI`
async fn reconcile_wrapper(cdi: Arc<CDI>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let name = cdi.name_any();
    debug!(cdi = %name, "Reconcile wrapper called for CDI");

    match reconcile_instance(&name, &ctx).await {
        Ok(action) => {
            debug!(cdi = %name, action = ?action, "Successfully reconciled CDI");
            Ok(action)
        }
        Err(e) => {
            error!("Failed to reconcile CDI {}: {:#}", name, e);
            Err(e.into())
        }
    }
}

/// Error policy for the `CDI` controller
fn error_policy(_cdi: Arc<CDI>, _err: &ReconcileError, _ctx: Arc<Context>) -> Action {
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

#[cfg(test)]
#[path = "watches_tests.rs"]
mod watches_tests;
