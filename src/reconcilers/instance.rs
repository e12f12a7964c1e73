// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `CDI` reconciliation logic.
//!
//! One reconcile walks the installation state machine for a single `CDI`
//! resource:
//!
//! - the ownership gate decides whether this resource may drive the install
//! - the create path claims the install and initialises status
//! - the update path detects upgrades, converges the desired set, keeps
//!   certificates current and evaluates readiness
//! - the deletion path honours the uninstall strategy and tears down what the
//!   cleanup hooks own
//!
//! Status is accumulated in a [`CdiStatusUpdater`] and written at the few
//! points where it must persist.

use super::cleanup::{cleanup_unused_resources, uninstall, workloads_exist};
use super::finalizers::{ensure_finalizer, remove_finalizer};
use super::readiness::check_degraded;
use super::route::inject_user_routes;
use super::scc::ensure_scc_exists;
use super::status::CdiStatusUpdater;
use super::upgrade::should_take_update_path;
use crate::certs::{CertManager, CertOverrides, CertificateDefinition};
use crate::cluster::ClusterApi;
use crate::config::FactoryArgs;
use crate::constants::{
    CA_BUNDLE_KEY, CONTROLLER_SERVICE_ACCOUNT_NAME, KIND_CDI, OWNER_GONE_REQUEUE_SECS,
};
use crate::context::Context;
use crate::crd::{Phase, UninstallStrategy, CDI};
use crate::differ::Converger;
use crate::errors::{OperatorError, Result as OperatorResult};
use crate::kinds::{KindRegistry, KIND_CONFIG_MAP};
use crate::labels::FINALIZER_CDI;
use crate::metrics;
use crate::ownership::{
    check_ownership, create_ownership_configmap, owns_installation, OwnershipState,
};
use crate::patches::Customizer;
use crate::resources::certs::{definitions, APISERVER_SIGNER_BUNDLE, UPLOADPROXY_SIGNER_BUNDLE};
use crate::resources::{bundle_resources, desired_resources, CaBundles};
use crate::status_reasons::{
    reconcile_failed_message, upgrade_started_message, ACTION_UNINSTALL, ACTION_UPDATE,
    EVENT_UNINSTALL_BLOCKED, MESSAGE_CONFIG_MISSING, MESSAGE_DEPLOY_COMPLETED,
    MESSAGE_DEPLOY_STARTED, MESSAGE_UNINSTALL_BLOCKED, MESSAGE_UNWANTED_CR,
    REASON_CONFIG_ERROR, REASON_CUSTOMIZATION_FAILED, REASON_DEPLOYMENT_NOT_READY,
    REASON_DEPLOY_COMPLETED, REASON_DEPLOY_STARTED, REASON_DOWNGRADE_REFUSED,
    REASON_INVALID_CERT_CONFIG, REASON_RECONCILE_FAILED, REASON_UNINSTALL_BLOCKED,
    REASON_UNWANTED_CR, REASON_UPGRADE_STARTED,
};
use anyhow::{anyhow, Result};
use chrono::Utc;
use kube::api::DynamicObject;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Reconcile the `CDI` resource called `name`.
///
/// Records reconciliation metrics around [`reconcile_cdi`].
///
/// # Errors
///
/// Returns an error when the reconcile should be retried through the
/// controller error policy.
pub async fn reconcile_instance(name: &str, ctx: &Context) -> Result<Action> {
    let start = Instant::now();
    let result = reconcile_cdi(name, ctx).await;
    match &result {
        Ok(_) => metrics::record_reconciliation_success(KIND_CDI, start.elapsed()),
        Err(e) => {
            error!(cdi = %name, error = %e, "Failed to reconcile CDI");
            metrics::record_reconciliation_error(KIND_CDI, start.elapsed());
        }
    }
    result
}

async fn reconcile_cdi(name: &str, ctx: &Context) -> Result<Action> {
    let cluster = ctx.cluster.as_ref();
    let namespace = ctx.args.namespace.as_str();

    let Some(cdi) = cluster.get_instance(name).await? else {
        debug!(cdi = %name, "CDI not found, nothing to do");
        return Ok(Action::await_change());
    };

    if cdi.metadata.deletion_timestamp.is_some() {
        return reconcile_deletion(cdi, ctx).await;
    }

    let cdi = match check_ownership(cluster, &ctx.kinds, &cdi, namespace).await? {
        OwnershipState::Owned => {
            if !cdi.has_finalizer(FINALIZER_CDI) {
                ensure_finalizer(cluster, cdi, FINALIZER_CDI).await?;
                metrics::record_reconciliation_requeue(KIND_CDI, "finalizer_added");
                return Ok(Action::requeue(Duration::ZERO));
            }
            cdi
        }
        OwnershipState::OwnedByOther(owner) => {
            warn!(cdi = %name, owner = %owner, "Another CDI resource owns the installation");
            let mut status = CdiStatusUpdater::new(&cdi);
            status.mark_failed(REASON_UNWANTED_CR, MESSAGE_UNWANTED_CR);
            status.set_phase(Phase::Error);
            status.apply(cluster).await?;
            return Ok(Action::await_change());
        }
        OwnershipState::OwnerGone => {
            debug!(cdi = %name, "Previous owner is going away, retrying shortly");
            metrics::record_reconciliation_requeue(KIND_CDI, "owner_gone");
            return Ok(Action::requeue(Duration::from_secs(OWNER_GONE_REQUEUE_SECS)));
        }
        OwnershipState::Absent => {
            if cdi.phase().is_some() {
                let mut status = CdiStatusUpdater::new(&cdi);
                status.mark_failed(REASON_CONFIG_ERROR, MESSAGE_CONFIG_MISSING);
                status.set_phase(Phase::Error);
                status.apply(cluster).await?;
                return Err(anyhow!(MESSAGE_CONFIG_MISSING));
            }
            create_installation(cdi, ctx).await?
        }
    };

    reconcile_update(cdi, ctx).await
}

/// Claim the installation for a fresh `CDI` resource and persist `Deploying`.
async fn create_installation(cdi: CDI, ctx: &Context) -> Result<CDI> {
    let cluster = ctx.cluster.as_ref();
    info!(cdi = %cdi.name_any(), version = %ctx.args.operator_version, "Starting CDI deployment");

    // Claim first: a resource that loses the race must not hold the finalizer.
    create_ownership_configmap(cluster, &ctx.kinds, &cdi, &ctx.args.namespace).await?;
    let (cdi, _) = ensure_finalizer(cluster, cdi, FINALIZER_CDI).await?;

    let mut status = CdiStatusUpdater::new(&cdi);
    status.set_phase(Phase::Deploying);
    status.set_operator_version(&ctx.args.operator_version);
    status.set_target_version(&ctx.args.operator_version);
    status.mark_deploying(REASON_DEPLOY_STARTED, MESSAGE_DEPLOY_STARTED);
    status.apply(cluster).await?;

    let mut cdi = cdi;
    cdi.status = Some(status.status().clone());
    Ok(cdi)
}

/// Desired set and certificate definitions of one reconcile.
struct DesiredState {
    args: FactoryArgs,
    definitions: Vec<CertificateDefinition>,
    customizer: Option<Customizer>,
}

impl DesiredState {
    fn objects(&self, cdi: &CDI, bundles: &CaBundles, kinds: &KindRegistry) -> OperatorResult<Vec<DynamicObject>> {
        let mut objects = desired_resources(
            &self.args,
            cdi.spec.config.as_ref(),
            bundles,
            kinds,
            &self.definitions,
        )?;
        self.customize(&mut objects)?;
        Ok(objects)
    }

    fn bundle_objects(&self, bundles: &CaBundles, kinds: &KindRegistry) -> OperatorResult<Vec<DynamicObject>> {
        let mut objects = bundle_resources(&self.args, bundles, kinds)?;
        self.customize(&mut objects)?;
        Ok(objects)
    }

    fn customize(&self, objects: &mut [DynamicObject]) -> OperatorResult<()> {
        match &self.customizer {
            Some(customizer) => customizer.apply(objects),
            None => Ok(()),
        }
    }
}

async fn reconcile_update(cdi: CDI, ctx: &Context) -> Result<Action> {
    let cluster = ctx.cluster.as_ref();
    let name = cdi.name_any();
    let poll = Action::requeue(ctx.args.cert_poll_interval);
    let mut status = CdiStatusUpdater::new(&cdi);

    match should_take_update_path(&ctx.args.operator_version, status.observed_version()) {
        Ok(true) if status.target_version() != ctx.args.operator_version => {
            info!(
                cdi = %name,
                from = %status.observed_version(),
                to = %ctx.args.operator_version,
                "Starting CDI upgrade"
            );
            status.set_operator_version(&ctx.args.operator_version);
            status.set_target_version(&ctx.args.operator_version);
            status.set_phase(Phase::Deploying);
            status.mark_upgrading(
                REASON_UPGRADE_STARTED,
                &upgrade_started_message(&ctx.args.operator_version),
            );
        }
        Ok(_) => {}
        Err(e @ OperatorError::Downgrade { .. }) => {
            warn!(cdi = %name, error = %e, "Refusing to downgrade CDI");
            ctx.events
                .publish(
                    &cdi.object_ref(&()),
                    EventType::Warning,
                    REASON_DOWNGRADE_REFUSED,
                    ACTION_UPDATE,
                    Some(e.to_string()),
                )
                .await;
            metrics::record_reconciliation_requeue(KIND_CDI, "downgrade_refused");
            return Ok(poll);
        }
        Err(e) => return Err(e.into()),
    }

    let desired_state = match build_desired_state(&cdi, &ctx.args) {
        Ok(state) => state,
        Err((reason, e)) => {
            warn!(cdi = %name, error = %e, "Invalid CDI configuration");
            status.mark_failed(reason, &e.to_string());
            status.apply(cluster).await?;
            return Ok(Action::await_change());
        }
    };

    let namespace = desired_state.args.namespace.as_str();
    let bundles = read_ca_bundles(cluster, &ctx.kinds, namespace).await?;
    let desired = match desired_state.objects(&cdi, &bundles, &ctx.kinds) {
        Ok(desired) => desired,
        Err(e @ (OperatorError::Patch { .. } | OperatorError::UnsupportedPatchType(_))) => {
            warn!(cdi = %name, error = %e, "Failed to apply component customizations");
            status.mark_failed(REASON_CUSTOMIZATION_FAILED, &e.to_string());
            status.apply(cluster).await?;
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e.into()),
    };

    let version = status.target_version().to_string();
    let converger = Converger {
        cluster,
        kinds: &ctx.kinds,
        hooks: &ctx.hooks,
        events: ctx.events.as_ref(),
        cr: &cdi,
        namespace,
        version: &version,
    };

    let converged =
        converge_installation(&converger, ctx, &desired_state, &desired, bundles).await;
    let bundles = match converged {
        Ok(bundles) => bundles,
        Err(e) => {
            let message = reconcile_failed_message(&e);
            status.set_degraded(true, REASON_RECONCILE_FAILED, &message);
            status.apply(cluster).await?;
            return Err(anyhow!(message));
        }
    };

    inject_user_routes(
        cluster,
        &ctx.kinds,
        ctx.events.as_ref(),
        &cdi,
        namespace,
        bundles.uploadproxy.as_deref(),
    )
    .await?;

    if check_degraded(cluster, &ctx.kinds, &desired).await? {
        if status.phase() == Some(Phase::Deployed) {
            status.set_degraded(true, REASON_DEPLOYMENT_NOT_READY, "Not all deployments are ready");
        }
        debug!(cdi = %name, "Waiting for deployments to become ready");
    } else {
        if status.is_upgrading() {
            let target = status.target_version().to_string();
            status.set_observed_version(&target);
            let swept = cleanup_unused_resources(&converger, &desired, &target).await?;
            info!(cdi = %name, version = %target, removed = swept, "CDI upgrade completed");
        } else if status.phase() != Some(Phase::Deployed) {
            let target = status.target_version().to_string();
            status.set_observed_version(&target);
            info!(cdi = %name, version = %target, "CDI deployment completed");
        }
        status.mark_healthy(REASON_DEPLOY_COMPLETED, MESSAGE_DEPLOY_COMPLETED);
        status.set_phase(Phase::Deployed);
    }

    status.apply(cluster).await?;
    Ok(poll)
}

/// Certificate definitions, factory arguments and customizer for `cdi`.
///
/// Errors come with the condition reason that reports them.
fn build_desired_state(
    cdi: &CDI,
    args: &FactoryArgs,
) -> std::result::Result<DesiredState, (&'static str, OperatorError)> {
    let overrides = CertOverrides::from_cr(cdi.spec.cert_config.as_ref());
    let definitions = definitions(&overrides).map_err(|e| (REASON_INVALID_CERT_CONFIG, e))?;
    let customizer = cdi
        .spec
        .customize_components
        .as_ref()
        .map(Customizer::new)
        .transpose()
        .map_err(|e| (REASON_CUSTOMIZATION_FAILED, e))?;
    Ok(DesiredState {
        args: args.for_instance(cdi),
        definitions,
        customizer,
    })
}

/// Converge the installation, then bring certificates up to date.
///
/// Stops at the first failed write. Returns the CA bundles as they stand after
/// certificate sync.
async fn converge_installation(
    converger: &Converger<'_>,
    ctx: &Context,
    state: &DesiredState,
    desired: &[DynamicObject],
    bundles: CaBundles,
) -> OperatorResult<CaBundles> {
    let cluster = ctx.cluster.as_ref();
    let namespace = converger.namespace;
    let name = converger.cr.name_any();

    if let Err(e) =
        ensure_scc_exists(cluster, &ctx.kinds, namespace, CONTROLLER_SERVICE_ACCOUNT_NAME).await
    {
        warn!(cdi = %name, error = %e, "Failed to ensure SecurityContextConstraints");
        metrics::record_error(KIND_CDI, "scc");
        return Err(e);
    }
    converge_all(converger, desired).await?;

    let report = CertManager {
        cluster,
        kinds: &ctx.kinds,
        rotation: ctx.rotation.as_ref(),
        cr: converger.cr,
        namespace,
        now: Utc::now().timestamp(),
    }
    .sync(&state.definitions)
    .await?;
    if !report.is_empty() {
        info!(
            cdi = %name,
            signers = ?report.signers_rotated,
            bundles = ?report.bundles_updated,
            targets = ?report.targets_rotated,
            "Certificates rotated"
        );
    }
    if report.bundles_updated.is_empty() {
        return Ok(bundles);
    }

    let bundles = read_ca_bundles(cluster, &ctx.kinds, namespace).await?;
    converge_all(converger, &state.bundle_objects(&bundles, &ctx.kinds)?).await?;
    Ok(bundles)
}

/// Converge `desired` in order, stopping at the first failure.
async fn converge_all(converger: &Converger<'_>, desired: &[DynamicObject]) -> OperatorResult<()> {
    for obj in desired {
        if let Err(e) = converger.converge(obj.clone()).await {
            warn!(kind = ?obj.types.as_ref().map(|t| &t.kind), name = %obj.name_any(), error = %e, "Failed to converge resource");
            metrics::record_error(KIND_CDI, "converge");
            return Err(e);
        }
    }
    Ok(())
}

/// Read the CA bundles published by the signers.
///
/// # Errors
///
/// Returns API errors from reading the bundle `ConfigMap`s.
pub async fn read_ca_bundles(
    cluster: &dyn ClusterApi,
    kinds: &KindRegistry,
    namespace: &str,
) -> OperatorResult<CaBundles> {
    let info = kinds.get(KIND_CONFIG_MAP)?;
    let mut bundles = CaBundles::default();
    for (name, slot) in [
        (APISERVER_SIGNER_BUNDLE, &mut bundles.apiserver),
        (UPLOADPROXY_SIGNER_BUNDLE, &mut bundles.uploadproxy),
    ] {
        *slot = cluster
            .get(info, Some(namespace), name)
            .await?
            .as_ref()
            .and_then(bundle_of);
    }
    Ok(bundles)
}

fn bundle_of(cm: &DynamicObject) -> Option<String> {
    cm.data
        .get("data")?
        .get(CA_BUNDLE_KEY)?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

async fn reconcile_deletion(cdi: CDI, ctx: &Context) -> Result<Action> {
    let cluster = ctx.cluster.as_ref();
    let name = cdi.name_any();
    if !cdi.has_finalizer(FINALIZER_CDI) {
        debug!(cdi = %name, "CDI deleted without finalizer");
        return Ok(Action::await_change());
    }

    if !owns_installation(cluster, &ctx.kinds, &cdi, &ctx.args.namespace).await? {
        info!(cdi = %name, "CDI does not own the installation, releasing it without uninstall");
        remove_finalizer(cluster, &cdi, FINALIZER_CDI).await?;
        return Ok(Action::await_change());
    }

    let mut status = CdiStatusUpdater::new(&cdi);
    if cdi.uninstall_strategy() == UninstallStrategy::BlockUninstallIfWorkloadsExist
        && workloads_exist(cluster, &ctx.kinds).await?
    {
        warn!(cdi = %name, "Uninstall blocked while DataVolumes exist");
        status.set_degraded(true, REASON_UNINSTALL_BLOCKED, MESSAGE_UNINSTALL_BLOCKED);
        status.apply(cluster).await?;
        ctx.events
            .publish(
                &cdi.object_ref(&()),
                EventType::Warning,
                EVENT_UNINSTALL_BLOCKED,
                ACTION_UNINSTALL,
                Some(MESSAGE_UNINSTALL_BLOCKED.to_string()),
            )
            .await;
        metrics::record_reconciliation_requeue(KIND_CDI, "uninstall_blocked");
        return Ok(Action::requeue(ctx.args.cert_poll_interval));
    }

    info!(cdi = %name, "Uninstalling CDI");
    status.set_phase(Phase::Deleting);
    status.apply(cluster).await?;

    // Invalid overrides must not block uninstall; the default definitions name
    // the same objects.
    let overrides = CertOverrides::from_cr(cdi.spec.cert_config.as_ref());
    let certs = definitions(&overrides).or_else(|_| definitions(&CertOverrides::default()))?;
    let args = ctx.args.for_instance(&cdi);
    let desired = desired_resources(
        &args,
        cdi.spec.config.as_ref(),
        &CaBundles::default(),
        &ctx.kinds,
        &certs,
    )?;

    let version = status.target_version().to_string();
    let converger = Converger {
        cluster,
        kinds: &ctx.kinds,
        hooks: &ctx.hooks,
        events: ctx.events.as_ref(),
        cr: &cdi,
        namespace: &args.namespace,
        version: &version,
    };
    uninstall(&converger, &desired).await?;

    status.set_phase(Phase::Deleted);
    status.apply(cluster).await?;
    remove_finalizer(cluster, &cdi, FINALIZER_CDI).await?;
    info!(cdi = %name, "CDI uninstalled");
    Ok(Action::await_change())
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod instance_tests;
