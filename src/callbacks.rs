// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The hooks the operator registers on its [`HookRegistry`].
//!
//! - [`ControllerDeploymentCleanup`]: when `cdi-deployment` is deleted, also
//!   remove the importer, upload server and clone source pods and services it
//!   spawned in every namespace.
//! - [`ServiceAccountSccAnnotation`] and [`ServiceAccountSccUsers`]: keep the
//!   users of `SecurityContextConstraints` in line with the `cdi-scc`
//!   annotation of each service account.
//! - [`LegacySecretCleanup`]: delete secrets older releases used for TLS.
//! - [`CrdPreserveUnknownFields`]: clear a deprecated CRD field on update.

use crate::cluster::ClusterApi;
use crate::constants::{
    CONTROLLER_DEPLOYMENT_NAME, WORKER_CLONE_SOURCE, WORKER_IMPORTER, WORKER_UPLOAD_SERVER,
};
use crate::differ::controlled_by;
use crate::errors::{OperatorError, Result};
use crate::hooks::{Hook, HookArgs, HookRegistry, ReconcileState};
use crate::kinds::{
    KindRegistry, KIND_CRD, KIND_DEPLOYMENT, KIND_POD, KIND_SCC, KIND_SECRET, KIND_SERVICE,
    KIND_SERVICE_ACCOUNT,
};
use crate::labels::{CDI_LABEL, SCC_ANNOTATION};
use crate::resources::optional::service_account_user;
use crate::status_reasons::{
    ACTION_DELETE, EVENT_DELETE_RESOURCE_FAILED, EVENT_DELETE_RESOURCE_SUCCESS,
};
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use serde_json::Value;
use tracing::{debug, info};

/// Secrets written by releases that predate the signer/bundle layout.
pub const LEGACY_SECRETS: [&str; 6] = [
    "cdi-api-server-cert",
    "cdi-upload-proxy-ca-key",
    "cdi-upload-proxy-server-key",
    "cdi-upload-server-ca-key",
    "cdi-upload-server-client-ca-key",
    "cdi-upload-server-client-key",
];

/// Label selector matching every worker pod and service the controller creates.
#[must_use]
pub fn worker_selector() -> String {
    format!("{CDI_LABEL} in ({WORKER_IMPORTER}, {WORKER_UPLOAD_SERVER}, {WORKER_CLONE_SOURCE})")
}

/// Registry with every hook the operator needs.
#[must_use]
pub fn registry() -> HookRegistry {
    HookRegistry::builder()
        .on_kind(KIND_DEPLOYMENT, ControllerDeploymentCleanup)
        .on_kind(KIND_DEPLOYMENT, LegacySecretCleanup)
        .on_kind(KIND_SERVICE_ACCOUNT, ServiceAccountSccAnnotation)
        .on_kind(KIND_SERVICE_ACCOUNT, ServiceAccountSccUsers)
        .on_kind(KIND_CRD, CrdPreserveUnknownFields)
        .build()
}

/// Deletes the controller deployment and the worker objects it left behind.
pub struct ControllerDeploymentCleanup;

#[async_trait]
impl Hook for ControllerDeploymentCleanup {
    fn name(&self) -> &str {
        "controller-deployment-cleanup"
    }

    async fn call(&self, args: &mut HookArgs<'_>) -> Result<()> {
        if !matches!(
            args.state,
            ReconcileState::PostDelete | ReconcileState::PostCRDelete
        ) || args.name() != CONTROLLER_DEPLOYMENT_NAME
        {
            return Ok(());
        }

        let deployment = args.kinds.get(KIND_DEPLOYMENT)?;
        if let Some(current) = args
            .cluster
            .get(deployment, Some(args.namespace), CONTROLLER_DEPLOYMENT_NAME)
            .await?
        {
            if !controlled_by(&current, args.cr) {
                debug!("CDI deployment belongs to another CDI resource, leaving it");
                return Ok(());
            }
        }

        info!("Deleting CDI deployment and all import/upload/clone pods/services");
        args.cluster
            .delete(deployment, Some(args.namespace), CONTROLLER_DEPLOYMENT_NAME)
            .await?;

        delete_workers(args.cluster, args.kinds).await
    }
}

/// Delete worker pods and services in every namespace.
///
/// # Errors
///
/// Returns the first list or delete error.
pub async fn delete_workers(cluster: &dyn ClusterApi, kinds: &KindRegistry) -> Result<()> {
    let selector = worker_selector();
    for kind in [KIND_POD, KIND_SERVICE] {
        let info = kinds.get(kind)?;
        for obj in cluster.list(info, None, Some(&selector)).await? {
            let name = obj.name_any();
            info!(kind = %kind, name = %name, namespace = ?obj.metadata.namespace, "Deleting worker resource");
            cluster
                .delete(info, obj.metadata.namespace.as_deref(), &name)
                .await?;
        }
    }
    Ok(())
}

/// Carries the desired `cdi-scc` annotation onto the current service account.
///
/// The annotation is replaced rather than merged so a value dropped from the
/// desired object disappears from the cluster too.
pub struct ServiceAccountSccAnnotation;

#[async_trait]
impl Hook for ServiceAccountSccAnnotation {
    fn name(&self) -> &str {
        "service-account-scc-annotation"
    }

    async fn call(&self, args: &mut HookArgs<'_>) -> Result<()> {
        if args.state != ReconcileState::PostRead {
            return Ok(());
        }
        let desired_value = args
            .desired
            .as_ref()
            .and_then(|d| d.annotations().get(SCC_ANNOTATION).cloned());
        let Some(current) = args.current.as_mut() else {
            return Ok(());
        };

        current.annotations_mut().remove(SCC_ANNOTATION);
        if let Some(value) = desired_value {
            current
                .annotations_mut()
                .insert(SCC_ANNOTATION.to_string(), value);
        }
        Ok(())
    }
}

/// Grants a service account the SCCs named in its `cdi-scc` annotation and
/// revokes every other one.
pub struct ServiceAccountSccUsers;

/// Users of `scc` after granting or revoking `user`, in their original order.
#[must_use]
pub fn scc_users(current: &[String], user: &str, grant: bool) -> Vec<String> {
    let mut users: Vec<String> = current
        .iter()
        .filter(|u| grant || u.as_str() != user)
        .cloned()
        .collect();
    if grant && !users.iter().any(|u| u == user) {
        users.push(user.to_string());
    }
    users
}

fn users_of(scc: &DynamicObject) -> Vec<String> {
    scc.data
        .get("users")
        .and_then(Value::as_array)
        .map(|users| {
            users
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Hook for ServiceAccountSccUsers {
    fn name(&self) -> &str {
        "service-account-scc-users"
    }

    async fn call(&self, args: &mut HookArgs<'_>) -> Result<()> {
        let granting = match args.state {
            ReconcileState::PreCreate | ReconcileState::PreUpdate => true,
            ReconcileState::PostDelete | ReconcileState::PostCRDelete => false,
            _ => return Ok(()),
        };
        if !args.kinds.is_available(KIND_SCC) {
            return Ok(());
        }
        let Some(sa) = args.current.as_ref().or(args.desired.as_ref()) else {
            debug!("SCC hook called without an object");
            return Ok(());
        };

        let namespace = sa.metadata.namespace.as_deref().unwrap_or(args.namespace);
        let user = service_account_user(namespace, &sa.name_any());
        let wanted: Vec<String> = match sa.annotations().get(SCC_ANNOTATION) {
            Some(raw) if granting => serde_json::from_str(raw)?,
            _ => Vec::new(),
        };

        let info = args.kinds.get(KIND_SCC)?;
        let sccs = match args.cluster.list(info, None, None).await {
            Ok(sccs) => sccs,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        for mut scc in sccs {
            let name = scc.name_any();
            let current = users_of(&scc);
            let users = scc_users(&current, &user, wanted.contains(&name));
            if users == current {
                continue;
            }
            info!(scc = %name, desired = ?users, current = ?current, "Doing SCC update");
            scc.data["users"] = Value::from(users);
            args.cluster.update(info, &scc).await?;
        }
        Ok(())
    }
}

/// Removes TLS secrets of releases that predate the current certificate layout.
pub struct LegacySecretCleanup;

#[async_trait]
impl Hook for LegacySecretCleanup {
    fn name(&self) -> &str {
        "legacy-secret-cleanup"
    }

    async fn call(&self, args: &mut HookArgs<'_>) -> Result<()> {
        if args.state != ReconcileState::PostRead
            || args.current.as_ref().map(ResourceExt::name_any).as_deref()
                != Some(CONTROLLER_DEPLOYMENT_NAME)
        {
            return Ok(());
        }

        let info = args.kinds.get(KIND_SECRET)?;
        let cr_ref = args.cr.object_ref(&());
        for secret in LEGACY_SECRETS {
            if args
                .cluster
                .get(info, Some(args.namespace), secret)
                .await?
                .is_none()
            {
                continue;
            }
            if let Err(e) = args.cluster.delete(info, Some(args.namespace), secret).await {
                args.events
                    .publish(
                        &cr_ref,
                        EventType::Warning,
                        EVENT_DELETE_RESOURCE_FAILED,
                        ACTION_DELETE,
                        Some(format!("Failed to delete secret {secret}, {e}")),
                    )
                    .await;
                return Err(e);
            }
            info!(secret = %secret, "Deleted legacy secret");
            args.events
                .publish(
                    &cr_ref,
                    EventType::Normal,
                    EVENT_DELETE_RESOURCE_SUCCESS,
                    ACTION_DELETE,
                    Some(format!("Deleted secret {secret} successfully")),
                )
                .await;
        }
        Ok(())
    }
}

/// Clears `spec.preserveUnknownFields` before a CRD is updated.
pub struct CrdPreserveUnknownFields;

#[async_trait]
impl Hook for CrdPreserveUnknownFields {
    fn name(&self) -> &str {
        "crd-preserve-unknown-fields"
    }

    async fn call(&self, args: &mut HookArgs<'_>) -> Result<()> {
        if args.state != ReconcileState::PreUpdate {
            return Ok(());
        }
        let Some(crd) = args.current.as_mut() else {
            return Ok(());
        };
        let name = crd.name_any();
        let Some(spec) = crd.data.get_mut("spec").and_then(Value::as_object_mut) else {
            return Err(OperatorError::MissingField {
                kind: KIND_CRD.to_string(),
                name,
                field: "spec".to_string(),
            });
        };
        spec.insert("preserveUnknownFields".to_string(), Value::Bool(false));
        Ok(())
    }
}

#[cfg(test)]
#[path = "callbacks_tests.rs"]
mod callbacks_tests;
