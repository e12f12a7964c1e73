// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deployment readiness of an installation.

use crate::cluster::ClusterApi;
use crate::constants::DEFAULT_REPLICAS;
use crate::errors::Result;
use crate::kinds::{KindRegistry, KIND_DEPLOYMENT};
use kube::api::DynamicObject;
use kube::ResourceExt;
use tracing::debug;

fn int_at(obj: &DynamicObject, pointer: &str) -> Option<i64> {
    obj.data.pointer(pointer).and_then(serde_json::Value::as_i64)
}

/// Whether every wanted replica of a deployment exists and is ready.
#[must_use]
pub fn deployment_ready(deployment: &DynamicObject) -> bool {
    let wanted = int_at(deployment, "/spec/replicas").unwrap_or(i64::from(DEFAULT_REPLICAS));
    let replicas = int_at(deployment, "/status/replicas").unwrap_or(0);
    let ready = int_at(deployment, "/status/readyReplicas").unwrap_or(0);
    replicas == wanted && ready == wanted
}

/// Whether any desired deployment is missing or not ready.
///
/// Deployments are read back from the cluster; `desired` only names them.
///
/// # Errors
///
/// Returns API errors from reading a deployment.
pub async fn check_degraded(
    cluster: &dyn ClusterApi,
    kinds: &KindRegistry,
    desired: &[DynamicObject],
) -> Result<bool> {
    let info = kinds.get(KIND_DEPLOYMENT)?;
    let deployments = desired
        .iter()
        .filter(|o| o.types.as_ref().is_some_and(|t| t.kind == KIND_DEPLOYMENT));

    for deployment in deployments {
        let name = deployment.name_any();
        let current = cluster
            .get(info, deployment.metadata.namespace.as_deref(), &name)
            .await?;
        if !current.as_ref().is_some_and(deployment_ready) {
            debug!(deployment = %name, "deployment not ready");
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
#[path = "readiness_tests.rs"]
mod readiness_tests;
