// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The `containerized-data-importer` `SecurityContextConstraints`.
//!
//! On platforms that serve SCCs the worker pods run under this SCC, so it must
//! exist before the controller starts spawning them. The SCC is shared
//! platform state: it carries no controller reference, survives uninstall,
//! and only ever has the controller service account added to its users. Other
//! users are managed by the service account hooks.

use crate::cluster::ClusterApi;
use crate::constants::SCC_NAME;
use crate::errors::Result;
use crate::kinds::{KindRegistry, KIND_SCC};
use crate::resources::optional::{security_context_constraints, service_account_user};
use serde_json::Value;
use tracing::{debug, info};

/// Create the SCC, or add the service account user to it.
///
/// Returns whether anything was written.
///
/// # Errors
///
/// Returns API errors other than the kind not being served.
pub async fn ensure_scc_exists(
    cluster: &dyn ClusterApi,
    kinds: &KindRegistry,
    namespace: &str,
    service_account: &str,
) -> Result<bool> {
    if !kinds.is_available(KIND_SCC) {
        return Ok(false);
    }
    let info = kinds.get(KIND_SCC)?;
    let user = service_account_user(namespace, service_account);

    let current = match cluster.get(info, None, SCC_NAME).await {
        Ok(current) => current,
        Err(e) if e.is_not_found() => {
            debug!("SecurityContextConstraints not served, skipping");
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    let Some(mut scc) = current else {
        info!(scc = %SCC_NAME, user = %user, "Creating SecurityContextConstraints");
        cluster
            .create(info, &security_context_constraints(std::slice::from_ref(&user))?)
            .await?;
        return Ok(true);
    };

    let mut users: Vec<Value> = scc
        .data
        .get("users")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if users.iter().any(|u| u.as_str() == Some(user.as_str())) {
        return Ok(false);
    }

    users.push(Value::String(user.clone()));
    scc.data["users"] = Value::Array(users);
    info!(scc = %SCC_NAME, user = %user, "Adding service account to SecurityContextConstraints");
    cluster.update(info, &scc).await?;
    Ok(true)
}

#[cfg(test)]
#[path = "scc_tests.rs"]
mod scc_tests;
