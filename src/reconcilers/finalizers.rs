// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Finalizer management for the `CDI` resource.
//!
//! The `operator.cdi.kubevirt.io` finalizer keeps a `CDI` resource around until
//! the uninstall callbacks ran. Both helpers are idempotent and return the
//! resource as the server stored it, so callers keep working on fresh metadata.
//!
//! # Example
//!
//! ```rust,ignore
//! use cdi_operator::labels::FINALIZER_CDI;
//! use cdi_operator::reconcilers::finalizers::{ensure_finalizer, remove_finalizer};
//!
//! let (cdi, added) = ensure_finalizer(cluster, cdi, FINALIZER_CDI).await?;
//! // ... uninstall ...
//! remove_finalizer(cluster, &cdi, FINALIZER_CDI).await?;
//! ```

use crate::cluster::ClusterApi;
use crate::crd::CDI;
use crate::errors::Result;
use kube::ResourceExt;
use tracing::info;

/// Add `finalizer` to `cdi` if not already present.
///
/// Returns the resource and whether a write happened.
///
/// # Errors
///
/// Returns an error if the API patch operation fails.
pub async fn ensure_finalizer(
    cluster: &dyn ClusterApi,
    cdi: CDI,
    finalizer: &str,
) -> Result<(CDI, bool)> {
    if cdi.has_finalizer(finalizer) {
        return Ok((cdi, false));
    }

    let name = cdi.name_any();
    info!("Adding finalizer {} to CDI {}", finalizer, name);
    let mut finalizers = cdi.finalizers().to_vec();
    finalizers.push(finalizer.to_string());
    let mut updated = cluster.patch_instance_finalizers(&name, &finalizers).await?;

    // The finalizer patch does not return status; keep what we had.
    if updated.status.is_none() {
        updated.status = cdi.status;
    }
    Ok((updated, true))
}

/// Remove `finalizer` from `cdi`.
///
/// Once the last finalizer is gone the API server deletes the resource.
///
/// # Errors
///
/// Returns an error if the API patch operation fails.
pub async fn remove_finalizer(cluster: &dyn ClusterApi, cdi: &CDI, finalizer: &str) -> Result<()> {
    if !cdi.has_finalizer(finalizer) {
        return Ok(());
    }

    let name = cdi.name_any();
    info!("Removing finalizer {} from CDI {}", finalizer, name);
    let finalizers: Vec<String> = cdi
        .finalizers()
        .iter()
        .filter(|f| *f != finalizer)
        .cloned()
        .collect();
    cluster.patch_instance_finalizers(&name, &finalizers).await?;
    info!("Successfully removed finalizer {} from CDI {}", finalizer, name);
    Ok(())
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
