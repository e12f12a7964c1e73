// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Removal of objects the installation no longer wants.
//!
//! Two situations remove objects:
//!
//! - **After an upgrade** [`cleanup_unused_resources`] sweeps every dependant kind
//!   for objects this `CDI` resource controls that an older release created and
//!   the current desired set no longer contains.
//! - **On uninstall** [`uninstall`] runs the `PreCRDelete` and `PostCRDelete`
//!   hooks for every desired object. Owned objects go away through garbage
//!   collection once the `CDI` resource is deleted; the hooks take care of what
//!   garbage collection cannot reach (workers in other namespaces, SCC users).

use crate::cluster::ClusterApi;
use crate::differ::{controlled_by, Converger};
use crate::errors::Result;
use crate::hooks::ReconcileState;
use crate::kinds::{KindInfo, KindRegistry, KIND_DATA_VOLUME};
use crate::labels::CREATE_VERSION_LABEL;
use kube::api::DynamicObject;
use kube::ResourceExt;
use std::collections::BTreeSet;
use tracing::{debug, info};

type Identity = (String, Option<String>, String);

fn identity(info: &KindInfo, obj: &DynamicObject) -> Identity {
    let namespace = if info.namespaced {
        obj.metadata.namespace.clone()
    } else {
        None
    };
    (info.kind().to_string(), namespace, obj.name_any())
}

/// Delete objects created by an older release that are no longer desired.
///
/// Only objects controlled by the `CDI` resource and labelled with a
/// `createVersion` other than `observed_version` are candidates. Deletion goes
/// through [`Converger::delete`], so the delete hooks and events apply.
///
/// Returns the number of objects deleted.
///
/// # Errors
///
/// Returns the first list or delete error; the sweep resumes on the next reconcile.
pub async fn cleanup_unused_resources(
    converger: &Converger<'_>,
    desired: &[DynamicObject],
    observed_version: &str,
) -> Result<usize> {
    let kinds = converger.kinds;
    let wanted: BTreeSet<Identity> = desired
        .iter()
        .filter_map(|obj| kinds.for_object(obj).ok().map(|info| identity(info, obj)))
        .collect();

    let mut deleted = 0;
    for info in kinds.dependant_kinds() {
        let objects = match converger
            .cluster
            .list(info, None, Some(CREATE_VERSION_LABEL))
            .await
        {
            Ok(objects) => objects,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        };

        for obj in objects {
            let stale = obj
                .labels()
                .get(CREATE_VERSION_LABEL)
                .is_some_and(|v| v != observed_version);
            if !stale || !controlled_by(&obj, converger.cr) || wanted.contains(&identity(info, &obj)) {
                continue;
            }

            info!(kind = %info.kind(), name = %obj.name_any(), namespace = ?obj.metadata.namespace, "Deleting unused resource");
            if converger.delete(obj).await? {
                deleted += 1;
            }
        }
    }

    if deleted > 0 {
        info!(count = deleted, "Removed resources left behind by the previous version");
    }
    Ok(deleted)
}

/// Whether any `DataVolume` exists in any namespace.
///
/// A cluster that does not serve the kind has none.
///
/// # Errors
///
/// Returns list errors other than not-found.
pub async fn workloads_exist(cluster: &dyn ClusterApi, kinds: &KindRegistry) -> Result<bool> {
    let info = kinds.get(KIND_DATA_VOLUME)?;
    match cluster.list(info, None, None).await {
        Ok(volumes) => Ok(!volumes.is_empty()),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Run the uninstall hooks for every desired object.
///
/// # Errors
///
/// Returns the first hook error; the finalizer must stay in that case.
pub async fn uninstall(converger: &Converger<'_>, desired: &[DynamicObject]) -> Result<()> {
    for state in [ReconcileState::PreCRDelete, ReconcileState::PostCRDelete] {
        for obj in desired {
            debug!(state = %state, kind = ?obj.types.as_ref().map(|t| &t.kind), name = %obj.name_any(), "uninstall hooks");
            converger.run_hooks(state, Some(obj.clone()), None).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod cleanup_tests;
