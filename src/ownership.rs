// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Single active `CDI` resource per cluster.
//!
//! The first `CDI` resource to reconcile creates the `cdi-config` `ConfigMap` in
//! the install namespace with a controller reference to itself. Every later
//! reconcile reads that `ConfigMap` back to decide whether the resource at hand
//! is the one that owns the installation.

use crate::cluster::ClusterApi;
use crate::constants::{KIND_CDI, OWNERSHIP_CONFIGMAP_NAME};
use crate::crd::CDI;
use crate::differ::{controlled_by, set_controller_reference};
use crate::errors::{OperatorError, Result};
use crate::kinds::{KindRegistry, KIND_CONFIG_MAP};
use crate::resources::builder::operator_labels;
use kube::api::DynamicObject;
use kube::ResourceExt;
use tracing::debug;

/// Who holds the ownership `ConfigMap`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OwnershipState {
    /// No `ConfigMap`, or one without a controller: this resource may claim it
    Absent,
    /// Controlled by this resource
    Owned,
    /// Controlled by another live `CDI` resource
    OwnedByOther(String),
    /// The controlling resource is gone or going; retry shortly
    OwnerGone,
}

/// Inspect the ownership `ConfigMap` on behalf of `cr`.
///
/// # Errors
///
/// Returns API errors, and [`OperatorError::Config`] when the `ConfigMap` is
/// controlled by something other than a `CDI` resource.
pub async fn check_ownership(
    cluster: &dyn ClusterApi,
    kinds: &KindRegistry,
    cr: &CDI,
    namespace: &str,
) -> Result<OwnershipState> {
    let info = kinds.get(KIND_CONFIG_MAP)?;
    let Some(cm) = cluster
        .get(info, Some(namespace), OWNERSHIP_CONFIGMAP_NAME)
        .await?
    else {
        return Ok(OwnershipState::Absent);
    };

    let Some(owner) = cm.owner_references().iter().find(|r| r.controller == Some(true)) else {
        debug!("ownership configmap has no controller");
        return Ok(OwnershipState::Absent);
    };

    if cr.metadata.uid.as_deref() == Some(owner.uid.as_str()) {
        return Ok(OwnershipState::Owned);
    }

    if owner.kind != KIND_CDI {
        return Err(OperatorError::Config(format!(
            "{OWNERSHIP_CONFIGMAP_NAME} is controlled by unexpected kind {}",
            owner.kind
        )));
    }

    if cm.metadata.deletion_timestamp.is_some() {
        debug!("ownership configmap is being deleted");
        return Ok(OwnershipState::OwnerGone);
    }

    let owner_gone = match cluster.get_instance(&owner.name).await? {
        None => true,
        Some(other) => {
            other.metadata.deletion_timestamp.is_some()
                || other.metadata.uid.as_deref() != Some(owner.uid.as_str())
        }
    };
    if owner_gone {
        debug!(owner = %owner.name, "controlling CDI no longer exists");
        return Ok(OwnershipState::OwnerGone);
    }
    Ok(OwnershipState::OwnedByOther(owner.name.clone()))
}

/// The ownership `ConfigMap`, controlled by `cr`.
///
/// # Errors
///
/// Returns [`OperatorError::UnknownKind`] if `ConfigMap` is not registered.
pub fn ownership_configmap(kinds: &KindRegistry, cr: &CDI, namespace: &str) -> Result<DynamicObject> {
    let info = kinds.get(KIND_CONFIG_MAP)?;
    let mut cm = info.new_object(Some(namespace), OWNERSHIP_CONFIGMAP_NAME);
    cm.labels_mut().extend(operator_labels());
    set_controller_reference(&mut cm, cr);
    Ok(cm)
}

/// Claim the installation for `cr`.
///
/// A `ConfigMap` left without a controller is adopted in place; otherwise a
/// new one is created.
///
/// # Errors
///
/// Returns the create or update error; a conflict means another resource won
/// the race.
pub async fn create_ownership_configmap(
    cluster: &dyn ClusterApi,
    kinds: &KindRegistry,
    cr: &CDI,
    namespace: &str,
) -> Result<()> {
    let info = kinds.get(KIND_CONFIG_MAP)?;
    match cluster
        .get(info, Some(namespace), OWNERSHIP_CONFIGMAP_NAME)
        .await?
    {
        Some(mut cm) => {
            if cm.owner_references().iter().any(|r| r.controller == Some(true)) {
                return Err(OperatorError::Config(format!(
                    "{OWNERSHIP_CONFIGMAP_NAME} already has a controller"
                )));
            }
            cm.labels_mut().extend(operator_labels());
            set_controller_reference(&mut cm, cr);
            cluster.update(info, &cm).await?;
            debug!(cdi = %cr.name_any(), "adopted ownership configmap");
        }
        None => {
            let cm = ownership_configmap(kinds, cr, namespace)?;
            cluster.create(info, &cm).await?;
            debug!(cdi = %cr.name_any(), "created ownership configmap");
        }
    }
    Ok(())
}

/// Whether the ownership `ConfigMap` is controlled by `cr`.
///
/// # Errors
///
/// Returns API errors from reading the `ConfigMap`.
pub async fn owns_installation(
    cluster: &dyn ClusterApi,
    kinds: &KindRegistry,
    cr: &CDI,
    namespace: &str,
) -> Result<bool> {
    let info = kinds.get(KIND_CONFIG_MAP)?;
    Ok(cluster
        .get(info, Some(namespace), OWNERSHIP_CONFIGMAP_NAME)
        .await?
        .is_some_and(|cm| controlled_by(&cm, cr)))
}

#[cfg(test)]
#[path = "ownership_tests.rs"]
mod ownership_tests;
