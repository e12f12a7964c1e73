// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired state of a CDI installation.
//!
//! Every reconcile rebuilds the full desired set from [`FactoryArgs`] and the
//! `CDI` resource. Nothing here talks to the API server: the CA bundles the
//! webhooks and the upload proxy route embed are read by the reconciler and
//! passed in as [`CaBundles`].
//!
//! Order is stable and matters: cluster-wide static objects first so RBAC and
//! CRDs exist before the workloads that need them, then namespaced objects, then
//! the objects that embed CA bundles, then the certificate-backed secrets and
//! bundles, and finally objects of optional kinds.

pub mod builder;
pub mod certs;
pub mod cluster;
pub mod crds;
pub mod namespaced;
pub mod optional;

use crate::certs::CertificateDefinition;
use crate::config::FactoryArgs;
use crate::crd::CDIConfigSpec;
use crate::errors::Result;
use crate::kinds::{KindRegistry, KIND_PROMETHEUS_RULE, KIND_ROUTE};
use kube::api::DynamicObject;

/// PEM bundles read from the signer bundle `ConfigMap`s.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaBundles {
    /// Trusts the API server signer
    pub apiserver: Option<String>,
    /// Trusts the upload proxy signer
    pub uploadproxy: Option<String>,
}

/// Objects whose content depends on [`CaBundles`].
///
/// Rebuilt and converged again when a sync rotated a bundle.
///
/// # Errors
///
/// Returns [`crate::errors::OperatorError::Serialization`] when an object fails
/// to convert.
pub fn bundle_resources(
    args: &FactoryArgs,
    bundles: &CaBundles,
    kinds: &KindRegistry,
) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    if args.deploy_cluster_resources {
        objects.extend(cluster::dynamic_resources(args, bundles.apiserver.as_deref())?);
    }
    if kinds.is_available(KIND_ROUTE) {
        if let Some(bundle) = bundles.uploadproxy.as_deref() {
            objects.push(optional::upload_proxy_route(&args.namespace, bundle)?);
        }
    }
    Ok(objects)
}

/// The complete desired set, in convergence order.
///
/// # Errors
///
/// Returns [`crate::errors::OperatorError::Serialization`] when an object fails
/// to convert.
pub fn desired_resources(
    args: &FactoryArgs,
    config: Option<&CDIConfigSpec>,
    bundles: &CaBundles,
    kinds: &KindRegistry,
    definitions: &[CertificateDefinition],
) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    if args.deploy_cluster_resources {
        objects.extend(cluster::static_resources(args)?);
    }
    objects.extend(namespaced::resources(args, config)?);

    let (route, dynamic): (Vec<_>, Vec<_>) = bundle_resources(args, bundles, kinds)?
        .into_iter()
        .partition(|o| o.types.as_ref().is_some_and(|t| t.kind == KIND_ROUTE));
    objects.extend(dynamic);
    objects.extend(certs::resources(&args.namespace, definitions)?);

    objects.extend(route);
    if kinds.is_available(KIND_PROMETHEUS_RULE) {
        objects.extend(optional::monitoring_resources(args)?);
    }
    Ok(objects)
}
