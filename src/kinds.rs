// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Registry of every kind the operator reads or writes.
//!
//! Desired objects are built as `DynamicObject`s, so every operation needs the
//! matching [`ApiResource`] and scope. [`KindRegistry`] maps a kind name to a
//! [`KindInfo`] and knows which optional kinds (routes, security context
//! constraints, prometheus rules) the cluster actually serves.

use crate::errors::{OperatorError, Result};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use std::collections::{BTreeMap, BTreeSet};

pub const KIND_CONFIG_MAP: &str = "ConfigMap";
pub const KIND_SECRET: &str = "Secret";
pub const KIND_SERVICE: &str = "Service";
pub const KIND_SERVICE_ACCOUNT: &str = "ServiceAccount";
pub const KIND_POD: &str = "Pod";
pub const KIND_DEPLOYMENT: &str = "Deployment";
pub const KIND_ROLE: &str = "Role";
pub const KIND_ROLE_BINDING: &str = "RoleBinding";
pub const KIND_CLUSTER_ROLE: &str = "ClusterRole";
pub const KIND_CLUSTER_ROLE_BINDING: &str = "ClusterRoleBinding";
pub const KIND_CRD: &str = "CustomResourceDefinition";
pub const KIND_API_SERVICE: &str = "APIService";
pub const KIND_VALIDATING_WEBHOOK: &str = "ValidatingWebhookConfiguration";
pub const KIND_MUTATING_WEBHOOK: &str = "MutatingWebhookConfiguration";
pub const KIND_ROUTE: &str = "Route";
pub const KIND_SCC: &str = "SecurityContextConstraints";
pub const KIND_PROMETHEUS_RULE: &str = "PrometheusRule";
pub const KIND_DATA_VOLUME: &str = "DataVolume";

/// Everything needed to talk to the API server about one kind.
#[derive(Clone, Debug)]
pub struct KindInfo {
    pub api_resource: ApiResource,
    /// Whether objects of this kind live in a namespace
    pub namespaced: bool,
    /// Whether the kind may be absent from the cluster (platform specific)
    pub optional: bool,
    /// Whether the data of existing objects is owned by someone else
    ///
    /// Only labels and annotations are converged on mutable kinds.
    pub mutable: bool,
    /// Whether the operator deploys objects of this kind
    pub owned: bool,
}

impl KindInfo {
    fn new(group: &str, version: &str, kind: &str, plural: &str, namespaced: bool) -> Self {
        let gvk = GroupVersionKind::gvk(group, version, kind);
        Self {
            api_resource: ApiResource::from_gvk_with_plural(&gvk, plural),
            namespaced,
            optional: false,
            mutable: false,
            owned: true,
        }
    }

    fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }

    fn foreign(mut self) -> Self {
        self.owned = false;
        self
    }

    /// Kind name, e.g. `Deployment`.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.api_resource.kind
    }

    /// An empty object of this kind named `name`.
    #[must_use]
    pub fn new_object(&self, namespace: Option<&str>, name: &str) -> DynamicObject {
        let mut obj = DynamicObject::new(name, &self.api_resource);
        if self.namespaced {
            obj.metadata.namespace = namespace.map(str::to_string);
        }
        obj
    }
}

/// Kind-indexed registry of [`KindInfo`].
#[derive(Clone, Debug)]
pub struct KindRegistry {
    kinds: BTreeMap<String, KindInfo>,
    /// Optional kinds found on the cluster
    present: BTreeSet<String>,
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl KindRegistry {
    /// Registry of every kind the operator knows. No optional kind is marked present.
    #[must_use]
    pub fn new() -> Self {
        let entries = [
            KindInfo::new("", "v1", KIND_CONFIG_MAP, "configmaps", true).mutable(),
            KindInfo::new("", "v1", KIND_SECRET, "secrets", true).mutable(),
            KindInfo::new("", "v1", KIND_SERVICE, "services", true),
            KindInfo::new("", "v1", KIND_SERVICE_ACCOUNT, "serviceaccounts", true),
            KindInfo::new("", "v1", KIND_POD, "pods", true).foreign(),
            KindInfo::new("apps", "v1", KIND_DEPLOYMENT, "deployments", true),
            KindInfo::new("rbac.authorization.k8s.io", "v1", KIND_ROLE, "roles", true),
            KindInfo::new(
                "rbac.authorization.k8s.io",
                "v1",
                KIND_ROLE_BINDING,
                "rolebindings",
                true,
            ),
            KindInfo::new(
                "rbac.authorization.k8s.io",
                "v1",
                KIND_CLUSTER_ROLE,
                "clusterroles",
                false,
            ),
            KindInfo::new(
                "rbac.authorization.k8s.io",
                "v1",
                KIND_CLUSTER_ROLE_BINDING,
                "clusterrolebindings",
                false,
            ),
            KindInfo::new(
                "apiextensions.k8s.io",
                "v1",
                KIND_CRD,
                "customresourcedefinitions",
                false,
            ),
            KindInfo::new(
                "apiregistration.k8s.io",
                "v1",
                KIND_API_SERVICE,
                "apiservices",
                false,
            ),
            KindInfo::new(
                "admissionregistration.k8s.io",
                "v1",
                KIND_VALIDATING_WEBHOOK,
                "validatingwebhookconfigurations",
                false,
            ),
            KindInfo::new(
                "admissionregistration.k8s.io",
                "v1",
                KIND_MUTATING_WEBHOOK,
                "mutatingwebhookconfigurations",
                false,
            ),
            KindInfo::new("route.openshift.io", "v1", KIND_ROUTE, "routes", true).optional(),
            KindInfo::new(
                "security.openshift.io",
                "v1",
                KIND_SCC,
                "securitycontextconstraints",
                false,
            )
            .optional()
            .foreign(),
            KindInfo::new(
                "monitoring.coreos.com",
                "v1",
                KIND_PROMETHEUS_RULE,
                "prometheusrules",
                true,
            )
            .optional(),
            KindInfo::new(
                crate::constants::API_GROUP,
                crate::constants::API_VERSION,
                KIND_DATA_VOLUME,
                crate::constants::PLURAL_DATA_VOLUMES,
                true,
            )
            .foreign(),
        ];

        Self {
            kinds: entries
                .into_iter()
                .map(|info| (info.kind().to_string(), info))
                .collect(),
            present: BTreeSet::new(),
        }
    }

    /// Mark optional kinds as served by the cluster.
    #[must_use]
    pub fn with_present<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.present.extend(kinds.into_iter().map(Into::into));
        self
    }

    /// Look up a kind.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::UnknownKind`] for kinds outside the registry.
    pub fn get(&self, kind: &str) -> Result<&KindInfo> {
        self.kinds
            .get(kind)
            .ok_or_else(|| OperatorError::UnknownKind(kind.to_string()))
    }

    /// Look up the kind of a dynamic object.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::UnknownKind`] when the object has no type
    /// information or an unregistered kind.
    pub fn for_object(&self, obj: &DynamicObject) -> Result<&KindInfo> {
        let kind = obj
            .types
            .as_ref()
            .map(|t| t.kind.as_str())
            .unwrap_or_default();
        self.get(kind)
    }

    /// Whether objects of `kind` can be used on this cluster.
    #[must_use]
    pub fn is_available(&self, kind: &str) -> bool {
        self.kinds
            .get(kind)
            .is_some_and(|info| !info.optional || self.present.contains(kind))
    }

    /// Optional kinds that must be probed at startup.
    pub fn optional_kinds(&self) -> impl Iterator<Item = &KindInfo> {
        self.kinds.values().filter(|info| info.optional)
    }

    /// Kinds the operator deploys and that are available on this cluster.
    ///
    /// These are watched for drift and swept after upgrades.
    pub fn dependant_kinds(&self) -> impl Iterator<Item = &KindInfo> {
        self.kinds
            .values()
            .filter(move |info| info.owned && self.is_available(info.kind()))
    }
}

#[cfg(test)]
#[path = "kinds_tests.rs"]
mod kinds_tests;
