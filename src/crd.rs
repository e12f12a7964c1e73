// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for the CDI operator.
//!
//! This module defines the cluster-scoped [`CDI`] resource that declares the desired
//! state of a Containerized Data Importer installation. Only one `CDI` resource may be
//! active in a cluster; see [`crate::ownership`] for how that is enforced.
//!
//! # Example: Declaring an installation
//!
//! ```rust,no_run
//! use cdi_operator::crd::{CDISpec, PullPolicy, UninstallStrategy};
//!
//! let spec = CDISpec {
//!     image_registry: Some("quay.io/project".to_string()),
//!     image_pull_policy: Some(PullPolicy::IfNotPresent),
//!     uninstall_strategy: Some(UninstallStrategy::BlockUninstallIfWorkloadsExist),
//!     ..Default::default()
//! };
//! ```

use k8s_openapi::api::core::v1::{Affinity, ResourceRequirements, Toleration};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Condition represents an observation of a resource's current state.
///
/// The `CDI` resource reports `Available`, `Progressing` and `Degraded`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition: Available, Progressing or Degraded.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    /// Last time the condition was probed (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_time: Option<String>,
}

/// Image pull policy applied to every operator-managed container.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum PullPolicy {
    Always,
    IfNotPresent,
    Never,
}

impl PullPolicy {
    /// Kubernetes string form of the policy.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "Always",
            Self::IfNotPresent => "IfNotPresent",
            Self::Never => "Never",
        }
    }
}

/// What to do with user workloads when the `CDI` resource is deleted.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum UninstallStrategy {
    /// Remove the installation regardless of remaining workloads.
    #[default]
    RemoveWorkloads,
    /// Refuse to uninstall while any `DataVolume` exists.
    BlockUninstallIfWorkloadsExist,
}

/// Node placement for a group of pods.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodePlacement {
    /// Node selector applied to the pod spec.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Affinity applied to the pod spec.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Tolerations applied to the pod spec.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,
}

/// Lifetime overrides for one class of certificates.
///
/// Both values are Go duration strings (e.g. `"48h"`, `"720h0m0s"`).
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertConfig {
    /// Total validity of the certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    /// Window before expiry in which the certificate is renewed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renew_before: Option<String>,
}

/// Certificate overrides for signers, server and client certificates.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CDICertConfig {
    /// Signer (CA) certificates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca: Option<CertConfig>,

    /// Server certificates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<CertConfig>,

    /// Client certificates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<CertConfig>,
}

/// Proxy settings passed to importer pods.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportProxy {
    #[serde(rename = "HTTPProxy", skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,
    #[serde(rename = "HTTPSProxy", skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,
    #[serde(rename = "noProxy", skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<String>,
    /// Name of a `ConfigMap` holding a CA bundle trusted for the proxy.
    #[serde(rename = "trustedCAProxy", skip_serializing_if = "Option::is_none")]
    pub trusted_ca_proxy: Option<String>,
}

/// Filesystem overhead ratios (decimal strings between 0 and 1).
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemOverhead {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<BTreeMap<String, String>>,
}

/// Runtime configuration consumed by the CDI controller workload.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CDIConfigSpec {
    /// Override of the upload proxy URL published to clients.
    #[serde(rename = "uploadProxyURLOverride", skip_serializing_if = "Option::is_none")]
    pub upload_proxy_url_override: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_proxy: Option<ImportProxy>,

    /// Storage class used for scratch space.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_space_storage_class: Option<String>,

    /// Resource requirements of worker pods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_resource_requirements: Option<ResourceRequirements>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_gates: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesystem_overhead: Option<FilesystemOverhead>,

    /// Preallocate disk space for new volumes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preallocation: Option<bool>,

    /// Registries that may be accessed without TLS verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure_registries: Option<Vec<String>>,
}

/// A user supplied patch applied to generated resources.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct CustomizeComponentsPatch {
    /// Name of the target resource, or `*` for any name.
    pub resource_name: String,

    /// Kind of the target resource, or `*` for any kind.
    pub resource_type: String,

    /// Patch body (JSON).
    pub patch: String,

    /// Patch type: `json`, `merge` or `strategic`.
    #[serde(rename = "type")]
    pub patch_type: String,
}

/// Extra command line flags per component, rendered as `-<name> <value>`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Flags {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub api: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub controller: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub upload_proxy: BTreeMap<String, String>,
}

/// User customizations of generated resources.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomizeComponents {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<CustomizeComponentsPatch>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<Flags>,
}

/// `CDI` declares the desired state of the Containerized Data Importer installation.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "cdi.kubevirt.io",
    version = "v1beta1",
    kind = "CDI",
    shortname = "cdi",
    shortname = "cdis",
    doc = "CDI is the cluster-scoped resource that installs and configures the Containerized Data Importer. Only one CDI resource may be active per cluster.",
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[kube(status = "CDIStatus")]
#[serde(rename_all = "camelCase")]
pub struct CDISpec {
    /// Registry prefix used for every workload image (e.g. `quay.io/project`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_registry: Option<String>,

    /// Tag used for every workload image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<PullPolicy>,

    /// Placement of infrastructure pods (API server, controller, upload proxy).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infra: Option<NodePlacement>,

    /// Placement of workload pods (importer, cloner, upload server).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workload: Option<NodePlacement>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_config: Option<CDICertConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub uninstall_strategy: Option<UninstallStrategy>,

    /// Priority class assigned to infrastructure pods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_class: Option<String>,

    /// Override the clone strategy chosen by the controller (`copy`, `snapshot`, `csi-clone`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clone_strategy_override: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<CDIConfigSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub customize_components: Option<CustomizeComponents>,
}

/// Installation phase reported in `status.phase`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum Phase {
    Deploying,
    Deployed,
    Deleting,
    Deleted,
    Error,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Deploying => "Deploying",
            Self::Deployed => "Deployed",
            Self::Deleting => "Deleting",
            Self::Deleted => "Deleted",
            Self::Error => "Error",
        };
        f.write_str(s)
    }
}

/// `CDI` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CDIStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Version of the operator currently running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_version: Option<String>,

    /// Version the installation is converging towards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,

    /// Version at which the installation was last fully ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_version: Option<String>,
}

impl CDI {
    /// Effective uninstall strategy.
    #[must_use]
    pub fn uninstall_strategy(&self) -> UninstallStrategy {
        self.spec.uninstall_strategy.unwrap_or_default()
    }

    /// Current phase, if any.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        self.status.as_ref().and_then(|s| s.phase)
    }

    /// Observed version, empty when never deployed.
    #[must_use]
    pub fn observed_version(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.observed_version.as_deref())
            .unwrap_or_default()
    }

    /// Target version, empty when never set.
    #[must_use]
    pub fn target_version(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.target_version.as_deref())
            .unwrap_or_default()
    }

    /// Whether the given finalizer is present.
    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
