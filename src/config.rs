// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Process configuration for the CDI operator.
//!
//! [`FactoryArgs`] is read once in `main` from the environment and passed down to
//! every component. Per-reconcile overrides from the `CDI` resource (image registry,
//! tag, pull policy, infra placement, priority class) are layered on top with
//! [`FactoryArgs::for_instance`].

use crate::constants::{
    DEFAULT_CERT_POLL_INTERVAL_SECS, DEFAULT_INSTALL_NAMESPACE, DEFAULT_MONITORING_NAMESPACE,
    DEFAULT_RUNBOOK_URL_TEMPLATE, METRICS_SERVER_PORT,
};
use crate::crd::{NodePlacement, CDI};
use crate::duration::parse_duration;
use anyhow::{bail, Result};
use clap::Parser;
use std::time::Duration;

/// Command line flags of the operator binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "cdi-operator", version, about = "Containerized Data Importer operator")]
pub struct Cli {
    /// Port of the metrics and health server
    #[arg(long, env = "METRICS_PORT", default_value_t = METRICS_SERVER_PORT)]
    pub metrics_port: u16,

    /// Disable the metrics and health server
    #[arg(long, env = "DISABLE_METRICS", default_value_t = false)]
    pub disable_metrics: bool,

    /// How often certificates are checked for rotation (Go duration)
    #[arg(long, env = "CERT_POLL_INTERVAL", default_value = "1m", value_parser = parse_poll_interval)]
    pub cert_poll_interval: Duration,
}

fn parse_poll_interval(raw: &str) -> std::result::Result<Duration, String> {
    parse_duration(raw).map_err(|e| format!("invalid duration '{raw}': {e}"))
}

/// Arguments consumed by the resource builders.
#[derive(Clone, Debug, PartialEq)]
pub struct FactoryArgs {
    /// Version of the running operator
    pub operator_version: String,
    pub controller_image: String,
    pub importer_image: String,
    pub cloner_image: String,
    pub apiserver_image: String,
    pub uploadproxy_image: String,
    pub uploadserver_image: String,
    /// Log verbosity passed to workloads as `-v=<n>`
    pub verbosity: String,
    /// Image pull policy for every workload container
    pub pull_policy: String,
    pub priority_class_name: Option<String>,
    /// Namespace the installation lives in
    pub namespace: String,
    /// Whether cluster-scoped resources are deployed at all
    pub deploy_cluster_resources: bool,
    /// Placement of infrastructure pods
    pub infra_node_placement: Option<NodePlacement>,
    /// Interval between certificate rotation checks
    pub cert_poll_interval: Duration,
    /// Namespace of the Prometheus service account granted access to metrics
    pub monitoring_namespace: String,
    /// `format!`-style template with one `{}` for the alert name
    pub runbook_url_template: String,
}

impl FactoryArgs {
    /// Read the arguments from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first required variable that is missing.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the arguments through an arbitrary lookup function.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first required variable that is missing.
    ///
    /// `cert_poll_interval` starts at its default; `main` sets it from [`Cli`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(value) if !value.is_empty() => Ok(value),
                _ => bail!("required environment variable {key} is not set"),
            }
        };

        let namespace = lookup("NAMESPACE")
            .filter(|s| !s.is_empty())
            .or_else(|| lookup("POD_NAMESPACE").filter(|s| !s.is_empty()))
            .unwrap_or_else(|| DEFAULT_INSTALL_NAMESPACE.to_string());

        let deploy_cluster_resources = lookup("DEPLOY_CLUSTER_RESOURCES")
            .is_none_or(|v| !v.eq_ignore_ascii_case("false"));

        Ok(Self {
            operator_version: required("OPERATOR_VERSION")?,
            controller_image: required("CONTROLLER_IMAGE")?,
            importer_image: required("IMPORTER_IMAGE")?,
            cloner_image: required("CLONER_IMAGE")?,
            apiserver_image: required("APISERVER_IMAGE")?,
            uploadproxy_image: required("UPLOAD_PROXY_IMAGE")?,
            uploadserver_image: required("UPLOAD_SERVER_IMAGE")?,
            verbosity: required("VERBOSITY")?,
            pull_policy: required("PULL_POLICY")?,
            priority_class_name: lookup("PRIORITY_CLASS_NAME").filter(|s| !s.is_empty()),
            namespace,
            deploy_cluster_resources,
            infra_node_placement: None,
            cert_poll_interval: Duration::from_secs(DEFAULT_CERT_POLL_INTERVAL_SECS),
            monitoring_namespace: lookup("MONITORING_NAMESPACE")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_MONITORING_NAMESPACE.to_string()),
            runbook_url_template: lookup("RUNBOOK_URL_TEMPLATE")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_RUNBOOK_URL_TEMPLATE.to_string()),
        })
    }

    /// Apply the overrides declared on a `CDI` resource.
    #[must_use]
    pub fn for_instance(&self, cdi: &CDI) -> Self {
        let mut args = self.clone();
        let registry = cdi.spec.image_registry.as_deref();
        let tag = cdi.spec.image_tag.as_deref();

        for image in [
            &mut args.controller_image,
            &mut args.importer_image,
            &mut args.cloner_image,
            &mut args.apiserver_image,
            &mut args.uploadproxy_image,
            &mut args.uploadserver_image,
        ] {
            *image = override_image(image, registry, tag);
        }

        if let Some(policy) = cdi.spec.image_pull_policy {
            args.pull_policy = policy.as_str().to_string();
        }
        if let Some(priority_class) = cdi.spec.priority_class.as_ref() {
            args.priority_class_name = Some(priority_class.clone());
        }
        if let Some(infra) = cdi.spec.infra.as_ref() {
            args.infra_node_placement = Some(infra.clone());
        }
        args
    }
}

#[cfg(test)]
impl FactoryArgs {
    /// Arguments of a `v1.5.0` install into the `cdi` namespace.
    pub fn for_tests() -> Self {
        let image = |name: &str| format!("quay.io/kubevirt/{name}:v1.5.0");
        Self {
            operator_version: "v1.5.0".to_string(),
            controller_image: image("cdi-controller"),
            importer_image: image("cdi-importer"),
            cloner_image: image("cdi-cloner"),
            apiserver_image: image("cdi-apiserver"),
            uploadproxy_image: image("cdi-uploadproxy"),
            uploadserver_image: image("cdi-uploadserver"),
            verbosity: "1".to_string(),
            pull_policy: "IfNotPresent".to_string(),
            priority_class_name: None,
            namespace: DEFAULT_INSTALL_NAMESPACE.to_string(),
            deploy_cluster_resources: true,
            infra_node_placement: None,
            cert_poll_interval: Duration::from_secs(DEFAULT_CERT_POLL_INTERVAL_SECS),
            monitoring_namespace: DEFAULT_MONITORING_NAMESPACE.to_string(),
            runbook_url_template: DEFAULT_RUNBOOK_URL_TEMPLATE.to_string(),
        }
    }
}

/// Replace the registry prefix and/or tag of an image reference.
///
/// `quay.io/kubevirt/cdi-controller:v1.5.0` with registry `quay.io/project`
/// becomes `quay.io/project/cdi-controller:v1.5.0`. Digest references keep their
/// digest unless a tag override is given.
#[must_use]
pub fn override_image(image: &str, registry: Option<&str>, tag: Option<&str>) -> String {
    let registry = registry.map(|r| r.trim_end_matches('/')).filter(|r| !r.is_empty());
    let tag = tag.filter(|t| !t.is_empty());
    if registry.is_none() && tag.is_none() {
        return image.to_string();
    }

    let (prefix, last) = match image.rsplit_once('/') {
        Some((prefix, last)) => (Some(prefix), last),
        None => (None, image),
    };

    let (name, reference) = if let Some((name, digest)) = last.split_once('@') {
        (name, format!("@{digest}"))
    } else if let Some((name, current_tag)) = last.rsplit_once(':') {
        (name, format!(":{current_tag}"))
    } else {
        (last, String::new())
    };

    let reference = tag.map_or(reference, |t| format!(":{t}"));

    match registry.or(prefix) {
        Some(prefix) => format!("{prefix}/{name}{reference}"),
        None => format!("{name}{reference}"),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
