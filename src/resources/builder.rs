// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared constructors for the objects the operator deploys.
//!
//! Everything here is pure: typed `k8s-openapi` values in, typed values out.
//! [`to_dynamic`] turns a typed object into the `DynamicObject` the differ works
//! on.

use crate::crd::NodePlacement;
use crate::errors::{OperatorError, Result};
use crate::labels::{
    CDI_LABEL, COMPONENT_STORAGE, K8S_COMPONENT, K8S_MANAGED_BY, MANAGED_BY_CDI_OPERATOR,
    OPERATOR_LABEL,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, EnvVar, EnvVarSource, ObjectFieldSelector, PodSecurityContext, PodSpec,
    PodTemplateSpec, Service, ServiceAccount, ServicePort, ServiceSpec,
};
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::DynamicObject;
use serde::Serialize;
use std::collections::BTreeMap;

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";
const TERMINATION_MESSAGE_POLICY: &str = "File";
const TERMINATION_MESSAGE_PATH: &str = "/dev/termination-log";

/// Labels every operand object carries.
#[must_use]
pub fn common_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (CDI_LABEL.to_string(), String::new()),
        (K8S_MANAGED_BY.to_string(), MANAGED_BY_CDI_OPERATOR.to_string()),
        (K8S_COMPONENT.to_string(), COMPONENT_STORAGE.to_string()),
    ])
}

/// Labels of objects that belong to the operator itself rather than an operand.
#[must_use]
pub fn operator_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(OPERATOR_LABEL.to_string(), String::new())])
}

/// [`common_labels`] plus `extra`; `extra` wins on conflicts.
#[must_use]
pub fn with_common_labels(extra: &[(&str, &str)]) -> BTreeMap<String, String> {
    let mut labels = common_labels();
    labels.extend(extra.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())));
    labels
}

/// Metadata with a name, an optional namespace and the common labels.
#[must_use]
pub fn meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: Some(common_labels()),
        ..Default::default()
    }
}

#[must_use]
pub fn policy_rule(api_groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    let owned = |items: &[&str]| Some(items.iter().map(|s| (*s).to_string()).collect());
    PolicyRule {
        api_groups: owned(api_groups),
        resources: owned(resources),
        verbs: verbs.iter().map(|s| (*s).to_string()).collect(),
        ..Default::default()
    }
}

#[must_use]
pub fn service_account(name: &str, namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: meta(name, Some(namespace)),
        ..Default::default()
    }
}

#[must_use]
pub fn role(name: &str, namespace: &str, rules: Vec<PolicyRule>) -> Role {
    Role {
        metadata: meta(name, Some(namespace)),
        rules: Some(rules),
    }
}

fn service_account_subject(service_account: &str, namespace: &str) -> Subject {
    Subject {
        kind: "ServiceAccount".to_string(),
        name: service_account.to_string(),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

/// Role binding granting `role` to a service account of the same namespace.
#[must_use]
pub fn role_binding(name: &str, role: &str, service_account: &str, namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: meta(name, Some(namespace)),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: role.to_string(),
        },
        subjects: Some(vec![service_account_subject(service_account, namespace)]),
    }
}

#[must_use]
pub fn cluster_role(name: &str, rules: Vec<PolicyRule>) -> ClusterRole {
    ClusterRole {
        metadata: meta(name, None),
        rules: Some(rules),
        ..Default::default()
    }
}

#[must_use]
pub fn cluster_role_binding(
    name: &str,
    role: &str,
    service_account: &str,
    namespace: &str,
) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: meta(name, None),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: role.to_string(),
        },
        subjects: Some(vec![service_account_subject(service_account, namespace)]),
    }
}

/// Service selecting pods labelled `match_key: match_value`, `port` forwarding to `target_port`.
#[must_use]
pub fn service(
    name: &str,
    namespace: &str,
    match_key: &str,
    match_value: &str,
    port: i32,
    target_port: i32,
) -> Service {
    Service {
        metadata: meta(name, Some(namespace)),
        spec: Some(ServiceSpec {
            selector: Some(BTreeMap::from([(
                match_key.to_string(),
                match_value.to_string(),
            )])),
            ports: Some(vec![ServicePort {
                port,
                target_port: Some(IntOrString::Int(target_port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Container with the pull policy, termination message defaults and `-v=<verbosity>`.
#[must_use]
pub fn container(name: &str, image: &str, verbosity: &str, pull_policy: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some(pull_policy.to_string()),
        args: Some(vec![format!("-v={verbosity}")]),
        termination_message_policy: Some(TERMINATION_MESSAGE_POLICY.to_string()),
        termination_message_path: Some(TERMINATION_MESSAGE_PATH.to_string()),
        ..Default::default()
    }
}

/// Environment variable read from a label of the pod.
#[must_use]
pub fn env_from_label(name: &str, label: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                api_version: Some("v1".to_string()),
                field_path: format!("metadata.labels['{label}']"),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[must_use]
pub fn env_value(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

/// Deployment running as non-root, selecting pods by `match_key: match_value`.
///
/// Containers are left empty for the caller to fill in.
#[must_use]
pub fn deployment(
    name: &str,
    namespace: &str,
    match_key: &str,
    match_value: &str,
    service_account: &str,
    replicas: i32,
    placement: Option<&NodePlacement>,
) -> Deployment {
    let mut pod_labels = common_labels();
    pod_labels.insert(match_key.to_string(), match_value.to_string());

    let mut pod_spec = PodSpec {
        service_account_name: Some(service_account.to_string()),
        security_context: Some(PodSecurityContext {
            run_as_non_root: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };
    if let Some(placement) = placement {
        pod_spec.node_selector.clone_from(&placement.node_selector);
        pod_spec.affinity.clone_from(&placement.affinity);
        pod_spec.tolerations.clone_from(&placement.tolerations);
    }

    Deployment {
        metadata: ObjectMeta {
            labels: Some(pod_labels.clone()),
            ..meta(name, Some(namespace))
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    match_key.to_string(),
                    match_value.to_string(),
                )])),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[must_use]
pub fn config_map(name: &str, namespace: &str, data: Option<BTreeMap<String, String>>) -> ConfigMap {
    ConfigMap {
        metadata: meta(name, Some(namespace)),
        data,
        ..Default::default()
    }
}

/// Convert a typed object into a `DynamicObject`.
///
/// # Errors
///
/// Returns [`OperatorError::Serialization`] if the object does not round-trip.
pub fn to_dynamic<K>(obj: &K) -> Result<DynamicObject>
where
    K: Serialize,
{
    let value = serde_json::to_value(obj)?;
    if value.get("kind").is_none() {
        return Err(OperatorError::MissingField {
            kind: "unknown".to_string(),
            name: value["metadata"]["name"].as_str().unwrap_or_default().to_string(),
            field: "kind".to_string(),
        });
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod builder_tests;
