// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Resources of kinds that only some clusters serve.
//!
//! `Route` and `SecurityContextConstraints` exist on `OpenShift`,
//! `PrometheusRule` wherever the Prometheus operator runs. None of them have
//! `k8s-openapi` types, so they are built as JSON.

use super::builder::{common_labels, meta, policy_rule, to_dynamic};
use crate::config::FactoryArgs;
use crate::constants::{
    MONITORING_RBAC_NAME, PROMETHEUS_RULE_NAME, PROMETHEUS_SERVICE_ACCOUNT, ROUTE_TIMEOUT,
    SCC_NAME, UPLOADPROXY_NAME,
};
use crate::errors::Result;
use crate::labels::{CDI_LABEL, PROMETHEUS_LABEL, PROMETHEUS_LABEL_VALUE, ROUTE_TIMEOUT_ANNOTATION};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Service account user name as it appears in SCC user lists.
#[must_use]
pub fn service_account_user(namespace: &str, name: &str) -> String {
    format!("system:serviceaccount:{namespace}:{name}")
}

/// Labels of objects that only exist for monitoring.
#[must_use]
pub fn monitoring_labels() -> BTreeMap<String, String> {
    let mut labels = common_labels();
    labels.insert(PROMETHEUS_LABEL.to_string(), PROMETHEUS_LABEL_VALUE.to_string());
    labels
}

/// Re-encrypting route in front of the upload proxy service.
///
/// `ca_bundle` is the upload proxy signer bundle the router trusts for the
/// backend connection.
///
/// # Errors
///
/// Returns [`crate::errors::OperatorError::Serialization`] when the object fails
/// to convert.
pub fn upload_proxy_route(namespace: &str, ca_bundle: &str) -> Result<DynamicObject> {
    Ok(serde_json::from_value(json!({
        "apiVersion": "route.openshift.io/v1",
        "kind": "Route",
        "metadata": {
            "name": UPLOADPROXY_NAME,
            "namespace": namespace,
            "labels": common_labels(),
            "annotations": { ROUTE_TIMEOUT_ANNOTATION: ROUTE_TIMEOUT },
        },
        "spec": {
            "to": { "kind": "Service", "name": UPLOADPROXY_NAME },
            "tls": {
                "termination": "reencrypt",
                "destinationCACertificate": ca_bundle,
            },
        },
    }))?)
}

/// The SCC granted to the controller, created once and left to the cluster admin.
///
/// # Errors
///
/// Returns [`crate::errors::OperatorError::Serialization`] when the object fails
/// to convert.
pub fn security_context_constraints(users: &[String]) -> Result<DynamicObject> {
    Ok(serde_json::from_value(json!({
        "apiVersion": "security.openshift.io/v1",
        "kind": "SecurityContextConstraints",
        "metadata": {
            "name": SCC_NAME,
            "labels": { CDI_LABEL: "" },
        },
        "priority": 10,
        "allowHostDirVolumePlugin": false,
        "allowHostIPC": false,
        "allowHostNetwork": false,
        "allowHostPID": false,
        "allowHostPorts": false,
        "allowPrivilegedContainer": false,
        "readOnlyRootFilesystem": false,
        "fsGroup": { "type": "RunAsAny" },
        "requiredDropCapabilities": ["MKNOD"],
        "runAsUser": { "type": "RunAsAny" },
        "seLinuxContext": { "type": "MustRunAs" },
        "supplementalGroups": { "type": "RunAsAny" },
        "volumes": [
            "configMap",
            "downwardAPI",
            "emptyDir",
            "persistentVolumeClaim",
            "projected",
            "secret",
        ],
        "users": users,
    }))?)
}

fn alert(
    name: &str,
    expr: &str,
    duration: &str,
    summary: &str,
    severity: &str,
    health_impact: &str,
    runbook_template: &str,
) -> Value {
    json!({
        "alert": name,
        "expr": expr,
        "for": duration,
        "annotations": {
            "summary": summary,
            "runbook_url": runbook_template.replacen("{}", name, 1),
        },
        "labels": {
            "severity": severity,
            "operator_health_impact": health_impact,
            "kubernetes_operator_part_of": "kubevirt",
            "kubernetes_operator_component": "containerized-data-importer",
        },
    })
}

/// `(name, expr, for, summary, severity, operator_health_impact)`
const ALERTS: &[(&str, &str, &str, &str, &str, &str)] = &[
    (
        "CDIOperatorDown",
        "kubevirt_cdi_operator_up == 0",
        "10m",
        "CDI operator is down",
        "critical",
        "critical",
    ),
    (
        "CDINotReady",
        "kubevirt_cdi_cr_ready == 0",
        "10m",
        "CDI is not available to use",
        "critical",
        "critical",
    ),
    (
        "CDIDataVolumeUnusualRestartCount",
        "kubevirt_cdi_import_pods_high_restart > 0 or kubevirt_cdi_upload_pods_high_restart > 0 or kubevirt_cdi_clone_pods_high_restart > 0",
        "5m",
        "Some CDI population workloads have an unusual restart count, meaning they are probably failing and need to be investigated",
        "warning",
        "warning",
    ),
    (
        "CDIStorageProfilesIncomplete",
        r#"sum by(storageclass,provisioner) ((kubevirt_cdi_storageprofile_info{complete="false"}>0))"#,
        "5m",
        "Incomplete StorageProfile {{ $labels.storageclass }}, accessMode/volumeMode cannot be inferred by CDI for PVC population request",
        "info",
        "none",
    ),
    (
        "CDIDataImportCronOutdated",
        r#"sum by(namespace,cron_name) (kubevirt_cdi_dataimportcron_outdated{pending="false"}) > 0"#,
        "15m",
        "DataImportCron (recurring polling of VM templates disk image sources, also known as golden images) PVCs are not being updated on the defined schedule",
        "warning",
        "none",
    ),
    (
        "CDINoDefaultStorageClass",
        r#"sum(kubevirt_cdi_storageprofile_info{default="true"} or on() vector(0)) + sum(kubevirt_cdi_storageprofile_info{virtdefault="true"} or on() vector(0)) + (count(kubevirt_cdi_datavolume_pending == 0) or on() vector(0)) == 0"#,
        "5m",
        "No default StorageClass or virtualization StorageClass, and a DataVolume is pending for one",
        "warning",
        "none",
    ),
    (
        "CDIMultipleDefaultVirtStorageClasses",
        r#"sum(kubevirt_cdi_storageprofile_info{virtdefault="true"} or on() vector(0)) > 1"#,
        "5m",
        "More than one default virtualization StorageClass detected",
        "warning",
        "none",
    ),
];

fn alert_rules(runbook_template: &str) -> Vec<Value> {
    ALERTS
        .iter()
        .map(|&(name, expr, duration, summary, severity, impact)| {
            alert(name, expr, duration, summary, severity, impact, runbook_template)
        })
        .collect()
}

/// Monitoring rule, role and binding, in a stable order.
///
/// # Errors
///
/// Returns [`crate::errors::OperatorError::Serialization`] when an object fails
/// to convert.
pub fn monitoring_resources(args: &FactoryArgs) -> Result<Vec<DynamicObject>> {
    let ns = args.namespace.as_str();

    let rule: DynamicObject = serde_json::from_value(json!({
        "apiVersion": "monitoring.coreos.com/v1",
        "kind": "PrometheusRule",
        "metadata": {
            "name": PROMETHEUS_RULE_NAME,
            "namespace": ns,
            "labels": monitoring_labels(),
        },
        "spec": {
            "groups": [{
                "name": "cdi.rules",
                "rules": alert_rules(&args.runbook_url_template),
            }],
        },
    }))?;

    let role_meta = ObjectMeta {
        labels: Some(monitoring_labels()),
        ..meta(MONITORING_RBAC_NAME, Some(ns))
    };
    let role = Role {
        metadata: role_meta.clone(),
        rules: Some(vec![policy_rule(
            &[""],
            &["services", "endpoints", "pods"],
            &["get", "list", "watch"],
        )]),
    };
    let binding = RoleBinding {
        metadata: role_meta,
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: MONITORING_RBAC_NAME.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: PROMETHEUS_SERVICE_ACCOUNT.to_string(),
            namespace: Some(args.monitoring_namespace.clone()),
            ..Default::default()
        }]),
    };

    Ok(vec![rule, to_dynamic(&role)?, to_dynamic(&binding)?])
}

#[cfg(test)]
#[path = "optional_tests.rs"]
mod optional_tests;
