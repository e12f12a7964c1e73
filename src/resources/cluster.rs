// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster-scoped resources.
//!
//! Static resources (RBAC and CRDs) depend only on the install namespace and are
//! skipped entirely when `deploy_cluster_resources` is off. Dynamic resources
//! (the aggregated API service and the admission webhooks) embed the API server
//! CA bundle, which the reconciler reads from the cluster beforehand.

use super::builder::{
    cluster_role, cluster_role_binding, meta, policy_rule, to_dynamic, with_common_labels,
};
use super::crds;
use crate::config::FactoryArgs;
use crate::constants::{
    API_GROUP, APISERVER_NAME, APISERVER_SERVICE_NAME, APISERVICE_NAME,
    CONTROLLER_CLUSTER_ROLE_NAME, CONTROLLER_SERVICE_ACCOUNT_NAME,
    DATAVOLUME_MUTATING_WEBHOOK_NAME, DATAVOLUME_VALIDATING_WEBHOOK_NAME, SERVICE_PORT,
};
use crate::errors::Result;
use crate::labels::CDI_LABEL;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    ValidatingWebhook, ValidatingWebhookConfiguration, WebhookClientConfig,
};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::{
    APIService, APIServiceSpec, ServiceReference as APIServiceReference,
};
use k8s_openapi::ByteString;
use kube::api::DynamicObject;

/// Upload API group served by the API server
pub const UPLOAD_API_GROUP: &str = "upload.cdi.kubevirt.io";

/// Validating webhook guarding `CDI` deletion
pub const CDI_VALIDATING_WEBHOOK_NAME: &str = "cdi-api-validate";

const CONFIG_READER_NAME: &str = "cdi.kubevirt.io:config-reader";
const AUTHENTICATED_GROUP: &str = "system:authenticated";
const WEBHOOK_TIMEOUT_SECONDS: i32 = 30;

/// Static cluster resources, in a stable order.
///
/// # Errors
///
/// Returns [`crate::errors::OperatorError::Serialization`] when an object fails
/// to convert.
pub fn static_resources(args: &FactoryArgs) -> Result<Vec<DynamicObject>> {
    let ns = args.namespace.as_str();
    let mut objects = vec![
        to_dynamic(&cluster_role(APISERVER_NAME, apiserver_rules()))?,
        to_dynamic(&cluster_role_binding(
            APISERVER_NAME,
            APISERVER_NAME,
            APISERVER_NAME,
            ns,
        ))?,
        to_dynamic(&cluster_role(CONTROLLER_CLUSTER_ROLE_NAME, controller_rules()))?,
        to_dynamic(&cluster_role_binding(
            CONTROLLER_SERVICE_ACCOUNT_NAME,
            CONTROLLER_CLUSTER_ROLE_NAME,
            CONTROLLER_SERVICE_ACCOUNT_NAME,
            ns,
        ))?,
    ];
    objects.extend(aggregate_roles()?);
    objects.extend(crds::resources()?);
    Ok(objects)
}

/// Dynamic cluster resources.
///
/// `ca_bundle` is the PEM content of the API server signer bundle, `None` while
/// it has not been written yet.
///
/// # Errors
///
/// Returns [`crate::errors::OperatorError::Serialization`] when an object fails
/// to convert.
pub fn dynamic_resources(args: &FactoryArgs, ca_bundle: Option<&str>) -> Result<Vec<DynamicObject>> {
    let ns = args.namespace.as_str();
    Ok(vec![
        to_dynamic(&api_service(ns, ca_bundle))?,
        to_dynamic(&datavolume_validating_webhook(ns, ca_bundle))?,
        to_dynamic(&datavolume_mutating_webhook(ns, ca_bundle))?,
        to_dynamic(&cdi_validating_webhook(ns, ca_bundle))?,
    ])
}

fn apiserver_rules() -> Vec<PolicyRule> {
    vec![
        policy_rule(&["authorization.k8s.io"], &["subjectaccessreviews"], &["create"]),
        policy_rule(&[""], &["configmaps"], &["get", "list", "watch"]),
        policy_rule(&[""], &["persistentvolumeclaims"], &["get"]),
        policy_rule(&[API_GROUP], &["datavolumes"], &["list", "get"]),
        policy_rule(&[API_GROUP], &["cdis"], &["get"]),
        policy_rule(&[API_GROUP], &["cdis/finalizers"], &["*"]),
    ]
}

fn controller_rules() -> Vec<PolicyRule> {
    let crud = ["get", "list", "watch", "create", "update", "delete"];
    let read = ["get", "list", "watch"];
    vec![
        policy_rule(&[""], &["events"], &["create", "patch"]),
        policy_rule(&[""], &["persistentvolumeclaims"], &crud),
        policy_rule(&[""], &["persistentvolumeclaims/finalizers", "pods/finalizers"], &["update"]),
        policy_rule(&[""], &["persistentvolumes"], &crud),
        policy_rule(&[""], &["pods", "services"], &["get", "list", "watch", "create", "delete"]),
        policy_rule(&[""], &["configmaps"], &["get"]),
        policy_rule(&["extensions"], &["ingresses"], &read),
        policy_rule(&["storage.k8s.io"], &["storageclasses"], &read),
        policy_rule(&["route.openshift.io"], &["routes"], &read),
        policy_rule(&["config.openshift.io"], &["proxies"], &read),
        policy_rule(&[API_GROUP], &["*"], &["*"]),
        policy_rule(&["snapshot.storage.k8s.io"], &["*"], &["*"]),
        policy_rule(&["apiextensions.k8s.io"], &["customresourcedefinitions"], &read),
    ]
}

fn view_rules() -> Vec<PolicyRule> {
    vec![
        policy_rule(&[API_GROUP], &["datavolumes"], &["get", "list", "watch"]),
        policy_rule(&[API_GROUP], &["datavolumes/source"], &["create"]),
        policy_rule(&[API_GROUP], &["cdiconfigs"], &["get", "list", "watch"]),
    ]
}

/// Admin and edit only differ in RBAC, which CDI does not grant.
fn admin_rules() -> Vec<PolicyRule> {
    vec![
        policy_rule(&[API_GROUP], &["datavolumes"], &["*"]),
        policy_rule(&[API_GROUP], &["datavolumes/source"], &["create"]),
        policy_rule(
            &[API_GROUP],
            &["cdiconfigs"],
            &["get", "list", "watch", "patch", "update"],
        ),
        policy_rule(&[UPLOAD_API_GROUP], &["uploadtokenrequests"], &["*"]),
    ]
}

fn aggregate_roles() -> Result<Vec<DynamicObject>> {
    let aggregate = |name: &str, to: &str, rules: Vec<PolicyRule>| {
        let mut role = cluster_role(name, rules);
        let label = format!("rbac.authorization.k8s.io/aggregate-to-{to}");
        role.metadata.labels = Some(with_common_labels(&[(label.as_str(), "true")]));
        to_dynamic(&role)
    };

    let reader_binding = ClusterRoleBinding {
        metadata: meta(CONFIG_READER_NAME, None),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: CONFIG_READER_NAME.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "Group".to_string(),
            name: AUTHENTICATED_GROUP.to_string(),
            api_group: Some("rbac.authorization.k8s.io".to_string()),
            ..Default::default()
        }]),
    };

    Ok(vec![
        aggregate("cdi.kubevirt.io:admin", "admin", admin_rules())?,
        aggregate("cdi.kubevirt.io:edit", "edit", admin_rules())?,
        aggregate("cdi.kubevirt.io:view", "view", view_rules())?,
        to_dynamic(&cluster_role(
            CONFIG_READER_NAME,
            vec![policy_rule(&[API_GROUP], &["cdiconfigs"], &["get", "list", "watch"])],
        ))?,
        to_dynamic(&reader_binding)?,
    ])
}

fn ca_bytes(ca_bundle: Option<&str>) -> Option<ByteString> {
    ca_bundle.map(|pem| ByteString(pem.as_bytes().to_vec()))
}

fn api_service(namespace: &str, ca_bundle: Option<&str>) -> APIService {
    APIService {
        metadata: ObjectMeta {
            labels: Some(with_common_labels(&[(CDI_LABEL, APISERVER_SERVICE_NAME)])),
            ..meta(APISERVICE_NAME, None)
        },
        spec: Some(APIServiceSpec {
            service: Some(APIServiceReference {
                name: Some(APISERVER_SERVICE_NAME.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            }),
            group: Some(UPLOAD_API_GROUP.to_string()),
            version: Some(crate::constants::API_VERSION.to_string()),
            ca_bundle: ca_bytes(ca_bundle),
            group_priority_minimum: 1000,
            version_priority: 15,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn client_config(namespace: &str, path: &str, ca_bundle: Option<&str>) -> WebhookClientConfig {
    WebhookClientConfig {
        service: Some(ServiceReference {
            name: APISERVER_SERVICE_NAME.to_string(),
            namespace: namespace.to_string(),
            path: Some(path.to_string()),
            port: Some(SERVICE_PORT),
        }),
        ca_bundle: ca_bytes(ca_bundle),
        ..Default::default()
    }
}

fn rule(operations: &[&str], resource: &str) -> RuleWithOperations {
    RuleWithOperations {
        operations: Some(operations.iter().map(|s| (*s).to_string()).collect()),
        api_groups: Some(vec![API_GROUP.to_string()]),
        api_versions: Some(vec![crate::constants::API_VERSION.to_string()]),
        resources: Some(vec![resource.to_string()]),
        scope: Some("*".to_string()),
    }
}

fn validating(
    name: &str,
    webhook: &str,
    path: &str,
    rules: Vec<RuleWithOperations>,
    namespace: &str,
    ca_bundle: Option<&str>,
) -> ValidatingWebhookConfiguration {
    ValidatingWebhookConfiguration {
        metadata: ObjectMeta {
            labels: Some(with_common_labels(&[(CDI_LABEL, APISERVER_SERVICE_NAME)])),
            ..meta(name, None)
        },
        webhooks: Some(vec![ValidatingWebhook {
            name: webhook.to_string(),
            admission_review_versions: vec!["v1".to_string(), "v1beta1".to_string()],
            client_config: client_config(namespace, path, ca_bundle),
            failure_policy: Some("Fail".to_string()),
            side_effects: "None".to_string(),
            match_policy: Some("Exact".to_string()),
            timeout_seconds: Some(WEBHOOK_TIMEOUT_SECONDS),
            namespace_selector: Some(LabelSelector::default()),
            object_selector: Some(LabelSelector::default()),
            rules: Some(rules),
            ..Default::default()
        }]),
    }
}

fn datavolume_validating_webhook(
    namespace: &str,
    ca_bundle: Option<&str>,
) -> ValidatingWebhookConfiguration {
    validating(
        DATAVOLUME_VALIDATING_WEBHOOK_NAME,
        "datavolume-validate.cdi.kubevirt.io",
        "/datavolume-validate",
        vec![rule(&["CREATE", "UPDATE"], "datavolumes")],
        namespace,
        ca_bundle,
    )
}

fn cdi_validating_webhook(namespace: &str, ca_bundle: Option<&str>) -> ValidatingWebhookConfiguration {
    validating(
        CDI_VALIDATING_WEBHOOK_NAME,
        "cdi-validate.cdi.kubevirt.io",
        "/cdi-validate",
        vec![rule(&["DELETE"], "cdis")],
        namespace,
        ca_bundle,
    )
}

fn datavolume_mutating_webhook(namespace: &str, ca_bundle: Option<&str>) -> MutatingWebhookConfiguration {
    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            labels: Some(with_common_labels(&[(CDI_LABEL, APISERVER_SERVICE_NAME)])),
            ..meta(DATAVOLUME_MUTATING_WEBHOOK_NAME, None)
        },
        webhooks: Some(vec![MutatingWebhook {
            name: "datavolume-mutate.cdi.kubevirt.io".to_string(),
            admission_review_versions: vec!["v1".to_string(), "v1beta1".to_string()],
            client_config: client_config(namespace, "/datavolume-mutate", ca_bundle),
            failure_policy: Some("Fail".to_string()),
            side_effects: "None".to_string(),
            match_policy: Some("Exact".to_string()),
            reinvocation_policy: Some("Never".to_string()),
            timeout_seconds: Some(WEBHOOK_TIMEOUT_SECONDS),
            namespace_selector: Some(LabelSelector::default()),
            object_selector: Some(LabelSelector::default()),
            rules: Some(vec![rule(&["CREATE", "UPDATE"], "datavolumes")]),
            ..Default::default()
        }]),
    }
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod cluster_tests;
