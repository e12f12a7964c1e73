// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Workload CRDs installed by the operator.
//!
//! The schemas belong to the workloads, so every CRD is published with an
//! opaque schema that preserves unknown fields.

use super::builder::{meta, to_dynamic};
use crate::constants::{API_GROUP, API_VERSION};
use crate::errors::Result;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionNames, CustomResourceDefinitionSpec,
    CustomResourceDefinitionVersion, CustomResourceSubresourceStatus,
    CustomResourceSubresources, CustomResourceValidation, JSONSchemaProps,
};
use kube::api::DynamicObject;

/// `(kind, plural, short names, namespaced)` of every workload CRD.
const WORKLOAD_CRDS: &[(&str, &str, &[&str], bool)] = &[
    ("DataVolume", "datavolumes", &["dv", "dvs"], true),
    ("CDIConfig", "cdiconfigs", &[], false),
    ("StorageProfile", "storageprofiles", &[], false),
    ("DataSource", "datasources", &["das"], true),
    ("DataImportCron", "dataimportcrons", &["dic", "dics"], true),
    ("ObjectTransfer", "objecttransfers", &["ot", "ots"], false),
];

fn opaque_schema() -> CustomResourceValidation {
    CustomResourceValidation {
        open_api_v3_schema: Some(JSONSchemaProps {
            type_: Some("object".to_string()),
            x_kubernetes_preserve_unknown_fields: Some(true),
            ..Default::default()
        }),
    }
}

fn crd(kind: &str, plural: &str, short_names: &[&str], namespaced: bool) -> CustomResourceDefinition {
    CustomResourceDefinition {
        metadata: meta(&format!("{plural}.{API_GROUP}"), None),
        spec: CustomResourceDefinitionSpec {
            group: API_GROUP.to_string(),
            names: CustomResourceDefinitionNames {
                kind: kind.to_string(),
                list_kind: Some(format!("{kind}List")),
                plural: plural.to_string(),
                singular: Some(kind.to_lowercase()),
                short_names: (!short_names.is_empty())
                    .then(|| short_names.iter().map(|s| (*s).to_string()).collect()),
                categories: Some(vec!["all".to_string()]).filter(|_| namespaced),
            },
            scope: if namespaced { "Namespaced" } else { "Cluster" }.to_string(),
            versions: vec![CustomResourceDefinitionVersion {
                name: API_VERSION.to_string(),
                served: true,
                storage: true,
                schema: Some(opaque_schema()),
                subresources: Some(CustomResourceSubresources {
                    status: Some(CustomResourceSubresourceStatus(serde_json::json!({}))),
                    scale: None,
                }),
                ..Default::default()
            }],
            ..Default::default()
        },
        status: None,
    }
}

/// Every workload CRD, in a stable order.
///
/// # Errors
///
/// Returns [`crate::errors::OperatorError::Serialization`] when a CRD fails to
/// convert.
pub fn resources() -> Result<Vec<DynamicObject>> {
    WORKLOAD_CRDS
        .iter()
        .map(|(kind, plural, short, namespaced)| to_dynamic(&crd(kind, plural, short, *namespaced)))
        .collect()
}

#[cfg(test)]
#[path = "crds_tests.rs"]
mod crds_tests;
