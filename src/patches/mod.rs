// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! User customization of the deployed objects.
//!
//! A `CDI` resource may carry `spec.customizeComponents`: a list of patches
//! targeting objects by kind and name, plus per-component command line flags.
//! [`Customizer`] turns both into an ordered patch list and applies it to the
//! desired objects before they are converged. Every patched object is stamped
//! with the annotation `cdi.kubevirt.io/customize-components-hash`, so changing
//! the customization always rolls the workloads.
//!
//! # Patch types
//!
//! - `strategic` - merge-key aware merge, see [`strategic`]
//! - `merge` - RFC 7396 JSON merge patch
//! - `json` - RFC 6902 JSON patch; removing a missing path is a no-op and
//!   adding below a missing parent creates the parent

pub mod strategic;

use crate::constants::{
    APISERVER_NAME, CONTROLLER_CONTAINER_NAME, CONTROLLER_DEPLOYMENT_NAME, UPLOADPROXY_NAME,
};
use crate::crd::{CustomizeComponents, CustomizeComponentsPatch, Flags};
use crate::errors::{OperatorError, Result};
use crate::kinds::{
    KIND_API_SERVICE, KIND_DEPLOYMENT, KIND_MUTATING_WEBHOOK, KIND_SERVICE,
    KIND_VALIDATING_WEBHOOK,
};
use crate::labels::CUSTOMIZE_COMPONENTS_HASH_ANNOTATION;
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::{json, Value};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use tracing::debug;

pub const PATCH_TYPE_JSON: &str = "json";
pub const PATCH_TYPE_MERGE: &str = "merge";
pub const PATCH_TYPE_STRATEGIC: &str = "strategic";

/// Kinds user patches can target.
pub const PATCHABLE_KINDS: [&str; 5] = [
    KIND_DEPLOYMENT,
    KIND_SERVICE,
    KIND_VALIDATING_WEBHOOK,
    KIND_MUTATING_WEBHOOK,
    KIND_API_SERVICE,
];

/// Ordered patch list with the hash of the customization it came from.
#[derive(Clone, Debug, Default)]
pub struct Customizer {
    patches: Vec<CustomizeComponentsPatch>,
    hash: String,
}

impl Customizer {
    /// Build a customizer from the `customizeComponents` of a `CDI` resource.
    ///
    /// User patches come first, followed by one strategic patch per component
    /// that has flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the customization cannot be serialized for hashing.
    pub fn new(customizations: &CustomizeComponents) -> Result<Self> {
        let hash = customization_hash(customizations)?;

        let mut patches = customizations.patches.clone();
        if let Some(flags) = customizations.flags.as_ref() {
            patches.extend(flag_patches(flags));
        }

        Ok(Self { patches, hash })
    }

    /// SHA1 hex digest of the customization.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    #[must_use]
    pub fn patches(&self) -> &[CustomizeComponentsPatch] {
        &self.patches
    }

    /// Patches whose kind and name globs match the given object.
    #[must_use]
    pub fn patches_for(&self, kind: &str, name: &str) -> Vec<&CustomizeComponentsPatch> {
        self.patches
            .iter()
            .filter(|p| value_matches_key(&p.resource_type, kind))
            .filter(|p| value_matches_key(&p.resource_name, name))
            .collect()
    }

    /// Apply every matching patch to the patchable objects in `objects`.
    ///
    /// Objects of other kinds are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::UnsupportedPatchType`] for an unknown patch type
    /// and [`OperatorError::Patch`] when a patch body is invalid or cannot be applied.
    pub fn apply(&self, objects: &mut [DynamicObject]) -> Result<()> {
        if self.patches.is_empty() {
            return Ok(());
        }

        for obj in objects.iter_mut() {
            let kind = obj
                .types
                .as_ref()
                .map(|t| t.kind.clone())
                .unwrap_or_default();
            if !PATCHABLE_KINDS.contains(&kind.as_str()) {
                continue;
            }

            let name = obj.name_any();
            let matched = self.patches_for(&kind, &name);
            if matched.is_empty() {
                continue;
            }

            debug!(kind = %kind, name = %name, patches = matched.len(), "applying customizations");
            let hash_patch = CustomizeComponentsPatch {
                resource_name: name.clone(),
                resource_type: kind.clone(),
                patch: json!({
                    "metadata": {
                        "annotations": { CUSTOMIZE_COMPONENTS_HASH_ANNOTATION: self.hash }
                    }
                })
                .to_string(),
                patch_type: PATCH_TYPE_STRATEGIC.to_string(),
            };

            let mut doc = serde_json::to_value(&*obj)?;
            for patch in matched.into_iter().chain(std::iter::once(&hash_patch)) {
                apply_patch(&mut doc, patch).map_err(|e| match e {
                    PatchFailure::Unsupported(t) => OperatorError::UnsupportedPatchType(t),
                    PatchFailure::Invalid(reason) => OperatorError::Patch {
                        kind: kind.clone(),
                        name: name.clone(),
                        reason,
                    },
                })?;
            }
            *obj = serde_json::from_value(doc)?;
        }
        Ok(())
    }
}

/// `*` matches anything; otherwise a case-insensitive comparison.
#[must_use]
pub fn value_matches_key(value: &str, key: &str) -> bool {
    value == "*" || value.eq_ignore_ascii_case(key)
}

/// Strategic patches replacing the container args of each flagged component.
#[must_use]
pub fn flag_patches(flags: &Flags) -> Vec<CustomizeComponentsPatch> {
    [
        (APISERVER_NAME, APISERVER_NAME, &flags.api),
        (
            CONTROLLER_DEPLOYMENT_NAME,
            CONTROLLER_CONTAINER_NAME,
            &flags.controller,
        ),
        (UPLOADPROXY_NAME, UPLOADPROXY_NAME, &flags.upload_proxy),
    ]
    .into_iter()
    .filter(|(_, _, component_flags)| !component_flags.is_empty())
    .map(|(deployment, container, component_flags)| CustomizeComponentsPatch {
        resource_name: deployment.to_string(),
        resource_type: KIND_DEPLOYMENT.to_string(),
        patch: json!({
            "spec": {"template": {"spec": {"containers": [
                {"name": container, "args": flags_to_args(component_flags)}
            ]}}}
        })
        .to_string(),
        patch_type: PATCH_TYPE_STRATEGIC.to_string(),
    })
    .collect()
}

/// `{"V": "4", "debug": ""}` becomes `["-v", "4", "-debug"]`.
fn flags_to_args(flags: &BTreeMap<String, String>) -> Vec<String> {
    let mut args = Vec::with_capacity(flags.len() * 2);
    for (flag, value) in flags {
        args.push(format!("-{}", flag.to_lowercase()));
        if !value.is_empty() {
            args.push(value.clone());
        }
    }
    args
}

/// SHA1 over the JSON of the customization, with patches sorted so that
/// reordering them does not change the hash.
fn customization_hash(customizations: &CustomizeComponents) -> Result<String> {
    let mut sorted = customizations.clone();
    sorted
        .patches
        .sort_by(|a, b| a.patch.len().cmp(&b.patch.len()).then_with(|| a.cmp(b)));

    let bytes = serde_json::to_vec(&sorted)?;
    let digest = Sha1::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

enum PatchFailure {
    Unsupported(String),
    Invalid(String),
}

fn apply_patch(
    doc: &mut Value,
    patch: &CustomizeComponentsPatch,
) -> std::result::Result<(), PatchFailure> {
    let invalid = |e: &dyn std::fmt::Display| PatchFailure::Invalid(e.to_string());
    match patch.patch_type.as_str() {
        PATCH_TYPE_STRATEGIC => {
            let body: Value = serde_json::from_str(&patch.patch).map_err(|e| invalid(&e))?;
            strategic::merge(doc, &body);
            Ok(())
        }
        PATCH_TYPE_MERGE => {
            let body: Value = serde_json::from_str(&patch.patch).map_err(|e| invalid(&e))?;
            json_patch::merge(doc, &body);
            Ok(())
        }
        PATCH_TYPE_JSON => apply_json_patch(doc, &patch.patch).map_err(PatchFailure::Invalid),
        other => Err(PatchFailure::Unsupported(other.to_string())),
    }
}

/// RFC 6902 patch, applied one operation at a time.
fn apply_json_patch(doc: &mut Value, body: &str) -> std::result::Result<(), String> {
    let ops: Vec<Value> = serde_json::from_str(body).map_err(|e| e.to_string())?;
    for op in ops {
        let kind = op.get("op").and_then(Value::as_str).unwrap_or_default();
        let path = op.get("path").and_then(Value::as_str).unwrap_or_default();
        match kind {
            "remove" if doc.pointer(path).is_none() => continue,
            "add" => ensure_parent(doc, path),
            _ => {}
        }
        let single: json_patch::Patch =
            serde_json::from_value(Value::Array(vec![op])).map_err(|e| e.to_string())?;
        json_patch::patch(doc, &single).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Create the missing objects and arrays leading up to the parent of `path`.
fn ensure_parent(doc: &mut Value, path: &str) {
    let tokens: Vec<String> = path
        .split('/')
        .skip(1)
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect();
    if tokens.len() < 2 {
        return;
    }

    let mut current = doc;
    for (idx, token) in tokens[..tokens.len() - 1].iter().enumerate() {
        let next_is_index = tokens[idx + 1] == "-" || tokens[idx + 1].parse::<usize>().is_ok();
        current = match current {
            Value::Object(map) => map.entry(token.clone()).or_insert_with(|| {
                if next_is_index {
                    Value::Array(Vec::new())
                } else {
                    Value::Object(serde_json::Map::new())
                }
            }),
            Value::Array(items) => match token.parse::<usize>() {
                Ok(i) if i < items.len() => &mut items[i],
                _ => return,
            },
            _ => return,
        };
    }
}

#[cfg(test)]
mod mod_tests;
