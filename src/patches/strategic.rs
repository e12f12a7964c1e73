// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Strategic merge of JSON documents.
//!
//! Lists of well-known Kubernetes fields are merged element-wise on a merge key
//! (containers by `name`, volume mounts by `mountPath`, ...). Lists without a
//! known merge key are replaced wholesale, as are primitive lists such as
//! container `args`. An explicit `null` removes a key. The `$patch` directive
//! supports `delete` on list elements and `replace` on maps.

use serde_json::{Map, Value};

const DIRECTIVE: &str = "$patch";
const DIRECTIVE_DELETE: &str = "delete";
const DIRECTIVE_REPLACE: &str = "replace";

/// Merge key for a list field, `None` when the list is replaced.
///
/// `ports` inside a container are keyed by `containerPort`; anywhere else (services)
/// they are keyed by `port`.
fn merge_key(field: &str, in_container: bool) -> Option<&'static str> {
    match field {
        "containers" | "initContainers" | "ephemeralContainers" | "env" | "volumes"
        | "imagePullSecrets" | "webhooks" => Some("name"),
        "volumeMounts" => Some("mountPath"),
        "volumeDevices" => Some("devicePath"),
        "ports" if in_container => Some("containerPort"),
        "ports" => Some("port"),
        "hostAliases" => Some("ip"),
        "topologySpreadConstraints" => Some("topologyKey"),
        "conditions" => Some("type"),
        "ownerReferences" => Some("uid"),
        _ => None,
    }
}

fn is_container_list(field: &str) -> bool {
    matches!(field, "containers" | "initContainers" | "ephemeralContainers")
}

/// Apply `patch` to `target` with strategic merge semantics.
pub fn merge(target: &mut Value, patch: &Value) {
    merge_value(target, patch, false);
}

fn merge_value(target: &mut Value, patch: &Value, in_container: bool) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target_map), Some(patch_map)) => {
            if directive(patch_map) == Some(DIRECTIVE_REPLACE) {
                *target = strip_directives(patch);
                return;
            }
            merge_map(target_map, patch_map, in_container);
        }
        _ => *target = strip_directives(patch),
    }
}

fn merge_map(target: &mut Map<String, Value>, patch: &Map<String, Value>, in_container: bool) {
    for (key, value) in patch {
        if key.starts_with('$') {
            continue;
        }
        if value.is_null() {
            target.remove(key);
            continue;
        }
        match target.get_mut(key) {
            Some(Value::Array(current)) if value.is_array() => {
                if let Some(items) = value.as_array() {
                    merge_list(key, current, items, in_container);
                }
            }
            Some(current) if current.is_object() && value.is_object() => {
                merge_value(current, value, in_container);
            }
            _ => {
                target.insert(key.clone(), strip_directives(value));
            }
        }
    }
}

fn merge_list(field: &str, current: &mut Vec<Value>, patch: &[Value], in_container: bool) {
    let Some(key) = merge_key(field, in_container) else {
        *current = patch.iter().map(strip_directives).collect();
        return;
    };
    let element_in_container = in_container || is_container_list(field);

    for item in patch {
        let Some(item_map) = item.as_object() else {
            current.push(item.clone());
            continue;
        };
        let Some(id) = item_map.get(key) else {
            current.push(strip_directives(item));
            continue;
        };
        let position = current.iter().position(|c| c.get(key) == Some(id));

        if directive(item_map) == Some(DIRECTIVE_DELETE) {
            if let Some(idx) = position {
                current.remove(idx);
            }
            continue;
        }

        match position {
            Some(idx) => merge_value(&mut current[idx], item, element_in_container),
            None => current.push(strip_directives(item)),
        }
    }
}

fn directive(map: &Map<String, Value>) -> Option<&str> {
    map.get(DIRECTIVE).and_then(Value::as_str)
}

/// Copy of `value` with every `$`-prefixed directive key removed.
fn strip_directives(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !k.starts_with('$'))
                .map(|(k, v)| (k.clone(), strip_directives(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_directives).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
#[path = "strategic_tests.rs"]
mod strategic_tests;
