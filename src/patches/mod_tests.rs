// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the customizer.

#[cfg(test)]
mod tests {
    use crate::crd::{CustomizeComponents, CustomizeComponentsPatch, Flags};
    use crate::errors::OperatorError;
    use crate::kinds::{KindRegistry, KIND_CONFIG_MAP, KIND_DEPLOYMENT, KIND_SERVICE};
    use crate::labels::CUSTOMIZE_COMPONENTS_HASH_ANNOTATION;
    use crate::patches::{flag_patches, value_matches_key, Customizer};
    use kube::api::DynamicObject;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn patch(kind: &str, name: &str, body: &str, patch_type: &str) -> CustomizeComponentsPatch {
        CustomizeComponentsPatch {
            resource_name: name.to_string(),
            resource_type: kind.to_string(),
            patch: body.to_string(),
            patch_type: patch_type.to_string(),
        }
    }

    fn controller_deployment() -> DynamicObject {
        let registry = KindRegistry::new();
        let mut obj = registry
            .get(KIND_DEPLOYMENT)
            .unwrap()
            .new_object(Some("cdi"), "cdi-deployment");
        obj.data = json!({
            "spec": {
                "replicas": 1,
                "template": {
                    "spec": {
                        "containers": [
                            {"name": "cdi-controller", "image": "controller:v1", "args": ["-v=1"]}
                        ]
                    }
                }
            }
        });
        obj
    }

    fn hash_of(obj: &DynamicObject) -> Option<String> {
        obj.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(CUSTOMIZE_COMPONENTS_HASH_ANNOTATION).cloned())
    }

    #[test]
    fn test_value_matches_key() {
        assert!(value_matches_key("*", "Deployment"));
        assert!(value_matches_key("deployment", "Deployment"));
        assert!(value_matches_key("CDI-DEPLOYMENT", "cdi-deployment"));
        assert!(!value_matches_key("Service", "Deployment"));
        assert!(!value_matches_key("", "Deployment"));
    }

    #[test]
    fn test_hash_ignores_patch_order() {
        let a = patch("Deployment", "cdi-deployment", r#"{"spec":{"replicas":2}}"#, "merge");
        let b = patch("Service", "*", r#"{"metadata":{"labels":{"x":"y"}}}"#, "strategic");
        let c = patch("Deployment", "cdi-apiserver", r#"{"spec":{"replicas":3}}"#, "merge");

        let first = Customizer::new(&CustomizeComponents {
            patches: vec![a.clone(), b.clone(), c.clone()],
            flags: None,
        })
        .unwrap();
        let second = Customizer::new(&CustomizeComponents {
            patches: vec![c, b, a],
            flags: None,
        })
        .unwrap();

        assert_eq!(first.hash(), second.hash());
        assert_eq!(first.hash().len(), 40);
    }

    #[test]
    fn test_hash_changes_with_flags() {
        let plain = Customizer::new(&CustomizeComponents::default()).unwrap();
        let mut controller = BTreeMap::new();
        controller.insert("v".to_string(), "4".to_string());
        let flagged = Customizer::new(&CustomizeComponents {
            patches: vec![],
            flags: Some(Flags {
                controller,
                ..Flags::default()
            }),
        })
        .unwrap();
        assert_ne!(plain.hash(), flagged.hash());
    }

    #[test]
    fn test_flag_patches_target_containers() {
        let mut controller = BTreeMap::new();
        controller.insert("V".to_string(), "4".to_string());
        controller.insert("debug".to_string(), String::new());
        let patches = flag_patches(&Flags {
            controller,
            ..Flags::default()
        });

        assert_eq!(patches.len(), 1, "components without flags produce no patch");
        assert_eq!(patches[0].resource_name, "cdi-deployment");
        assert_eq!(patches[0].resource_type, "Deployment");
        let body: serde_json::Value = serde_json::from_str(&patches[0].patch).unwrap();
        assert_eq!(
            body["spec"]["template"]["spec"]["containers"][0],
            json!({"name": "cdi-controller", "args": ["-v", "4", "-debug"]})
        );
    }

    #[test]
    fn test_apply_flags_replaces_args_and_stamps_hash() {
        let mut controller = BTreeMap::new();
        controller.insert("v".to_string(), "4".to_string());
        let customizer = Customizer::new(&CustomizeComponents {
            patches: vec![],
            flags: Some(Flags {
                controller,
                ..Flags::default()
            }),
        })
        .unwrap();

        let mut objects = vec![controller_deployment()];
        customizer.apply(&mut objects).unwrap();

        let container = &objects[0].data["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["args"], json!(["-v", "4"]));
        assert_eq!(container["image"], "controller:v1");
        assert_eq!(hash_of(&objects[0]).as_deref(), Some(customizer.hash()));
    }

    #[test]
    fn test_apply_merge_and_json_patches() {
        let customizer = Customizer::new(&CustomizeComponents {
            patches: vec![
                patch("deployment", "*", r#"{"spec":{"replicas":3}}"#, "merge"),
                patch(
                    "Deployment",
                    "cdi-deployment",
                    r#"[{"op":"add","path":"/spec/template/metadata/labels/team","value":"storage"},
                        {"op":"remove","path":"/spec/paused"}]"#,
                    "json",
                ),
            ],
            flags: None,
        })
        .unwrap();

        let mut objects = vec![controller_deployment()];
        customizer.apply(&mut objects).unwrap();

        assert_eq!(objects[0].data["spec"]["replicas"], 3);
        assert_eq!(
            objects[0].data["spec"]["template"]["metadata"]["labels"]["team"],
            "storage",
            "missing parents are created on add"
        );
    }

    #[test]
    fn test_unmatched_objects_are_untouched() {
        let registry = KindRegistry::new();
        let customizer = Customizer::new(&CustomizeComponents {
            patches: vec![patch("*", "*", r#"{"metadata":{"labels":{"x":"y"}}}"#, "merge")],
            flags: None,
        })
        .unwrap();

        let service = registry.get(KIND_SERVICE).unwrap().new_object(Some("cdi"), "cdi-api");
        let config_map = registry
            .get(KIND_CONFIG_MAP)
            .unwrap()
            .new_object(Some("cdi"), "cdi-config");
        let mut objects = vec![service, config_map];
        customizer.apply(&mut objects).unwrap();

        assert!(hash_of(&objects[0]).is_some(), "services are patchable");
        assert!(
            objects[1].metadata.labels.is_none(),
            "config maps are never customized"
        );
        assert!(hash_of(&objects[1]).is_none());
    }

    #[test]
    fn test_unsupported_patch_type() {
        let customizer = Customizer::new(&CustomizeComponents {
            patches: vec![patch("Deployment", "*", "{}", "yaml")],
            flags: None,
        })
        .unwrap();
        let mut objects = vec![controller_deployment()];
        let err = customizer.apply(&mut objects).unwrap_err();
        assert!(matches!(err, OperatorError::UnsupportedPatchType(ref t) if t == "yaml"));
        assert_eq!(err.to_string(), "PatchType is not supported: yaml");
    }

    #[test]
    fn test_invalid_patch_body() {
        let customizer = Customizer::new(&CustomizeComponents {
            patches: vec![patch("Deployment", "*", "{not json", "strategic")],
            flags: None,
        })
        .unwrap();
        let mut objects = vec![controller_deployment()];
        assert!(matches!(
            customizer.apply(&mut objects),
            Err(OperatorError::Patch { ref name, .. }) if name == "cdi-deployment"
        ));
    }
}
