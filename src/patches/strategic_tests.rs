// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `strategic.rs`

#[cfg(test)]
mod tests {
    use super::super::merge;
    use serde_json::json;

    fn deployment() -> serde_json::Value {
        json!({
            "spec": {
                "template": {
                    "spec": {
                        "containers": [
                            {
                                "name": "cdi-controller",
                                "image": "controller:v1",
                                "args": ["-v=1"],
                                "env": [
                                    {"name": "A", "value": "1"},
                                    {"name": "B", "value": "2"}
                                ],
                                "ports": [{"containerPort": 8080, "name": "metrics"}]
                            },
                            {"name": "sidecar", "image": "sidecar:v1"}
                        ]
                    }
                }
            }
        })
    }

    #[test]
    fn test_containers_merge_by_name() {
        let mut target = deployment();
        merge(
            &mut target,
            &json!({"spec": {"template": {"spec": {"containers": [
                {"name": "cdi-controller", "image": "controller:v2"}
            ]}}}}),
        );

        let containers = &target["spec"]["template"]["spec"]["containers"];
        assert_eq!(containers.as_array().unwrap().len(), 2);
        assert_eq!(containers[0]["image"], "controller:v2");
        assert_eq!(containers[0]["args"], json!(["-v=1"]));
        assert_eq!(containers[1]["name"], "sidecar");
    }

    #[test]
    fn test_args_are_replaced() {
        let mut target = deployment();
        merge(
            &mut target,
            &json!({"spec": {"template": {"spec": {"containers": [
                {"name": "cdi-controller", "args": ["-v", "4"]}
            ]}}}}),
        );
        assert_eq!(
            target["spec"]["template"]["spec"]["containers"][0]["args"],
            json!(["-v", "4"])
        );
    }

    #[test]
    fn test_env_merge_and_append() {
        let mut target = deployment();
        merge(
            &mut target,
            &json!({"spec": {"template": {"spec": {"containers": [
                {"name": "cdi-controller", "env": [
                    {"name": "B", "value": "20"},
                    {"name": "C", "value": "3"}
                ]}
            ]}}}}),
        );
        let env = &target["spec"]["template"]["spec"]["containers"][0]["env"];
        assert_eq!(
            env,
            &json!([
                {"name": "A", "value": "1"},
                {"name": "B", "value": "20"},
                {"name": "C", "value": "3"}
            ])
        );
    }

    #[test]
    fn test_container_ports_keyed_by_container_port() {
        let mut target = deployment();
        merge(
            &mut target,
            &json!({"spec": {"template": {"spec": {"containers": [
                {"name": "cdi-controller", "ports": [{"containerPort": 8080, "protocol": "TCP"}]}
            ]}}}}),
        );
        let ports = &target["spec"]["template"]["spec"]["containers"][0]["ports"];
        assert_eq!(
            ports,
            &json!([{"containerPort": 8080, "name": "metrics", "protocol": "TCP"}])
        );
    }

    #[test]
    fn test_service_ports_keyed_by_port() {
        let mut target = json!({"spec": {"ports": [{"port": 443, "targetPort": 8443}]}});
        merge(
            &mut target,
            &json!({"spec": {"ports": [{"port": 443, "nodePort": 31001}]}}),
        );
        assert_eq!(
            target["spec"]["ports"],
            json!([{"port": 443, "targetPort": 8443, "nodePort": 31001}])
        );
    }

    #[test]
    fn test_null_removes_key() {
        let mut target = json!({"metadata": {"labels": {"a": "1", "b": "2"}}});
        merge(&mut target, &json!({"metadata": {"labels": {"a": null}}}));
        assert_eq!(target, json!({"metadata": {"labels": {"b": "2"}}}));
    }

    #[test]
    fn test_delete_directive_removes_list_element() {
        let mut target = deployment();
        merge(
            &mut target,
            &json!({"spec": {"template": {"spec": {"containers": [
                {"name": "sidecar", "$patch": "delete"}
            ]}}}}),
        );
        let containers = target["spec"]["template"]["spec"]["containers"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0]["name"], "cdi-controller");
    }

    #[test]
    fn test_replace_directive_on_map() {
        let mut target = json!({"spec": {"selector": {"a": "1", "b": "2"}}});
        merge(
            &mut target,
            &json!({"spec": {"selector": {"$patch": "replace", "c": "3"}}}),
        );
        assert_eq!(target, json!({"spec": {"selector": {"c": "3"}}}));
    }

    #[test]
    fn test_unkeyed_list_replaced() {
        let mut target = json!({"rules": [{"verbs": ["get"]}, {"verbs": ["list"]}]});
        merge(&mut target, &json!({"rules": [{"verbs": ["*"]}]}));
        assert_eq!(target, json!({"rules": [{"verbs": ["*"]}]}));
    }

    #[test]
    fn test_webhooks_merge_by_name() {
        let mut target = json!({"webhooks": [
            {"name": "a.cdi.kubevirt.io", "failurePolicy": "Fail", "sideEffects": "None"}
        ]});
        merge(
            &mut target,
            &json!({"webhooks": [{"name": "a.cdi.kubevirt.io", "failurePolicy": "Ignore"}]}),
        );
        assert_eq!(target["webhooks"][0]["failurePolicy"], "Ignore");
        assert_eq!(target["webhooks"][0]["sideEffects"], "None");
    }
}
