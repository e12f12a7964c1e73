// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `cluster.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use base64::Engine;
    use kube::ResourceExt;

    fn find<'a>(objects: &'a [DynamicObject], kind: &str, name: &str) -> &'a DynamicObject {
        objects
            .iter()
            .find(|o| {
                o.types.as_ref().is_some_and(|t| t.kind == kind) && o.name_any() == name
            })
            .unwrap_or_else(|| panic!("{kind}/{name} not found"))
    }

    #[test]
    fn test_static_resources_are_cluster_scoped() {
        let objects = static_resources(&FactoryArgs::for_tests()).unwrap();
        for obj in &objects {
            assert!(obj.metadata.namespace.is_none(), "{}", obj.name_any());
        }
        find(&objects, "ClusterRole", APISERVER_NAME);
        find(&objects, "ClusterRole", CONTROLLER_CLUSTER_ROLE_NAME);
        find(&objects, "CustomResourceDefinition", "datavolumes.cdi.kubevirt.io");
    }

    #[test]
    fn test_controller_binding_points_at_install_namespace() {
        let mut args = FactoryArgs::for_tests();
        args.namespace = "storage".to_string();
        let objects = static_resources(&args).unwrap();
        let binding = find(&objects, "ClusterRoleBinding", CONTROLLER_SERVICE_ACCOUNT_NAME);
        assert_eq!(binding.data["roleRef"]["name"], CONTROLLER_CLUSTER_ROLE_NAME);
        assert_eq!(binding.data["subjects"][0]["namespace"], "storage");
    }

    #[test]
    fn test_aggregate_roles_are_labelled() {
        let objects = static_resources(&FactoryArgs::for_tests()).unwrap();
        for (name, to) in [
            ("cdi.kubevirt.io:admin", "admin"),
            ("cdi.kubevirt.io:edit", "edit"),
            ("cdi.kubevirt.io:view", "view"),
        ] {
            let role = find(&objects, "ClusterRole", name);
            let key = format!("rbac.authorization.k8s.io/aggregate-to-{to}");
            assert_eq!(role.labels().get(&key).map(String::as_str), Some("true"));
            assert!(role.labels().contains_key(CDI_LABEL));
        }
        let binding = find(&objects, "ClusterRoleBinding", "cdi.kubevirt.io:config-reader");
        assert_eq!(binding.data["subjects"][0]["kind"], "Group");
    }

    #[test]
    fn test_dynamic_resources_embed_ca_bundle() {
        let objects = dynamic_resources(&FactoryArgs::for_tests(), Some("PEM")).unwrap();
        assert_eq!(objects.len(), 4);
        let expected = base64::engine::general_purpose::STANDARD.encode("PEM");

        let apiservice = find(&objects, "APIService", APISERVICE_NAME);
        assert_eq!(apiservice.data["spec"]["caBundle"], expected.as_str());
        assert_eq!(apiservice.data["spec"]["service"]["namespace"], "cdi");
        assert_eq!(apiservice.data["spec"]["groupPriorityMinimum"], 1000);

        let validate = find(
            &objects,
            "ValidatingWebhookConfiguration",
            DATAVOLUME_VALIDATING_WEBHOOK_NAME,
        );
        let hook = &validate.data["webhooks"][0];
        assert_eq!(hook["clientConfig"]["caBundle"], expected.as_str());
        assert_eq!(hook["clientConfig"]["service"]["path"], "/datavolume-validate");
        assert_eq!(hook["failurePolicy"], "Fail");
        assert_eq!(hook["rules"][0]["operations"][1], "UPDATE");

        let mutate = find(
            &objects,
            "MutatingWebhookConfiguration",
            DATAVOLUME_MUTATING_WEBHOOK_NAME,
        );
        assert_eq!(mutate.data["webhooks"][0]["reinvocationPolicy"], "Never");

        let cdi = find(&objects, "ValidatingWebhookConfiguration", CDI_VALIDATING_WEBHOOK_NAME);
        assert_eq!(cdi.data["webhooks"][0]["rules"][0]["resources"][0], "cdis");
    }

    #[test]
    fn test_dynamic_resources_without_bundle() {
        let objects = dynamic_resources(&FactoryArgs::for_tests(), None).unwrap();
        let apiservice = find(&objects, "APIService", APISERVICE_NAME);
        assert!(apiservice.data["spec"].get("caBundle").is_none());
    }
}
