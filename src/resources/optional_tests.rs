// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `optional.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use kube::ResourceExt;

    #[test]
    fn test_upload_proxy_route() {
        let route = upload_proxy_route("cdi", "BUNDLE").unwrap();
        assert_eq!(route.types.as_ref().unwrap().kind, "Route");
        assert_eq!(route.name_any(), UPLOADPROXY_NAME);
        assert_eq!(route.metadata.namespace.as_deref(), Some("cdi"));
        assert_eq!(
            route.annotations().get(ROUTE_TIMEOUT_ANNOTATION).map(String::as_str),
            Some("60m")
        );
        assert_eq!(route.data["spec"]["to"]["name"], UPLOADPROXY_NAME);
        assert_eq!(route.data["spec"]["tls"]["termination"], "reencrypt");
        assert_eq!(route.data["spec"]["tls"]["destinationCACertificate"], "BUNDLE");
    }

    #[test]
    fn test_security_context_constraints() {
        let user = service_account_user("cdi", "cdi-sa");
        assert_eq!(user, "system:serviceaccount:cdi:cdi-sa");

        let scc = security_context_constraints(std::slice::from_ref(&user)).unwrap();
        assert_eq!(scc.name_any(), SCC_NAME);
        assert!(scc.metadata.namespace.is_none());
        assert!(scc.labels().contains_key(CDI_LABEL));
        assert_eq!(scc.data["priority"], 10);
        assert_eq!(scc.data["seLinuxContext"]["type"], "MustRunAs");
        assert_eq!(scc.data["requiredDropCapabilities"][0], "MKNOD");
        assert_eq!(scc.data["volumes"].as_array().unwrap().len(), 6);
        assert_eq!(scc.data["users"][0], user.as_str());
    }

    #[test]
    fn test_monitoring_resources() {
        let mut args = FactoryArgs::for_tests();
        args.monitoring_namespace = "openshift-monitoring".to_string();
        let objects = monitoring_resources(&args).unwrap();
        let kinds: Vec<&str> = objects
            .iter()
            .map(|o| o.types.as_ref().unwrap().kind.as_str())
            .collect();
        assert_eq!(kinds, vec!["PrometheusRule", "Role", "RoleBinding"]);

        for obj in &objects {
            assert_eq!(obj.metadata.namespace.as_deref(), Some("cdi"));
            assert_eq!(
                obj.labels().get(PROMETHEUS_LABEL).map(String::as_str),
                Some("true")
            );
        }

        let binding = &objects[2];
        assert_eq!(binding.data["subjects"][0]["name"], PROMETHEUS_SERVICE_ACCOUNT);
        assert_eq!(binding.data["subjects"][0]["namespace"], "openshift-monitoring");
        assert_eq!(objects[1].data["rules"][0]["resources"][1], "endpoints");
    }

    #[test]
    fn test_alerts_carry_required_labels_and_runbooks() {
        let args = FactoryArgs::for_tests();
        let objects = monitoring_resources(&args).unwrap();
        let group = &objects[0].data["spec"]["groups"][0];
        assert_eq!(group["name"], "cdi.rules");

        let rules = group["rules"].as_array().unwrap();
        assert_eq!(rules.len(), ALERTS.len());
        for rule in rules {
            let name = rule["alert"].as_str().unwrap();
            assert!(rule["labels"]["severity"].is_string(), "{name}");
            assert!(
                ["none", "warning", "critical"]
                    .contains(&rule["labels"]["operator_health_impact"].as_str().unwrap()),
                "{name}"
            );
            assert_eq!(rule["labels"]["kubernetes_operator_part_of"], "kubevirt");
            assert_eq!(
                rule["labels"]["kubernetes_operator_component"],
                "containerized-data-importer"
            );
            assert_eq!(
                rule["annotations"]["runbook_url"],
                format!("https://kubevirt.io/monitoring/runbooks/{name}")
            );
        }
        assert_eq!(rules[0]["alert"], "CDIOperatorDown");
        assert_eq!(rules[0]["for"], "10m");
    }
}
