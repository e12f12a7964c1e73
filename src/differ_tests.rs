// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `differ.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::cluster::fake::{FakeClusterApi, FakeOp};
    use crate::crd::CDISpec;
    use crate::events::RecordingEventPublisher;
    use crate::kinds::{KIND_CONFIG_MAP, KIND_SERVICE};
    use serde_json::json;

    fn cr() -> CDI {
        let mut cr = CDI::new("cdi", CDISpec::default());
        cr.metadata.uid = Some("cdi-uid".to_string());
        cr.labels_mut()
            .insert(K8S_PART_OF.to_string(), "hyperconverged".to_string());
        cr
    }

    fn deployment(kinds: &KindRegistry, image: &str) -> DynamicObject {
        let mut obj = kinds
            .get(KIND_DEPLOYMENT)
            .unwrap()
            .new_object(Some("cdi"), "cdi-deployment");
        obj.labels_mut()
            .insert("cdi.kubevirt.io".to_string(), String::new());
        obj.data = json!({
            "spec": {
                "replicas": 1,
                "template": {
                    "metadata": {"labels": {"app": "containerized-data-importer"}},
                    "spec": {"containers": [{"name": "cdi-controller", "image": image}]}
                }
            }
        });
        obj
    }

    struct Harness {
        cluster: FakeClusterApi,
        kinds: KindRegistry,
        hooks: HookRegistry,
        events: RecordingEventPublisher,
        cr: CDI,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                cluster: FakeClusterApi::new(),
                kinds: KindRegistry::new(),
                hooks: HookRegistry::default(),
                events: RecordingEventPublisher::default(),
                cr: cr(),
            }
        }

        fn converger(&self) -> Converger<'_> {
            Converger {
                cluster: &self.cluster,
                kinds: &self.kinds,
                hooks: &self.hooks,
                events: &self.events,
                cr: &self.cr,
                namespace: "cdi",
                version: "v1.5.0",
            }
        }
    }

    #[tokio::test]
    async fn test_create_stamps_ownership_and_versions() {
        let h = Harness::new();
        let outcome = h
            .converger()
            .converge(deployment(&h.kinds, "controller:v1"))
            .await
            .unwrap();
        assert_eq!(outcome, ConvergeOutcome::Created);

        let kind = h.kinds.get(KIND_DEPLOYMENT).unwrap();
        let stored = h.cluster.object(kind, Some("cdi"), "cdi-deployment").unwrap();
        assert!(controlled_by(&stored, &h.cr));
        assert_eq!(
            stored.labels().get(CREATE_VERSION_LABEL).map(String::as_str),
            Some("v1.5.0")
        );
        assert_eq!(
            stored.labels().get(K8S_PART_OF).map(String::as_str),
            Some("hyperconverged")
        );
        assert_eq!(
            stored.data["spec"]["template"]["metadata"]["labels"][K8S_PART_OF],
            "hyperconverged"
        );
        assert!(stored
            .annotations()
            .contains_key(LAST_APPLIED_CONFIG_ANNOTATION));
        assert_eq!(h.events.reasons(), vec![EVENT_CREATE_RESOURCE_SUCCESS]);
    }

    #[tokio::test]
    async fn test_second_converge_is_noop() {
        let h = Harness::new();
        let converger = h.converger();
        converger
            .converge(deployment(&h.kinds, "controller:v1"))
            .await
            .unwrap();
        let writes = h.cluster.object_writes();

        let outcome = converger
            .converge(deployment(&h.kinds, "controller:v1"))
            .await
            .unwrap();
        assert_eq!(outcome, ConvergeOutcome::Unchanged);
        assert_eq!(h.cluster.object_writes(), writes);
    }

    #[tokio::test]
    async fn test_update_preserves_user_labels() {
        let h = Harness::new();
        let converger = h.converger();
        converger
            .converge(deployment(&h.kinds, "controller:v1"))
            .await
            .unwrap();

        let kind = h.kinds.get(KIND_DEPLOYMENT).unwrap();
        let mut stored = h.cluster.object(kind, Some("cdi"), "cdi-deployment").unwrap();
        stored
            .labels_mut()
            .insert("team".to_string(), "storage".to_string());
        h.cluster.insert(kind, stored);

        let outcome = converger
            .converge(deployment(&h.kinds, "controller:v2"))
            .await
            .unwrap();
        assert_eq!(outcome, ConvergeOutcome::Updated);

        let stored = h.cluster.object(kind, Some("cdi"), "cdi-deployment").unwrap();
        assert_eq!(stored.labels().get("team").map(String::as_str), Some("storage"));
        assert_eq!(
            stored.labels().get(UPDATE_VERSION_LABEL).map(String::as_str),
            Some("v1.5.0")
        );
        assert_eq!(
            stored.data["spec"]["template"]["spec"]["containers"][0]["image"],
            "controller:v2"
        );
        assert!(h
            .events
            .reasons()
            .contains(&EVENT_UPDATE_RESOURCE_SUCCESS.to_string()));
    }

    #[tokio::test]
    async fn test_foreign_object_is_not_adopted() {
        let h = Harness::new();
        let kind = h.kinds.get(KIND_DEPLOYMENT).unwrap();
        h.cluster.insert(kind, deployment(&h.kinds, "someone-else:v1"));

        let outcome = h
            .converger()
            .converge(deployment(&h.kinds, "controller:v1"))
            .await
            .unwrap();
        assert_eq!(outcome, ConvergeOutcome::NotOwned);
        assert_eq!(h.cluster.object_writes(), 0);
        let stored = h.cluster.object(kind, Some("cdi"), "cdi-deployment").unwrap();
        assert_eq!(
            stored.data["spec"]["template"]["spec"]["containers"][0]["image"],
            "someone-else:v1"
        );
    }

    #[tokio::test]
    async fn test_mutable_kind_keeps_data() {
        let h = Harness::new();
        let kind = h.kinds.get(KIND_CONFIG_MAP).unwrap();
        let desired = kind.new_object(Some("cdi"), "cdi-apiserver-signer-bundle");
        let converger = h.converger();
        converger.converge(desired.clone()).await.unwrap();

        let mut stored = h
            .cluster
            .object(kind, Some("cdi"), "cdi-apiserver-signer-bundle")
            .unwrap();
        stored.data = json!({"data": {"ca-bundle.crt": "PEM"}});
        h.cluster.insert(kind, stored);

        let outcome = converger.converge(desired).await.unwrap();
        assert_eq!(outcome, ConvergeOutcome::Unchanged);
        let stored = h
            .cluster
            .object(kind, Some("cdi"), "cdi-apiserver-signer-bundle")
            .unwrap();
        assert_eq!(stored.data["data"]["ca-bundle.crt"], "PEM");
    }

    #[tokio::test]
    async fn test_mutable_kind_converges_declared_keys_only() {
        let h = Harness::new();
        let kind = h.kinds.get(KIND_CONFIG_MAP).unwrap();
        let mut desired = kind.new_object(Some("cdi"), "cdi-config-spec");
        desired.data = json!({"data": {"config.json": "{}"}});
        let converger = h.converger();
        converger.converge(desired.clone()).await.unwrap();

        let mut stored = h.cluster.object(kind, Some("cdi"), "cdi-config-spec").unwrap();
        stored.data = json!({"data": {"config.json": "stale", "extra": "kept"}});
        h.cluster.insert(kind, stored);

        let outcome = converger.converge(desired).await.unwrap();
        assert_eq!(outcome, ConvergeOutcome::Updated);
        let stored = h.cluster.object(kind, Some("cdi"), "cdi-config-spec").unwrap();
        assert_eq!(stored.data["data"]["config.json"], "{}");
        assert_eq!(stored.data["data"]["extra"], "kept");
    }

    #[tokio::test]
    async fn test_create_failure_publishes_warning() {
        let h = Harness::new();
        h.cluster
            .fail_on(FakeOp::Create, KIND_DEPLOYMENT, "cdi-deployment", 500);

        let err = h
            .converger()
            .converge(deployment(&h.kinds, "controller:v1"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        let events = h.events.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].warning);
        assert_eq!(events[0].reason, EVENT_CREATE_RESOURCE_FAILED);
    }

    #[tokio::test]
    async fn test_delete_publishes_event() {
        let h = Harness::new();
        let converger = h.converger();
        converger
            .converge(deployment(&h.kinds, "controller:v1"))
            .await
            .unwrap();
        let kind = h.kinds.get(KIND_DEPLOYMENT).unwrap();
        let stored = h.cluster.object(kind, Some("cdi"), "cdi-deployment").unwrap();

        assert!(converger.delete(stored).await.unwrap());
        assert!(h.cluster.object(kind, Some("cdi"), "cdi-deployment").is_none());
        assert!(h
            .events
            .reasons()
            .contains(&EVENT_DELETE_RESOURCE_SUCCESS.to_string()));
    }

    #[test]
    fn test_merge_object_keeps_server_fields() {
        let kinds = KindRegistry::new();
        let kind = kinds.get(KIND_SERVICE).unwrap();

        let mut current = kind.new_object(Some("cdi"), "cdi-api");
        current.metadata.uid = Some("svc-uid".to_string());
        current.metadata.resource_version = Some("7".to_string());
        current.data = json!({
            "spec": {
                "clusterIP": "10.0.0.1",
                "ports": [
                    {"port": 443, "targetPort": 8443, "protocol": "TCP"},
                    {"port": 80, "targetPort": 8080}
                ]
            },
            "status": {"loadBalancer": {}}
        });

        let mut desired = kind.new_object(Some("cdi"), "cdi-api");
        desired.data = json!({"spec": {"ports": [{"port": 443, "targetPort": 8444}]}});

        let merged = merge_object(&desired, &current).unwrap();
        assert_eq!(merged.metadata.uid.as_deref(), Some("svc-uid"));
        assert_eq!(merged.metadata.resource_version.as_deref(), Some("7"));
        assert_eq!(merged.data["spec"]["clusterIP"], "10.0.0.1");
        assert_eq!(
            merged.data["spec"]["ports"],
            json!([{"port": 443, "targetPort": 8444, "protocol": "TCP"}])
        );
        assert!(merged.data.get("status").is_none());
    }

    #[test]
    fn test_overlay_null_removes_key() {
        let mut target = json!({"a": 1, "b": {"c": 2}});
        overlay(&mut target, &json!({"a": null, "b": {"d": 3}}));
        assert_eq!(target, json!({"b": {"c": 2, "d": 3}}));
    }

    #[test]
    fn test_merge_labels_and_annotations() {
        let desired = ObjectMeta {
            labels: Some(BTreeMap::from([("a".to_string(), "new".to_string())])),
            ..ObjectMeta::default()
        };
        let mut current = ObjectMeta {
            labels: Some(BTreeMap::from([
                ("a".to_string(), "old".to_string()),
                ("user".to_string(), "x".to_string()),
            ])),
            ..ObjectMeta::default()
        };
        merge_labels_and_annotations(&desired, &mut current);
        let labels = current.labels.unwrap();
        assert_eq!(labels["a"], "new");
        assert_eq!(labels["user"], "x");
        assert!(current.annotations.is_none());
    }

    #[test]
    fn test_set_controller_reference_replaces_existing() {
        let kinds = KindRegistry::new();
        let mut obj = kinds
            .get(KIND_CONFIG_MAP)
            .unwrap()
            .new_object(Some("cdi"), "cdi-config");
        let mut other = cr();
        other.metadata.uid = Some("other-uid".to_string());
        set_controller_reference(&mut obj, &other);
        set_controller_reference(&mut obj, &cr());

        assert_eq!(obj.owner_references().len(), 1);
        assert!(controlled_by(&obj, &cr()));
        assert!(!controlled_by(&obj, &other));
    }
}
