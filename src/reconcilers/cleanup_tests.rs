// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `cleanup.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::callbacks;
    use crate::cluster::fake::FakeClusterApi;
    use crate::constants::{CONTROLLER_DEPLOYMENT_NAME, WORKER_IMPORTER};
    use crate::crd::{CDISpec, CDI};
    use crate::differ::set_controller_reference;
    use crate::events::RecordingEventPublisher;
    use crate::hooks::HookRegistry;
    use crate::kinds::{KIND_CONFIG_MAP, KIND_DEPLOYMENT, KIND_POD, KIND_SERVICE};
    use crate::labels::CDI_LABEL;
    use crate::status_reasons::EVENT_DELETE_RESOURCE_SUCCESS;

    struct Harness {
        cluster: FakeClusterApi,
        kinds: KindRegistry,
        hooks: HookRegistry,
        events: RecordingEventPublisher,
        cr: CDI,
    }

    impl Harness {
        fn new() -> Self {
            let mut cr = CDI::new("cdi", CDISpec::default());
            cr.metadata.uid = Some("cdi-uid".to_string());
            Self {
                cluster: FakeClusterApi::new(),
                kinds: KindRegistry::new(),
                hooks: callbacks::registry(),
                events: RecordingEventPublisher::default(),
                cr,
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

        fn object(&self, kind: &str, name: &str) -> DynamicObject {
            self.kinds.get(kind).unwrap().new_object(Some("cdi"), name)
        }

        /// Store an object as an earlier operator would have created it.
        fn install(&self, kind: &str, name: &str, version: Option<&str>, owned: bool) {
            let mut obj = self.object(kind, name);
            if let Some(version) = version {
                obj.labels_mut()
                    .insert(CREATE_VERSION_LABEL.to_string(), version.to_string());
            }
            if owned {
                set_controller_reference(&mut obj, &self.cr);
            }
            self.cluster.insert(self.kinds.get(kind).unwrap(), obj);
        }

        fn exists(&self, kind: &str, name: &str) -> bool {
            self.cluster
                .object(self.kinds.get(kind).unwrap(), Some("cdi"), name)
                .is_some()
        }
    }

    #[tokio::test]
    async fn test_sweep_removes_only_stale_owned_leftovers() {
        let h = Harness::new();
        h.install(KIND_CONFIG_MAP, "kept-desired", Some("v1.4.0"), true);
        h.install(KIND_CONFIG_MAP, "stale", Some("v1.4.0"), true);
        h.install(KIND_CONFIG_MAP, "current-version", Some("v1.5.0"), true);
        h.install(KIND_CONFIG_MAP, "not-ours", Some("v1.4.0"), false);
        h.install(KIND_CONFIG_MAP, "unlabelled", None, true);
        h.install(KIND_SERVICE, "old-service", Some("v1.3.0"), true);

        let desired = vec![h.object(KIND_CONFIG_MAP, "kept-desired")];
        let deleted = cleanup_unused_resources(&h.converger(), &desired, "v1.5.0")
            .await
            .unwrap();

        assert_eq!(deleted, 2);
        assert!(h.exists(KIND_CONFIG_MAP, "kept-desired"));
        assert!(!h.exists(KIND_CONFIG_MAP, "stale"));
        assert!(h.exists(KIND_CONFIG_MAP, "current-version"));
        assert!(h.exists(KIND_CONFIG_MAP, "not-ours"));
        assert!(h.exists(KIND_CONFIG_MAP, "unlabelled"));
        assert!(!h.exists(KIND_SERVICE, "old-service"));
        assert_eq!(
            h.events
                .reasons()
                .iter()
                .filter(|r| *r == EVENT_DELETE_RESOURCE_SUCCESS)
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let h = Harness::new();
        h.install(KIND_CONFIG_MAP, "stale", Some("v1.4.0"), true);
        assert_eq!(cleanup_unused_resources(&h.converger(), &[], "v1.5.0").await.unwrap(), 1);
        assert_eq!(cleanup_unused_resources(&h.converger(), &[], "v1.5.0").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_workloads_exist() {
        let h = Harness::new();
        assert!(!workloads_exist(&h.cluster, &h.kinds).await.unwrap());

        let dv = h.kinds.get(KIND_DATA_VOLUME).unwrap().new_object(Some("default"), "disk");
        h.cluster.insert(h.kinds.get(KIND_DATA_VOLUME).unwrap(), dv);
        assert!(workloads_exist(&h.cluster, &h.kinds).await.unwrap());
    }

    #[tokio::test]
    async fn test_uninstall_runs_cleanup_hooks() {
        let h = Harness::new();
        h.install(KIND_DEPLOYMENT, CONTROLLER_DEPLOYMENT_NAME, Some("v1.5.0"), true);

        let mut importer = h
            .kinds
            .get(KIND_POD)
            .unwrap()
            .new_object(Some("default"), "importer-disk");
        importer
            .labels_mut()
            .insert(CDI_LABEL.to_string(), WORKER_IMPORTER.to_string());
        h.cluster.insert(h.kinds.get(KIND_POD).unwrap(), importer);

        let desired = vec![h.object(KIND_DEPLOYMENT, CONTROLLER_DEPLOYMENT_NAME)];
        uninstall(&h.converger(), &desired).await.unwrap();

        assert!(!h.exists(KIND_DEPLOYMENT, CONTROLLER_DEPLOYMENT_NAME));
        assert!(h.cluster.objects_of(KIND_POD).is_empty());
    }
}
