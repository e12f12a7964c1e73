// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `route.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::cluster::fake::FakeClusterApi;
    use crate::crd::CDISpec;
    use crate::differ::set_controller_reference;
    use crate::events::RecordingEventPublisher;

    const NS: &str = "cdi";

    struct Env {
        cluster: FakeClusterApi,
        kinds: KindRegistry,
        events: RecordingEventPublisher,
        cr: CDI,
    }

    impl Env {
        fn new() -> Self {
            let mut cr = CDI::new("cdi", CDISpec::default());
            cr.metadata.uid = Some("cdi-uid".to_string());
            Self {
                cluster: FakeClusterApi::new().with_kind(KIND_ROUTE),
                kinds: KindRegistry::new().with_present([KIND_ROUTE]),
                events: RecordingEventPublisher::default(),
                cr,
            }
        }

        fn add_route(&self, name: &str, annotated: bool, ca: Option<&str>) {
            let info = self.kinds.get(KIND_ROUTE).unwrap();
            let mut route = info.new_object(Some(NS), name);
            if annotated {
                route.annotations_mut().insert(
                    INJECT_UPLOAD_PROXY_CERT_ANNOTATION.to_string(),
                    "true".to_string(),
                );
            }
            route.data["spec"] = json!({"host": format!("{name}.apps.example.com")});
            if let Some(ca) = ca {
                route.data["spec"]["tls"] = json!({"termination": "reencrypt", "destinationCACertificate": ca});
            }
            self.cluster.insert(info, route);
        }

        fn ca_of(&self, name: &str) -> Option<String> {
            let route = self
                .cluster
                .object(self.kinds.get(KIND_ROUTE).unwrap(), Some(NS), name)
                .unwrap();
            route
                .data
                .pointer("/spec/tls/destinationCACertificate")
                .and_then(Value::as_str)
                .map(str::to_string)
        }

        async fn inject(&self, bundle: Option<&str>) -> usize {
            inject_user_routes(&self.cluster, &self.kinds, &self.events, &self.cr, NS, bundle)
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_annotated_routes_receive_bundle() {
        let env = Env::new();
        env.add_route("mine", true, Some("OLD"));
        env.add_route("bare", true, None);
        env.add_route("unannotated", false, Some("OLD"));

        assert_eq!(env.inject(Some("NEW")).await, 2);
        assert_eq!(env.ca_of("mine").as_deref(), Some("NEW"));
        assert_eq!(env.ca_of("bare").as_deref(), Some("NEW"));
        assert_eq!(env.ca_of("unannotated").as_deref(), Some("OLD"));

        let route = env
            .cluster
            .object(env.kinds.get(KIND_ROUTE).unwrap(), Some(NS), "mine")
            .unwrap();
        assert_eq!(route.data["spec"]["tls"]["termination"], "reencrypt");
        assert_eq!(route.data["spec"]["host"], "mine.apps.example.com");

        let events = env.events.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.reason == EVENT_UPDATE_USER_ROUTE_SUCCESS && !e.warning));
    }

    #[tokio::test]
    async fn test_current_bundle_is_not_rewritten() {
        let env = Env::new();
        env.add_route("mine", true, Some("SAME"));
        assert_eq!(env.inject(Some("SAME")).await, 0);
        assert_eq!(env.cluster.updates(), 0);
        assert!(env.events.events().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_without_bundle_or_routes() {
        let env = Env::new();
        env.add_route("mine", true, Some("OLD"));
        assert_eq!(env.inject(None).await, 0);

        let vanilla = Env {
            cluster: FakeClusterApi::new(),
            kinds: KindRegistry::new(),
            ..Env::new()
        };
        assert_eq!(vanilla.inject(Some("NEW")).await, 0);
    }

    #[tokio::test]
    async fn test_owned_route_is_skipped() {
        let env = Env::new();
        let info = env.kinds.get(KIND_ROUTE).unwrap();
        let mut ours = info.new_object(Some(NS), "cdi-uploadproxy");
        ours.annotations_mut().insert(
            INJECT_UPLOAD_PROXY_CERT_ANNOTATION.to_string(),
            "true".to_string(),
        );
        set_controller_reference(&mut ours, &env.cr);
        env.cluster.insert(info, ours);

        assert_eq!(env.inject(Some("NEW")).await, 0);
    }
}
