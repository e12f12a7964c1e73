// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `scc.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::cluster::fake::FakeClusterApi;
    use kube::ResourceExt;
    use serde_json::json;

    const USER: &str = "system:serviceaccount:cdi:cdi-sa";

    fn openshift() -> (FakeClusterApi, KindRegistry) {
        (
            FakeClusterApi::new().with_kind(KIND_SCC),
            KindRegistry::new().with_present([KIND_SCC]),
        )
    }

    fn users(cluster: &FakeClusterApi, kinds: &KindRegistry) -> serde_json::Value {
        cluster
            .object(kinds.get(KIND_SCC).unwrap(), None, SCC_NAME)
            .unwrap()
            .data["users"]
            .clone()
    }

    #[tokio::test]
    async fn test_creates_unowned_scc() {
        let (cluster, kinds) = openshift();
        assert!(ensure_scc_exists(&cluster, &kinds, "cdi", "cdi-sa").await.unwrap());

        let scc = cluster
            .object(kinds.get(KIND_SCC).unwrap(), None, SCC_NAME)
            .unwrap();
        assert!(scc.owner_references().is_empty());
        assert_eq!(users(&cluster, &kinds), json!([USER]));

        // Second pass is a no-op.
        assert!(!ensure_scc_exists(&cluster, &kinds, "cdi", "cdi-sa").await.unwrap());
        assert_eq!(cluster.object_writes(), 1);
    }

    #[tokio::test]
    async fn test_appends_user_to_existing_scc() {
        let (cluster, kinds) = openshift();
        let info = kinds.get(KIND_SCC).unwrap();
        let mut scc = info.new_object(None, SCC_NAME);
        scc.data["users"] = json!(["system:serviceaccount:other:sa"]);
        scc.data["priority"] = json!(5);
        cluster.insert(info, scc);

        assert!(ensure_scc_exists(&cluster, &kinds, "cdi", "cdi-sa").await.unwrap());
        assert_eq!(
            users(&cluster, &kinds),
            json!(["system:serviceaccount:other:sa", USER])
        );
        // Admin edits survive.
        let stored = cluster.object(info, None, SCC_NAME).unwrap();
        assert_eq!(stored.data["priority"], 5);
    }

    #[tokio::test]
    async fn test_noop_when_scc_not_served() {
        let cluster = FakeClusterApi::new();
        let kinds = KindRegistry::new();
        assert!(!ensure_scc_exists(&cluster, &kinds, "cdi", "cdi-sa").await.unwrap());

        // Registry says present but the server does not serve it.
        let kinds = KindRegistry::new().with_present([KIND_SCC]);
        assert!(!ensure_scc_exists(&cluster, &kinds, "cdi", "cdi-sa").await.unwrap());
        assert_eq!(cluster.object_count(), 0);
    }
}
