// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Access to the Kubernetes API server.
//!
//! Every read and write the reconciler performs goes through [`ClusterApi`]. The
//! production implementation, [`KubeClusterApi`], works on `DynamicObject`s so a
//! single code path handles every kind in the [`crate::kinds::KindRegistry`]. Tests
//! use the in-memory implementation in [`fake`].

use crate::crd::{CDIStatus, CDI};
use crate::errors::Result;
use crate::kinds::KindInfo;
use crate::reconcilers::pagination::list_all_paginated;
use crate::reconcilers::retry::retry_api_call;
use async_trait::async_trait;
use kube::api::{DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::debug;

/// Operations the operator needs from the API server.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch an object, `None` when it does not exist.
    async fn get(
        &self,
        kind: &KindInfo,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>>;

    /// Create an object and return the stored version.
    async fn create(&self, kind: &KindInfo, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Replace an object and return the stored version.
    async fn update(&self, kind: &KindInfo, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Delete an object with foreground propagation.
    ///
    /// Returns `false` when the object was already gone.
    async fn delete(&self, kind: &KindInfo, namespace: Option<&str>, name: &str) -> Result<bool>;

    /// List objects of a kind, optionally within one namespace and filtered by a
    /// label selector.
    async fn list(
        &self,
        kind: &KindInfo,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>>;

    /// Whether the cluster serves the kind at all.
    async fn kind_exists(&self, kind: &KindInfo) -> Result<bool>;

    /// Fetch a `CDI` resource, `None` when it does not exist.
    async fn get_instance(&self, name: &str) -> Result<Option<CDI>>;

    /// Replace the finalizer list of a `CDI` resource.
    async fn patch_instance_finalizers(&self, name: &str, finalizers: &[String]) -> Result<CDI>;

    /// Write the status subresource of a `CDI` resource.
    async fn patch_instance_status(&self, name: &str, status: &CDIStatus) -> Result<()>;
}

/// [`ClusterApi`] backed by a `kube::Client`.
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: &KindInfo, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) if kind.namespaced => {
                Api::namespaced_with(self.client.clone(), ns, &kind.api_resource)
            }
            _ => Api::all_with(self.client.clone(), &kind.api_resource),
        }
    }

    fn instances(&self) -> Api<CDI> {
        Api::all(self.client.clone())
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get(
        &self,
        kind: &KindInfo,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        let api = self.api(kind, namespace);
        let op = format!("get {} {name}", kind.kind());
        Ok(retry_api_call(|| api.get_opt(name), &op).await?)
    }

    async fn create(&self, kind: &KindInfo, obj: &DynamicObject) -> Result<DynamicObject> {
        let api = self.api(kind, obj.metadata.namespace.as_deref());
        let created = api.create(&PostParams::default(), obj).await?;
        debug!(kind = %kind.kind(), name = %created.name_any(), "created object");
        Ok(created)
    }

    async fn update(&self, kind: &KindInfo, obj: &DynamicObject) -> Result<DynamicObject> {
        let api = self.api(kind, obj.metadata.namespace.as_deref());
        let updated = api
            .replace(&obj.name_any(), &PostParams::default(), obj)
            .await?;
        debug!(kind = %kind.kind(), name = %updated.name_any(), "updated object");
        Ok(updated)
    }

    async fn delete(&self, kind: &KindInfo, namespace: Option<&str>, name: &str) -> Result<bool> {
        let api = self.api(kind, namespace);
        match api.delete(name, &DeleteParams::foreground()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(
        &self,
        kind: &KindInfo,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        let api = self.api(kind, namespace);
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        Ok(list_all_paginated(&api, params).await?)
    }

    async fn kind_exists(&self, kind: &KindInfo) -> Result<bool> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &kind.api_resource);
        let params = ListParams::default().limit(crate::constants::KIND_PROBE_LIMIT);
        match api.list(&params).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_instance(&self, name: &str) -> Result<Option<CDI>> {
        let api = self.instances();
        Ok(retry_api_call(|| api.get_opt(name), "get CDI").await?)
    }

    async fn patch_instance_finalizers(&self, name: &str, finalizers: &[String]) -> Result<CDI> {
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        Ok(self
            .instances()
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    async fn patch_instance_status(&self, name: &str, status: &CDIStatus) -> Result<()> {
        let patch = json!({ "status": status });
        self.instances()
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "cluster_fake.rs"]
pub mod fake;
