// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory [`ClusterApi`] used by unit tests.
//!
//! Objects are keyed by kind, namespace and name. The fake assigns `uid`,
//! `resourceVersion` and `creationTimestamp` on create, enforces optimistic
//! concurrency on update, understands equality and set-based label selectors and
//! reports optional kinds as missing unless they were registered as present.

use super::ClusterApi;
use crate::crd::{CDIStatus, Phase, CDI};
use crate::errors::Result;
use crate::kinds::{KindInfo, KIND_DEPLOYMENT};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::DynamicObject;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type ObjectKey = (String, Option<String>, String);

/// Operation a failure can be injected into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FakeOp {
    Get,
    Create,
    Update,
    Delete,
}

#[derive(Default)]
struct Counters {
    creates: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
    status_writes: AtomicUsize,
    finalizer_writes: AtomicUsize,
    next_uid: AtomicUsize,
}

/// In-memory API server.
#[derive(Default)]
pub struct FakeClusterApi {
    objects: Mutex<BTreeMap<ObjectKey, DynamicObject>>,
    instances: Mutex<BTreeMap<String, CDI>>,
    present_kinds: Mutex<BTreeSet<String>>,
    failures: Mutex<Vec<(FakeOp, String, String, u16)>>,
    phases: Mutex<Vec<Phase>>,
    counters: Counters,
}

pub fn api_error(code: u16, reason: &str, message: &str) -> kube::Error {
    kube::Error::Api(
        kube::error::ErrorResponse {
            status: Some(kube::core::response::StatusSummary::Failure),
            message: message.to_string(),
            reason: reason.to_string(),
            code,
            metadata: None,
            details: None,
        }
        .boxed(),
    )
}

fn key(kind: &KindInfo, namespace: Option<&str>, name: &str) -> ObjectKey {
    let namespace = if kind.namespaced {
        namespace.map(str::to_string)
    } else {
        None
    };
    (kind.kind().to_string(), namespace, name.to_string())
}

fn now() -> Time {
    Time(k8s_openapi::jiff::Timestamp::now())
}

impl FakeClusterApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report an optional kind as served.
    pub fn with_kind(self, kind: &str) -> Self {
        if let Ok(mut present) = self.present_kinds.lock() {
            present.insert(kind.to_string());
        }
        self
    }

    /// Make the next matching operation fail with the given HTTP code.
    pub fn fail_on(&self, op: FakeOp, kind: &str, name: &str, code: u16) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push((op, kind.to_string(), name.to_string(), code));
        }
    }

    fn take_failure(&self, op: FakeOp, kind: &KindInfo, name: &str) -> Option<kube::Error> {
        let mut failures = self.failures.lock().ok()?;
        let pos = failures
            .iter()
            .position(|(o, k, n, _)| *o == op && k == kind.kind() && n == name)?;
        let (_, _, _, code) = failures.remove(pos);
        Some(api_error(code, "Injected", &format!("injected failure for {name}")))
    }

    fn check_kind(&self, kind: &KindInfo) -> Result<()> {
        if kind.optional && !self.is_present(kind.kind()) {
            return Err(api_error(404, "NotFound", "the server could not find the requested resource").into());
        }
        Ok(())
    }

    fn is_present(&self, kind: &str) -> bool {
        self.present_kinds
            .lock()
            .map(|p| p.contains(kind))
            .unwrap_or(false)
    }

    /// Store an object directly, bypassing counters.
    pub fn insert(&self, kind: &KindInfo, mut obj: DynamicObject) -> DynamicObject {
        let uid = self.counters.next_uid.fetch_add(1, Ordering::SeqCst);
        obj.metadata.uid.get_or_insert_with(|| format!("uid-{uid}"));
        obj.metadata.resource_version.get_or_insert_with(|| "1".to_string());
        obj.metadata.creation_timestamp.get_or_insert_with(now);
        let k = key(kind, obj.metadata.namespace.as_deref(), &obj.name_any());
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(k, obj.clone());
        }
        obj
    }

    /// Read an object directly.
    pub fn object(&self, kind: &KindInfo, namespace: Option<&str>, name: &str) -> Option<DynamicObject> {
        self.objects
            .lock()
            .ok()
            .and_then(|o| o.get(&key(kind, namespace, name)).cloned())
    }

    /// All stored objects of a kind.
    pub fn objects_of(&self, kind: &str) -> Vec<DynamicObject> {
        self.objects
            .lock()
            .map(|o| {
                o.iter()
                    .filter(|((k, _, _), _)| k == kind)
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    /// Store a `CDI` resource.
    pub fn add_instance(&self, mut cdi: CDI) {
        let uid = self.counters.next_uid.fetch_add(1, Ordering::SeqCst);
        cdi.metadata.uid.get_or_insert_with(|| format!("cdi-uid-{uid}"));
        cdi.metadata.creation_timestamp.get_or_insert_with(now);
        if let Ok(mut instances) = self.instances.lock() {
            instances.insert(cdi.name_any(), cdi);
        }
    }

    /// Read a `CDI` resource directly.
    pub fn instance(&self, name: &str) -> Option<CDI> {
        self.instances.lock().ok().and_then(|i| i.get(name).cloned())
    }

    /// Mark a `CDI` resource as being deleted.
    pub fn mark_instance_deleted(&self, name: &str) {
        if let Ok(mut instances) = self.instances.lock() {
            if let Some(cdi) = instances.get_mut(name) {
                cdi.metadata.deletion_timestamp = Some(now());
            }
        }
    }

    /// Report every stored deployment as fully rolled out.
    pub fn mark_deployments_ready(&self) {
        if let Ok(mut objects) = self.objects.lock() {
            for ((kind, _, _), obj) in objects.iter_mut() {
                if kind != KIND_DEPLOYMENT {
                    continue;
                }
                let replicas = obj
                    .data
                    .pointer("/spec/replicas")
                    .and_then(serde_json::Value::as_i64)
                    .unwrap_or(1);
                obj.data["status"] = serde_json::json!({
                    "replicas": replicas,
                    "readyReplicas": replicas,
                });
            }
        }
    }

    /// Creates + updates + deletes of regular objects.
    pub fn object_writes(&self) -> usize {
        self.counters.creates.load(Ordering::SeqCst)
            + self.counters.updates.load(Ordering::SeqCst)
            + self.counters.deletes.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.counters.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.counters.updates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.counters.deletes.load(Ordering::SeqCst)
    }

    /// Status and finalizer writes on `CDI` resources.
    pub fn instance_writes(&self) -> usize {
        self.counters.status_writes.load(Ordering::SeqCst)
            + self.counters.finalizer_writes.load(Ordering::SeqCst)
    }

    /// Phases written to `CDI` status, oldest first.
    pub fn phases(&self) -> Vec<Phase> {
        self.phases.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

/// Whether `labels` satisfy a Kubernetes label selector string.
///
/// Supports `k`, `!k`, `k=v`, `k==v`, `k!=v`, `k in (a,b)` and `k notin (a,b)`.
#[must_use]
pub fn selector_matches(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    split_requirements(selector)
        .iter()
        .all(|req| requirement_matches(labels, req.trim()))
}

fn split_requirements(selector: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0;
    let mut current = String::new();
    for c in selector.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                out.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

fn parse_set(raw: &str) -> Vec<String> {
    raw.trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(|v| v.trim().to_string())
        .collect()
}

fn requirement_matches(labels: &BTreeMap<String, String>, req: &str) -> bool {
    if req.is_empty() {
        return true;
    }
    if let Some(k) = req.strip_prefix('!') {
        return !labels.contains_key(k.trim());
    }
    if let Some((k, set)) = req.split_once(" notin ") {
        return labels
            .get(k.trim())
            .is_none_or(|v| !parse_set(set).contains(v));
    }
    if let Some((k, set)) = req.split_once(" in ") {
        return labels
            .get(k.trim())
            .is_some_and(|v| parse_set(set).contains(v));
    }
    if let Some((k, v)) = req.split_once("!=") {
        return labels.get(k.trim()).is_none_or(|x| x != v.trim());
    }
    if let Some((k, v)) = req.split_once("==").or_else(|| req.split_once('=')) {
        return labels.get(k.trim()).is_some_and(|x| x == v.trim());
    }
    labels.contains_key(req)
}

#[async_trait]
impl ClusterApi for FakeClusterApi {
    async fn get(
        &self,
        kind: &KindInfo,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        self.check_kind(kind)?;
        if let Some(err) = self.take_failure(FakeOp::Get, kind, name) {
            return Err(err.into());
        }
        Ok(self.object(kind, namespace, name))
    }

    async fn create(&self, kind: &KindInfo, obj: &DynamicObject) -> Result<DynamicObject> {
        self.check_kind(kind)?;
        let name = obj.name_any();
        if let Some(err) = self.take_failure(FakeOp::Create, kind, &name) {
            return Err(err.into());
        }
        if self.object(kind, obj.metadata.namespace.as_deref(), &name).is_some() {
            return Err(api_error(409, "AlreadyExists", &format!("{name} already exists")).into());
        }
        let mut obj = obj.clone();
        obj.metadata.uid = None;
        obj.metadata.resource_version = None;
        obj.metadata.creation_timestamp = None;
        self.counters.creates.fetch_add(1, Ordering::SeqCst);
        Ok(self.insert(kind, obj))
    }

    async fn update(&self, kind: &KindInfo, obj: &DynamicObject) -> Result<DynamicObject> {
        self.check_kind(kind)?;
        let name = obj.name_any();
        if let Some(err) = self.take_failure(FakeOp::Update, kind, &name) {
            return Err(err.into());
        }
        let k = key(kind, obj.metadata.namespace.as_deref(), &name);
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| api_error(500, "InternalError", "poisoned"))?;
        let Some(stored) = objects.get(&k) else {
            return Err(api_error(404, "NotFound", &format!("{name} not found")).into());
        };
        if obj.metadata.resource_version.is_some()
            && obj.metadata.resource_version != stored.metadata.resource_version
        {
            return Err(api_error(409, "Conflict", "the object has been modified").into());
        }

        let version = stored
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1);
        let mut next = obj.clone();
        next.metadata.uid.clone_from(&stored.metadata.uid);
        next.metadata
            .creation_timestamp
            .clone_from(&stored.metadata.creation_timestamp);
        next.metadata.resource_version = Some((version + 1).to_string());
        objects.insert(k, next.clone());
        self.counters.updates.fetch_add(1, Ordering::SeqCst);
        Ok(next)
    }

    async fn delete(&self, kind: &KindInfo, namespace: Option<&str>, name: &str) -> Result<bool> {
        self.check_kind(kind)?;
        if let Some(err) = self.take_failure(FakeOp::Delete, kind, name) {
            return Err(err.into());
        }
        let removed = self
            .objects
            .lock()
            .map(|mut o| o.remove(&key(kind, namespace, name)).is_some())
            .unwrap_or(false);
        if removed {
            self.counters.deletes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(removed)
    }

    async fn list(
        &self,
        kind: &KindInfo,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        self.check_kind(kind)?;
        Ok(self
            .objects_of(kind.kind())
            .into_iter()
            .filter(|o| namespace.is_none() || o.metadata.namespace.as_deref() == namespace)
            .filter(|o| label_selector.is_none_or(|s| selector_matches(o.labels(), s)))
            .collect())
    }

    async fn kind_exists(&self, kind: &KindInfo) -> Result<bool> {
        Ok(!kind.optional || self.is_present(kind.kind()))
    }

    async fn get_instance(&self, name: &str) -> Result<Option<CDI>> {
        Ok(self.instance(name))
    }

    async fn patch_instance_finalizers(&self, name: &str, finalizers: &[String]) -> Result<CDI> {
        let mut instances = self
            .instances
            .lock()
            .map_err(|_| api_error(500, "InternalError", "poisoned"))?;
        let Some(cdi) = instances.get_mut(name) else {
            return Err(api_error(404, "NotFound", &format!("cdi {name} not found")).into());
        };
        cdi.metadata.finalizers = Some(finalizers.to_vec());
        let result = cdi.clone();
        if finalizers.is_empty() && cdi.metadata.deletion_timestamp.is_some() {
            instances.remove(name);
        }
        self.counters.finalizer_writes.fetch_add(1, Ordering::SeqCst);
        Ok(result)
    }

    async fn patch_instance_status(&self, name: &str, status: &CDIStatus) -> Result<()> {
        let mut instances = self
            .instances
            .lock()
            .map_err(|_| api_error(500, "InternalError", "poisoned"))?;
        let Some(cdi) = instances.get_mut(name) else {
            return Err(api_error(404, "NotFound", &format!("cdi {name} not found")).into());
        };
        cdi.status = Some(status.clone());
        if let (Some(phase), Ok(mut phases)) = (status.phase, self.phases.lock()) {
            phases.push(phase);
        }
        self.counters.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{KindRegistry, KIND_CONFIG_MAP, KIND_POD, KIND_ROUTE};

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn selector_forms() {
        let l = labels(&[("cdi.kubevirt.io", "importer"), ("app", "x")]);
        assert!(selector_matches(&l, "cdi.kubevirt.io"));
        assert!(!selector_matches(&l, "!cdi.kubevirt.io"));
        assert!(selector_matches(&l, "app=x"));
        assert!(selector_matches(&l, "app==x,cdi.kubevirt.io"));
        assert!(!selector_matches(&l, "app!=x"));
        assert!(selector_matches(
            &l,
            "cdi.kubevirt.io in (importer, cdi-upload-server, cdi-clone-source)"
        ));
        assert!(!selector_matches(&l, "cdi.kubevirt.io notin (importer)"));
        assert!(!selector_matches(&l, "missing"));
    }

    #[tokio::test]
    async fn create_assigns_metadata_and_rejects_duplicates() {
        let registry = KindRegistry::new();
        let cm_kind = registry.get(KIND_CONFIG_MAP).unwrap();
        let fake = FakeClusterApi::new();

        let created = fake
            .create(cm_kind, &cm_kind.new_object(Some("cdi"), "a"))
            .await
            .unwrap();
        assert!(created.metadata.uid.is_some());
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));

        let err = fake
            .create(cm_kind, &cm_kind.new_object(Some("cdi"), "a"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(fake.creates(), 1);
    }

    #[tokio::test]
    async fn update_enforces_resource_version() {
        let registry = KindRegistry::new();
        let cm_kind = registry.get(KIND_CONFIG_MAP).unwrap();
        let fake = FakeClusterApi::new();
        let created = fake
            .create(cm_kind, &cm_kind.new_object(Some("cdi"), "a"))
            .await
            .unwrap();

        let updated = fake.update(cm_kind, &created).await.unwrap();
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("2"));
        assert!(fake.update(cm_kind, &created).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn optional_kinds_are_missing_until_registered() {
        let registry = KindRegistry::new();
        let route = registry.get(KIND_ROUTE).unwrap();
        assert!(!FakeClusterApi::new().kind_exists(route).await.unwrap());
        assert!(FakeClusterApi::new().get(route, Some("cdi"), "r").await.unwrap_err().is_not_found());

        let fake = FakeClusterApi::new().with_kind(KIND_ROUTE);
        assert!(fake.kind_exists(route).await.unwrap());
        assert!(fake.get(route, Some("cdi"), "r").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let registry = KindRegistry::new();
        let pod = registry.get(KIND_POD).unwrap();
        let fake = FakeClusterApi::new();
        fake.fail_on(FakeOp::Get, KIND_POD, "p", 500);

        assert!(fake.get(pod, Some("ns"), "p").await.is_err());
        assert!(fake.get(pod, Some("ns"), "p").await.unwrap().is_none());
    }
}
