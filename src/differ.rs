// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Convergence of one desired object onto the cluster.
//!
//! [`Converger::converge`] decides between create, update and no-op:
//!
//! - **Absent**: the object is stamped with the last-applied annotation, the
//!   `createVersion` label and a controller reference to the `CDI` resource, then
//!   created between the `PreCreate` and `PostCreate` hooks.
//! - **Present, not ours**: left alone. The operator never adopts objects.
//! - **Present, ours**: labels and annotations are merged (desired keys win, user
//!   keys survive) and, unless the kind's data belongs to someone else, the desired
//!   JSON is overlaid onto the current JSON. The object is written only when the
//!   result differs from what the server holds.
//!
//! Every write publishes a success or failure event on the `CDI` resource.

use crate::cluster::ClusterApi;
use crate::crd::CDI;
use crate::errors::{OperatorError, Result};
use crate::events::EventPublisher;
use crate::hooks::{HookArgs, HookRegistry, ReconcileState};
use crate::kinds::{KindInfo, KindRegistry, KIND_DEPLOYMENT};
use crate::labels::{
    CREATE_VERSION_LABEL, K8S_COMPONENT, K8S_MANAGED_BY, K8S_PART_OF, K8S_VERSION,
    LAST_APPLIED_CONFIG_ANNOTATION, UPDATE_VERSION_LABEL,
};
use crate::metrics;
use crate::status_reasons::{
    ACTION_CREATE, ACTION_DELETE, ACTION_UPDATE, EVENT_CREATE_RESOURCE_FAILED,
    EVENT_CREATE_RESOURCE_SUCCESS, EVENT_DELETE_RESOURCE_FAILED, EVENT_DELETE_RESOURCE_SUCCESS,
    EVENT_UPDATE_RESOURCE_FAILED, EVENT_UPDATE_RESOURCE_SUCCESS,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Labels copied from the `CDI` resource onto every deployed object.
const RECOMMENDED_LABELS: [&str; 4] = [K8S_PART_OF, K8S_VERSION, K8S_COMPONENT, K8S_MANAGED_BY];

/// What [`Converger::converge`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvergeOutcome {
    Created,
    Updated,
    Unchanged,
    /// The object exists but is not controlled by the `CDI` resource
    NotOwned,
}

/// Shared state for converging the objects of one reconcile.
pub struct Converger<'a> {
    pub cluster: &'a dyn ClusterApi,
    pub kinds: &'a KindRegistry,
    pub hooks: &'a HookRegistry,
    pub events: &'a dyn EventPublisher,
    pub cr: &'a CDI,
    /// Install namespace
    pub namespace: &'a str,
    /// Version stamped into the create/update version labels
    pub version: &'a str,
}

impl Converger<'_> {
    /// Bring one desired object into the cluster.
    ///
    /// # Errors
    ///
    /// Returns the API or hook error that stopped this object. A warning event has
    /// already been published for it.
    pub async fn converge(&self, desired: DynamicObject) -> Result<ConvergeOutcome> {
        let info = self.kinds.for_object(&desired)?;
        let name = desired.name_any();
        let current = self
            .cluster
            .get(info, desired.metadata.namespace.as_deref(), &name)
            .await?;

        match current {
            None => self.create(info, desired).await,
            Some(current) if !controlled_by(&current, self.cr) => {
                debug!(kind = %info.kind(), name = %name, "object exists and is not owned, skipping");
                Ok(ConvergeOutcome::NotOwned)
            }
            Some(current) => self.update(info, desired, current).await,
        }
    }

    /// Delete an owned object between the `PreDelete` and `PostDelete` hooks.
    ///
    /// # Errors
    ///
    /// Returns the API or hook error; a warning event has been published for it.
    pub async fn delete(&self, current: DynamicObject) -> Result<bool> {
        let info = self.kinds.for_object(&current)?;
        let name = current.name_any();
        let namespace = current.metadata.namespace.clone();

        let hooked = self
            .run_hooks(ReconcileState::PreDelete, None, Some(current))
            .await;
        let (_, current) = self
            .report(hooked, EVENT_DELETE_RESOURCE_FAILED, ACTION_DELETE, info, &name)
            .await?;

        let deleted = match self.cluster.delete(info, namespace.as_deref(), &name).await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.warn_event(EVENT_DELETE_RESOURCE_FAILED, ACTION_DELETE, info, &name, &e)
                    .await;
                return Err(e);
            }
        };

        let hooked = self.run_hooks(ReconcileState::PostDelete, None, current).await;
        self.report(hooked, EVENT_DELETE_RESOURCE_FAILED, ACTION_DELETE, info, &name)
            .await?;

        if deleted {
            info!(kind = %info.kind(), name = %name, "Resource deleted");
            metrics::record_resource_deleted(info.kind());
            self.normal_event(EVENT_DELETE_RESOURCE_SUCCESS, ACTION_DELETE, "deleted", info, &name)
                .await;
        }
        Ok(deleted)
    }

    async fn create(&self, info: &KindInfo, mut desired: DynamicObject) -> Result<ConvergeOutcome> {
        let name = desired.name_any();
        set_last_applied(&mut desired)?;
        desired
            .labels_mut()
            .insert(CREATE_VERSION_LABEL.to_string(), self.version.to_string());
        set_recommended_labels(&mut desired, self.cr);
        set_controller_reference(&mut desired, self.cr);

        let hooked = self
            .run_hooks(ReconcileState::PreCreate, Some(desired), None)
            .await;
        let (desired, _) = self
            .report(hooked, EVENT_CREATE_RESOURCE_FAILED, ACTION_CREATE, info, &name)
            .await?;
        let Some(desired) = desired else {
            return Ok(ConvergeOutcome::Unchanged);
        };

        if let Err(e) = self.cluster.create(info, &desired).await {
            warn!(kind = %info.kind(), name = %name, error = %e, "Failed to create resource");
            self.warn_event(EVENT_CREATE_RESOURCE_FAILED, ACTION_CREATE, info, &name, &e)
                .await;
            return Err(e);
        }

        let hooked = self
            .run_hooks(ReconcileState::PostCreate, Some(desired), None)
            .await;
        self.report(hooked, EVENT_CREATE_RESOURCE_FAILED, ACTION_CREATE, info, &name)
            .await?;

        info!(kind = %info.kind(), name = %name, namespace = ?self.namespace_of(info), "Resource created");
        metrics::record_resource_created(info.kind());
        self.normal_event(EVENT_CREATE_RESOURCE_SUCCESS, ACTION_CREATE, "created", info, &name)
            .await;
        Ok(ConvergeOutcome::Created)
    }

    async fn update(
        &self,
        info: &KindInfo,
        desired: DynamicObject,
        current: DynamicObject,
    ) -> Result<ConvergeOutcome> {
        let name = desired.name_any();

        let (desired, current) = self
            .run_hooks(ReconcileState::PostRead, Some(desired), Some(current))
            .await?;
        let (Some(mut desired), Some(mut current)) = (desired, current) else {
            return Ok(ConvergeOutcome::Unchanged);
        };

        strip_status(&mut current);
        let original = serde_json::to_value(&current)?;

        merge_labels_and_annotations(&desired.metadata, &mut current.metadata);
        set_recommended_labels(&mut current, self.cr);

        if !info.mutable {
            set_last_applied(&mut desired)?;
            if let Some(applied) = desired.annotations().get(LAST_APPLIED_CONFIG_ANNOTATION) {
                current
                    .annotations_mut()
                    .insert(LAST_APPLIED_CONFIG_ANNOTATION.to_string(), applied.clone());
            }
            current = merge_object(&desired, &current)?;
        } else if let Some(declared) = desired.data.get("data").filter(|d| d.is_object()) {
            // Only the keys the operator declares are converged, the rest belong to others.
            overlay(&mut current.data["data"], declared);
        }

        if serde_json::to_value(&current)? == original {
            debug!(kind = %info.kind(), name = %name, "Resource unchanged");
            return Ok(ConvergeOutcome::Unchanged);
        }

        current
            .labels_mut()
            .insert(UPDATE_VERSION_LABEL.to_string(), self.version.to_string());

        let hooked = self
            .run_hooks(ReconcileState::PreUpdate, Some(desired), Some(current))
            .await;
        let (desired, current) = self
            .report(hooked, EVENT_UPDATE_RESOURCE_FAILED, ACTION_UPDATE, info, &name)
            .await?;
        let Some(current) = current else {
            return Ok(ConvergeOutcome::Unchanged);
        };

        if let Err(e) = self.cluster.update(info, &current).await {
            warn!(kind = %info.kind(), name = %name, error = %e, "Failed to update resource");
            self.warn_event(EVENT_UPDATE_RESOURCE_FAILED, ACTION_UPDATE, info, &name, &e)
                .await;
            return Err(e);
        }

        let hooked = self.run_hooks(ReconcileState::PostUpdate, desired, None).await;
        self.report(hooked, EVENT_UPDATE_RESOURCE_FAILED, ACTION_UPDATE, info, &name)
            .await?;

        info!(kind = %info.kind(), name = %name, namespace = ?self.namespace_of(info), "Resource updated");
        metrics::record_resource_updated(info.kind());
        self.normal_event(EVENT_UPDATE_RESOURCE_SUCCESS, ACTION_UPDATE, "updated", info, &name)
            .await;
        Ok(ConvergeOutcome::Updated)
    }

    /// Dispatch hooks and hand back the (possibly modified) objects.
    pub(crate) async fn run_hooks(
        &self,
        state: ReconcileState,
        desired: Option<DynamicObject>,
        current: Option<DynamicObject>,
    ) -> Result<(Option<DynamicObject>, Option<DynamicObject>)> {
        let mut args = HookArgs {
            state,
            namespace: self.namespace,
            cr: self.cr,
            desired,
            current,
            cluster: self.cluster,
            kinds: self.kinds,
            events: self.events,
        };
        self.hooks.dispatch(&mut args).await?;
        Ok((args.desired, args.current))
    }

    /// Publish a warning event for a failed result and pass the result through.
    async fn report<T>(
        &self,
        result: Result<T>,
        reason: &str,
        action: &str,
        info: &KindInfo,
        name: &str,
    ) -> Result<T> {
        if let Err(e) = &result {
            self.warn_event(reason, action, info, name, e).await;
        }
        result
    }

    fn namespace_of(&self, info: &KindInfo) -> Option<&str> {
        info.namespaced.then_some(self.namespace)
    }

    async fn normal_event(&self, reason: &str, action: &str, verb: &str, info: &KindInfo, name: &str) {
        let note = format!("Successfully {verb} resource {} {name}", info.kind());
        self.events
            .publish(&self.cr.object_ref(&()), EventType::Normal, reason, action, Some(note))
            .await;
    }

    async fn warn_event(
        &self,
        reason: &str,
        action: &str,
        info: &KindInfo,
        name: &str,
        err: &OperatorError,
    ) {
        let note = format!(
            "Failed to {} resource {} {name}, {err}",
            action.to_lowercase(),
            info.kind()
        );
        self.events
            .publish(&self.cr.object_ref(&()), EventType::Warning, reason, action, Some(note))
            .await;
    }
}

/// Whether `obj` carries a controller reference to `cr`.
#[must_use]
pub fn controlled_by(obj: &DynamicObject, cr: &CDI) -> bool {
    let Some(uid) = cr.metadata.uid.as_deref() else {
        return false;
    };
    obj.owner_references()
        .iter()
        .any(|r| r.controller == Some(true) && r.uid == uid)
}

/// Replace any controller reference on `obj` with one pointing at `cr`.
pub fn set_controller_reference(obj: &mut DynamicObject, cr: &CDI) {
    let Some(owner) = cr.controller_owner_ref(&()) else {
        return;
    };
    let refs = obj.owner_references_mut();
    refs.retain(|r| r.controller != Some(true));
    refs.push(owner);
}

/// Desired labels and annotations win; keys only present on `current` survive.
pub fn merge_labels_and_annotations(desired: &ObjectMeta, current: &mut ObjectMeta) {
    for (source, target) in [
        (&desired.labels, &mut current.labels),
        (&desired.annotations, &mut current.annotations),
    ] {
        if let Some(source) = source {
            target
                .get_or_insert_with(BTreeMap::new)
                .extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
}

/// Overlay the desired object onto the current one.
///
/// The merged labels, annotations and creation timestamp of `current` are carried
/// into the desired object first. Fields only `current` has (uid, resource version,
/// server defaults) are kept.
///
/// # Errors
///
/// Returns a serialization error if either object cannot round-trip through JSON.
pub fn merge_object(desired: &DynamicObject, current: &DynamicObject) -> Result<DynamicObject> {
    let mut desired = desired.clone();
    desired.metadata.labels.clone_from(&current.metadata.labels);
    desired
        .metadata
        .annotations
        .clone_from(&current.metadata.annotations);
    desired
        .metadata
        .creation_timestamp
        .clone_from(&current.metadata.creation_timestamp);
    strip_status(&mut desired);

    let mut merged = serde_json::to_value(current)?;
    overlay(&mut merged, &serde_json::to_value(&desired)?);
    if let Some(map) = merged.as_object_mut() {
        map.remove("status");
    }
    Ok(serde_json::from_value(merged)?)
}

/// Recursive overlay: objects merge, arrays are truncated and merged per index,
/// scalars are replaced, `null` removes the key.
pub(crate) fn overlay(target: &mut Value, desired: &Value) {
    match (target, desired) {
        (Value::Object(target), Value::Object(desired)) => {
            for (key, value) in desired {
                if value.is_null() {
                    target.remove(key);
                } else if let Some(existing) = target.get_mut(key) {
                    overlay(existing, value);
                } else {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        (Value::Array(target), Value::Array(desired)) => {
            target.truncate(desired.len());
            for (idx, value) in desired.iter().enumerate() {
                if let Some(existing) = target.get_mut(idx) {
                    overlay(existing, value);
                } else {
                    target.push(value.clone());
                }
            }
        }
        (target, desired) => *target = desired.clone(),
    }
}

fn strip_status(obj: &mut DynamicObject) {
    if let Some(map) = obj.data.as_object_mut() {
        map.remove("status");
    }
}

/// Record the JSON of the desired object (without the annotation itself).
fn set_last_applied(obj: &mut DynamicObject) -> Result<()> {
    obj.annotations_mut().remove(LAST_APPLIED_CONFIG_ANNOTATION);
    let json = serde_json::to_string(obj)?;
    obj.annotations_mut()
        .insert(LAST_APPLIED_CONFIG_ANNOTATION.to_string(), json);
    Ok(())
}

/// Copy the recommended labels of the `CDI` resource onto the object, and onto the
/// pod template of deployments.
fn set_recommended_labels(obj: &mut DynamicObject, cr: &CDI) {
    let labels: BTreeMap<String, String> = RECOMMENDED_LABELS
        .iter()
        .filter_map(|k| cr.labels().get(*k).map(|v| ((*k).to_string(), v.clone())))
        .collect();
    if labels.is_empty() {
        return;
    }

    obj.labels_mut()
        .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));

    let is_deployment = obj.types.as_ref().is_some_and(|t| t.kind == KIND_DEPLOYMENT);
    if !is_deployment {
        return;
    }
    if let Some(template) = obj
        .data
        .pointer_mut("/spec/template")
        .and_then(Value::as_object_mut)
    {
        let metadata = template
            .entry("metadata")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Some(metadata) = metadata.as_object_mut() {
            let pod_labels = metadata
                .entry("labels")
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Some(pod_labels) = pod_labels.as_object_mut() {
                for (k, v) in labels {
                    pod_labels.insert(k, Value::String(v));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "differ_tests.rs"]
mod differ_tests;
