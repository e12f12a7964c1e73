// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CA injection into user routes that front the upload proxy.
//!
//! Users may expose the upload proxy through their own `Route`. Annotating it
//! with `operator.cdi.kubevirt.io/injectUploadProxyCert: "true"` asks the operator
//! to keep its `spec.tls.destinationCACertificate` in line with the upload proxy
//! signer bundle, across rotations. Nothing else on the route is touched, and
//! the routes are left alone on uninstall.

use crate::cluster::ClusterApi;
use crate::crd::CDI;
use crate::differ::controlled_by;
use crate::errors::Result;
use crate::events::EventPublisher;
use crate::kinds::{KindRegistry, KIND_ROUTE};
use crate::labels::INJECT_UPLOAD_PROXY_CERT_ANNOTATION;
use crate::status_reasons::{ACTION_UPDATE, EVENT_UPDATE_USER_ROUTE_SUCCESS};
use kube::api::DynamicObject;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use serde_json::{json, Value};
use tracing::{debug, info};

fn wants_injection(route: &DynamicObject) -> bool {
    route
        .annotations()
        .get(INJECT_UPLOAD_PROXY_CERT_ANNOTATION)
        .is_some_and(|v| v == "true")
}

/// Write `bundle` into `route`, returning whether it changed.
fn inject(route: &mut DynamicObject, bundle: &str) -> bool {
    let current = route
        .data
        .pointer("/spec/tls/destinationCACertificate")
        .and_then(Value::as_str);
    if current == Some(bundle) {
        return false;
    }

    if !route.data["spec"].is_object() {
        route.data["spec"] = json!({});
    }
    if !route.data["spec"]["tls"].is_object() {
        route.data["spec"]["tls"] = json!({});
    }
    route.data["spec"]["tls"]["destinationCACertificate"] = Value::from(bundle);
    true
}

/// Update every annotated route in the install namespace with the upload proxy
/// CA bundle.
///
/// Returns the number of routes updated. A cluster without routes, or an
/// upload proxy signer that has not published a bundle yet, updates nothing.
///
/// # Errors
///
/// Returns list or update errors.
pub async fn inject_user_routes(
    cluster: &dyn ClusterApi,
    kinds: &KindRegistry,
    events: &dyn EventPublisher,
    cr: &CDI,
    namespace: &str,
    bundle: Option<&str>,
) -> Result<usize> {
    let Some(bundle) = bundle else {
        return Ok(0);
    };
    if !kinds.is_available(KIND_ROUTE) {
        return Ok(0);
    }

    let info = kinds.get(KIND_ROUTE)?;
    let mut updated = 0;
    for mut route in cluster.list(info, Some(namespace), None).await? {
        // Our own route is converged with the rest of the desired set.
        if !wants_injection(&route) || controlled_by(&route, cr) {
            continue;
        }
        let name = route.name_any();
        if !inject(&mut route, bundle) {
            debug!(route = %name, "user route already carries the current CA bundle");
            continue;
        }

        cluster.update(info, &route).await?;
        info!(route = %name, namespace = %namespace, "Injected upload proxy CA bundle into user route");
        events
            .publish(
                &cr.object_ref(&()),
                EventType::Normal,
                EVENT_UPDATE_USER_ROUTE_SUCCESS,
                ACTION_UPDATE,
                Some(format!("Successfully updated route {name}")),
            )
            .await;
        updated += 1;
    }
    Ok(updated)
}

#[cfg(test)]
#[path = "route_tests.rs"]
mod route_tests;
