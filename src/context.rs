// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the `CDI` controller.
//!
//! The controller receives an `Arc<Context>` holding everything a reconcile
//! needs: cluster access, the kind registry resolved at startup, the hook
//! registry, the event publisher, the factory arguments and the certificate
//! issuer. Every dependency sits behind a trait object so reconciles can run
//! against the in-memory fakes in tests.

use crate::callbacks;
use crate::certs::rotation::{RcgenRotation, Rotation};
use crate::cluster::{ClusterApi, KubeClusterApi};
use crate::config::FactoryArgs;
use crate::constants::OPERATOR_NAME;
use crate::events::{EventPublisher, KubeEventPublisher};
use crate::hooks::HookRegistry;
use crate::kinds::KindRegistry;
use kube::Client;
use std::sync::Arc;

/// Shared context passed to the controller.
#[derive(Clone)]
pub struct Context {
    /// API server access for every kind
    pub cluster: Arc<dyn ClusterApi>,

    /// Kinds served by this cluster
    pub kinds: KindRegistry,

    /// Per-kind reconcile callbacks
    pub hooks: Arc<HookRegistry>,

    /// Kubernetes event sink
    pub events: Arc<dyn EventPublisher>,

    /// Operator wide settings read from the environment
    pub args: FactoryArgs,

    /// Certificate issuer
    pub rotation: Arc<dyn Rotation>,
}

impl Context {
    /// Context backed by a live cluster.
    #[must_use]
    pub fn new(client: Client, args: FactoryArgs, kinds: KindRegistry) -> Self {
        Self {
            cluster: Arc::new(KubeClusterApi::new(client.clone())),
            kinds,
            hooks: Arc::new(callbacks::registry()),
            events: Arc::new(KubeEventPublisher::new(client, OPERATOR_NAME)),
            args,
            rotation: Arc::new(RcgenRotation),
        }
    }

    /// Context over arbitrary implementations.
    #[must_use]
    pub fn with_parts(
        cluster: Arc<dyn ClusterApi>,
        kinds: KindRegistry,
        events: Arc<dyn EventPublisher>,
        args: FactoryArgs,
        rotation: Arc<dyn Rotation>,
    ) -> Self {
        Self {
            cluster,
            kinds,
            hooks: Arc::new(callbacks::registry()),
            events,
            args,
            rotation,
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
