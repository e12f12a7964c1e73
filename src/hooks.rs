// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-kind callbacks invoked around every object operation.
//!
//! The differ and the cleanup paths call [`HookRegistry::dispatch`] at each
//! [`ReconcileState`]. Hooks are registered per kind, or for every kind, through
//! [`HookRegistryBuilder`]. A hook sees the desired and current object and may
//! mutate either; the differ writes back whatever the hooks leave behind. A hook
//! error aborts the operation on that object.

use crate::cluster::ClusterApi;
use crate::crd::CDI;
use crate::errors::{OperatorError, Result};
use crate::events::EventPublisher;
use crate::kinds::KindRegistry;
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::ResourceExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Point in an object's lifecycle at which hooks run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReconcileState {
    PreCreate,
    PostCreate,
    /// After the current object was read, before it is merged with the desired one
    PostRead,
    /// Before the merged object is written; `current` holds the object to write
    PreUpdate,
    PostUpdate,
    PreDelete,
    PostDelete,
    /// Before the `CDI` resource's finalizer is processed, once per desired object
    PreCRDelete,
    /// After the installation was torn down, once per desired object
    PostCRDelete,
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PreCreate => "PRE_CREATE",
            Self::PostCreate => "POST_CREATE",
            Self::PostRead => "POST_READ",
            Self::PreUpdate => "PRE_UPDATE",
            Self::PostUpdate => "POST_UPDATE",
            Self::PreDelete => "PRE_DELETE",
            Self::PostDelete => "POST_DELETE",
            Self::PreCRDelete => "PRE_CR_DELETE",
            Self::PostCRDelete => "POST_CR_DELETE",
        };
        f.write_str(s)
    }
}

/// Everything a hook can see and touch.
pub struct HookArgs<'a> {
    pub state: ReconcileState,
    /// Install namespace
    pub namespace: &'a str,
    pub cr: &'a CDI,
    pub desired: Option<DynamicObject>,
    pub current: Option<DynamicObject>,
    pub cluster: &'a dyn ClusterApi,
    pub kinds: &'a KindRegistry,
    pub events: &'a dyn EventPublisher,
}

impl HookArgs<'_> {
    /// The object the hook is about: desired when present, else current.
    #[must_use]
    pub fn object(&self) -> Option<&DynamicObject> {
        self.desired.as_ref().or(self.current.as_ref())
    }

    /// Kind of [`Self::object`], empty when there is none.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.object()
            .and_then(|o| o.types.as_ref())
            .map(|t| t.kind.as_str())
            .unwrap_or_default()
    }

    /// Name of [`Self::object`], empty when there is none.
    #[must_use]
    pub fn name(&self) -> String {
        self.object().map(ResourceExt::name_any).unwrap_or_default()
    }
}

/// A reconcile callback.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Run the hook. Hooks ignore states they are not interested in.
    async fn call(&self, args: &mut HookArgs<'_>) -> Result<()>;
}

/// Kind-keyed hook lists plus hooks that run for every kind.
#[derive(Clone, Default)]
pub struct HookRegistry {
    by_kind: HashMap<String, Vec<Arc<dyn Hook>>>,
    always: Vec<Arc<dyn Hook>>,
}

impl HookRegistry {
    #[must_use]
    pub fn builder() -> HookRegistryBuilder {
        HookRegistryBuilder::default()
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum::<usize>() + self.always.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every hook registered for the object's kind, then the hooks for
    /// every kind.
    ///
    /// Outside of `PreCreate`, a missing `current` object is fetched first.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::Hook`] for the first failing hook, or the error
    /// of fetching the current object.
    pub async fn dispatch(&self, args: &mut HookArgs<'_>) -> Result<()> {
        let kind = args.kind().to_string();
        let hooks: Vec<&Arc<dyn Hook>> = self
            .by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .chain(self.always.iter())
            .collect();
        if hooks.is_empty() {
            return Ok(());
        }

        if args.state != ReconcileState::PreCreate && args.current.is_none() {
            if let Some(desired) = args.desired.as_ref() {
                let info = args.kinds.get(&kind)?;
                args.current = args
                    .cluster
                    .get(info, desired.metadata.namespace.as_deref(), &desired.name_any())
                    .await?;
            }
        }

        for hook in hooks {
            debug!(hook = hook.name(), state = %args.state, kind = %kind, "invoking hook");
            if let Err(e) = hook.call(args).await {
                error!(hook = hook.name(), state = %args.state, kind = %kind, error = %e, "hook failed");
                return Err(OperatorError::Hook {
                    state: args.state.to_string(),
                    kind,
                    name: args.name(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Builder for [`HookRegistry`].
#[derive(Default)]
pub struct HookRegistryBuilder {
    registry: HookRegistry,
}

impl HookRegistryBuilder {
    /// Register a hook for one kind.
    #[must_use]
    pub fn on_kind(mut self, kind: &str, hook: impl Hook + 'static) -> Self {
        self.registry
            .by_kind
            .entry(kind.to_string())
            .or_default()
            .push(Arc::new(hook));
        self
    }

    /// Register a hook for every kind.
    #[must_use]
    pub fn always(mut self, hook: impl Hook + 'static) -> Self {
        self.registry.always.push(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn build(self) -> HookRegistry {
        self.registry
    }
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod hooks_tests;
