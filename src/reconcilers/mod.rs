// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation of the `CDI` resource.
//!
//! The controller in [`crate::watches`] calls [`reconcile_instance`] for every
//! change to the `CDI` resource or to an object it owns. The reconciler compares
//! the desired installation with the cluster and converges it.
//!
//! # Reconciliation Architecture
//!
//! 1. **Gate** - Only the `CDI` resource that owns the install may mutate it
//! 2. **Converge** - Build the desired set and create or update each object
//! 3. **Certificates** - Rotate signers and serving certificates before expiry
//! 4. **Status** - Report phase, versions and conditions back to Kubernetes
//!
//! # Modules
//!
//! - [`instance`] - The state machine driving one reconcile
//! - [`upgrade`] - Semantic version comparison deciding the upgrade path
//! - [`readiness`] - Deployment rollout checks
//! - [`cleanup`] - Post-upgrade sweep and uninstall
//! - [`status`] - Condition helpers and the batched status writer
//! - [`finalizers`] - Finalizer management on the `CDI` resource
//! - [`route`] - CA injection into user routes
//! - [`scc`] - The shared `SecurityContextConstraints`
//! - [`pagination`], [`retry`] - API plumbing used by the cluster client
//!
//! # Example
//!
//! ```rust,no_run
//! use cdi_operator::context::Context;
//! use cdi_operator::reconcilers::reconcile_instance;
//!
//! async fn reconcile(ctx: &Context) -> anyhow::Result<()> {
//!     let action = reconcile_instance("cdi", ctx).await?;
//!     println!("next: {action:?}");
//!     Ok(())
//! }
//! ```

pub mod cleanup;
pub mod finalizers;
pub mod instance;
pub mod pagination;
pub mod readiness;
pub mod retry;
pub mod route;
pub mod scc;
pub mod status;
pub mod upgrade;

pub use instance::{read_ca_bundles, reconcile_instance};
pub use upgrade::should_take_update_path;
