// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # cdi-operator - Containerized Data Importer operator for Kubernetes
//!
//! cdi-operator installs, upgrades and uninstalls the Containerized Data
//! Importer (CDI) from a single cluster-scoped `CDI` custom resource.
//!
//! ## Overview
//!
//! From the `CDI` resource and the operator's environment the operator derives
//! the complete set of objects making up an installation (CRDs, RBAC,
//! deployments, services, webhooks, certificates) and keeps the cluster in
//! line with it:
//!
//! - Converges every desired object, never touching objects it does not own
//! - Applies user customizations (patches and command line flags)
//! - Issues and rotates the CA and serving certificates of every component
//! - Drives upgrades forward and garbage collects what older versions left
//! - Honours the uninstall strategy when the `CDI` resource is deleted
//!
//! ## Modules
//!
//! - [`crd`] - The `CDI` custom resource
//! - [`reconcilers`] - The reconcile state machine
//! - [`watches`] - Controller wiring and optional kind discovery
//! - [`resources`] - Builders for every desired object
//! - [`differ`] - Create or update decisions for one object
//! - [`certs`] - Certificate lifecycle
//! - [`patches`] - User customizations
//! - [`hooks`], [`callbacks`] - Per-kind reconcile callbacks
//! - [`ownership`] - The single active `CDI` resource gate
//! - [`cluster`], [`kinds`], [`events`] - API server access
//!
//! ## Example
//!
//! ```rust,no_run
//! use cdi_operator::crd::{CDISpec, UninstallStrategy, CDI};
//!
//! let cdi = CDI::new(
//!     "cdi",
//!     CDISpec {
//!         uninstall_strategy: Some(UninstallStrategy::BlockUninstallIfWorkloadsExist),
//!         ..CDISpec::default()
//!     },
//! );
//! assert_eq!(cdi.uninstall_strategy(), UninstallStrategy::BlockUninstallIfWorkloadsExist);
//! ```

pub mod callbacks;
pub mod certs;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod differ;
pub mod duration;
pub mod errors;
pub mod events;
pub mod hooks;
pub mod kinds;
pub mod labels;
pub mod metrics;
pub mod ownership;
pub mod patches;
pub mod reconcilers;
pub mod resources;
pub mod status_reasons;
pub mod watches;
