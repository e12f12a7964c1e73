// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Standard Kubernetes status condition reasons for the `CDI` resource.
//!
//! The `CDI` resource reports three conditions, following the operator lifecycle
//! conventions used across KubeVirt components:
//!
//! - **`Available`** - the installation serves requests
//! - **`Progressing`** - the installation is being deployed or upgraded
//! - **`Degraded`** - something needs attention
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   phase: Deployed
//!   observedVersion: v1.5.0
//!   conditions:
//!     - type: Available
//!       status: "True"
//!       reason: DeployCompleted
//!       message: Deployment Completed
//!     - type: Progressing
//!       status: "False"
//!     - type: Degraded
//!       status: "False"
//! ```
//!
//! Event reasons published on the `CDI` resource live in this module as well, under
//! the `EVENT_` prefix.

// ============================================================================
// Condition Types
// ============================================================================

/// The installation is available.
pub const CONDITION_TYPE_AVAILABLE: &str = "Available";

/// The installation is progressing towards its desired state.
pub const CONDITION_TYPE_PROGRESSING: &str = "Progressing";

/// The installation is degraded.
pub const CONDITION_TYPE_DEGRADED: &str = "Degraded";

// ============================================================================
// Condition Reasons
// ============================================================================

/// First deployment of the installation started.
pub const REASON_DEPLOY_STARTED: &str = "DeployStarted";

/// Every operator-managed deployment is ready.
pub const REASON_DEPLOY_COMPLETED: &str = "DeployCompleted";

/// An upgrade to the running operator version started.
pub const REASON_UPGRADE_STARTED: &str = "UpgradeStarted";

/// A previously ready deployment is no longer ready.
pub const REASON_DEPLOYMENT_NOT_READY: &str = "DeploymentNotReady";

/// Another `CDI` resource already owns the installation.
///
/// The resource is placed in phase `Error` and not requeued. Deleting it is the
/// only way out.
pub const REASON_UNWANTED_CR: &str = "UnwantedCR";

/// The ownership `ConfigMap` disappeared underneath an initialised resource.
pub const REASON_CONFIG_ERROR: &str = "ConfigError";

/// Converging one or more objects failed.
pub const REASON_RECONCILE_FAILED: &str = "ReconcileFailed";

/// A user patch from `spec.customizeComponents` could not be applied.
pub const REASON_CUSTOMIZATION_FAILED: &str = "CustomizationFailed";

/// `spec.certConfig` declares an invalid duration or renewal window.
pub const REASON_INVALID_CERT_CONFIG: &str = "InvalidCertConfig";

/// Uninstall refused because `DataVolume`s still exist.
pub const REASON_UNINSTALL_BLOCKED: &str = "UninstallBlocked";

/// The running operator is older than the observed installation.
pub const REASON_DOWNGRADE_REFUSED: &str = "DowngradeRefused";

// ============================================================================
// Condition Messages
// ============================================================================

/// Message paired with [`REASON_DEPLOY_STARTED`]
pub const MESSAGE_DEPLOY_STARTED: &str = "Started Deployment";

/// Message paired with [`REASON_DEPLOY_COMPLETED`]
pub const MESSAGE_DEPLOY_COMPLETED: &str = "Deployment Completed";

/// Message paired with [`REASON_UNWANTED_CR`]
pub const MESSAGE_UNWANTED_CR: &str = "Reconciling to error state, unwanted CDI object";

/// Message paired with [`REASON_CONFIG_ERROR`]
pub const MESSAGE_CONFIG_MISSING: &str =
    "Reconciling to error state, no configmap for initialised CDI object";

/// Message paired with [`REASON_UNINSTALL_BLOCKED`]
pub const MESSAGE_UNINSTALL_BLOCKED: &str =
    "Uninstall blocked: DataVolumes still exist and uninstallStrategy is BlockUninstallIfWorkloadsExist";

/// Message paired with [`REASON_UPGRADE_STARTED`].
#[must_use]
pub fn upgrade_started_message(version: &str) -> String {
    format!("Started upgrade to version {version}")
}

/// Message paired with [`REASON_RECONCILE_FAILED`].
#[must_use]
pub fn reconcile_failed_message(err: &impl std::fmt::Display) -> String {
    format!("reconcile failed: {err}")
}

// ============================================================================
// Event Reasons
// ============================================================================

/// An owned object was created.
pub const EVENT_CREATE_RESOURCE_SUCCESS: &str = "CreateResourceSuccess";

/// Creating an owned object failed.
pub const EVENT_CREATE_RESOURCE_FAILED: &str = "CreateResourceFailed";

/// An owned object was updated.
pub const EVENT_UPDATE_RESOURCE_SUCCESS: &str = "UpdateResourceSuccess";

/// Updating an owned object failed.
pub const EVENT_UPDATE_RESOURCE_FAILED: &str = "UpdateResourceFailed";

/// An owned object was deleted.
pub const EVENT_DELETE_RESOURCE_SUCCESS: &str = "DeleteResourceSuccess";

/// Deleting an owned object failed.
pub const EVENT_DELETE_RESOURCE_FAILED: &str = "DeleteResourceFailed";

/// A user route received the upload proxy CA.
pub const EVENT_UPDATE_USER_ROUTE_SUCCESS: &str = "UpdateUserRouteSuccess";

/// Uninstall was refused.
pub const EVENT_UNINSTALL_BLOCKED: &str = "UninstallBlocked";

// ============================================================================
// Event Actions
// ============================================================================

/// Action recorded on create events
pub const ACTION_CREATE: &str = "Create";

/// Action recorded on update events
pub const ACTION_UPDATE: &str = "Update";

/// Action recorded on delete events
pub const ACTION_DELETE: &str = "Delete";

/// Action recorded on uninstall events
pub const ACTION_UNINSTALL: &str = "Uninstall";

#[cfg(test)]
#[path = "status_reasons_tests.rs"]
mod status_reasons_tests;
