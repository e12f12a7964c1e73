// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the CDI operator.
//!
//! Library layers (cluster access, differ, patch engine, certificate manager, hooks)
//! return [`OperatorError`]. Reconcilers work with `anyhow::Result` and convert at
//! the boundary, which keeps the transient/permanent classification available to
//! the controller error policy through [`OperatorError::is_transient`].

use thiserror::Error;

/// Errors raised while converging the installation.
#[derive(Error, Debug)]
pub enum OperatorError {
    /// Kubernetes API call failed
    ///
    /// Conflicts, throttling and server errors are transient and requeued with backoff.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// JSON (de)serialization of an object failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A user patch could not be applied to a matched object
    ///
    /// Permanent until the user corrects the patch.
    #[error("Failed to apply patch to {kind}/{name}: {reason}")]
    Patch {
        /// Kind of the object being patched
        kind: String,
        /// Name of the object being patched
        name: String,
        /// Why the patch failed
        reason: String,
    },

    /// A user patch declared an unknown type
    #[error("PatchType is not supported: {0}")]
    UnsupportedPatchType(String),

    /// Certificate generation or parsing failed
    #[error("Certificate error for {name}: {reason}")]
    Certificate {
        /// Secret or `ConfigMap` the certificate belongs to
        name: String,
        /// Why the operation failed
        reason: String,
    },

    /// A reconcile hook returned an error
    #[error("Hook failed during {state} of {kind}/{name}: {reason}")]
    Hook {
        /// Reconcile state in which the hook ran
        state: String,
        /// Kind of the object the hook ran for
        kind: String,
        /// Name of the object the hook ran for
        name: String,
        /// Error reported by the hook
        reason: String,
    },

    /// The running operator is older than the observed installation
    #[error("operator downgraded, will not reconcile (observed {observed}, target {target})")]
    Downgrade {
        /// Version observed on the installation
        observed: String,
        /// Version of the running operator
        target: String,
    },

    /// Invalid operator or resource configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// An object lacks a field the operator relies on
    #[error("{kind} {name} is missing {field}")]
    MissingField {
        /// Kind of the object
        kind: String,
        /// Name of the object
        name: String,
        /// Path of the missing field
        field: String,
    },

    /// A kind was used that is not present in the kind registry
    #[error("Kind {0} is not registered")]
    UnknownKind(String),
}

/// Result alias for operator library code.
pub type Result<T, E = OperatorError> = std::result::Result<T, E>;

impl OperatorError {
    /// Whether the error is expected to clear on its own and should be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Kube(e) => crate::reconcilers::retry::is_retryable_error(e) || is_conflict(e),
            Self::Certificate { .. } => true,
            _ => false,
        }
    }

    /// Whether the error is an HTTP 404 from the API server.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 404)
    }

    /// Whether the error is an HTTP 409 from the API server.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Kube(e) if is_conflict(e))
    }
}

fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
