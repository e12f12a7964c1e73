// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! This module defines standard Kubernetes labels and CDI-specific labels/annotations
//! to ensure consistency across all resources created by the operator.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

/// Standard label carrying the application version
pub const K8S_VERSION: &str = "app.kubernetes.io/version";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/managed-by`
pub const MANAGED_BY_CDI_OPERATOR: &str = "cdi-operator";

/// Value for `app.kubernetes.io/component`
pub const COMPONENT_STORAGE: &str = "storage";

// ============================================================================
// CDI-Specific Labels
// ============================================================================

/// Label present on every object the operator deploys
pub const CDI_LABEL: &str = "cdi.kubevirt.io";

/// Label present on operator bookkeeping objects (ownership `ConfigMap`)
pub const OPERATOR_LABEL: &str = "operator.cdi.kubevirt.io";

/// Label recording the operator version that created an object
pub const CREATE_VERSION_LABEL: &str = "operator.cdi.kubevirt.io/createVersion";

/// Label recording the operator version that last updated an object
pub const UPDATE_VERSION_LABEL: &str = "operator.cdi.kubevirt.io/updateVersion";

/// Label selecting the objects Prometheus cares about
pub const PROMETHEUS_LABEL: &str = "prometheus.cdi.kubevirt.io";

/// Value of [`PROMETHEUS_LABEL`]
pub const PROMETHEUS_LABEL_VALUE: &str = "true";

// ============================================================================
// CDI-Specific Annotations
// ============================================================================

/// Annotation carrying the JSON of the desired object at last write
pub const LAST_APPLIED_CONFIG_ANNOTATION: &str = "operator.cdi.kubevirt.io/lastAppliedConfiguration";

/// Annotation carrying the SHA1 hash of user customizations
pub const CUSTOMIZE_COMPONENTS_HASH_ANNOTATION: &str = "cdi.kubevirt.io/customize-components-hash";

/// Annotation on signer secrets carrying the lifetime/refresh configuration as JSON
pub const CERT_CONFIG_ANNOTATION: &str = "operator.cdi.kubevirt.io/certConfig";

/// Annotation recording a certificate's `notBefore` (RFC3339)
pub const CERT_NOT_BEFORE_ANNOTATION: &str = "operator.cdi.kubevirt.io/certificate-not-before";

/// Annotation recording a certificate's `notAfter` (RFC3339)
pub const CERT_NOT_AFTER_ANNOTATION: &str = "operator.cdi.kubevirt.io/certificate-not-after";

/// Annotation recording the common name of a certificate's issuer
pub const CERT_ISSUER_ANNOTATION: &str = "operator.cdi.kubevirt.io/certificate-issuer";

/// Annotation on user routes requesting upload proxy CA injection
pub const INJECT_UPLOAD_PROXY_CERT_ANNOTATION: &str =
    "operator.cdi.kubevirt.io/injectUploadProxyCert";

/// Annotation on service accounts listing the SCCs they must be granted (JSON array)
pub const SCC_ANNOTATION: &str = "cdi-scc";

/// Route timeout annotation understood by the `OpenShift` router
pub const ROUTE_TIMEOUT_ANNOTATION: &str = "haproxy.router.openshift.io/timeout";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer held on the `CDI` resource until uninstall completes
pub const FINALIZER_CDI: &str = "operator.cdi.kubevirt.io";
