// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the CDI operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group of the `CDI` custom resource and the workload CRDs
pub const API_GROUP: &str = "cdi.kubevirt.io";

/// API version of the `CDI` custom resource
pub const API_VERSION: &str = "v1beta1";

/// Kind name for the `CDI` resource
pub const KIND_CDI: &str = "CDI";

/// Kind name for the `DataVolume` workload resource
pub const KIND_DATA_VOLUME: &str = "DataVolume";

/// Plural of the `DataVolume` workload resource
pub const PLURAL_DATA_VOLUMES: &str = "datavolumes";

// ============================================================================
// Operator Identity
// ============================================================================

/// Controller name reported on Kubernetes events and used as field manager
pub const OPERATOR_NAME: &str = "cdi-operator";

/// Default install namespace when neither `INSTALL_NAMESPACE` nor `POD_NAMESPACE` is set
pub const DEFAULT_INSTALL_NAMESPACE: &str = "cdi";

/// Name of the ownership `ConfigMap` that marks the active `CDI` resource
pub const OWNERSHIP_CONFIGMAP_NAME: &str = "cdi-config";

/// Name of the `ConfigMap` carrying the serialized `spec.config` for the controller workload
pub const CONFIG_SPEC_CONFIGMAP_NAME: &str = "cdi-config-spec";

/// Key under which the serialized `spec.config` is stored
pub const CONFIG_SPEC_KEY: &str = "config.json";

/// Name of the `ConfigMap` listing insecure registries
pub const INSECURE_REGISTRIES_CONFIGMAP_NAME: &str = "cdi-insecure-registries";

// ============================================================================
// Component Names
// ============================================================================

/// API server deployment, service account and RBAC name
pub const APISERVER_NAME: &str = "cdi-apiserver";

/// API server service name
pub const APISERVER_SERVICE_NAME: &str = "cdi-api";

/// Controller deployment name
pub const CONTROLLER_DEPLOYMENT_NAME: &str = "cdi-deployment";

/// Controller container name
pub const CONTROLLER_CONTAINER_NAME: &str = "cdi-controller";

/// Controller service account name
pub const CONTROLLER_SERVICE_ACCOUNT_NAME: &str = "cdi-sa";

/// Controller cluster role name
pub const CONTROLLER_CLUSTER_ROLE_NAME: &str = "cdi";

/// Upload proxy deployment, service and RBAC name
pub const UPLOADPROXY_NAME: &str = "cdi-uploadproxy";

/// Cron job service account used to poll registries
pub const CRONJOB_SERVICE_ACCOUNT_NAME: &str = "cdi-cronjob";

/// Monitoring rule name (only when `PrometheusRule` exists)
pub const PROMETHEUS_RULE_NAME: &str = "prometheus-cdi-rules";

/// Monitoring RBAC name (only when `PrometheusRule` exists)
pub const MONITORING_RBAC_NAME: &str = "cdi-monitoring";

/// Default namespace of the Prometheus service account
pub const DEFAULT_MONITORING_NAMESPACE: &str = "monitoring";

/// Service account Prometheus scrapes with
pub const PROMETHEUS_SERVICE_ACCOUNT: &str = "prometheus-k8s";

/// Default runbook location of the alerts, `{}` is replaced by the alert name
pub const DEFAULT_RUNBOOK_URL_TEMPLATE: &str = "https://kubevirt.io/monitoring/runbooks/{}";

/// Name of the validating webhook configuration for `DataVolume`s
pub const DATAVOLUME_VALIDATING_WEBHOOK_NAME: &str = "cdi-api-datavolume-validate";

/// Name of the mutating webhook configuration for `DataVolume`s
pub const DATAVOLUME_MUTATING_WEBHOOK_NAME: &str = "cdi-api-datavolume-mutate";

/// Name of the aggregated API service
pub const APISERVICE_NAME: &str = "v1beta1.upload.cdi.kubevirt.io";

/// Security context constraints the service accounts are granted on `OpenShift`
pub const SCC_NAME: &str = "containerized-data-importer";

// ============================================================================
// Worker Resources
// ============================================================================

/// Label value of importer worker pods
pub const WORKER_IMPORTER: &str = "importer";

/// Label value of upload server worker pods and services
pub const WORKER_UPLOAD_SERVER: &str = "cdi-upload-server";

/// Label value of clone source worker pods
pub const WORKER_CLONE_SOURCE: &str = "cdi-clone-source";

// ============================================================================
// Certificate Constants
// ============================================================================

/// `ConfigMap` key holding the PEM bundle of trusted signers
pub const CA_BUNDLE_KEY: &str = "ca-bundle.crt";

/// Secret key holding the PEM certificate
pub const TLS_CERT_KEY: &str = "tls.crt";

/// Secret key holding the PEM private key
pub const TLS_KEY_KEY: &str = "tls.key";

/// Client user name for the upload server client certificate
pub const UPLOADSERVER_CLIENT_USER: &str = "client.upload-server.cdi.kubevirt.io";

/// Seconds per hour
pub const SECONDS_PER_HOUR: u64 = 3600;

/// Seconds per day
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Default lifetime of the API server signer (48 hours)
pub const APISERVER_SIGNER_LIFETIME_SECS: u64 = 48 * SECONDS_PER_HOUR;

/// Default refresh window of the API server signer (24 hours before expiry)
pub const APISERVER_SIGNER_REFRESH_SECS: u64 = 24 * SECONDS_PER_HOUR;

/// Default lifetime of the upload proxy signer (48 days)
pub const UPLOADPROXY_SIGNER_LIFETIME_SECS: u64 = 48 * SECONDS_PER_DAY;

/// Default refresh window of the upload proxy signer (24 days before expiry)
pub const UPLOADPROXY_SIGNER_REFRESH_SECS: u64 = 24 * SECONDS_PER_DAY;

/// Lifetime of the upload server signers (10 years)
pub const UPLOADSERVER_SIGNER_LIFETIME_SECS: u64 = 10 * 365 * SECONDS_PER_DAY;

/// Refresh window of the upload server signers (2 years before expiry)
pub const UPLOADSERVER_SIGNER_REFRESH_SECS: u64 = 2 * 365 * SECONDS_PER_DAY;

/// Default lifetime of server and client leaf certificates (24 hours)
pub const TARGET_LIFETIME_SECS: u64 = 24 * SECONDS_PER_HOUR;

/// Default refresh window of server and client leaf certificates (12 hours before expiry)
pub const TARGET_REFRESH_SECS: u64 = 12 * SECONDS_PER_HOUR;

// ============================================================================
// Reconciliation Timing
// ============================================================================

/// Default certificate poll interval (1 minute)
pub const DEFAULT_CERT_POLL_INTERVAL_SECS: u64 = 60;

/// Requeue delay while a previous owner's resources are garbage collected (1 second)
pub const OWNER_GONE_REQUEUE_SECS: u64 = 1;

/// Requeue interval after a reconciliation error (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

// ============================================================================
// Kubernetes API Client Constants
// ============================================================================

/// Page size for Kubernetes API list operations
pub const KUBE_LIST_PAGE_SIZE: u32 = 100;

/// Limit used when probing whether an optional kind is served
pub const KIND_PROBE_LIMIT: u32 = 1;

/// Tokio worker threads for the operator runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Workload Defaults
// ============================================================================

/// Default replicas of every operator-managed deployment
pub const DEFAULT_REPLICAS: i32 = 1;

/// API server container port
pub const APISERVER_PORT: i32 = 8443;

/// Upload proxy container port
pub const UPLOADPROXY_PORT: i32 = 8443;

/// Service port exposed by the API server and upload proxy services
pub const SERVICE_PORT: i32 = 443;

/// Upload proxy route timeout annotation value
pub const ROUTE_TIMEOUT: &str = "60m";

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Metrics server port
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Metrics server path
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Health probe path
pub const HEALTH_SERVER_PATH: &str = "/healthz";

/// Metrics server bind address
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
