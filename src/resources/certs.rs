// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate definitions and the objects backing them.
//!
//! The secrets and bundles are part of the desired set as bare labelled objects
//! so they are owned, watched and swept like everything else. Their content is
//! written by [`crate::certs::CertManager`].

use super::builder::{config_map, meta, to_dynamic};
use crate::certs::{CertOverrides, CertificateConfig, CertificateDefinition, TargetSubject};
use crate::constants::{
    APISERVER_SERVICE_NAME, APISERVER_SIGNER_LIFETIME_SECS, APISERVER_SIGNER_REFRESH_SECS,
    TARGET_LIFETIME_SECS, TARGET_REFRESH_SECS, UPLOADPROXY_NAME, UPLOADPROXY_SIGNER_LIFETIME_SECS,
    UPLOADPROXY_SIGNER_REFRESH_SECS, UPLOADSERVER_CLIENT_USER, UPLOADSERVER_SIGNER_LIFETIME_SECS,
    UPLOADSERVER_SIGNER_REFRESH_SECS,
};
use crate::errors::Result;
use k8s_openapi::api::core::v1::Secret;
use kube::api::DynamicObject;

/// Signer secret of the API server serving certificate
pub const APISERVER_SIGNER: &str = "cdi-apiserver-signer";
/// Bundle trusting the API server signer, embedded in webhooks and the API service
pub const APISERVER_SIGNER_BUNDLE: &str = "cdi-apiserver-signer-bundle";
pub const APISERVER_SERVER_CERT: &str = "cdi-apiserver-server-cert";
pub const UPLOADPROXY_SIGNER: &str = "cdi-uploadproxy-signer";
/// Bundle trusting the upload proxy signer, used by routes
pub const UPLOADPROXY_SIGNER_BUNDLE: &str = "cdi-uploadproxy-signer-bundle";
pub const UPLOADPROXY_SERVER_CERT: &str = "cdi-uploadproxy-server-cert";
pub const UPLOADSERVER_SIGNER: &str = "cdi-uploadserver-signer";
pub const UPLOADSERVER_SIGNER_BUNDLE: &str = "cdi-uploadserver-signer-bundle";
pub const UPLOADSERVER_CLIENT_SIGNER: &str = "cdi-uploadserver-client-signer";
pub const UPLOADSERVER_CLIENT_SIGNER_BUNDLE: &str = "cdi-uploadserver-client-signer-bundle";
pub const UPLOADSERVER_CLIENT_CERT: &str = "cdi-uploadserver-client-cert";

const TARGET: CertificateConfig = CertificateConfig::from_secs(TARGET_LIFETIME_SECS, TARGET_REFRESH_SECS);

fn base_definitions() -> Vec<CertificateDefinition> {
    vec![
        CertificateDefinition {
            configurable: true,
            signer_secret: APISERVER_SIGNER.to_string(),
            signer_config: CertificateConfig::from_secs(
                APISERVER_SIGNER_LIFETIME_SECS,
                APISERVER_SIGNER_REFRESH_SECS,
            ),
            bundle_configmap: Some(APISERVER_SIGNER_BUNDLE.to_string()),
            target_secret: Some(APISERVER_SERVER_CERT.to_string()),
            target_config: TARGET,
            target: Some(TargetSubject::Service(APISERVER_SERVICE_NAME.to_string())),
        },
        CertificateDefinition {
            configurable: true,
            signer_secret: UPLOADPROXY_SIGNER.to_string(),
            signer_config: CertificateConfig::from_secs(
                UPLOADPROXY_SIGNER_LIFETIME_SECS,
                UPLOADPROXY_SIGNER_REFRESH_SECS,
            ),
            bundle_configmap: Some(UPLOADPROXY_SIGNER_BUNDLE.to_string()),
            target_secret: Some(UPLOADPROXY_SERVER_CERT.to_string()),
            target_config: TARGET,
            target: Some(TargetSubject::Service(UPLOADPROXY_NAME.to_string())),
        },
        CertificateDefinition {
            configurable: false,
            signer_secret: UPLOADSERVER_SIGNER.to_string(),
            signer_config: CertificateConfig::from_secs(
                UPLOADSERVER_SIGNER_LIFETIME_SECS,
                UPLOADSERVER_SIGNER_REFRESH_SECS,
            ),
            bundle_configmap: Some(UPLOADSERVER_SIGNER_BUNDLE.to_string()),
            target_secret: None,
            target_config: TARGET,
            target: None,
        },
        CertificateDefinition {
            configurable: false,
            signer_secret: UPLOADSERVER_CLIENT_SIGNER.to_string(),
            signer_config: CertificateConfig::from_secs(
                UPLOADSERVER_SIGNER_LIFETIME_SECS,
                UPLOADSERVER_SIGNER_REFRESH_SECS,
            ),
            bundle_configmap: Some(UPLOADSERVER_CLIENT_SIGNER_BUNDLE.to_string()),
            target_secret: Some(UPLOADSERVER_CLIENT_CERT.to_string()),
            target_config: TARGET,
            target: Some(TargetSubject::User(UPLOADSERVER_CLIENT_USER.to_string())),
        },
    ]
}

/// Certificate definitions with the `CDI` resource's overrides applied.
///
/// # Errors
///
/// Returns [`crate::errors::OperatorError::Config`] when an override is invalid.
pub fn definitions(overrides: &CertOverrides) -> Result<Vec<CertificateDefinition>> {
    base_definitions()
        .into_iter()
        .map(|d| d.with_overrides(overrides))
        .collect()
}

/// Bare secrets and bundles for every definition, signer first.
///
/// # Errors
///
/// Returns [`crate::errors::OperatorError::Serialization`] when an object fails
/// to convert.
pub fn resources(namespace: &str, definitions: &[CertificateDefinition]) -> Result<Vec<DynamicObject>> {
    let secret = |name: &str| {
        to_dynamic(&Secret {
            metadata: meta(name, Some(namespace)),
            ..Default::default()
        })
    };

    let mut objects = Vec::new();
    for definition in definitions {
        objects.push(secret(&definition.signer_secret)?);
        if let Some(bundle) = definition.bundle_configmap.as_deref() {
            objects.push(to_dynamic(&config_map(bundle, namespace, None))?);
        }
        if let Some(target) = definition.target_secret.as_deref() {
            objects.push(secret(target)?);
        }
    }
    Ok(objects)
}

#[cfg(test)]
#[path = "certs_tests.rs"]
mod certs_tests;
