// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate lifecycle for the CDI components.
//!
//! Each [`CertificateDefinition`] names a signer secret, an optional CA bundle
//! `ConfigMap` and an optional target secret. [`CertManager::sync`] makes sure
//! the signer exists and is outside its refresh window, that the bundle trusts
//! it, and that the target was issued by it and is outside its own refresh
//! window.
//!
//! Lifetimes live in [`CertificateConfig`]. The config a certificate was issued
//! with is recorded on its secret in the `operator.cdi.kubevirt.io/certConfig`
//! annotation, so changing a lifetime through the `CDI` resource forces a
//! reissue.

pub mod rotation;

use crate::crd::{CDICertConfig, CertConfig, CDI};
use crate::cluster::ClusterApi;
use crate::constants::{CA_BUNDLE_KEY, TLS_CERT_KEY, TLS_KEY_KEY};
use crate::differ::set_controller_reference;
use crate::duration::{format_duration, parse_duration};
use crate::errors::{OperatorError, Result};
use crate::kinds::{KindRegistry, KIND_CONFIG_MAP, KIND_SECRET};
use crate::labels::{
    CDI_LABEL, CERT_CONFIG_ANNOTATION, CERT_ISSUER_ANNOTATION, CERT_NOT_AFTER_ANNOTATION,
    CERT_NOT_BEFORE_ANNOTATION,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use kube::api::DynamicObject;
use kube::ResourceExt;
use rotation::{encode_certificates, parse_certificates, CertInfo, CertKeyPair, Rotation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Secret type written on signer and target secrets
pub const SECRET_TYPE_TLS: &str = "kubernetes.io/tls";

/// Lifetime and refresh window of one certificate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CertificateConfig {
    /// Total validity
    pub lifetime: Duration,
    /// Window before `notAfter` in which the certificate is reissued
    pub refresh: Duration,
}

#[derive(Serialize, Deserialize, PartialEq, Eq)]
struct CertConfigAnnotation {
    lifetime: String,
    refresh: String,
}

impl CertificateConfig {
    #[must_use]
    pub const fn from_secs(lifetime: u64, refresh: u64) -> Self {
        Self {
            lifetime: Duration::from_secs(lifetime),
            refresh: Duration::from_secs(refresh),
        }
    }

    /// # Errors
    ///
    /// Returns [`OperatorError::Config`] unless `lifetime > refresh > 0`.
    pub fn validate(&self) -> Result<()> {
        if self.refresh.is_zero() || self.lifetime.is_zero() {
            return Err(OperatorError::Config(
                "certificate lifetime and refresh must be greater than zero".to_string(),
            ));
        }
        if self.refresh >= self.lifetime {
            return Err(OperatorError::Config(format!(
                "certificate refresh {} must be shorter than lifetime {}",
                format_duration(self.refresh),
                format_duration(self.lifetime)
            )));
        }
        Ok(())
    }

    /// Apply a user override on top of this config.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::Config`] for unparseable durations or a result
    /// that fails [`Self::validate`].
    pub fn with_override(self, config: &CertConfig) -> Result<Self> {
        let parse = |field: &str, raw: &str| {
            parse_duration(raw)
                .map_err(|e| OperatorError::Config(format!("invalid certConfig {field} {raw:?}: {e}")))
        };
        let mut merged = self;
        if let Some(raw) = config.duration.as_deref() {
            merged.lifetime = parse("duration", raw)?;
        }
        if let Some(raw) = config.renew_before.as_deref() {
            merged.refresh = parse("renewBefore", raw)?;
        }
        merged.validate()?;
        Ok(merged)
    }

    /// Value of the cert-config annotation for this config.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::Serialization`] if encoding fails.
    pub fn annotation(&self) -> Result<String> {
        Ok(serde_json::to_string(&CertConfigAnnotation {
            lifetime: format_duration(self.lifetime),
            refresh: format_duration(self.refresh),
        })?)
    }
}

/// User overrides for configurable definitions, read from `spec.certConfig`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CertOverrides {
    pub ca: Option<CertConfig>,
    pub server: Option<CertConfig>,
}

impl CertOverrides {
    /// Take the overrides from the `CDI` resource.
    ///
    /// Client overrides are accepted by the schema but no configurable
    /// definition issues client certificates.
    #[must_use]
    pub fn from_cr(config: Option<&CDICertConfig>) -> Self {
        config.map_or_else(Self::default, |c| Self {
            ca: c.ca.clone(),
            server: c.server.clone(),
        })
    }
}

/// Who a target certificate is for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetSubject {
    /// Serving certificate for a service in the install namespace
    Service(String),
    /// Client certificate for a user name
    User(String),
}

/// One signer and what it signs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateDefinition {
    /// Whether `spec.certConfig` applies
    pub configurable: bool,
    pub signer_secret: String,
    pub signer_config: CertificateConfig,
    pub bundle_configmap: Option<String>,
    pub target_secret: Option<String>,
    pub target_config: CertificateConfig,
    pub target: Option<TargetSubject>,
}

impl CertificateDefinition {
    /// Apply user overrides when the definition is configurable.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::Config`] for invalid overrides.
    pub fn with_overrides(mut self, overrides: &CertOverrides) -> Result<Self> {
        if !self.configurable {
            return Ok(self);
        }
        if let Some(ca) = overrides.ca.as_ref() {
            self.signer_config = self.signer_config.with_override(ca)?;
        }
        if let Some(server) = overrides.server.as_ref() {
            self.target_config = self.target_config.with_override(server)?;
        }
        Ok(self)
    }
}

/// Host names a serving certificate for `service` covers.
#[must_use]
pub fn service_hostnames(service: &str, namespace: &str) -> Vec<String> {
    vec![
        service.to_string(),
        format!("{service}.{namespace}"),
        format!("{service}.{namespace}.svc"),
    ]
}

/// Keeps the certificates of one installation current.
pub struct CertManager<'a> {
    pub cluster: &'a dyn ClusterApi,
    pub kinds: &'a KindRegistry,
    pub rotation: &'a dyn Rotation,
    pub cr: &'a CDI,
    pub namespace: &'a str,
    /// Unix seconds used as "now" for every decision of one sync
    pub now: i64,
}

/// What a sync did, for logging and tests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub signers_rotated: Vec<String>,
    pub bundles_updated: Vec<String>,
    pub targets_rotated: Vec<String>,
}

impl SyncReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signers_rotated.is_empty()
            && self.bundles_updated.is_empty()
            && self.targets_rotated.is_empty()
    }
}

fn format_time(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

fn refresh_due(cert: &CertInfo, refresh: Duration, now: i64) -> bool {
    let refresh = i64::try_from(refresh.as_secs()).unwrap_or(i64::MAX);
    now >= cert.not_after.saturating_sub(refresh)
}

fn secret_field(secret: &DynamicObject, key: &str) -> Option<String> {
    let raw = secret.data.get("data")?.get(key)?.as_str()?;
    let bytes = BASE64.decode(raw).ok()?;
    String::from_utf8(bytes).ok()
}

fn read_pair(secret: &DynamicObject) -> Option<CertKeyPair> {
    Some(CertKeyPair {
        cert_pem: secret_field(secret, TLS_CERT_KEY)?,
        key_pem: secret_field(secret, TLS_KEY_KEY)?,
    })
}

/// First certificate of the secret's `tls.crt`, if it parses.
fn first_cert(name: &str, pair: &CertKeyPair) -> Option<CertInfo> {
    parse_certificates(name, &pair.cert_pem)
        .ok()
        .and_then(|certs| certs.into_iter().next())
}

impl CertManager<'_> {
    /// Ensure signers, bundles and targets of every definition.
    ///
    /// Definitions are processed in order and the first error stops the sync.
    ///
    /// # Errors
    ///
    /// Returns API errors from reading or writing secrets and `ConfigMap`s, and
    /// [`OperatorError::Certificate`] when generation fails.
    pub async fn sync(&self, definitions: &[CertificateDefinition]) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for definition in definitions {
            self.sync_one(definition, &mut report).await?;
        }
        if !report.is_empty() {
            info!(
                signers = ?report.signers_rotated,
                bundles = ?report.bundles_updated,
                targets = ?report.targets_rotated,
                "certificates rotated"
            );
        }
        Ok(report)
    }

    async fn sync_one(
        &self,
        definition: &CertificateDefinition,
        report: &mut SyncReport,
    ) -> Result<()> {
        let (signer, signer_info) = self.ensure_signer(definition, report).await?;

        let Some(bundle) = definition.bundle_configmap.as_deref() else {
            return Ok(());
        };
        self.ensure_bundle(bundle, &signer_info, report).await?;

        let (Some(target_secret), Some(subject)) =
            (definition.target_secret.as_deref(), definition.target.as_ref())
        else {
            return Ok(());
        };
        self.ensure_target(definition, target_secret, subject, &signer, &signer_info, report)
            .await
    }

    /// Existing secret or a fresh labelled one owned by the `CDI` resource.
    async fn secret(&self, name: &str) -> Result<(DynamicObject, bool)> {
        let kind = self.kinds.get(KIND_SECRET)?;
        match self.cluster.get(kind, Some(self.namespace), name).await? {
            Some(existing) => Ok((existing, true)),
            None => {
                let mut secret = kind.new_object(Some(self.namespace), name);
                secret
                    .labels_mut()
                    .insert(CDI_LABEL.to_string(), String::new());
                set_controller_reference(&mut secret, self.cr);
                Ok((secret, false))
            }
        }
    }

    async fn write(&self, kind: &str, obj: &DynamicObject, exists: bool) -> Result<()> {
        let info = self.kinds.get(kind)?;
        if exists {
            self.cluster.update(info, obj).await?;
        } else {
            self.cluster.create(info, obj).await?;
        }
        Ok(())
    }

    fn store_pair(
        secret: &mut DynamicObject,
        pair: &CertKeyPair,
        cert: &CertInfo,
        config_annotation: &str,
    ) {
        // The type of an existing secret is immutable.
        if secret.data.get("type").is_none() {
            secret.data["type"] = Value::String(SECRET_TYPE_TLS.to_string());
        }
        secret.data["data"] = json!({
            TLS_CERT_KEY: BASE64.encode(&pair.cert_pem),
            TLS_KEY_KEY: BASE64.encode(&pair.key_pem),
        });
        let annotations = secret.annotations_mut();
        annotations.insert(
            CERT_CONFIG_ANNOTATION.to_string(),
            config_annotation.to_string(),
        );
        annotations.insert(
            CERT_NOT_BEFORE_ANNOTATION.to_string(),
            format_time(cert.not_before),
        );
        annotations.insert(
            CERT_NOT_AFTER_ANNOTATION.to_string(),
            format_time(cert.not_after),
        );
        annotations.insert(CERT_ISSUER_ANNOTATION.to_string(), cert.issuer.clone());
    }

    /// Reuse the stored pair unless the config changed or it is due for refresh.
    fn reusable(
        secret: &DynamicObject,
        config: &CertificateConfig,
        config_annotation: &str,
        now: i64,
    ) -> Option<(CertKeyPair, CertInfo)> {
        let recorded = secret.annotations().get(CERT_CONFIG_ANNOTATION);
        if recorded.map(String::as_str) != Some(config_annotation) {
            return None;
        }
        let pair = read_pair(secret)?;
        let info = first_cert(&secret.name_any(), &pair)?;
        if refresh_due(&info, config.refresh, now) {
            return None;
        }
        Some((pair, info))
    }

    async fn ensure_signer(
        &self,
        definition: &CertificateDefinition,
        report: &mut SyncReport,
    ) -> Result<(CertKeyPair, CertInfo)> {
        let name = definition.signer_secret.as_str();
        let config_annotation = definition.signer_config.annotation()?;
        let (mut secret, exists) = self.secret(name).await?;

        if exists {
            if let Some(current) =
                Self::reusable(&secret, &definition.signer_config, &config_annotation, self.now)
            {
                debug!(secret = %name, "signer is current");
                return Ok(current);
            }
        }

        let common_name = format!("{}_{}@{}", self.namespace, name, self.now);
        let pair = self
            .rotation
            .new_signer(&common_name, self.now, definition.signer_config.lifetime)?;
        let info = first_cert(name, &pair).ok_or_else(|| OperatorError::Certificate {
            name: name.to_string(),
            reason: "generated signer does not parse".to_string(),
        })?;

        Self::store_pair(&mut secret, &pair, &info, &config_annotation);
        self.write(KIND_SECRET, &secret, exists).await?;
        info!(secret = %name, common_name = %common_name, "rotated signer certificate");
        crate::metrics::record_certificate_rotation(name, "signer");
        report.signers_rotated.push(name.to_string());
        Ok((pair, info))
    }

    async fn ensure_bundle(
        &self,
        name: &str,
        signer: &CertInfo,
        report: &mut SyncReport,
    ) -> Result<()> {
        let kind = self.kinds.get(KIND_CONFIG_MAP)?;
        let (mut configmap, exists) =
            match self.cluster.get(kind, Some(self.namespace), name).await? {
                Some(existing) => (existing, true),
                None => {
                    let mut cm = kind.new_object(Some(self.namespace), name);
                    cm.labels_mut().insert(CDI_LABEL.to_string(), String::new());
                    set_controller_reference(&mut cm, self.cr);
                    (cm, false)
                }
            };

        let existing_pem = configmap
            .data
            .get("data")
            .and_then(|d| d.get(CA_BUNDLE_KEY))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let existing = parse_certificates(name, &existing_pem).unwrap_or_default();

        let mut bundle: Vec<CertInfo> = vec![signer.clone()];
        bundle.extend(
            existing
                .iter()
                .filter(|c| c.der != signer.der && c.not_after > self.now)
                .cloned(),
        );

        let unchanged = exists && {
            let mut before: Vec<&[u8]> = existing.iter().map(|c| c.der.as_slice()).collect();
            let mut after: Vec<&[u8]> = bundle.iter().map(|c| c.der.as_slice()).collect();
            before.sort_unstable();
            after.sort_unstable();
            before == after
        };
        if unchanged {
            return Ok(());
        }

        configmap.data["data"] = json!({ CA_BUNDLE_KEY: encode_certificates(&bundle) });
        self.write(KIND_CONFIG_MAP, &configmap, exists).await?;
        info!(configmap = %name, certificates = bundle.len(), "updated CA bundle");
        report.bundles_updated.push(name.to_string());
        Ok(())
    }

    async fn ensure_target(
        &self,
        definition: &CertificateDefinition,
        name: &str,
        subject: &TargetSubject,
        signer: &CertKeyPair,
        signer_info: &CertInfo,
        report: &mut SyncReport,
    ) -> Result<()> {
        let config_annotation = definition.target_config.annotation()?;
        let (mut secret, exists) = self.secret(name).await?;

        if exists {
            if let Some((_, info)) =
                Self::reusable(&secret, &definition.target_config, &config_annotation, self.now)
            {
                if info.issuer == signer_info.subject {
                    debug!(secret = %name, "target is current");
                    return Ok(());
                }
                debug!(secret = %name, issuer = %info.issuer, "target issued by a previous signer");
            }
        }

        let leaf_subject = match subject {
            TargetSubject::Service(service) => {
                rotation::TargetSubject::Serving(service_hostnames(service, self.namespace))
            }
            TargetSubject::User(user) => rotation::TargetSubject::Client(user.clone()),
        };
        let pair = self.rotation.new_target(
            signer,
            &leaf_subject,
            self.now,
            definition.target_config.lifetime,
        )?;
        let info = first_cert(name, &pair).ok_or_else(|| OperatorError::Certificate {
            name: name.to_string(),
            reason: "generated certificate does not parse".to_string(),
        })?;

        Self::store_pair(&mut secret, &pair, &info, &config_annotation);
        self.write(KIND_SECRET, &secret, exists).await?;
        info!(secret = %name, issuer = %info.issuer, "rotated target certificate");
        crate::metrics::record_certificate_rotation(name, "target");
        report.targets_rotated.push(name.to_string());
        Ok(())
    }
}
