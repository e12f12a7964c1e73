// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate generation and inspection.
//!
//! [`SigningRotation`] issues self-signed CA certificates and [`TargetRotation`]
//! issues leaf certificates signed by one of them. [`RcgenRotation`] implements
//! both with `rcgen`; parsing goes through `x509-parser`.

use crate::errors::{OperatorError, Result};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose,
};
use std::time::Duration;
use time::OffsetDateTime;
use x509_parser::prelude::{FromDer, X509Certificate};

const PEM_TAG_CERTIFICATE: &str = "CERTIFICATE";

/// A certificate and its private key, both PEM encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertKeyPair {
    pub cert_pem: String,
    pub key_pem: String,
}

/// What a leaf certificate is issued for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetSubject {
    /// Serving certificate for the given host names
    Serving(Vec<String>),
    /// Client certificate for the given user name
    Client(String),
}

/// The parts of a parsed certificate the manager looks at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertInfo {
    pub subject: String,
    pub issuer: String,
    /// Unix seconds
    pub not_before: i64,
    /// Unix seconds
    pub not_after: i64,
    pub der: Vec<u8>,
}

/// Issues CA certificates.
pub trait SigningRotation: Send + Sync {
    /// Self-signed CA named `common_name`, valid for `lifetime` from `now`.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::Certificate`] when generation fails.
    fn new_signer(&self, common_name: &str, now: i64, lifetime: Duration) -> Result<CertKeyPair>;
}

/// Issues leaf certificates.
pub trait TargetRotation: Send + Sync {
    /// Leaf certificate for `subject` signed by `ca`, valid for `lifetime` from `now`.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::Certificate`] when the CA cannot be loaded or
    /// signing fails.
    fn new_target(
        &self,
        ca: &CertKeyPair,
        subject: &TargetSubject,
        now: i64,
        lifetime: Duration,
    ) -> Result<CertKeyPair>;
}

/// Both halves of rotation, as the certificate manager needs them.
pub trait Rotation: SigningRotation + TargetRotation {}

impl<T: SigningRotation + TargetRotation> Rotation for T {}

/// `rcgen` backed rotation.
#[derive(Clone, Copy, Debug, Default)]
pub struct RcgenRotation;

fn cert_error(name: &str, e: impl std::fmt::Display) -> OperatorError {
    OperatorError::Certificate {
        name: name.to_string(),
        reason: e.to_string(),
    }
}

fn validity(name: &str, now: i64, lifetime: Duration) -> Result<(OffsetDateTime, OffsetDateTime)> {
    let secs = i64::try_from(lifetime.as_secs()).map_err(|e| cert_error(name, e))?;
    let not_before = OffsetDateTime::from_unix_timestamp(now).map_err(|e| cert_error(name, e))?;
    let not_after =
        OffsetDateTime::from_unix_timestamp(now + secs).map_err(|e| cert_error(name, e))?;
    Ok((not_before, not_after))
}

fn common_name(value: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, DnValue::Utf8String(value.to_string()));
    dn
}

impl SigningRotation for RcgenRotation {
    fn new_signer(&self, name: &str, now: i64, lifetime: Duration) -> Result<CertKeyPair> {
        let mut params = CertificateParams::default();
        params.distinguished_name = common_name(name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        (params.not_before, params.not_after) = validity(name, now, lifetime)?;

        let key = KeyPair::generate().map_err(|e| cert_error(name, e))?;
        let cert = params.self_signed(&key).map_err(|e| cert_error(name, e))?;
        Ok(CertKeyPair {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        })
    }
}

impl TargetRotation for RcgenRotation {
    fn new_target(
        &self,
        ca: &CertKeyPair,
        subject: &TargetSubject,
        now: i64,
        lifetime: Duration,
    ) -> Result<CertKeyPair> {
        let (name, mut params) = match subject {
            TargetSubject::Serving(hostnames) => {
                let name = hostnames.first().cloned().unwrap_or_default();
                let mut params =
                    CertificateParams::new(hostnames.clone()).map_err(|e| cert_error(&name, e))?;
                params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
                (name, params)
            }
            TargetSubject::Client(user) => {
                let mut params = CertificateParams::default();
                params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
                (user.clone(), params)
            }
        };
        params.distinguished_name = common_name(&name);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        (params.not_before, params.not_after) = validity(&name, now, lifetime)?;

        let ca_key = KeyPair::from_pem(&ca.key_pem).map_err(|e| cert_error(&name, e))?;
        let issuer =
            Issuer::from_ca_cert_pem(&ca.cert_pem, &ca_key).map_err(|e| cert_error(&name, e))?;
        let key = KeyPair::generate().map_err(|e| cert_error(&name, e))?;
        let cert = params
            .signed_by(&key, &issuer)
            .map_err(|e| cert_error(&name, e))?;

        Ok(CertKeyPair {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        })
    }
}

/// Parse every certificate in a PEM bundle.
///
/// # Errors
///
/// Returns [`OperatorError::Certificate`] when the bundle is not valid PEM or a
/// certificate cannot be parsed.
pub fn parse_certificates(name: &str, bundle: &str) -> Result<Vec<CertInfo>> {
    let blocks = pem::parse_many(bundle).map_err(|e| cert_error(name, e))?;
    blocks
        .iter()
        .filter(|block| block.tag() == PEM_TAG_CERTIFICATE)
        .map(|block| {
            let (_, cert) =
                X509Certificate::from_der(block.contents()).map_err(|e| cert_error(name, e))?;
            let cn = |dn: &x509_parser::x509::X509Name<'_>| {
                dn.iter_common_name()
                    .next()
                    .and_then(|attr| attr.as_str().ok())
                    .unwrap_or_default()
                    .to_string()
            };
            Ok(CertInfo {
                subject: cn(cert.subject()),
                issuer: cn(cert.issuer()),
                not_before: cert.validity().not_before.timestamp(),
                not_after: cert.validity().not_after.timestamp(),
                der: block.contents().to_vec(),
            })
        })
        .collect()
}

/// Encode certificates back into a PEM bundle.
#[must_use]
pub fn encode_certificates(certs: &[CertInfo]) -> String {
    certs
        .iter()
        .map(|c| pem::encode(&pem::Pem::new(PEM_TAG_CERTIFICATE, c.der.clone())))
        .collect()
}

/// [`Rotation`] that counts what it issued, for tests.
#[cfg(test)]
#[derive(Default)]
pub struct FakeRotation {
    inner: RcgenRotation,
    pub signers: std::sync::atomic::AtomicUsize,
    pub targets: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl FakeRotation {
    pub fn signers_issued(&self) -> usize {
        self.signers.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn targets_issued(&self) -> usize {
        self.targets.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl SigningRotation for FakeRotation {
    fn new_signer(&self, name: &str, now: i64, lifetime: Duration) -> Result<CertKeyPair> {
        self.signers
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.inner.new_signer(name, now, lifetime)
    }
}

#[cfg(test)]
impl TargetRotation for FakeRotation {
    fn new_target(
        &self,
        ca: &CertKeyPair,
        subject: &TargetSubject,
        now: i64,
        lifetime: Duration,
    ) -> Result<CertKeyPair> {
        self.targets
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.inner.new_target(ca, subject, now, lifetime)
    }
}

#[cfg(test)]
#[path = "rotation_tests.rs"]
mod rotation_tests;
