//! Server certificate issuance.
//!
//! Signs a server CSR with the probe's CA so the test server can be rotated
//! with short-lived certificates and the poller's expiry report watched.

use chrono::{Duration as ChronoDuration, Utc};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, KeyUsage, SubjectAlternativeName,
    SubjectKeyIdentifier,
};
use openssl::x509::{X509Ref, X509Req, X509ReqRef, X509VerifyResult, X509};
use std::fs;
use std::path::Path;

use crate::ProbeError;

pub const DEFAULT_CA_KEY: &str = "./cert/ca-key.pem";
pub const DEFAULT_SERVER_CSR: &str = "./cert/server.csr";

/// DNS name placed in the subject alternative names of issued certificates.
pub const SERVER_DNS_NAME: &str = "localhost";

/// A CA certificate and its private key.
pub struct CertIssuer {
    ca_cert: X509,
    ca_key: PKey<Private>,
}

impl CertIssuer {
    pub fn new(ca_cert: X509, ca_key: PKey<Private>) -> Self {
        CertIssuer { ca_cert, ca_key }
    }

    /// Loads the CA key pair and certificate from PEM files.
    pub fn load<P: AsRef<Path>>(ca_key: P, root_ca: P) -> Result<Self, ProbeError> {
        let (ca_key, root_ca) = (ca_key.as_ref(), root_ca.as_ref());
        log::info!(
            "Loading CA from {} and {}",
            ca_key.display(),
            root_ca.display()
        );

        let key = fs::read(ca_key).map_err(|e| ProbeError::identity(ca_key, e))?;
        let key = PKey::private_key_from_pem(&key).map_err(|e| ProbeError::identity(ca_key, e))?;

        let cert = fs::read(root_ca).map_err(|e| ProbeError::identity(root_ca, e))?;
        let cert = X509::from_pem(&cert).map_err(|e| ProbeError::identity(root_ca, e))?;

        Ok(CertIssuer::new(cert, key))
    }

    pub fn ca_cert(&self) -> &X509 {
        &self.ca_cert
    }

    /// Issues a certificate for the subject and public key of `req`.
    ///
    /// The certificate is valid from now for `lifetime_minutes` and names
    /// `localhost` as its only subject alternative name.
    pub fn sign_request(
        &self,
        req: &X509ReqRef,
        lifetime_minutes: u32,
    ) -> Result<X509, ProbeError> {
        if lifetime_minutes == 0 {
            return Err(ProbeError::InvalidInput {
                field: "lifetime_minutes".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        let pubkey = req.public_key()?;
        if !req.verify(&pubkey)? {
            return Err(ProbeError::InvalidInput {
                field: "csr".to_string(),
                reason: "signature does not match its public key".to_string(),
            });
        }

        let ca: &X509Ref = &self.ca_cert;
        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        let serial_number = {
            let mut serial = BigNum::new()?;
            serial.rand(159, MsbOption::MAYBE_ZERO, false)?;
            serial.to_asn1_integer()?
        };
        builder.set_serial_number(&serial_number)?;
        builder.set_subject_name(req.subject_name())?;
        builder.set_issuer_name(ca.subject_name())?;
        builder.set_pubkey(&pubkey)?;

        let not_before = Asn1Time::days_from_now(0)?;
        builder.set_not_before(&not_before)?;
        let end = Utc::now() + ChronoDuration::minutes(i64::from(lifetime_minutes));
        let not_after = Asn1Time::from_str(&end.format("%Y%m%d%H%M%SZ").to_string())?;
        builder.set_not_after(&not_after)?;

        builder.append_extension(BasicConstraints::new().build()?)?;
        builder.append_extension(
            KeyUsage::new()
                .critical()
                .non_repudiation()
                .digital_signature()
                .key_encipherment()
                .build()?,
        )?;
        let subject_key_identifier = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(Some(ca), None))?;
        builder.append_extension(subject_key_identifier)?;
        let auth_key_identifier = AuthorityKeyIdentifier::new()
            .keyid(false)
            .issuer(false)
            .build(&builder.x509v3_context(Some(ca), None))?;
        builder.append_extension(auth_key_identifier)?;
        let subject_alt_name = SubjectAlternativeName::new()
            .dns(SERVER_DNS_NAME)
            .build(&builder.x509v3_context(Some(ca), None))?;
        builder.append_extension(subject_alt_name)?;

        builder.sign(&self.ca_key, MessageDigest::sha256())?;
        let cert = builder.build();

        match ca.issued(&cert) {
            X509VerifyResult::OK => Ok(cert),
            err => Err(ProbeError::Other {
                message: format!("Failed to verify certificate: {}", err),
            }),
        }
    }

    /// Reads a PEM CSR, signs it and writes the certificate as PEM to `out`.
    pub fn issue_file<P: AsRef<Path>>(
        &self,
        csr: P,
        out: P,
        lifetime_minutes: u32,
    ) -> Result<X509, ProbeError> {
        let (csr, out) = (csr.as_ref(), out.as_ref());
        log::info!("Loading CSR from {}", csr.display());

        let req = fs::read(csr).map_err(|e| ProbeError::identity(csr, e))?;
        let req = X509Req::from_pem(&req).map_err(|e| ProbeError::identity(csr, e))?;

        let cert = self.sign_request(&req, lifetime_minutes)?;
        fs::write(out, cert.to_pem()?)?;
        log::info!("Wrote {}", out.display());
        Ok(cert)
    }
}
