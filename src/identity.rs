//! Client certificate, private key and trust anchors for mutual TLS.

use openssl::pkey::PKey;
use openssl::x509::X509;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ProbeError;

/// Paths making up the client's TLS identity and the CA it trusts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsIdentity {
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    pub root_ca: PathBuf,
}

/// PEM material read from a [`TlsIdentity`], ready for the HTTP client.
pub struct LoadedIdentity {
    pub identity: reqwest::Identity,
    pub roots: Vec<reqwest::Certificate>,
}

impl TlsIdentity {
    pub fn new<P: Into<PathBuf>>(client_cert: P, client_key: P, root_ca: P) -> Self {
        TlsIdentity {
            client_cert: client_cert.into(),
            client_key: client_key.into(),
            root_ca: root_ca.into(),
        }
    }

    /// Reads and validates the three PEM files.
    ///
    /// The client key may be PKCS#1, SEC1 or PKCS#8; it is re-encoded as
    /// PKCS#8 since that is the only form the TLS backend accepts. The root
    /// CA file may hold a bundle.
    pub fn load(&self) -> Result<LoadedIdentity, ProbeError> {
        let cert_pem = read_pem(&self.client_cert)?;
        let chain = X509::stack_from_pem(&cert_pem)
            .map_err(|e| ProbeError::identity(&self.client_cert, e))?;
        if chain.is_empty() {
            return Err(ProbeError::identity(
                &self.client_cert,
                "no certificate found",
            ));
        }

        let key_pem = read_pem(&self.client_key)?;
        let key = PKey::private_key_from_pem(&key_pem)
            .and_then(|key| key.private_key_to_pem_pkcs8())
            .map_err(|e| ProbeError::identity(&self.client_key, e))?;

        let identity = reqwest::Identity::from_pkcs8_pem(&cert_pem, &key)
            .map_err(|e| ProbeError::identity(&self.client_cert, e))?;

        let ca_pem = read_pem(&self.root_ca)?;
        let mut roots = Vec::new();
        for ca in X509::stack_from_pem(&ca_pem).map_err(|e| ProbeError::identity(&self.root_ca, e))? {
            let der = ca
                .to_der()
                .map_err(|e| ProbeError::identity(&self.root_ca, e))?;
            let root = reqwest::Certificate::from_der(&der)
                .map_err(|e| ProbeError::identity(&self.root_ca, e))?;
            roots.push(root);
        }
        if roots.is_empty() {
            return Err(ProbeError::identity(&self.root_ca, "no certificate found"));
        }

        log::debug!(
            "loaded client identity ({} certificate(s)) and {} trust anchor(s)",
            chain.len(),
            roots.len()
        );
        Ok(LoadedIdentity { identity, roots })
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ProbeError> {
    fs::read(path).map_err(|e| ProbeError::identity(path, e))
}
