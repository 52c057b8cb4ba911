//! Test PKI and an in-process mutual TLS server.

#![allow(dead_code)]

use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod, SslVerifyMode};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, SubjectAlternativeName, SubjectKeyIdentifier,
};
use openssl::x509::{X509Name, X509NameBuilder, X509Ref, X509};
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::TempDir;

use mtlsprobe::TlsIdentity;

pub fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

fn name(common_name: &str) -> X509Name {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    name.build()
}

fn serial() -> openssl::asn1::Asn1Integer {
    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
    serial.to_asn1_integer().unwrap()
}

pub fn make_ca(common_name: &str) -> (X509, PKey<Private>) {
    let key = rsa_key();
    let name = name(common_name);

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&serial()).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(30).unwrap())
        .unwrap();
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    let ski = SubjectKeyIdentifier::new()
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(ski).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    (builder.build(), key)
}

/// Issues a leaf certificate; `dns` adds a subject alternative name.
pub fn make_leaf(
    ca: &X509Ref,
    ca_key: &PKey<Private>,
    common_name: &str,
    dns: Option<&str>,
    not_before: &Asn1TimeRef,
    not_after: &Asn1TimeRef,
) -> (X509, PKey<Private>) {
    let key = rsa_key();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&serial()).unwrap();
    builder.set_subject_name(&name(common_name)).unwrap();
    builder.set_issuer_name(ca.subject_name()).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.set_not_before(not_before).unwrap();
    builder.set_not_after(not_after).unwrap();
    builder
        .append_extension(BasicConstraints::new().build().unwrap())
        .unwrap();
    let aki = AuthorityKeyIdentifier::new()
        .keyid(false)
        .build(&builder.x509v3_context(Some(ca), None))
        .unwrap();
    builder.append_extension(aki).unwrap();
    if let Some(dns) = dns {
        let san = SubjectAlternativeName::new()
            .dns(dns)
            .build(&builder.x509v3_context(Some(ca), None))
            .unwrap();
        builder.append_extension(san).unwrap();
    }
    builder.sign(ca_key, MessageDigest::sha256()).unwrap();

    (builder.build(), key)
}

/// Writes a single self-signed certificate expiring at `not_after`.
pub fn write_cert_expiring(dir: &Path, not_after: &str) -> PathBuf {
    let (ca, ca_key) = make_ca("fixture CA");
    let not_before = Asn1Time::from_str("240101000000Z").unwrap();
    let not_after = Asn1Time::from_str(not_after).unwrap();
    let (cert, _) = make_leaf(&ca, &ca_key, "fixture", None, &not_before, &not_after);

    let path = dir.join("server-cert.pem");
    fs::write(&path, cert.to_pem().unwrap()).unwrap();
    path
}

/// The `./cert/` layout of a probe deployment inside a temporary directory.
pub struct Pki {
    pub dir: TempDir,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    pub root_ca: PathBuf,
    pub server_cert: PathBuf,
    pub server_key: PathBuf,
}

impl Pki {
    /// Client and server certificates both issued by one CA.
    pub fn generate() -> Self {
        let (ca, ca_key) = make_ca("probe test CA");
        Self::generate_with_server_ca(&ca, &ca_key, &ca)
    }

    /// The server certificate is issued by a CA the client does not trust.
    pub fn generate_untrusted_server() -> Self {
        let (ca, ca_key) = make_ca("probe test CA");
        let (rogue, rogue_key) = make_ca("rogue CA");
        let pki = Self::generate_with_server_ca(&rogue, &rogue_key, &ca);

        // The client certificate must still come from the trusted CA.
        let (client, client_key) = leaf_now(&ca, &ca_key, "probe client", None);
        fs::write(&pki.client_cert, client.to_pem().unwrap()).unwrap();
        fs::write(
            &pki.client_key,
            client_key.private_key_to_pem_pkcs8().unwrap(),
        )
        .unwrap();
        pki
    }

    fn generate_with_server_ca(
        server_ca: &X509,
        server_ca_key: &PKey<Private>,
        trusted: &X509,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let (server, server_key) = leaf_now(server_ca, server_ca_key, "localhost", Some("localhost"));
        let (client, client_key) = leaf_now(server_ca, server_ca_key, "probe client", None);

        let pki = Pki {
            client_cert: dir.path().join("client-cert.pem"),
            client_key: dir.path().join("client-key.pem"),
            root_ca: dir.path().join("root-ca.pem"),
            server_cert: dir.path().join("server-cert.pem"),
            server_key: dir.path().join("server-key.pem"),
            dir,
        };
        fs::write(&pki.root_ca, trusted.to_pem().unwrap()).unwrap();
        fs::write(&pki.server_cert, server.to_pem().unwrap()).unwrap();
        fs::write(
            &pki.server_key,
            server_key.private_key_to_pem_pkcs8().unwrap(),
        )
        .unwrap();
        fs::write(&pki.client_cert, client.to_pem().unwrap()).unwrap();
        // Traditional RSA form, as `openssl genrsa` used to write it.
        fs::write(
            &pki.client_key,
            client_key.rsa().unwrap().private_key_to_pem().unwrap(),
        )
        .unwrap();
        pki
    }

    pub fn identity(&self) -> TlsIdentity {
        TlsIdentity::new(
            self.client_cert.clone(),
            self.client_key.clone(),
            self.root_ca.clone(),
        )
    }
}

fn leaf_now(
    ca: &X509Ref,
    ca_key: &PKey<Private>,
    common_name: &str,
    dns: Option<&str>,
) -> (X509, PKey<Private>) {
    make_leaf(
        ca,
        ca_key,
        common_name,
        dns,
        &Asn1Time::days_from_now(0).unwrap(),
        &Asn1Time::days_from_now(7).unwrap(),
    )
}

/// A TLS server on 127.0.0.1 that requires a client certificate issued by
/// the PKI's root CA and answers every request with a fixed body.
pub struct MtlsServer {
    pub port: u16,
    handle: JoinHandle<Vec<Result<(), String>>>,
}

impl MtlsServer {
    /// Serves `connections` TLS connections, one request each, then stops.
    pub fn spawn(pki: &Pki, body: &'static str, connections: usize) -> Self {
        let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
        acceptor
            .set_private_key_file(&pki.server_key, SslFiletype::PEM)
            .unwrap();
        acceptor
            .set_certificate_chain_file(&pki.server_cert)
            .unwrap();
        acceptor.set_ca_file(&pki.root_ca).unwrap();
        acceptor.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);
        let acceptor = acceptor.build();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let mut results = Vec::with_capacity(connections);
            for stream in listener.incoming().take(connections) {
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        results.push(Err(e.to_string()));
                        continue;
                    }
                };
                stream
                    .set_read_timeout(Some(Duration::from_secs(10)))
                    .unwrap();
                let mut tls = match acceptor.accept(stream) {
                    Ok(tls) => tls,
                    Err(e) => {
                        results.push(Err(e.to_string()));
                        continue;
                    }
                };

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match tls.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let written = tls.write_all(response.as_bytes()).map_err(|e| e.to_string());
                let _ = tls.shutdown();
                results.push(written);
            }
            results
        });

        MtlsServer { port, handle }
    }

    pub fn url(&self) -> String {
        format!("https://localhost:{}/", self.port)
    }

    /// Waits for the server to finish and returns one result per connection.
    pub fn join(self) -> Vec<Result<(), String>> {
        self.handle.join().unwrap()
    }
}

/// A port on 127.0.0.1 with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
