//! Mutual TLS configuration.
//!
//! [`build`] turns the CA, certificate and key paths from
//! [`ServerConfig`](super::config::ServerConfig) into a [`TlsMaterial`]:
//! a rustls server configuration that requires and verifies client
//! certificates against the CA, presents the server's own identity and
//! negotiates HTTP/2 only. An empty CA path means authentication is
//! disabled and yields `None`.
//!
//! Server identity verification is never skipped, neither on the listener
//! nor on the gateway's dial back into it.

use std::fs;
use std::sync::Arc;

use rustls::RootCertStore;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use tracing::info;

use crate::{GrafeasError, Result};

/// ALPN protocols offered by the listener.
pub const ALPN_PROTOCOLS: &[&[u8]] = &[b"h2"];

/// TLS state derived once per server run.
#[derive(Clone)]
pub struct TlsMaterial {
    server_config: Arc<rustls::ServerConfig>,
    client_auth_required: bool,
    ca_pem: Vec<u8>,
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
    server_name: String,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("client_auth_required", &self.client_auth_required)
            .field("alpn_protocols", &self.server_config.alpn_protocols)
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl TlsMaterial {
    /// The rustls configuration used to terminate TLS on the listener.
    pub fn server_config(&self) -> Arc<rustls::ServerConfig> {
        Arc::clone(&self.server_config)
    }

    /// Whether connections without a trusted client certificate are refused.
    pub fn client_auth_required(&self) -> bool {
        self.client_auth_required
    }

    /// Protocols advertised during ALPN.
    pub fn alpn_protocols(&self) -> &[Vec<u8>] {
        &self.server_config.alpn_protocols
    }

    /// Name the server certificate is verified against. Empty means the
    /// dialed host is used.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn ca_pem(&self) -> &[u8] {
        &self.ca_pem
    }

    pub fn cert_pem(&self) -> &[u8] {
        &self.cert_pem
    }

    pub fn key_pem(&self) -> &[u8] {
        &self.key_pem
    }
}

/// Build the listener's TLS configuration.
///
/// Returns `Ok(None)` when `ca_path` is empty. Any read or parse failure is
/// an error; a partially built configuration is never returned.
pub fn build(
    ca_path: &str,
    cert_path: &str,
    key_path: &str,
    server_name: &str,
) -> Result<Option<TlsMaterial>> {
    if ca_path.is_empty() {
        return Ok(None);
    }

    let ca_pem = read_pem(ca_path, "CA certificate")?;
    let cert_pem = read_pem(cert_path, "certificate")?;
    let key_pem = read_pem(key_path, "private key")?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let roots = root_store(&ca_pem, ca_path)?;
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .map_err(|e| GrafeasError::Tls(format!("client verifier for {ca_path:?}: {e}")))?;
    let client_auth_required = verifier.client_auth_mandatory();

    let chain = parse_certs(&cert_pem, cert_path)?;
    let key = parse_key(&key_pem, key_path)?;

    let mut server_config = server_config_builder(provider)?
        .with_client_cert_verifier(verifier)
        .with_single_cert(chain, key)
        .map_err(|e| {
            GrafeasError::Tls(format!("loading key pair {cert_path:?}/{key_path:?}: {e}"))
        })?;
    server_config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

    info!(
        cafile = ca_path,
        certfile = cert_path,
        server_name,
        "mutual TLS enabled"
    );

    Ok(Some(TlsMaterial {
        server_config: Arc::new(server_config),
        client_auth_required,
        ca_pem,
        cert_pem,
        key_pem,
        server_name: server_name.to_string(),
    }))
}

fn server_config_builder(
    provider: Arc<CryptoProvider>,
) -> Result<rustls::ConfigBuilder<rustls::ServerConfig, rustls::WantsVerifier>> {
    rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| GrafeasError::Tls(format!("protocol versions: {e}")))
}

fn read_pem(path: &str, what: &str) -> Result<Vec<u8>> {
    if path.is_empty() {
        return Err(GrafeasError::Tls(format!("{what} path is empty")));
    }
    fs::read(path).map_err(|e| GrafeasError::Tls(format!("reading {what} {path:?}: {e}")))
}

fn parse_certs(pem: &[u8], path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut &*pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| GrafeasError::Tls(format!("parsing certificates in {path:?}: {e}")))?;
    if certs.is_empty() {
        return Err(GrafeasError::Tls(format!("no certificates found in {path:?}")));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8], path: &str) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut &*pem)
        .map_err(|e| GrafeasError::Tls(format!("parsing private key in {path:?}: {e}")))?
        .ok_or_else(|| GrafeasError::Tls(format!("no private key found in {path:?}")))
}

fn root_store(pem: &[u8], path: &str) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in parse_certs(pem, path)? {
        roots
            .add(cert)
            .map_err(|e| GrafeasError::Tls(format!("adding CA from {path:?}: {e}")))?;
    }
    Ok(roots)
}
