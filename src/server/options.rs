//! Dial and server options derived from the TLS configuration.
//!
//! The gateway dials back into the listener with [`DialOptions`]; the RPC
//! server carries [`ServerOptions`], whose credentials terminate TLS on every
//! accepted connection. Both are pure derivations of
//! `Option<&TlsMaterial>` and cannot fail.

use std::fmt;

use tokio_rustls::TlsAcceptor;
use tonic::transport::{Certificate, ClientTlsConfig, Identity};

use super::tls::TlsMaterial;

/// How the gateway connects to the RPC server.
#[derive(Debug, Clone)]
pub enum DialOptions {
    /// Plaintext HTTP/2 with prior knowledge.
    Insecure,
    /// Mutual TLS: trusts the configured CA and presents the server's own
    /// identity as the client certificate.
    Credentials(ClientTlsConfig),
}

impl DialOptions {
    pub fn from_tls(tls: Option<&TlsMaterial>) -> Self {
        let Some(tls) = tls else {
            return DialOptions::Insecure;
        };

        let mut config = ClientTlsConfig::new()
            .ca_certificate(Certificate::from_pem(tls.ca_pem()))
            .identity(Identity::from_pem(tls.cert_pem(), tls.key_pem()));
        if !tls.server_name().is_empty() {
            config = config.domain_name(tls.server_name());
        }
        DialOptions::Credentials(config)
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, DialOptions::Credentials(_))
    }

    /// URI scheme matching the transport.
    pub fn scheme(&self) -> &'static str {
        if self.is_secure() { "https" } else { "http" }
    }
}

/// Transport credentials of the RPC server.
#[derive(Clone)]
pub enum ServerOptions {
    Insecure,
    Credentials(TlsAcceptor),
}

impl ServerOptions {
    pub fn from_tls(tls: Option<&TlsMaterial>) -> Self {
        match tls {
            Some(tls) => ServerOptions::Credentials(TlsAcceptor::from(tls.server_config())),
            None => ServerOptions::Insecure,
        }
    }

    /// Acceptor that terminates TLS on accepted connections, if any.
    pub fn acceptor(&self) -> Option<&TlsAcceptor> {
        match self {
            ServerOptions::Credentials(acceptor) => Some(acceptor),
            ServerOptions::Insecure => None,
        }
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerOptions::Insecure => f.write_str("Insecure"),
            ServerOptions::Credentials(_) => f.write_str("Credentials(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_tls_yields_insecure_options() {
        let dial = DialOptions::from_tls(None);
        assert!(!dial.is_secure());
        assert_eq!(dial.scheme(), "http");

        let server = ServerOptions::from_tls(None);
        assert!(server.acceptor().is_none());
        assert_eq!(format!("{server:?}"), "Insecure");
    }
}
