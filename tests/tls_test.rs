//! Mutual TLS tests.
//!
//! A throwaway CA issues the server certificate (valid for `localhost`, with
//! both server and client auth usages since the gateway presents it when
//! dialing back) and a separate client certificate.

use std::sync::Arc;

use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
};
use tempfile::TempDir;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Identity};

use grafeas::server::proto::ListProjectsRequest;
use grafeas::server::proto::projects_client::ProjectsClient;
use grafeas::server::{Server, ServerConfig, ShutdownHandle};
use grafeas::storage::MemStore;

// ============================================================================
// Certificates
// ============================================================================

struct Issued {
    cert_pem: String,
    key_pem: String,
}

struct Pki {
    dir: TempDir,
    ca_pem: String,
    server: Issued,
    client: Issued,
}

fn issue(
    ca: &rcgen::Certificate,
    ca_key: &KeyPair,
    name: &str,
    usages: Vec<ExtendedKeyUsagePurpose>,
) -> Issued {
    let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
    params.distinguished_name.push(DnType::CommonName, name);
    params.extended_key_usages = usages;
    let key = KeyPair::generate().unwrap();
    let cert = params.signed_by(&key, ca, ca_key).unwrap();
    Issued {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
    }
}

fn ca(name: &str) -> (rcgen::Certificate, KeyPair) {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.distinguished_name.push(DnType::CommonName, name);
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert, key)
}

fn pki() -> Pki {
    let (ca_cert, ca_key) = ca("grafeas test CA");
    let server = issue(
        &ca_cert,
        &ca_key,
        "localhost",
        vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ],
    );
    let client = issue(
        &ca_cert,
        &ca_key,
        "client.localhost",
        vec![ExtendedKeyUsagePurpose::ClientAuth],
    );
    Pki {
        dir: tempfile::tempdir().unwrap(),
        ca_pem: ca_cert.pem(),
        server,
        client,
    }
}

impl Pki {
    fn write(&self, name: &str, contents: &str) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path.display().to_string()
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            address: "127.0.0.1:0".into(),
            cafile: self.write("ca.pem", &self.ca_pem),
            certfile: self.write("server.pem", &self.server.cert_pem),
            keyfile: self.write("server.key", &self.server.key_pem),
            server_name: "localhost".into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn start(config: &ServerConfig) -> (u16, ShutdownHandle) {
    let server = Server::bind(config, Arc::new(MemStore::new())).await.unwrap();
    let port = match server.local_addr() {
        grafeas::server::listener::LocalAddr::Tcp(addr) => addr.port(),
        #[cfg(unix)]
        other => panic!("unexpected address {other}"),
    };
    let shutdown = server.shutdown_handle();
    tokio::spawn(server.serve());
    (port, shutdown)
}

/// Whether a ListProjects call succeeds with the given client TLS settings.
async fn can_call(port: u16, tls: ClientTlsConfig) -> bool {
    let result = async {
        let channel = Channel::from_shared(format!("https://127.0.0.1:{port}"))?
            .tls_config(tls)?
            .connect()
            .await?;
        ProjectsClient::new(channel)
            .list_projects(ListProjectsRequest::default())
            .await?;
        Ok::<_, Box<dyn std::error::Error>>(())
    }
    .await;
    result.is_ok()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn client_with_trusted_certificate_is_served() {
    let pki = pki();
    let (port, shutdown) = start(&pki.server_config()).await;

    let tls = ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(&pki.ca_pem))
        .identity(Identity::from_pem(&pki.client.cert_pem, &pki.client.key_pem))
        .domain_name("localhost");
    assert!(can_call(port, tls).await);

    shutdown.close();
}

#[tokio::test]
async fn client_without_certificate_is_refused() {
    let pki = pki();
    let (port, shutdown) = start(&pki.server_config()).await;

    let tls = ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(&pki.ca_pem))
        .domain_name("localhost");
    assert!(!can_call(port, tls).await);

    shutdown.close();
}

#[tokio::test]
async fn client_from_another_ca_is_refused() {
    let pki = pki();
    let (port, shutdown) = start(&pki.server_config()).await;

    let (rogue_ca, rogue_key) = ca("rogue CA");
    let rogue = issue(
        &rogue_ca,
        &rogue_key,
        "client.localhost",
        vec![ExtendedKeyUsagePurpose::ClientAuth],
    );
    let tls = ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(&pki.ca_pem))
        .identity(Identity::from_pem(&rogue.cert_pem, &rogue.key_pem))
        .domain_name("localhost");
    assert!(!can_call(port, tls).await);

    shutdown.close();
}

#[tokio::test]
async fn gateway_dials_back_over_mutual_tls() {
    let pki = pki();
    let (port, shutdown) = start(&pki.server_config()).await;

    let identity = format!("{}{}", pki.client.cert_pem, pki.client.key_pem);
    let http = reqwest::Client::builder()
        .use_rustls_tls()
        .add_root_certificate(reqwest::Certificate::from_pem(pki.ca_pem.as_bytes()).unwrap())
        .identity(reqwest::Identity::from_pem(identity.as_bytes()).unwrap())
        .build()
        .unwrap();

    let created = http
        .post(format!("https://localhost:{port}/v1/projects"))
        .json(&serde_json::json!({"name": "projects/secure"}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 200);

    let listed: serde_json::Value = http
        .get(format!("https://localhost:{port}/v1/projects"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["projects"][0]["name"], "projects/secure");

    shutdown.close();
}

#[tokio::test]
async fn gateway_verifies_the_server_name() {
    let pki = pki();
    let config = ServerConfig {
        server_name: "not-localhost".into(),
        ..pki.server_config()
    };
    let (port, shutdown) = start(&config).await;

    // Direct callers that name the certificate's host are still served.
    let tls = ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(&pki.ca_pem))
        .identity(Identity::from_pem(&pki.client.cert_pem, &pki.client.key_pem))
        .domain_name("localhost");
    assert!(can_call(port, tls).await);

    let identity = format!("{}{}", pki.client.cert_pem, pki.client.key_pem);
    let http = reqwest::Client::builder()
        .use_rustls_tls()
        .add_root_certificate(reqwest::Certificate::from_pem(pki.ca_pem.as_bytes()).unwrap())
        .identity(reqwest::Identity::from_pem(identity.as_bytes()).unwrap())
        .build()
        .unwrap();

    // The dial-back expects "not-localhost", which the certificate does not name.
    let response = http
        .get(format!("https://localhost:{port}/v1/projects"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], tonic::Code::Unavailable as i32);

    shutdown.close();
}
