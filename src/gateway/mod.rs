//! JSON/HTTP gateway.
//!
//! The gateway exposes every RPC as a REST endpoint under `/v1` and serves
//! it by calling the RPC services through a client channel dialed back into
//! the server's own listener. The channel connects lazily, so the gateway
//! can be built before the listener starts accepting.
//!
//! # Example
//!
//! ```text
//! POST /v1/projects/demo/notes?note_id=cve-1   {"short_description": "...", "kind": "VULNERABILITY"}
//! GET  /v1/projects/demo/notes
//! ```

pub mod error;
pub mod json;
mod routes;

pub use error::{GatewayError, http_status};

#[cfg(unix)]
use hyper_util::rt::TokioIo;
#[cfg(unix)]
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint};
use tracing::info;

use crate::server::listener::LocalAddr;
use crate::server::options::DialOptions;
use crate::{GrafeasError, Result};

/// Build the gateway router for the listener bound at `target`.
pub fn register(target: &LocalAddr, dial: &DialOptions) -> Result<axum::Router> {
    let channel = connect(&target.dial_target(), dial)?;
    info!(%target, secure = dial.is_secure(), "JSON gateway registered");
    Ok(routes::router(routes::Upstream::new(channel)))
}

/// Lazily connected channel to `target`.
fn connect(target: &LocalAddr, dial: &DialOptions) -> Result<Channel> {
    let registration_error = |e: tonic::transport::Error| {
        GrafeasError::Registration(format!("gateway endpoint for {target}: {e}"))
    };

    let authority = match target {
        LocalAddr::Tcp(addr) => addr.to_string(),
        #[cfg(unix)]
        LocalAddr::Unix(_) => "localhost".to_string(),
    };
    let mut endpoint = Endpoint::from_shared(format!("{}://{authority}", dial.scheme()))
        .map_err(registration_error)?;
    if let DialOptions::Credentials(tls) = dial {
        endpoint = endpoint
            .tls_config(tls.clone())
            .map_err(registration_error)?;
    }

    match target {
        LocalAddr::Tcp(_) => Ok(endpoint.connect_lazy()),
        #[cfg(unix)]
        LocalAddr::Unix(path) => {
            let path = path.clone();
            let connector = tower::service_fn(move |_: http::Uri| {
                let path = path.clone();
                async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(path).await?)) }
            });
            Ok(endpoint.connect_with_connector_lazy(connector))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_without_a_running_server() {
        let target = LocalAddr::Tcp("127.0.0.1:1".parse().unwrap());
        assert!(register(&target, &DialOptions::Insecure).is_ok());
    }
}
