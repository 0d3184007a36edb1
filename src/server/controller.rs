//! Server lifecycle: bind, serve, shut down.
//!
//! [`Server::bind`] assembles everything a run needs (listener, TLS, RPC
//! routes, gateway, dispatcher, middleware) and fails fast on any error.
//! [`Server::serve`] then accepts connections until the listener is closed
//! through a [`ShutdownHandle`] or accepting fails for good.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use grafeas::server::{Server, ServerConfig};
//! use grafeas::storage::MemStore;
//!
//! # async fn run() -> grafeas::Result<()> {
//! let server = Server::bind(&ServerConfig::default(), Arc::new(MemStore::new())).await?;
//! let shutdown = server.shutdown_handle();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     shutdown.close();
//! });
//! server.serve().await
//! # }
//! ```

use std::io;
use std::sync::Arc;
use std::time::Duration;

use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use metrics::counter;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use super::config::ServerConfig;
use super::dispatch::Dispatcher;
use super::listener::{BindAddress, Connection, Listener, LocalAddr};
use super::middleware::{self, HttpService, OriginPolicy};
use super::options::{DialOptions, ServerOptions};
use super::{registrar, tls};
use crate::storage::{GrafeasStorage, ProjectStorage};
use crate::{GrafeasError, Result, gateway, telemetry};

const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(5);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Why the accept loop ended.
#[derive(Debug, thiserror::Error)]
pub enum AcceptError {
    /// The shutdown handle closed the listener.
    #[error("listener closed")]
    ListenerClosed,

    #[error("accept failed: {0}")]
    Io(#[from] io::Error),
}

/// How a stopped server should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Clean,
    Fatal,
}

/// Only an intentional close is a clean stop.
pub fn classify(err: &AcceptError) -> Termination {
    match err {
        AcceptError::ListenerClosed => Termination::Clean,
        AcceptError::Io(_) => Termination::Fatal,
    }
}

/// Closes the listener of a running server. Cheap to clone; closing more
/// than once is a no-op.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// A bound server, ready to serve.
pub struct Server {
    listener: Listener,
    local_addr: LocalAddr,
    service: HttpService,
    acceptor: Option<TlsAcceptor>,
    shutdown: ShutdownHandle,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("tls", &self.acceptor.is_some())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Bind the configured address and assemble the service stack over
    /// `storage`.
    pub async fn bind<S>(config: &ServerConfig, storage: Arc<S>) -> Result<Self>
    where
        S: GrafeasStorage + ProjectStorage + 'static,
    {
        let address = BindAddress::parse(&config.address)?;
        let listener = Listener::bind(&address).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| GrafeasError::Bind {
                address: address.to_string(),
                source,
            })?;

        let tls = tls::build(
            &config.cafile,
            &config.certfile,
            &config.keyfile,
            &config.server_name,
        )?;
        let dial = DialOptions::from_tls(tls.as_ref());
        let credentials = ServerOptions::from_tls(tls.as_ref());

        let rpc = registrar::register(storage, &credentials)?;
        let acceptor = rpc.acceptor().cloned();
        let gateway = gateway::register(&local_addr, &dial)?;

        let origins = OriginPolicy::new(&config.cors_allowed_origins);
        if origins.is_empty() {
            debug!("no CORS origins configured; cross-origin requests are refused");
        }
        let service = middleware::wrap(Dispatcher::new(rpc.into_router(), gateway), origins);

        Ok(Self {
            listener,
            local_addr,
            service,
            acceptor,
            shutdown: ShutdownHandle::new(),
        })
    }

    /// The address actually bound (with the assigned port for `:0`).
    pub fn local_addr(&self) -> &LocalAddr {
        &self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept and serve connections until shut down.
    ///
    /// Returns `Ok(())` when the listener was closed through the shutdown
    /// handle and [`GrafeasError::Serve`] when accepting failed. The listener
    /// is released (and a Unix socket file removed) either way.
    pub async fn serve(self) -> Result<()> {
        info!(
            address = %self.local_addr,
            tls = self.acceptor.is_some(),
            "gRPC API listening"
        );

        let stopped = self.accept_loop().await;
        drop(self);

        match (classify(&stopped), stopped) {
            (Termination::Clean, _) => {
                info!("gRPC API stopped");
                Ok(())
            }
            (Termination::Fatal, AcceptError::Io(e)) => {
                error!(error = %e, "gRPC API stopped unexpectedly");
                Err(GrafeasError::Serve(e))
            }
            (Termination::Fatal, err) => Err(GrafeasError::Serve(io::Error::other(err))),
        }
    }

    async fn accept_loop(&self) -> AcceptError {
        let mut shutdown = self.shutdown.subscribe();
        let mut backoff: Option<Duration> = None;

        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.wait_for(|closed| *closed) => return AcceptError::ListenerClosed,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((conn, peer)) => {
                    backoff = None;
                    self.spawn_connection(conn, peer);
                }
                Err(e) if is_connection_error(&e) => {
                    debug!(error = %e, "skipping failed connection");
                }
                Err(e) if is_fd_exhaustion(&e) => {
                    let delay = backoff.map_or(MIN_ACCEPT_BACKOFF, |d| (d * 2).min(MAX_ACCEPT_BACKOFF));
                    backoff = Some(delay);
                    warn!(error = %e, ?delay, "accept failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return AcceptError::Io(e),
            }
        }
    }

    fn spawn_connection(&self, conn: Connection, peer: String) {
        counter!(telemetry::CONNECTIONS_ACCEPTED_TOTAL).increment(1);
        let service = self.service.clone();
        let acceptor = self.acceptor.clone();

        tokio::spawn(async move {
            let served = match acceptor {
                Some(acceptor) => match acceptor.accept(conn).await {
                    Ok(stream) => serve_connection(stream, service).await,
                    Err(e) => {
                        debug!(%peer, error = %e, "TLS handshake failed");
                        counter!(telemetry::CONNECTION_ERRORS_TOTAL, "stage" => "handshake")
                            .increment(1);
                        return;
                    }
                },
                None => serve_connection(conn, service).await,
            };
            if let Err(e) = served {
                debug!(%peer, error = %e, "connection ended with error");
                counter!(telemetry::CONNECTION_ERRORS_TOTAL, "stage" => "protocol").increment(1);
            }
        });
    }
}

async fn serve_connection<I>(
    io: I,
    service: HttpService,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let builder = middleware::connection_builder();
    builder
        .serve_connection(TokioIo::new(io), TowerToHyperService::new(service))
        .await
}

/// Errors that concern one pending connection rather than the listener.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

/// Out of file descriptors (EMFILE / ENFILE); clears once connections close.
///
/// ENFILE is 23 and EMFILE is 24 on Linux and macOS. Other targets never
/// back off and treat these errors as fatal.
#[cfg(any(target_os = "linux", target_os = "macos"))]
fn is_fd_exhaustion(e: &io::Error) -> bool {
    const ENFILE: i32 = 23;
    const EMFILE: i32 = 24;
    matches!(e.raw_os_error(), Some(ENFILE | EMFILE))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn is_fd_exhaustion(_e: &io::Error) -> bool {
    false
}
