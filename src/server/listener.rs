//! Bound listener for TCP and Unix-domain sockets.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
#[cfg(unix)]
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info};

use crate::{GrafeasError, Result};

const UNIX_SCHEME: &str = "unix://";

/// Parsed `address` setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAddress {
    /// `host:port`; an empty host (`:8080`) binds every interface.
    Tcp(String),
    /// `unix://<path>`.
    #[cfg(unix)]
    Unix(PathBuf),
}

impl BindAddress {
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        if let Some(path) = address.strip_prefix(UNIX_SCHEME) {
            if path.is_empty() {
                return Err(GrafeasError::Configuration(format!(
                    "missing socket path in address {address:?}"
                )));
            }
            #[cfg(unix)]
            return Ok(BindAddress::Unix(PathBuf::from(path)));
            #[cfg(not(unix))]
            return Err(GrafeasError::Configuration(
                "unix sockets are not supported on this platform".to_string(),
            ));
        }
        if address.is_empty() {
            return Err(GrafeasError::Configuration("empty listen address".to_string()));
        }
        let host_port = match address.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => address.to_string(),
        };
        Ok(BindAddress::Tcp(host_port))
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindAddress::Tcp(addr) => f.write_str(addr),
            #[cfg(unix)]
            BindAddress::Unix(path) => write!(f, "{UNIX_SCHEME}{}", path.display()),
        }
    }
}

/// Address a listener actually bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalAddr {
    Tcp(SocketAddr),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl LocalAddr {
    /// Address to dial back into this listener. Wildcard hosts become the
    /// matching loopback address.
    pub fn dial_target(&self) -> LocalAddr {
        match self {
            LocalAddr::Tcp(addr) if addr.ip().is_unspecified() => {
                let ip = match addr.ip() {
                    IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                    IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
                };
                LocalAddr::Tcp(SocketAddr::new(ip, addr.port()))
            }
            other => other.clone(),
        }
    }
}

impl fmt::Display for LocalAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalAddr::Tcp(addr) => write!(f, "{addr}"),
            #[cfg(unix)]
            LocalAddr::Unix(path) => write!(f, "{UNIX_SCHEME}{}", path.display()),
        }
    }
}

/// A bound listening socket. Dropping it closes the socket and, for Unix
/// sockets, removes the socket file.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
}

impl Listener {
    pub async fn bind(address: &BindAddress) -> Result<Self> {
        let bind_error = |source| GrafeasError::Bind {
            address: address.to_string(),
            source,
        };
        match address {
            BindAddress::Tcp(addr) => {
                let listener = TcpListener::bind(addr.as_str()).await.map_err(bind_error)?;
                Ok(Listener::Tcp(listener))
            }
            #[cfg(unix)]
            BindAddress::Unix(path) => {
                remove_stale_socket(path).map_err(bind_error)?;
                let listener = UnixListener::bind(path).map_err(bind_error)?;
                info!(path = %path.display(), "bound unix socket");
                Ok(Listener::Unix {
                    listener,
                    path: path.clone(),
                })
            }
        }
    }

    pub fn local_addr(&self) -> io::Result<LocalAddr> {
        match self {
            Listener::Tcp(listener) => listener.local_addr().map(LocalAddr::Tcp),
            #[cfg(unix)]
            Listener::Unix { path, .. } => Ok(LocalAddr::Unix(path.clone())),
        }
    }

    /// Accept the next connection and a printable peer address.
    pub async fn accept(&self) -> io::Result<(Connection, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%peer, error = %e, "could not set TCP_NODELAY");
                }
                Ok((Connection::Tcp(stream), peer.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix { listener, path } => {
                let (stream, _) = listener.accept().await?;
                Ok((Connection::Unix(stream), path.display().to_string()))
            }
        }
    }
}

#[cfg(unix)]
impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Unix { path, .. } = self {
            match std::fs::remove_file(&*path) {
                Ok(()) => debug!(path = %path.display(), "removed unix socket"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => debug!(path = %path.display(), error = %e, "could not remove unix socket"),
            }
        }
    }
}

/// Remove a socket file left behind by a previous run.
#[cfg(unix)]
fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale unix socket");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// An accepted stream, before any TLS.
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_write_vectored(cx, bufs),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            Connection::Tcp(s) => s.is_write_vectored(),
            #[cfg(unix)]
            Connection::Unix(s) => s.is_write_vectored(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_addresses() {
        assert_eq!(
            BindAddress::parse("127.0.0.1:8080").unwrap(),
            BindAddress::Tcp("127.0.0.1:8080".into())
        );
        assert_eq!(
            BindAddress::parse(":8080").unwrap(),
            BindAddress::Tcp("0.0.0.0:8080".into())
        );
    }

    #[cfg(unix)]
    #[test]
    fn parses_unix_addresses() {
        let addr = BindAddress::parse("unix:///tmp/grafeas.sock").unwrap();
        assert_eq!(addr, BindAddress::Unix(PathBuf::from("/tmp/grafeas.sock")));
        assert_eq!(addr.to_string(), "unix:///tmp/grafeas.sock");
    }

    #[test]
    fn rejects_empty_addresses() {
        assert!(BindAddress::parse("").is_err());
        assert!(BindAddress::parse("unix://").is_err());
    }

    #[test]
    fn wildcard_hosts_dial_loopback() {
        let bound = LocalAddr::Tcp("0.0.0.0:9000".parse().unwrap());
        assert_eq!(bound.dial_target().to_string(), "127.0.0.1:9000");

        let bound = LocalAddr::Tcp("[::]:9000".parse().unwrap());
        assert_eq!(bound.dial_target().to_string(), "[::1]:9000");

        let bound = LocalAddr::Tcp("10.1.2.3:9000".parse().unwrap());
        assert_eq!(bound.dial_target(), bound);
    }

    #[tokio::test]
    async fn tcp_port_zero_reports_the_assigned_port() {
        let listener = Listener::bind(&BindAddress::parse("127.0.0.1:0").unwrap())
            .await
            .unwrap();
        let LocalAddr::Tcp(addr) = listener.local_addr().unwrap() else {
            panic!("expected tcp address");
        };
        assert_ne!(addr.port(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_socket_replaces_stale_file_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grafeas.sock");
        std::fs::write(&path, b"stale").unwrap();

        let listener = Listener::bind(&BindAddress::Unix(path.clone())).await.unwrap();
        assert_eq!(listener.local_addr().unwrap(), LocalAddr::Unix(path.clone()));
        drop(listener);
        assert!(!path.exists());
    }
}
