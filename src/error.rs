//! Grafeas server error types

/// Errors that stop the server from starting or keep it from serving.
///
/// Every variant is fatal to the current run: the server never keeps going
/// with a partially built TLS configuration, listener or service table.
/// Failures confined to a single connection are logged and never surface
/// here.
#[derive(Debug, thiserror::Error)]
pub enum GrafeasError {
    // Startup errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("could not listen to address {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The RPC server or the JSON gateway could not be assembled.
    #[error("service registration failed: {0}")]
    Registration(String),

    // Runtime errors
    /// The accept loop ended with something other than an intentional close.
    #[error("server stopped: {0}")]
    Serve(#[source] std::io::Error),
}

impl GrafeasError {
    /// Short, stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GrafeasError::Configuration(_) => "configuration",
            GrafeasError::Tls(_) => "tls",
            GrafeasError::Bind { .. } => "bind",
            GrafeasError::Registration(_) => "registration",
            GrafeasError::Serve(_) => "serve",
        }
    }
}

/// Result type alias for Grafeas server operations
pub type Result<T> = std::result::Result<T, GrafeasError>;
