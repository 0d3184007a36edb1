//! grafeasd: Grafeas API daemon.
//!
//! Serves the artifact metadata API over gRPC and the JSON gateway on one
//! address until interrupted.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use grafeas::GrafeasError;
use grafeas::server::{Config, Server, ShutdownHandle};
use grafeas::storage::MemStore;

/// Grafeas daemon, an artifact metadata API server.
#[derive(Parser)]
#[command(name = "grafeasd")]
#[command(version = grafeas::PKG_VERSION)]
#[command(about = "Grafeas artifact metadata API server")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Override the listen address (`host:port` or `unix://<path>`).
    #[arg(short, long, env = "GRAFEAS_ADDRESS")]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(address) = args.address {
        config.api.address = address;
    }
    config.validate()?;

    let storage = match config.storage_type.as_str() {
        "memstore" => Arc::new(MemStore::new()),
        other => {
            return Err(
                GrafeasError::Configuration(format!("Storage type unsupported: {other}")).into(),
            );
        }
    };

    info!(
        version = grafeas::version_string(),
        address = %config.api.address,
        storage = %config.storage_type,
        "grafeasd starting"
    );

    let server = Server::bind(&config.api, storage).await?;
    tokio::spawn(close_on_signal(server.shutdown_handle()));

    if let Err(e) = server.serve().await {
        error!(kind = e.kind(), error = %e, "grafeasd failed");
        return Err(e.into());
    }
    Ok(())
}

/// Close the listener on Ctrl-C or SIGTERM.
async fn close_on_signal(shutdown: ShutdownHandle) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    error!(error = %e, "could not install SIGTERM handler");
                    let _ = ctrl_c.await;
                    shutdown.close();
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    let _ = ctrl_c.await;

    info!("shutdown signal received");
    shutdown.close();
}
