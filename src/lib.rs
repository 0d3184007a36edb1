//! Grafeas - artifact metadata API over gRPC and JSON on one listener
//!
//! A single address (TCP or Unix socket, optionally with mutual TLS) serves
//! the `grafeas.v1` gRPC services and a JSON/HTTP gateway that translates
//! REST calls into calls on those same services. Storage is injected through
//! the capability traits in [`storage`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use grafeas::server::{Config, Server};
//! use grafeas::storage::MemStore;
//!
//! #[tokio::main]
//! async fn main() -> grafeas::Result<()> {
//!     let config = Config::load(None)?;
//!     config.validate()?;
//!
//!     let server = Server::bind(&config.api, Arc::new(MemStore::new())).await?;
//!     println!("listening on {}", server.local_addr());
//!     server.serve().await
//! }
//! ```

pub mod api;
pub mod error;
pub mod gateway;
pub mod server;
pub mod storage;
pub mod telemetry;
pub mod version;

pub use error::{GrafeasError, Result};
pub use version::{PKG_VERSION, version_string};
