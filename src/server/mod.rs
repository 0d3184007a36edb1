//! Dual-protocol server.
//!
//! This module provides:
//! - Generated protobuf types (`proto`) shared by the services, the gateway
//!   and clients
//! - Configuration and TLS material (`config`, `tls`, `options`)
//! - The RPC service table (`registrar`)
//! - Per-request protocol selection (`dispatch`) and the HTTP middleware
//!   wrapped around it (`middleware`)
//! - The bound listener and its accept loop (`listener`, `controller`)
//!
//! # Transport
//!
//! One listener carries both gRPC and the JSON gateway. The address is either
//! `host:port` or `unix://<path>`; TLS, when configured, is terminated per
//! accepted connection on both kinds of socket.

pub mod config;
pub mod controller;
pub mod dispatch;
pub mod listener;
pub mod middleware;
pub mod options;
pub mod registrar;
pub mod tls;

/// Re-exported generated proto types.
pub mod proto {
    tonic::include_proto!("grafeas.v1");

    /// Encoded descriptors of every service, served through reflection.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("grafeas_descriptor");
}

pub use config::{Config, ServerConfig};
pub use controller::{AcceptError, Server, ShutdownHandle, Termination, classify};
pub use dispatch::{Dispatcher, Route, route};
pub use listener::{BindAddress, Listener};
