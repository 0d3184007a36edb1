//! RPC service table.
//!
//! [`register`] builds the gRPC side of the listener: the metadata services
//! over the injected storage capability plus server reflection. The result
//! only describes what to serve; the controller decides where and when.

use std::sync::Arc;

use tokio_rustls::TlsAcceptor;
use tonic::server::NamedService;
use tonic::service::Routes;
use tracing::info;

use super::options::ServerOptions;
use super::proto::{
    FILE_DESCRIPTOR_SET, grafeas_server::GrafeasServer, projects_server::ProjectsServer,
};
use crate::api::{GrafeasApi, ProjectsApi};
use crate::storage::{GrafeasStorage, ProjectStorage};
use crate::{GrafeasError, Result};

/// A configured, not yet running gRPC server.
#[derive(Debug)]
pub struct RpcServer {
    routes: Routes,
    credentials: ServerOptions,
    services: Vec<&'static str>,
}

impl RpcServer {
    /// Fully qualified names of the registered services.
    pub fn services(&self) -> &[&'static str] {
        &self.services
    }

    /// Acceptor used to terminate TLS before requests reach the routes.
    pub fn acceptor(&self) -> Option<&TlsAcceptor> {
        self.credentials.acceptor()
    }

    /// The service table as a router, ready to sit behind the dispatcher.
    pub fn into_router(self) -> axum::Router {
        self.routes.prepare().into_axum_router()
    }
}

/// Register the metadata services and reflection over `storage`.
pub fn register<S>(storage: Arc<S>, credentials: &ServerOptions) -> Result<RpcServer>
where
    S: GrafeasStorage + ProjectStorage + 'static,
{
    let grafeas = GrafeasServer::new(GrafeasApi::new(Arc::clone(&storage)));
    let projects = ProjectsServer::new(ProjectsApi::new(storage));

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()
        .map_err(|e| GrafeasError::Registration(format!("reflection service: {e}")))?;

    let services = vec![
        <GrafeasServer<GrafeasApi<S>> as NamedService>::NAME,
        <ProjectsServer<ProjectsApi<S>> as NamedService>::NAME,
        "grpc.reflection.v1.ServerReflection",
    ];
    info!(?services, secure = credentials.acceptor().is_some(), "registered gRPC services");

    let routes = Routes::new(grafeas)
        .add_service(projects)
        .add_service(reflection);

    Ok(RpcServer {
        routes,
        credentials: credentials.clone(),
        services,
    })
}
