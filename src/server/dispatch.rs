//! Per-request protocol selection.
//!
//! Every request on the shared listener goes to exactly one of two routers:
//! gRPC when it is HTTP/2 carrying an `application/grpc*` content type, the
//! JSON gateway otherwise. The decision is re-made for each request, so one
//! HTTP/2 connection can interleave both.

use std::convert::Infallible;
use std::task::{Context, Poll};

use axum::Router;
use axum::response::Response;
use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Version};
use metrics::counter;
use tower::{Service, ServiceExt};

use crate::telemetry;

const GRPC_CONTENT_TYPE: &str = "application/grpc";

/// Which side of the listener handles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Rpc,
    Gateway,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Rpc => "rpc",
            Route::Gateway => "gateway",
        }
    }
}

/// Pick the handler for a request from its HTTP version and content type.
pub fn route(version: Version, content_type: Option<&HeaderValue>) -> Route {
    let grpc = content_type
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains(GRPC_CONTENT_TYPE));
    if version == Version::HTTP_2 && grpc {
        Route::Rpc
    } else {
        Route::Gateway
    }
}

/// Service forwarding each request, unmodified, to the RPC routes or the
/// gateway.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    rpc: Router,
    gateway: Router,
}

impl Dispatcher {
    pub fn new(rpc: Router, gateway: Router) -> Self {
        Self { rpc, gateway }
    }
}

impl<B> Service<Request<B>> for Dispatcher
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<axum::BoxError>,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let target = route(request.version(), request.headers().get(CONTENT_TYPE));
        counter!(telemetry::REQUESTS_DISPATCHED_TOTAL, "route" => target.as_str()).increment(1);

        let router = match target {
            Route::Rpc => self.rpc.clone(),
            Route::Gateway => self.gateway.clone(),
        };
        router.oneshot(request).boxed()
    }
}
