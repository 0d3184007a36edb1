//! HTTP middleware wrapped around the dispatcher.
//!
//! Two concerns live here. Connections are served by hyper-util's automatic
//! builder, which speaks HTTP/1.1 and cleartext HTTP/2 (prior knowledge) on
//! the same socket. Every request then passes an origin allow-list before
//! reaching the dispatcher.

use std::sync::Arc;

use http::header::{ACCEPT, CONTENT_TYPE, HeaderName, ORIGIN};
use http::{HeaderValue, Method};
use hyper_util::rt::TokioExecutor;
use hyper_util::server::conn::auto;
use tower::Layer;
use tower_http::cors::{AllowOrigin, Cors, CorsLayer};

use super::dispatch::Dispatcher;

/// The complete per-request service handed to each connection.
pub type HttpService = Cors<Dispatcher>;

/// Origins allowed to make cross-origin requests.
///
/// Entries are matched case-insensitively. `*` allows any origin, and an
/// entry with a single `*` (for example `https://*.example.com`) matches any
/// origin with that prefix and suffix. An empty list allows none.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    any: bool,
    exact: Vec<String>,
    wildcards: Vec<(String, String)>,
}

impl OriginPolicy {
    pub fn new<I, T>(origins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut policy = Self::default();
        for origin in origins {
            let origin = origin.as_ref().trim().to_ascii_lowercase();
            if origin.is_empty() {
                continue;
            }
            if origin == "*" {
                policy.any = true;
            } else if let Some((prefix, suffix)) = origin.split_once('*') {
                policy
                    .wildcards
                    .push((prefix.to_string(), suffix.to_string()));
            } else {
                policy.exact.push(origin);
            }
        }
        policy
    }

    /// Whether no origin at all is allowed.
    pub fn is_empty(&self) -> bool {
        !self.any && self.exact.is_empty() && self.wildcards.is_empty()
    }

    pub fn allows(&self, origin: &str) -> bool {
        if self.any {
            return true;
        }
        let origin = origin.to_ascii_lowercase();
        self.exact.iter().any(|allowed| *allowed == origin)
            || self.wildcards.iter().any(|(prefix, suffix)| {
                origin.len() >= prefix.len() + suffix.len()
                    && origin.starts_with(prefix.as_str())
                    && origin.ends_with(suffix.as_str())
            })
    }
}

/// CORS layer enforcing `policy`. Disallowed origins get no CORS headers.
///
/// Every method the gateway routes is allowed, so browsers can update and
/// delete as well as read and create.
pub fn cors_layer(policy: OriginPolicy) -> CorsLayer {
    let policy = Arc::new(policy);
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &http::request::Parts| {
                origin.to_str().is_ok_and(|origin| policy.allows(origin))
            },
        ))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::HEAD,
        ])
        .allow_headers([
            ORIGIN,
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static("x-requested-with"),
        ])
}

/// Wrap the dispatcher in the middleware chain.
pub fn wrap(dispatcher: Dispatcher, policy: OriginPolicy) -> HttpService {
    cors_layer(policy).layer(dispatcher)
}

/// Connection server accepting HTTP/1.1 and HTTP/2 without TLS.
pub fn connection_builder() -> auto::Builder<TokioExecutor> {
    auto::Builder::new(TokioExecutor::new())
}
