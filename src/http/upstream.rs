//! Outbound leg of a relay call.
//!
//! # Responsibilities
//! - Check the network boundary for the backend's internal name
//! - Resolve that name afresh for every call
//! - Issue exactly one request and wait, under a deadline, for its headers
//!
//! # Design Decisions
//! - No retries: the inbound body is a stream and is consumed by the one
//!   attempt
//! - The whole settings bundle is rebuilt on config reload and swapped in
//!   atomically; in-flight calls keep the bundle they started with

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE, HOST},
        HeaderMap, Method, Request, Response, Uri,
    },
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::config::RelayConfig;
use crate::http::error::RelayError;
use crate::http::request::X_REQUEST_ID;
use crate::net::{NetworkBoundary, ResolveError, Resolver, ServiceResolver};
use crate::resilience::Deadline;
use crate::topology::{Deployment, TopologyError};

/// Everything a handler needs to reach the backend.
#[derive(Debug, Clone)]
pub struct Upstream {
    host: String,
    port: u16,
    path: String,
    boundary: NetworkBoundary,
    resolver: Arc<dyn Resolver>,
    client: Client<HttpConnector, Body>,
    deadline: Deadline,
}

impl Upstream {
    /// Build from configuration. `resolver` replaces the configured one when
    /// given.
    pub fn from_config(
        config: &RelayConfig,
        resolver: Option<Arc<dyn Resolver>>,
    ) -> Result<Self, TopologyError> {
        let upstream = &config.upstream;

        let boundary = match &config.topology {
            Some(spec) => {
                let deployment = Arc::new(Deployment::build(spec)?);
                NetworkBoundary::enforcing(upstream.caller.clone(), deployment)
            }
            None => NetworkBoundary::open(upstream.caller.clone()),
        };

        let resolver = resolver
            .unwrap_or_else(|| Arc::new(ServiceResolver::from_overrides(&upstream.resolve)));

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            host: upstream.host.clone(),
            port: upstream.port,
            path: upstream.path.clone(),
            boundary,
            resolver,
            client,
            deadline: Deadline::from_secs(config.timeouts.request_secs),
        })
    }

    /// Logical address of the backend, e.g. `http://backend.internal:3005/`.
    pub fn url(&self) -> Option<Url> {
        Url::parse(&format!("http://{}:{}{}", self.host, self.port, self.path)).ok()
    }

    pub fn boundary(&self) -> &NetworkBoundary {
        &self.boundary
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// Send one request to the backend and return its response as soon as the
    /// headers are in. The body is left streaming.
    ///
    /// Only the headers describing `body` (`Content-Type`, `Content-Length`)
    /// are taken from `inbound`; the multipart boundary travels in
    /// `Content-Type`.
    pub async fn send(
        &self,
        method: Method,
        inbound: &HeaderMap,
        body: Body,
        request_id: &str,
    ) -> Result<Response<Incoming>, RelayError> {
        self.boundary.check(&self.host, self.port)?;

        self.deadline
            .run(async {
                let addrs = self.resolver.resolve(&self.host, self.port).await?;
                // single replica; the first answer is as good as any
                let addr = addrs
                    .first()
                    .copied()
                    .ok_or_else(|| ResolveError::NotFound(self.host.clone()))?;

                let uri = Uri::builder()
                    .scheme("http")
                    .authority(addr.to_string().as_str())
                    .path_and_query(self.path.as_str())
                    .build()?;

                let mut builder = Request::builder()
                    .method(method)
                    .uri(uri)
                    .header(HOST, format!("{}:{}", self.host, self.port))
                    .header(X_REQUEST_ID, request_id);
                for name in [CONTENT_TYPE, CONTENT_LENGTH] {
                    if let Some(value) = inbound.get(&name) {
                        builder = builder.header(name, value.clone());
                    }
                }
                let request = builder.body(body)?;

                tracing::debug!(
                    request_id = %request_id,
                    upstream = %addr,
                    host = %self.host,
                    method = %request.method(),
                    "Forwarding to backend"
                );

                Ok::<_, RelayError>(self.client.request(request).await?)
            })
            .await?
    }
}
