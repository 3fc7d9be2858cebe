//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the relay endpoints
//! - Wire up middleware (request ID, tracing, optional body limit)
//! - Serve plain HTTP or TLS on the given listener
//! - Swap in new upstream settings when the config is reloaded
//! - Stop accepting on shutdown and let in-flight calls finish
//!
//! # Design Decisions
//! - Handlers read the upstream settings through an `ArcSwap`, so a reload
//!   never blocks a request and never changes one mid-flight
//! - Listener, TLS and body limit are fixed at startup

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    extract::Request,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::RelayConfig;
use crate::http::relay::{status_handler, submit_handler};
use crate::http::request::{propagate_request_id, set_request_id, RequestIdExt};
use crate::http::upstream::Upstream;
use crate::net::{tls::load_tls_config, Resolver};
use crate::topology::TopologyError;

/// How long TLS connections get to drain after shutdown is signalled.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    upstream: Arc<ArcSwap<Upstream>>,
}

impl AppState {
    pub fn new(upstream: Upstream) -> Self {
        Self {
            upstream: Arc::new(ArcSwap::from_pointee(upstream)),
        }
    }

    /// Settings in effect right now.
    pub fn upstream(&self) -> Arc<Upstream> {
        self.upstream.load_full()
    }

    fn replace(&self, upstream: Upstream) {
        self.upstream.store(Arc::new(upstream));
    }
}

/// The public-facing relay.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: RelayConfig,
    resolver: Option<Arc<dyn Resolver>>,
}

impl HttpServer {
    /// Create a server that resolves the backend through DNS and the
    /// configured overrides.
    pub fn new(config: RelayConfig) -> Result<Self, TopologyError> {
        Self::build(config, None)
    }

    /// Create a server with a custom resolver. The resolver is kept across
    /// config reloads.
    pub fn with_resolver(
        config: RelayConfig,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self, TopologyError> {
        Self::build(config, Some(resolver))
    }

    fn build(config: RelayConfig, resolver: Option<Arc<dyn Resolver>>) -> Result<Self, TopologyError> {
        let upstream = Upstream::from_config(&config, resolver.clone())?;
        let state = AppState::new(upstream);
        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            state,
            config,
            resolver,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &RelayConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/status", get(status_handler))
            .route("/submit", post(submit_handler))
            .route("/api/backend", get(status_handler).post(submit_handler))
            .with_state(state);

        if let Some(limit) = config.limits.max_body_bytes {
            router = router.layer(RequestBodyLimitLayer::new(limit));
        }

        router
            .layer(propagate_request_id())
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %request.headers().request_id(),
                    )
                }),
            )
            .layer(set_request_id())
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Each config received on `config_updates` replaces the upstream
    /// settings; one that fails to build is logged and ignored.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<RelayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            tls = self.config.listener.tls.is_some(),
            upstream = %self.state.upstream().url().map(|u| u.to_string()).unwrap_or_default(),
            timeout_secs = self.state.upstream().deadline().limit().as_secs(),
            "HTTP server starting"
        );

        let state = self.state.clone();
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match Upstream::from_config(&config, resolver.clone()) {
                    Ok(upstream) => {
                        tracing::info!(
                            host = %config.upstream.host,
                            port = config.upstream.port,
                            enforcing = upstream.boundary().is_enforcing(),
                            timeout_secs = upstream.deadline().limit().as_secs(),
                            "Upstream settings reloaded"
                        );
                        state.replace(upstream);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Reloaded topology is invalid, keeping current settings");
                    }
                }
            }
        });

        let shutdown_signal = async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received");
        };

        match &self.config.listener.tls {
            None => {
                axum::serve(listener, self.router)
                    .with_graceful_shutdown(shutdown_signal)
                    .await?;
            }
            Some(tls) => {
                let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
                let handle = axum_server::Handle::new();
                let drain = handle.clone();
                tokio::spawn(async move {
                    shutdown_signal.await;
                    drain.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
                });

                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(self.router.into_make_service())
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Shared state, for inspecting the settings in effect.
    pub fn state(&self) -> &AppState {
        &self.state
    }
}
