//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Build the topology and check the upstream against it
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::topology::{Deployment, TopologyError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("upstream.host must not be empty")]
    EmptyUpstreamHost,

    #[error("upstream.port must be greater than zero")]
    ZeroUpstreamPort,

    #[error("upstream.path `{0}` must start with '/'")]
    UpstreamPath(String),

    #[error("upstream.resolve[{host}]: `{addr}` is not a socket address")]
    ResolveOverride { host: String, addr: String },

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("limits.max_body_bytes must be greater than zero when set")]
    ZeroBodyLimit,

    #[error("observability.metrics_address `{0}` is not a socket address")]
    MetricsAddress(String),

    #[error("topology: {0}")]
    Topology(#[from] TopologyError),

    #[error("upstream.caller `{0}` is not a service in the topology")]
    UnknownCaller(String),

    #[error("upstream.host `{0}` does not resolve to an internal service in the topology")]
    UpstreamNotInternal(String),

    #[error("upstream.port {port} is not the container port ({expected}) of `{service}`")]
    UpstreamPort {
        service: String,
        port: u16,
        expected: u16,
    },
}

pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let upstream = &config.upstream;
    if upstream.host.trim().is_empty() {
        errors.push(ValidationError::EmptyUpstreamHost);
    }
    if upstream.port == 0 {
        errors.push(ValidationError::ZeroUpstreamPort);
    }
    if !upstream.path.starts_with('/') {
        errors.push(ValidationError::UpstreamPath(upstream.path.clone()));
    }
    for (host, addrs) in &upstream.resolve {
        for addr in addrs {
            if addr.parse::<SocketAddr>().is_err() {
                errors.push(ValidationError::ResolveOverride {
                    host: host.clone(),
                    addr: addr.clone(),
                });
            }
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }
    if config.limits.max_body_bytes == Some(0) {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if let Some(spec) = &config.topology {
        match Deployment::build(spec) {
            Ok(deployment) => {
                if deployment.service(&upstream.caller).is_none() {
                    errors.push(ValidationError::UnknownCaller(upstream.caller.clone()));
                }
                match deployment.cluster.resolve(&upstream.host) {
                    Some(target) if target.container_port != upstream.port => {
                        errors.push(ValidationError::UpstreamPort {
                            service: target.name.clone(),
                            port: upstream.port,
                            expected: target.container_port,
                        });
                    }
                    Some(_) => {}
                    None => errors.push(ValidationError::UpstreamNotInternal(upstream.host.clone())),
                }
            }
            Err(e) => errors.push(e.into()),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
