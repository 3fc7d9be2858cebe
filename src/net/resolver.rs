//! Service name resolution.
//!
//! # Responsibilities
//! - Turn a discovery name (`backend.internal`) into socket addresses
//! - Consult static overrides before the system resolver
//!
//! # Design Decisions
//! - Nothing is cached: each relay call resolves again so replica changes
//!   are picked up without a restart
//! - A trait seam so tests can substitute their own resolution

use std::collections::HashMap;
use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("no addresses found for {0}")]
    NotFound(String),

    #[error("lookup of {host} failed: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait Resolver: Send + Sync + std::fmt::Debug {
    /// Resolve `host` to at least one address on `port`.
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, ResolveError>;
}

/// Static overrides first, then the system resolver (the private DNS zone
/// when running inside the network).
#[derive(Debug, Clone, Default)]
pub struct ServiceResolver {
    overrides: HashMap<String, Vec<SocketAddr>>,
}

impl ServiceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `upstream.resolve`; unparsable entries are skipped
    /// (validation has already rejected them).
    pub fn from_overrides<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a Vec<String>)>,
    {
        let overrides = entries
            .into_iter()
            .map(|(host, addrs)| {
                let addrs = addrs.iter().filter_map(|a| a.parse().ok()).collect();
                (host.to_lowercase(), addrs)
            })
            .collect();
        Self { overrides }
    }

    pub fn with_override(mut self, host: &str, addrs: Vec<SocketAddr>) -> Self {
        self.overrides.insert(host.to_lowercase(), addrs);
        self
    }
}

#[async_trait]
impl Resolver for ServiceResolver {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, ResolveError> {
        if let Some(addrs) = self.overrides.get(&host.to_lowercase()) {
            if addrs.is_empty() {
                return Err(ResolveError::NotFound(host.to_string()));
            }
            return Ok(addrs.clone());
        }

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|source| ResolveError::Lookup {
                host: host.to_string(),
                source,
            })?
            .collect();

        if addrs.is_empty() {
            return Err(ResolveError::NotFound(host.to_string()));
        }
        tracing::trace!(host = %host, addrs = ?addrs, "Resolved upstream");
        Ok(addrs)
    }
}
