//! Network boundary enforcement for outbound connections.
//!
//! Before the relay opens a socket to an internal name it asks the boundary
//! whether its own service may reach the service behind that name on that
//! port. Without a topology the boundary is open and the platform's security
//! groups are the only enforcement.

use std::sync::Arc;

use thiserror::Error;

use crate::topology::{Deployment, Protocol, Verdict};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoundaryError {
    #[error("{host} is not an internal service of this network")]
    UnknownDestination { host: String },

    #[error("connection {source_service} -> {target}:{port} refused: no access rule")]
    Denied {
        source_service: String,
        target: String,
        port: u16,
    },
}

#[derive(Debug, Clone)]
pub struct NetworkBoundary {
    caller: String,
    deployment: Option<Arc<Deployment>>,
}

impl NetworkBoundary {
    /// A boundary that enforces `deployment`'s access policy for `caller`.
    pub fn enforcing(caller: impl Into<String>, deployment: Arc<Deployment>) -> Self {
        Self {
            caller: caller.into(),
            deployment: Some(deployment),
        }
    }

    pub fn open(caller: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            deployment: None,
        }
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn is_enforcing(&self) -> bool {
        self.deployment.is_some()
    }

    /// Check a TCP connection attempt to `host:port`.
    pub fn check(&self, host: &str, port: u16) -> Result<(), BoundaryError> {
        let Some(deployment) = &self.deployment else {
            return Ok(());
        };

        let target = deployment
            .cluster
            .resolve(host)
            .ok_or_else(|| BoundaryError::UnknownDestination {
                host: host.to_string(),
            })?;

        match deployment.can_connect(&self.caller, &target.name, Protocol::Tcp, port) {
            Verdict::Allow { reason } => {
                tracing::trace!(
                    source = %self.caller,
                    target = %target.name,
                    port,
                    reason = %reason,
                    "Connection permitted"
                );
                Ok(())
            }
            Verdict::Deny => {
                tracing::warn!(
                    source = %self.caller,
                    target = %target.name,
                    port,
                    "Connection refused at network boundary"
                );
                Err(BoundaryError::Denied {
                    source_service: self.caller.clone(),
                    target: target.name.clone(),
                    port,
                })
            }
        }
    }
}
