//! Inter-service access policy.
//!
//! # Responsibilities
//! - Hold the explicit set of permitted (source, target, protocol, port) edges
//! - Answer whether a connection attempt is allowed at the network layer
//!
//! # Design Decisions
//! - Default deny: anything not in the set is refused, including the reverse edge
//! - `allow` is additive and idempotent
//! - Ordered set so plans and listings are deterministic

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// Adjacency key. Presence means the source may initiate connections.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RuleKey {
    pub source: String,
    pub target: String,
    pub protocol: Protocol,
    pub port: u16,
}

/// An installed permission with its justification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessRule {
    #[serde(flatten)]
    pub key: RuleKey,
    pub reason: String,
}

impl fmt::Display for AccessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} {}/{}",
            self.key.source, self.key.target, self.key.protocol, self.key.port
        )
    }
}

/// Outcome of a reachability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum Verdict {
    Allow { reason: String },
    Deny,
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    rules: BTreeMap<RuleKey, String>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Permit `source` to initiate `protocol`/`port` connections to `target`.
    ///
    /// Returns `false` when the edge was already present; the original
    /// justification is kept in that case.
    pub fn allow(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        protocol: Protocol,
        port: u16,
        reason: impl Into<String>,
    ) -> bool {
        let key = RuleKey {
            source: source.into(),
            target: target.into(),
            protocol,
            port,
        };
        if self.rules.contains_key(&key) {
            return false;
        }
        tracing::debug!(
            source = %key.source,
            target = %key.target,
            protocol = %key.protocol,
            port = key.port,
            "Access rule installed"
        );
        self.rules.insert(key, reason.into());
        true
    }

    pub fn check(&self, source: &str, target: &str, protocol: Protocol, port: u16) -> Verdict {
        let key = RuleKey {
            source: source.to_string(),
            target: target.to_string(),
            protocol,
            port,
        };
        match self.rules.get(&key) {
            Some(reason) => Verdict::Allow {
                reason: reason.clone(),
            },
            None => Verdict::Deny,
        }
    }

    pub fn permits(&self, source: &str, target: &str, protocol: Protocol, port: u16) -> bool {
        self.check(source, target, protocol, port).is_allowed()
    }

    pub fn rules(&self) -> impl Iterator<Item = AccessRule> + '_ {
        self.rules.iter().map(|(key, reason)| AccessRule {
            key: key.clone(),
            reason: reason.clone(),
        })
    }

    /// Rules that let traffic into `target`.
    pub fn ingress(&self, target: &str) -> Vec<AccessRule> {
        self.rules().filter(|r| r.key.target == target).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
