//! Provisioning errors.
//!
//! Every variant is a configuration error: it is raised while the resource
//! graph is being assembled, before anything is handed to the resource store.

use thiserror::Error;

use crate::topology::network::Reachability;

/// Errors raised while building a topology.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("network must span at least one availability zone")]
    NoAvailabilityZones,

    #[error("network declares no segments")]
    NoSegments,

    #[error("invalid CIDR block `{0}`")]
    InvalidCidr(String),

    #[error("segment `{segment}` prefix /{prefix} does not fit inside network /{network_prefix}")]
    InvalidPrefix {
        segment: String,
        prefix: u8,
        network_prefix: u8,
    },

    #[error("duplicate segment name `{0}`")]
    DuplicateSegment(String),

    #[error("private-egress segment `{0}` needs a public segment to host its NAT gateway")]
    NoPublicSegmentForNat(String),

    #[error(
        "address space exhausted: segment `{segment}` in zone {zone} does not fit in {network}"
    )]
    AddressExhausted {
        segment: String,
        zone: String,
        network: String,
    },

    #[error("duplicate service name `{0}`")]
    DuplicateService(String),

    #[error("duplicate discovery name `{0}`")]
    DuplicateDiscoveryName(String),

    #[error("service `{service}` references unknown segment `{segment}`")]
    UnknownSegment { service: String, segment: String },

    #[error(
        "service `{service}` cannot be placed in {reachability} segment `{segment}`: {reason}"
    )]
    PlacementConflict {
        service: String,
        segment: String,
        reachability: Reachability,
        reason: &'static str,
    },

    #[error("service `{service}`: {field} must be greater than zero")]
    ZeroResource {
        service: String,
        field: &'static str,
    },

    #[error("access rule references unknown service `{0}`")]
    UnknownService(String),

    #[error("access rule {source_service} -> {target}: target does not listen on port {port}")]
    PortMismatch {
        source_service: String,
        target: String,
        port: u16,
    },

    #[error("access rule {0} -> {0}: a service cannot grant access to itself")]
    SelfRule(String),
}
