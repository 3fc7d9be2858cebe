//! Network and segment layout.
//!
//! # Responsibilities
//! - Partition the network CIDR into one subnet per segment per zone
//! - Attach the default route for each subnet (internet gateway or NAT)
//! - Place one NAT gateway per zone in the first public segment
//!
//! # Design Decisions
//! - Allocation is sequential and segment-major, each block aligned to its size
//! - Running out of address space is a hard error, never a truncation
//! - Only the reachability semantics are a contract; the exact blocks are not

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::topology::error::TopologyError;
use crate::topology::spec::NetworkSpec;

/// Smallest subnet the allocator hands out.
pub const MAX_SUBNET_PREFIX: u8 = 28;

/// Whether a segment can receive unsolicited inbound internet traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reachability {
    /// Routed through the internet gateway, no NAT.
    Public,
    /// Outbound through NAT only; no inbound route from the internet.
    PrivateEgress,
}

impl Reachability {
    pub fn accepts_inbound_internet(&self) -> bool {
        matches!(self, Reachability::Public)
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reachability::Public => write!(f, "public"),
            Reachability::PrivateEgress => write!(f, "private-egress"),
        }
    }
}

/// An IPv4 block in CIDR notation with all host bits cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    addr: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Option<Self> {
        if prefix > 32 {
            return None;
        }
        let raw = u32::from(addr);
        if raw & !mask(prefix) != 0 {
            return None;
        }
        Some(Self { addr, prefix })
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of addresses in the block.
    pub fn size(&self) -> u64 {
        1u64 << (32 - self.prefix as u32)
    }

    fn start(&self) -> u64 {
        u32::from(self.addr) as u64
    }

    fn end(&self) -> u64 {
        self.start() + self.size()
    }

    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix && other.start() >= self.start() && other.end() <= self.end()
    }

    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.start() < other.end() && other.start() < self.end()
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix as u32)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TopologyError::InvalidCidr(s.to_string());
        let (addr, prefix) = s.split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.trim().parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.trim().parse().map_err(|_| invalid())?;
        Ipv4Cidr::new(addr, prefix).ok_or_else(invalid)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl Serialize for Ipv4Cidr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Where a subnet's default route (`0.0.0.0/0`) points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RouteTarget {
    InternetGateway,
    NatGateway { zone: String },
}

/// One segment materialised in one availability zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subnet {
    pub segment: String,
    pub zone: String,
    pub cidr: Ipv4Cidr,
    pub default_route: RouteTarget,
}

/// A named subdivision of the network with a single reachability class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub name: String,
    pub reachability: Reachability,
    pub subnets: Vec<Subnet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NatGateway {
    pub zone: String,
    /// Public subnet hosting the gateway.
    pub subnet: Ipv4Cidr,
}

/// An isolated network. Immutable once built; changes replace it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Network {
    pub name: String,
    pub cidr: Ipv4Cidr,
    pub zones: Vec<String>,
    pub segments: Vec<Segment>,
    pub nat_gateways: Vec<NatGateway>,
}

impl Network {
    /// Validate `spec` and lay out every subnet.
    pub fn build(spec: &NetworkSpec) -> Result<Self, TopologyError> {
        if spec.max_azs == 0 {
            return Err(TopologyError::NoAvailabilityZones);
        }
        if spec.segments.is_empty() {
            return Err(TopologyError::NoSegments);
        }

        let cidr: Ipv4Cidr = spec.cidr.parse()?;

        let mut seen = std::collections::HashSet::new();
        for segment in &spec.segments {
            if !seen.insert(segment.name.as_str()) {
                return Err(TopologyError::DuplicateSegment(segment.name.clone()));
            }
            if segment.prefix_len < cidr.prefix() || segment.prefix_len > MAX_SUBNET_PREFIX {
                return Err(TopologyError::InvalidPrefix {
                    segment: segment.name.clone(),
                    prefix: segment.prefix_len,
                    network_prefix: cidr.prefix(),
                });
            }
        }

        let nat_segment = spec
            .segments
            .iter()
            .find(|s| s.reachability == Reachability::Public)
            .map(|s| s.name.clone());
        if nat_segment.is_none() {
            if let Some(private) = spec
                .segments
                .iter()
                .find(|s| s.reachability == Reachability::PrivateEgress)
            {
                return Err(TopologyError::NoPublicSegmentForNat(private.name.clone()));
            }
        }

        let zones: Vec<String> = (1..=spec.max_azs).map(|i| format!("az{}", i)).collect();

        let mut cursor = cidr.start();
        let mut segments = Vec::with_capacity(spec.segments.len());
        for segment in &spec.segments {
            let size = 1u64 << (32 - segment.prefix_len as u32);
            let mut subnets = Vec::with_capacity(zones.len());
            for zone in &zones {
                let start = cursor.div_ceil(size) * size;
                if start + size > cidr.end() {
                    return Err(TopologyError::AddressExhausted {
                        segment: segment.name.clone(),
                        zone: zone.clone(),
                        network: cidr.to_string(),
                    });
                }
                // start < 2^32 here because it fits inside the network block
                let block = Ipv4Cidr::new(Ipv4Addr::from(start as u32), segment.prefix_len)
                    .ok_or_else(|| TopologyError::InvalidCidr(spec.cidr.clone()))?;
                let default_route = match segment.reachability {
                    Reachability::Public => RouteTarget::InternetGateway,
                    Reachability::PrivateEgress => RouteTarget::NatGateway { zone: zone.clone() },
                };
                subnets.push(Subnet {
                    segment: segment.name.clone(),
                    zone: zone.clone(),
                    cidr: block,
                    default_route,
                });
                cursor = start + size;
            }
            segments.push(Segment {
                name: segment.name.clone(),
                reachability: segment.reachability,
                subnets,
            });
        }

        let has_private = segments
            .iter()
            .any(|s| s.reachability == Reachability::PrivateEgress);
        let nat_gateways = match (&nat_segment, has_private) {
            (Some(name), true) => segments
                .iter()
                .find(|s| &s.name == name)
                .map(|s| {
                    s.subnets
                        .iter()
                        .map(|subnet| NatGateway {
                            zone: subnet.zone.clone(),
                            subnet: subnet.cidr,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        tracing::debug!(
            network = %spec.name,
            cidr = %cidr,
            zones = zones.len(),
            segments = segments.len(),
            "Network laid out"
        );

        Ok(Self {
            name: spec.name.clone(),
            cidr,
            zones,
            segments,
            nat_gateways,
        })
    }

    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name == name)
    }

    pub fn subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.segments.iter().flat_map(|s| s.subnets.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::spec::SegmentSpec;

    fn segment(name: &str, reachability: Reachability, prefix_len: u8) -> SegmentSpec {
        SegmentSpec {
            name: name.into(),
            reachability,
            prefix_len,
        }
    }

    fn three_tier(cidr: &str, prefix_len: u8) -> NetworkSpec {
        NetworkSpec {
            name: "vpc".into(),
            cidr: cidr.into(),
            max_azs: 2,
            segments: vec![
                segment("public-subnet", Reachability::Public, prefix_len),
                segment("private-frontend", Reachability::PrivateEgress, prefix_len),
                segment("private-backend", Reachability::PrivateEgress, prefix_len),
            ],
        }
    }

    #[test]
    fn one_subnet_per_segment_per_zone() {
        let network = Network::build(&three_tier("10.0.0.0/16", 24)).unwrap();

        assert_eq!(network.zones, vec!["az1", "az2"]);
        assert_eq!(network.subnets().count(), 6);

        let blocks: Vec<String> = network.subnets().map(|s| s.cidr.to_string()).collect();
        assert_eq!(
            blocks,
            vec![
                "10.0.0.0/24",
                "10.0.1.0/24",
                "10.0.2.0/24",
                "10.0.3.0/24",
                "10.0.4.0/24",
                "10.0.5.0/24",
            ]
        );
    }

    #[test]
    fn subnets_never_overlap() {
        let mut spec = three_tier("10.0.0.0/16", 24);
        spec.segments[1].prefix_len = 20;
        let network = Network::build(&spec).unwrap();
        let subnets: Vec<&Subnet> = network.subnets().collect();

        for (i, a) in subnets.iter().enumerate() {
            assert!(network.cidr.contains(&a.cidr));
            for b in subnets.iter().skip(i + 1) {
                assert!(!a.cidr.overlaps(&b.cidr), "{} overlaps {}", a.cidr, b.cidr);
            }
        }
    }

    #[test]
    fn routes_follow_reachability() {
        let network = Network::build(&three_tier("10.0.0.0/16", 24)).unwrap();

        for subnet in network.segment("public-subnet").unwrap().subnets.iter() {
            assert_eq!(subnet.default_route, RouteTarget::InternetGateway);
        }
        for subnet in network.segment("private-backend").unwrap().subnets.iter() {
            assert_eq!(
                subnet.default_route,
                RouteTarget::NatGateway {
                    zone: subnet.zone.clone()
                }
            );
        }
        assert_eq!(network.nat_gateways.len(), 2);
        assert!(!Reachability::PrivateEgress.accepts_inbound_internet());
    }

    #[test]
    fn address_exhaustion_is_an_error() {
        // six /26 blocks need 384 addresses, a /24 only has 256
        let err = Network::build(&three_tier("10.0.0.0/24", 26)).unwrap_err();
        assert!(matches!(err, TopologyError::AddressExhausted { .. }));
    }

    #[test]
    fn duplicate_segments_rejected() {
        let mut spec = three_tier("10.0.0.0/16", 24);
        spec.segments[2].name = "private-frontend".into();
        assert_eq!(
            Network::build(&spec).unwrap_err(),
            TopologyError::DuplicateSegment("private-frontend".into())
        );
    }

    #[test]
    fn private_segments_need_a_public_segment() {
        let mut spec = three_tier("10.0.0.0/16", 24);
        spec.segments.remove(0);
        assert!(matches!(
            Network::build(&spec).unwrap_err(),
            TopologyError::NoPublicSegmentForNat(_)
        ));
    }

    #[test]
    fn cidr_parsing() {
        assert!("10.0.0.0/16".parse::<Ipv4Cidr>().is_ok());
        assert!("10.0.0.1/16".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
    }
}
