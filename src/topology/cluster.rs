//! Cluster and service placement.
//!
//! # Responsibilities
//! - Validate every service spec against the network before building anything
//! - Register internal services under the private discovery namespace
//! - Front public services with a load balancer while keeping the
//!   containers in a private-egress segment
//! - Attach a per-service log destination
//!
//! # Design Decisions
//! - Containers never bind a public address; only load balancers are public
//! - Validation is a separate pass so a failure leaves no partial cluster

use std::collections::HashSet;

use serde::Serialize;

use crate::topology::error::TopologyError;
use crate::topology::network::{Ipv4Cidr, Network, Reachability};
use crate::topology::spec::{ClusterSpec, Exposure, ServiceSpec};

pub const HTTPS_PORT: u16 = 443;

/// Central log sink for a service's containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogDestination {
    pub group: String,
    pub stream_prefix: String,
}

/// Private DNS registration of an internal service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryRecord {
    pub name: String,
    pub namespace: String,
    pub port: u16,
}

impl DiscoveryRecord {
    /// `<name>.<namespace>`
    pub fn fqdn(&self) -> String {
        format!("{}.{}", self.name, self.namespace)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadBalancer {
    pub name: String,
    pub dns_name: String,
    /// External listener ports.
    pub listeners: Vec<u16>,
    pub target_port: u16,
    /// Public subnets the load balancer sits in.
    pub subnets: Vec<Ipv4Cidr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "exposure", rename_all = "lowercase")]
pub enum ServiceKind {
    Internal { discovery: DiscoveryRecord },
    Public { load_balancer: LoadBalancer },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    pub name: String,
    pub cpu: u32,
    pub memory_mib: u32,
    pub desired_count: u32,
    pub image: String,
    pub container_port: u16,
    pub segment: String,
    /// Subnets the tasks are spread over, one per zone.
    pub subnets: Vec<Ipv4Cidr>,
    pub kind: ServiceKind,
    pub logs: LogDestination,
}

impl Service {
    pub fn is_internal(&self) -> bool {
        matches!(self.kind, ServiceKind::Internal { .. })
    }

    pub fn discovery(&self) -> Option<&DiscoveryRecord> {
        match &self.kind {
            ServiceKind::Internal { discovery } => Some(discovery),
            ServiceKind::Public { .. } => None,
        }
    }

    pub fn load_balancer(&self) -> Option<&LoadBalancer> {
        match &self.kind {
            ServiceKind::Public { load_balancer } => Some(load_balancer),
            ServiceKind::Internal { .. } => None,
        }
    }

    /// Public DNS name, if the service is reachable from the internet.
    pub fn public_address(&self) -> Option<&str> {
        self.load_balancer().map(|lb| lb.dns_name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    pub name: String,
    pub network: String,
    pub namespace: String,
    pub services: Vec<Service>,
}

impl Cluster {
    pub fn build(
        network: &Network,
        spec: &ClusterSpec,
        services: &[ServiceSpec],
    ) -> Result<Self, TopologyError> {
        validate_services(network, services)?;

        let public_subnets: Vec<Ipv4Cidr> = network
            .segments
            .iter()
            .find(|s| s.reachability == Reachability::Public)
            .map(|s| s.subnets.iter().map(|subnet| subnet.cidr).collect())
            .unwrap_or_default();

        let services = services
            .iter()
            .map(|svc| {
                let subnets = network
                    .segment(&svc.segment)
                    .map(|s| s.subnets.iter().map(|subnet| subnet.cidr).collect())
                    .unwrap_or_default();

                let kind = match &svc.exposure {
                    Exposure::Internal { discovery_name } => ServiceKind::Internal {
                        discovery: DiscoveryRecord {
                            name: discovery_name.clone().unwrap_or_else(|| svc.name.clone()),
                            namespace: spec.namespace.clone(),
                            port: svc.container_port,
                        },
                    },
                    Exposure::Public {
                        listener_port,
                        certificate,
                    } => {
                        let mut listeners = vec![*listener_port];
                        if certificate.is_some() && *listener_port != HTTPS_PORT {
                            listeners.push(HTTPS_PORT);
                        }
                        ServiceKind::Public {
                            load_balancer: LoadBalancer {
                                name: format!("{}-lb", svc.name),
                                dns_name: format!("{}-lb.{}.elb.public", svc.name, network.name),
                                listeners,
                                target_port: svc.container_port,
                                subnets: public_subnets.clone(),
                            },
                        }
                    }
                };

                Service {
                    name: svc.name.clone(),
                    cpu: svc.cpu,
                    memory_mib: svc.memory_mib,
                    desired_count: svc.desired_count,
                    image: svc.image.clone(),
                    container_port: svc.container_port,
                    segment: svc.segment.clone(),
                    subnets,
                    kind,
                    logs: LogDestination {
                        group: format!("/{}/{}", spec.name, svc.name),
                        stream_prefix: svc
                            .log_stream_prefix
                            .clone()
                            .unwrap_or_else(|| svc.name.clone()),
                    },
                }
            })
            .collect();

        Ok(Self {
            name: spec.name.clone(),
            network: network.name.clone(),
            namespace: spec.namespace.clone(),
            services,
        })
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Resolve a discovery name, short (`backend`) or qualified
    /// (`backend.internal`), to the internal service behind it.
    pub fn resolve(&self, host: &str) -> Option<&Service> {
        let short = match host.strip_suffix(&format!(".{}", self.namespace)) {
            Some(short) => short,
            None => host,
        };
        self.services
            .iter()
            .find(|s| s.discovery().is_some_and(|d| d.name == short))
    }
}

fn validate_services(network: &Network, services: &[ServiceSpec]) -> Result<(), TopologyError> {
    let mut names = HashSet::new();
    let mut discovery_names = HashSet::new();

    for svc in services {
        if !names.insert(svc.name.as_str()) {
            return Err(TopologyError::DuplicateService(svc.name.clone()));
        }

        let zero = |field| TopologyError::ZeroResource {
            service: svc.name.clone(),
            field,
        };
        if svc.cpu == 0 {
            return Err(zero("cpu"));
        }
        if svc.memory_mib == 0 {
            return Err(zero("memory_mib"));
        }
        if svc.container_port == 0 {
            return Err(zero("container_port"));
        }
        if svc.desired_count == 0 {
            return Err(zero("desired_count"));
        }

        let segment = network
            .segment(&svc.segment)
            .ok_or_else(|| TopologyError::UnknownSegment {
                service: svc.name.clone(),
                segment: svc.segment.clone(),
            })?;

        let conflict = |reason| TopologyError::PlacementConflict {
            service: svc.name.clone(),
            segment: svc.segment.clone(),
            reachability: segment.reachability,
            reason,
        };

        match &svc.exposure {
            Exposure::Internal { discovery_name } => {
                if segment.reachability == Reachability::Public {
                    return Err(conflict("internal services must not sit in a public segment"));
                }
                let discovery = discovery_name.as_deref().unwrap_or(&svc.name);
                if !discovery_names.insert(discovery.to_string()) {
                    return Err(TopologyError::DuplicateDiscoveryName(discovery.to_string()));
                }
            }
            Exposure::Public { .. } => {
                if segment.reachability == Reachability::Public {
                    return Err(conflict(
                        "containers never bind a public address; only the load balancer is public",
                    ));
                }
                if !network
                    .segments
                    .iter()
                    .any(|s| s.reachability == Reachability::Public)
                {
                    return Err(conflict("no public segment to host the load balancer"));
                }
            }
        }
    }

    Ok(())
}
