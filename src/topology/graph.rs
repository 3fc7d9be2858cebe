//! Typed resource graph.
//!
//! # Responsibilities
//! - Flatten a built deployment into typed resources with explicit edges
//! - Keep a deterministic build order:
//!   Network → Segments → Cluster → Services → Rules
//!
//! # Design Decisions
//! - Dependencies are explicit ids, never inferred from field references
//! - A resource only depends on resources earlier in the order
//! - Properties are plain JSON so the store can diff them without knowing types

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::topology::cluster::{Cluster, ServiceKind};
use crate::topology::network::{Network, RouteTarget};
use crate::topology::policy::AccessPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Network,
    Subnet,
    NatGateway,
    Cluster,
    Service,
    LoadBalancer,
    DiscoveryRecord,
    AccessRule,
}

impl ResourceKind {
    /// Build stage; lower stages are created first.
    pub fn stage(&self) -> u8 {
        match self {
            ResourceKind::Network => 0,
            ResourceKind::Subnet | ResourceKind::NatGateway => 1,
            ResourceKind::Cluster => 2,
            ResourceKind::Service | ResourceKind::LoadBalancer | ResourceKind::DiscoveryRecord => 3,
            ResourceKind::AccessRule => 4,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Network => "network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::NatGateway => "nat-gateway",
            ResourceKind::Cluster => "cluster",
            ResourceKind::Service => "service",
            ResourceKind::LoadBalancer => "load-balancer",
            ResourceKind::DiscoveryRecord => "discovery-record",
            ResourceKind::AccessRule => "access-rule",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub depends_on: Vec<ResourceId>,
    pub tags: BTreeMap<String, String>,
    pub properties: Value,
}

/// Resources in build order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceGraph {
    resources: Vec<Resource>,
}

impl ResourceGraph {
    pub fn from_parts(
        network: &Network,
        cluster: &Cluster,
        policy: &AccessPolicy,
        tags: &BTreeMap<String, String>,
    ) -> Self {
        let mut builder = GraphBuilder {
            resources: Vec::new(),
            tags,
        };

        let network_id = ResourceId::new(ResourceKind::Network, &network.name);
        builder.push(
            network_id.clone(),
            vec![],
            json!({ "cidr": network.cidr, "zones": network.zones }),
        );

        for segment in &network.segments {
            for subnet in &segment.subnets {
                let mut deps = vec![network_id.clone()];
                if let RouteTarget::NatGateway { zone } = &subnet.default_route {
                    deps.push(ResourceId::new(ResourceKind::NatGateway, nat_name(zone)));
                }
                builder.push(
                    ResourceId::new(ResourceKind::Subnet, subnet_name(&segment.name, &subnet.zone)),
                    deps,
                    json!({
                        "segment": segment.name,
                        "reachability": segment.reachability,
                        "zone": subnet.zone,
                        "cidr": subnet.cidr,
                        "default_route": subnet.default_route,
                    }),
                );
            }
        }
        // NAT gateways sit in a public subnet and private subnets route through them,
        // so they are pushed after subnets and moved ahead of their dependants below.
        for nat in &network.nat_gateways {
            let host = network
                .subnets()
                .find(|s| s.cidr == nat.subnet)
                .map(|s| ResourceId::new(ResourceKind::Subnet, subnet_name(&s.segment, &s.zone)));
            let mut deps = vec![network_id.clone()];
            deps.extend(host);
            builder.push(
                ResourceId::new(ResourceKind::NatGateway, nat_name(&nat.zone)),
                deps,
                json!({ "zone": nat.zone, "subnet": nat.subnet }),
            );
        }

        let cluster_id = ResourceId::new(ResourceKind::Cluster, &cluster.name);
        builder.push(
            cluster_id.clone(),
            vec![network_id.clone()],
            json!({ "namespace": cluster.namespace }),
        );

        for service in &cluster.services {
            let service_id = ResourceId::new(ResourceKind::Service, &service.name);
            let mut deps = vec![cluster_id.clone()];
            for zone in &network.zones {
                deps.push(ResourceId::new(
                    ResourceKind::Subnet,
                    subnet_name(&service.segment, zone),
                ));
            }
            builder.push(
                service_id.clone(),
                deps,
                json!({
                    "image": service.image,
                    "cpu": service.cpu,
                    "memory_mib": service.memory_mib,
                    "desired_count": service.desired_count,
                    "container_port": service.container_port,
                    "segment": service.segment,
                    "subnets": service.subnets,
                    "logs": service.logs,
                    "public_ip": false,
                }),
            );

            match &service.kind {
                ServiceKind::Internal { discovery } => builder.push(
                    ResourceId::new(ResourceKind::DiscoveryRecord, discovery.fqdn()),
                    vec![cluster_id.clone(), service_id],
                    json!({ "name": discovery.name, "namespace": discovery.namespace, "port": discovery.port }),
                ),
                ServiceKind::Public { load_balancer } => builder.push(
                    ResourceId::new(ResourceKind::LoadBalancer, &load_balancer.name),
                    vec![service_id],
                    json!(load_balancer),
                ),
            }
        }

        for rule in policy.rules() {
            builder.push(
                ResourceId::new(ResourceKind::AccessRule, rule.to_string()),
                vec![
                    ResourceId::new(ResourceKind::Service, &rule.key.source),
                    ResourceId::new(ResourceKind::Service, &rule.key.target),
                ],
                json!(rule),
            );
        }

        let mut resources = builder.resources;
        order(&mut resources);
        Self { resources }
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.id == id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Ids in the order they would be created.
    pub fn plan(&self) -> Vec<ResourceId> {
        self.resources.iter().map(|r| r.id.clone()).collect()
    }
}

struct GraphBuilder<'a> {
    resources: Vec<Resource>,
    tags: &'a BTreeMap<String, String>,
}

impl GraphBuilder<'_> {
    fn push(&mut self, id: ResourceId, depends_on: Vec<ResourceId>, properties: Value) {
        self.resources.push(Resource {
            id,
            depends_on,
            tags: self.tags.clone(),
            properties,
        });
    }
}

fn subnet_name(segment: &str, zone: &str) -> String {
    format!("{}-{}", segment, zone)
}

fn nat_name(zone: &str) -> String {
    format!("nat-{}", zone)
}

/// Stable topological sort: by stage, then dependencies first, then insertion order.
fn order(resources: &mut Vec<Resource>) {
    resources.sort_by_key(|r| r.id.kind.stage());

    let mut placed: Vec<Resource> = Vec::with_capacity(resources.len());
    let mut pending: Vec<Resource> = std::mem::take(resources);
    while !pending.is_empty() {
        let ready = pending.iter().position(|r| {
            r.depends_on.iter().all(|dep| {
                placed.iter().any(|p| &p.id == dep) || !pending.iter().any(|q| &q.id == dep)
            })
        });
        // a cycle cannot be produced by from_parts; fall back to stage order
        let index = ready.unwrap_or(0);
        placed.push(pending.remove(index));
    }
    *resources = placed;
}
