//! A fully validated topology.

use std::fmt;

use crate::topology::cluster::{Cluster, Service};
use crate::topology::error::TopologyError;
use crate::topology::graph::ResourceGraph;
use crate::topology::network::Network;
use crate::topology::policy::{AccessPolicy, Protocol, Verdict};
use crate::topology::spec::TopologySpec;

/// Network, cluster and access policy built from one [`TopologySpec`].
///
/// Construction validates the whole document up front; an `Err` means nothing was
/// built.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub network: Network,
    pub cluster: Cluster,
    pub policy: AccessPolicy,
    pub graph: ResourceGraph,
}

impl Deployment {
    pub fn build(spec: &TopologySpec) -> Result<Self, TopologyError> {
        let network = Network::build(&spec.network)?;
        let cluster = Cluster::build(&network, &spec.cluster, &spec.services)?;

        let mut policy = AccessPolicy::new();
        for rule in &spec.rules {
            if rule.from == rule.to {
                return Err(TopologyError::SelfRule(rule.from.clone()));
            }
            if cluster.service(&rule.from).is_none() {
                return Err(TopologyError::UnknownService(rule.from.clone()));
            }
            let target = cluster
                .service(&rule.to)
                .ok_or_else(|| TopologyError::UnknownService(rule.to.clone()))?;
            if target.container_port != rule.port {
                return Err(TopologyError::PortMismatch {
                    source_service: rule.from.clone(),
                    target: rule.to.clone(),
                    port: rule.port,
                });
            }
            policy.allow(&rule.from, &rule.to, rule.protocol, rule.port, &rule.reason);
        }

        let graph = ResourceGraph::from_parts(&network, &cluster, &policy, &spec.tags);

        tracing::info!(
            network = %network.name,
            cluster = %cluster.name,
            services = cluster.services.len(),
            rules = policy.len(),
            resources = graph.len(),
            "Topology built"
        );

        Ok(Self {
            network,
            cluster,
            policy,
            graph,
        })
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.cluster.service(name)
    }

    /// Whether `source` may open a connection to `target` on `port`.
    pub fn can_connect(&self, source: &str, target: &str, protocol: Protocol, port: u16) -> Verdict {
        self.policy.check(source, target, protocol, port)
    }

    /// True only for public services, and only through their load balancer.
    pub fn internet_reachable(&self, service: &str) -> bool {
        self.service(service)
            .is_some_and(|s| s.load_balancer().is_some())
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "network {} ({})", self.network.name, self.network.cidr)?;
        for segment in &self.network.segments {
            writeln!(f, "  segment {} [{}]", segment.name, segment.reachability)?;
            for subnet in &segment.subnets {
                writeln!(f, "    {} {}", subnet.zone, subnet.cidr)?;
            }
        }
        writeln!(f, "cluster {} (namespace {})", self.cluster.name, self.cluster.namespace)?;
        for service in &self.cluster.services {
            match (service.discovery(), service.load_balancer()) {
                (Some(d), _) => writeln!(f, "  service {} -> {}:{}", service.name, d.fqdn(), d.port)?,
                (_, Some(lb)) => writeln!(
                    f,
                    "  service {} <- {} {:?}",
                    service.name, lb.dns_name, lb.listeners
                )?,
                _ => writeln!(f, "  service {}", service.name)?,
            }
        }
        for rule in self.policy.rules() {
            writeln!(f, "rule {} ({})", rule, rule.reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::spec::RuleSpec;

    #[test]
    fn default_deployment_reachability() {
        let deployment = Deployment::build(&TopologySpec::default()).unwrap();

        assert!(deployment
            .can_connect("frontend", "backend", Protocol::Tcp, 3005)
            .is_allowed());
        assert_eq!(
            deployment.can_connect("backend", "frontend", Protocol::Tcp, 3000),
            Verdict::Deny
        );
        assert!(deployment.internet_reachable("frontend"));
        assert!(!deployment.internet_reachable("backend"));
    }

    #[test]
    fn missing_rule_means_no_path() {
        let mut spec = TopologySpec::default();
        spec.rules.clear();
        let deployment = Deployment::build(&spec).unwrap();

        assert!(deployment.policy.is_empty());
        assert!(!deployment
            .can_connect("frontend", "backend", Protocol::Tcp, 3005)
            .is_allowed());
    }

    #[test]
    fn rules_are_validated() {
        let mut spec = TopologySpec::default();
        spec.rules.push(RuleSpec {
            from: "frontend".into(),
            to: "cache".into(),
            protocol: Protocol::Tcp,
            port: 6379,
            reason: String::new(),
        });
        assert_eq!(
            Deployment::build(&spec).unwrap_err(),
            TopologyError::UnknownService("cache".into())
        );

        let mut spec = TopologySpec::default();
        spec.rules[0].port = 8080;
        assert!(matches!(
            Deployment::build(&spec).unwrap_err(),
            TopologyError::PortMismatch { port: 8080, .. }
        ));
    }

    #[test]
    fn duplicate_rules_collapse() {
        let mut spec = TopologySpec::default();
        let rule = spec.rules[0].clone();
        spec.rules.push(rule);
        let deployment = Deployment::build(&spec).unwrap();
        assert_eq!(deployment.policy.len(), 1);
    }

    #[test]
    fn summary_lists_every_tier() {
        let text = Deployment::build(&TopologySpec::default()).unwrap().to_string();
        assert!(text.contains("segment public-subnet [public]"));
        assert!(text.contains("service backend -> backend.internal:3005"));
        assert!(text.contains("rule frontend -> backend tcp/3005"));
    }
}
