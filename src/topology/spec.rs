//! Declarative topology input.
//!
//! These are the shapes read from the `[topology]` section of the relay
//! config or from a standalone topology file. Defaults describe the
//! two-tier report deployment: a public segment, a private frontend tier and
//! a private backend tier, with the frontend allowed to reach the backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::topology::network::Reachability;
use crate::topology::policy::Protocol;

/// Root of a topology document.
///
/// A document that leaves out `services` or `rules` gets none of them, so a
/// missing `[[rules]]` block means every connection is denied. The two-tier
/// layout from `Default` is only for building specs in code.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TopologySpec {
    #[serde(default)]
    pub network: NetworkSpec,
    #[serde(default)]
    pub cluster: ClusterSpec,
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    /// Tags applied to every resource.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Default for TopologySpec {
    fn default() -> Self {
        Self {
            network: NetworkSpec::default(),
            cluster: ClusterSpec::default(),
            services: vec![
                ServiceSpec {
                    name: "backend".into(),
                    cpu: 512,
                    memory_mib: 1024,
                    image: "report-backend:latest".into(),
                    container_port: 3005,
                    desired_count: 1,
                    segment: "private-backend".into(),
                    exposure: Exposure::Internal {
                        discovery_name: None,
                    },
                    log_stream_prefix: None,
                },
                ServiceSpec {
                    name: "frontend".into(),
                    cpu: 1024,
                    memory_mib: 2048,
                    image: "report-web:latest".into(),
                    container_port: 3000,
                    desired_count: 1,
                    segment: "private-frontend".into(),
                    exposure: Exposure::Public {
                        listener_port: default_listener_port(),
                        certificate: None,
                    },
                    log_stream_prefix: None,
                },
            ],
            rules: vec![RuleSpec {
                from: "frontend".into(),
                to: "backend".into(),
                protocol: Protocol::Tcp,
                port: 3005,
                reason: "Allow frontend to connect to backend on port 3005".into(),
            }],
            tags: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct NetworkSpec {
    pub name: String,
    /// Base block, e.g. "10.0.0.0/16".
    pub cidr: String,
    pub max_azs: u8,
    pub segments: Vec<SegmentSpec>,
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self {
            name: "relay-vpc".into(),
            cidr: "10.0.0.0/16".into(),
            max_azs: 2,
            segments: vec![
                SegmentSpec {
                    name: "public-subnet".into(),
                    reachability: Reachability::Public,
                    prefix_len: default_prefix_len(),
                },
                SegmentSpec {
                    name: "private-frontend".into(),
                    reachability: Reachability::PrivateEgress,
                    prefix_len: default_prefix_len(),
                },
                SegmentSpec {
                    name: "private-backend".into(),
                    reachability: Reachability::PrivateEgress,
                    prefix_len: default_prefix_len(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SegmentSpec {
    pub name: String,
    pub reachability: Reachability,
    #[serde(default = "default_prefix_len")]
    pub prefix_len: u8,
}

fn default_prefix_len() -> u8 {
    24
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClusterSpec {
    pub name: String,
    /// Private DNS namespace for service discovery.
    pub namespace: String,
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            name: "relay-cluster".into(),
            namespace: "internal".into(),
        }
    }
}

/// One workload placed into the cluster.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServiceSpec {
    pub name: String,
    /// CPU units (1024 = one vCPU).
    pub cpu: u32,
    pub memory_mib: u32,
    pub image: String,
    pub container_port: u16,
    #[serde(default = "default_desired_count")]
    pub desired_count: u32,
    pub segment: String,
    pub exposure: Exposure,
    /// Log stream prefix; defaults to the service name.
    #[serde(default)]
    pub log_stream_prefix: Option<String>,
}

fn default_desired_count() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Exposure {
    /// Reachable only inside the network via `<discovery_name>.<namespace>`.
    Internal {
        #[serde(default)]
        discovery_name: Option<String>,
    },
    /// Fronted by a public load balancer.
    Public {
        #[serde(default = "default_listener_port")]
        listener_port: u16,
        /// Certificate reference; adds an HTTPS listener on 443.
        #[serde(default)]
        certificate: Option<String>,
    },
}

fn default_listener_port() -> u16 {
    80
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RuleSpec {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub protocol: Protocol,
    pub port: u16,
    #[serde(default)]
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let doc = r#"
            [network]
            cidr = "172.16.0.0/20"
            max_azs = 1
            segments = [
                { name = "edge", reachability = "public" },
                { name = "apps", reachability = "private-egress", prefix_len = 26 },
            ]

            [[services]]
            name = "api"
            cpu = 256
            memory_mib = 512
            image = "api:1"
            container_port = 8080
            segment = "apps"
            exposure = { kind = "internal" }

            [tags]
            env = "test"
        "#;

        let spec: TopologySpec = toml::from_str(doc).unwrap();
        assert_eq!(spec.network.max_azs, 1);
        assert_eq!(spec.network.segments[0].prefix_len, 24);
        assert_eq!(spec.network.segments[1].reachability, Reachability::PrivateEgress);
        assert_eq!(spec.services.len(), 1);
        assert_eq!(spec.services[0].desired_count, 1);
        assert_eq!(
            spec.services[0].exposure,
            Exposure::Internal {
                discovery_name: None
            }
        );
        assert!(spec.rules.is_empty());
        assert_eq!(spec.cluster.namespace, "internal");
        assert_eq!(spec.tags.get("env").map(String::as_str), Some("test"));
    }

    #[test]
    fn public_exposure_defaults_to_port_80() {
        let exposure: Exposure = toml::from_str(r#"kind = "public""#).unwrap();
        assert_eq!(
            exposure,
            Exposure::Public {
                listener_port: 80,
                certificate: None
            }
        );
    }
}
