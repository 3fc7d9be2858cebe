//! Topology documents as an operator writes them, from TOML to applied state.

use topology_relay::config::{parse_config, ConfigError};
use topology_relay::topology::graph::ResourceKind;
use topology_relay::topology::{
    Deployment, Protocol, ResourceStore, TopologyError, TopologySpec, Verdict,
};

const TWO_TIER: &str = r#"
[network]
name = "report-vpc"
cidr = "10.20.0.0/16"
max_azs = 2

[[network.segments]]
name = "public-subnet"
reachability = "public"

[[network.segments]]
name = "private-frontend"
reachability = "private-egress"

[[network.segments]]
name = "private-backend"
reachability = "private-egress"

[cluster]
name = "report-cluster"
namespace = "internal"

[[services]]
name = "backend"
cpu = 512
memory_mib = 1024
image = "report-backend:1.4.0"
container_port = 3005
segment = "private-backend"
exposure = { kind = "internal" }

[[services]]
name = "frontend"
cpu = 1024
memory_mib = 2048
image = "report-web:2.0.1"
container_port = 3000
segment = "private-frontend"
exposure = { kind = "public", listener_port = 80 }

[[rules]]
from = "frontend"
to = "backend"
port = 3005
reason = "Allow frontend to connect to backend on port 3005"

[tags]
project = "reports"
"#;

fn two_tier() -> Deployment {
    let spec: TopologySpec = toml::from_str(TWO_TIER).unwrap();
    Deployment::build(&spec).unwrap()
}

#[test]
fn document_builds_the_two_tier_layout() {
    let deployment = two_tier();

    let backend = deployment.service("backend").unwrap();
    assert_eq!(backend.discovery().unwrap().fqdn(), "backend.internal");
    assert!(!deployment.internet_reachable("backend"));
    assert!(deployment.internet_reachable("frontend"));

    assert!(deployment
        .can_connect("frontend", "backend", Protocol::Tcp, 3005)
        .is_allowed());
    assert!(!deployment
        .can_connect("backend", "frontend", Protocol::Tcp, 3000)
        .is_allowed());
    assert!(!deployment
        .can_connect("frontend", "backend", Protocol::Udp, 3005)
        .is_allowed());
}

#[test]
fn plan_follows_build_stages() {
    let deployment = two_tier();
    let plan = deployment.graph.plan();

    let stages: Vec<u8> = plan.iter().map(|id| id.kind.stage()).collect();
    let mut sorted = stages.clone();
    sorted.sort();
    assert_eq!(stages, sorted);

    assert_eq!(plan.first().unwrap().kind, ResourceKind::Network);
    assert_eq!(plan.last().unwrap().kind, ResourceKind::AccessRule);

    for resource in deployment.graph.resources() {
        assert_eq!(resource.tags.get("project").map(String::as_str), Some("reports"));
        for dep in &resource.depends_on {
            let dep_at = plan.iter().position(|id| id == dep).unwrap();
            let own_at = plan.iter().position(|id| *id == resource.id).unwrap();
            assert!(dep_at < own_at, "{dep} must come before {}", resource.id);
        }
    }
}

#[test]
fn apply_is_idempotent_across_saved_state() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state.json");
    let deployment = two_tier();

    let store = ResourceStore::load(&state).unwrap();
    let first = store.apply(&deployment.graph);
    assert_eq!(first.created.len(), deployment.graph.len());
    store.save(&state).unwrap();

    let reloaded = ResourceStore::load(&state).unwrap();
    let second = reloaded.apply(&deployment.graph);
    assert!(second.is_noop());
    assert_eq!(second.unchanged.len(), deployment.graph.len());
}

#[test]
fn image_bump_replaces_only_that_service() {
    let store = ResourceStore::new();
    store.apply(&two_tier().graph);

    let bumped = TWO_TIER.replace("report-backend:1.4.0", "report-backend:1.5.0");
    let spec: TopologySpec = toml::from_str(&bumped).unwrap();
    let report = store.apply(&Deployment::build(&spec).unwrap().graph);

    assert_eq!(report.replaced.len(), 1);
    assert_eq!(report.replaced[0].name, "backend");
    assert!(report.created.is_empty());
    assert!(report.removed.is_empty());
}

#[test]
fn document_without_rules_denies_everything() {
    let (head, tail) = TWO_TIER.split_once("[[rules]]").unwrap();
    let tags = tail.find("[tags]").unwrap();
    let doc = format!("{head}{}", &tail[tags..]);

    let spec: TopologySpec = toml::from_str(&doc).unwrap();
    assert_eq!(spec.services.len(), 2);
    assert!(spec.rules.is_empty());

    let deployment = Deployment::build(&spec).unwrap();
    assert!(deployment.policy.is_empty());
    assert_eq!(
        deployment.can_connect("frontend", "backend", Protocol::Tcp, 3005),
        Verdict::Deny
    );
}

#[test]
fn document_without_services_declares_none() {
    let spec: TopologySpec = toml::from_str("[tags]\nproject = \"reports\"\n").unwrap();
    assert!(spec.services.is_empty());
    assert!(spec.rules.is_empty());
    assert_eq!(spec.network.segments.len(), 3);
}

#[test]
fn rule_to_wrong_port_is_rejected() {
    let doc = TWO_TIER.replace("port = 3005\nreason", "port = 8080\nreason");
    let spec: TopologySpec = toml::from_str(&doc).unwrap();
    assert!(matches!(
        Deployment::build(&spec),
        Err(TopologyError::PortMismatch { .. })
    ));
}

#[test]
fn relay_config_embeds_the_topology() {
    let doc = format!(
        "[upstream]\ncaller = \"frontend\"\nhost = \"backend.internal\"\nport = 3005\n\n{}",
        TWO_TIER
            .replace("[network]", "[topology.network]")
            .replace("[[network.segments]]", "[[topology.network.segments]]")
            .replace("[cluster]", "[topology.cluster]")
            .replace("[[services]]", "[[topology.services]]")
            .replace("[[rules]]", "[[topology.rules]]")
            .replace("[tags]", "[topology.tags]")
    );
    let config = parse_config(&doc).unwrap();
    assert_eq!(config.topology.unwrap().network.name, "report-vpc");
}

#[test]
fn relay_config_must_point_at_an_internal_service() {
    let doc = "[upstream]\nhost = \"frontend.internal\"\n\n[topology]\n";
    match parse_config(doc).unwrap_err() {
        ConfigError::Validation(errors) => assert!(!errors.is_empty()),
        other => panic!("expected validation errors, got {other}"),
    }
}
