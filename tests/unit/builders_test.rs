//! Tests for builder modules

use std::sync::Arc;

use elastic_runtime_core::builders::{build_agent, build_policy, build_scheduler};
use elastic_runtime_core::config::{PolicyConfig, SchedulerConfig};
use elastic_runtime_core::core::{AdaptorConfig, ResourceDescriptor, WorkerKey};
use elastic_runtime_core::data::DataRegistry;

#[test]
fn test_build_policy_names() {
    let registry = Arc::new(DataRegistry::new());
    assert_eq!(build_policy(PolicyConfig::Fifo, &registry).name(), "fifo");
    assert_eq!(build_policy(PolicyConfig::DataLocality, &registry).name(), "data_locality");
    assert_eq!(build_policy(PolicyConfig::LoadBalancing, &registry).name(), "load_balancing");
}

#[test]
fn test_built_scheduler_applies_carve_out_to_configured_node() {
    let cfg = SchedulerConfig {
        local_node: "master01".into(),
        ..SchedulerConfig::default()
    };
    let scheduler = build_scheduler(&cfg).unwrap();
    let master = scheduler.add_worker(
        WorkerKey::permanent("master01"),
        &ResourceDescriptor::cpus(4),
        AdaptorConfig::default(),
    );
    let other = scheduler.add_worker(
        WorkerKey::permanent("node02"),
        &ResourceDescriptor::cpus(4),
        AdaptorConfig::default(),
    );
    assert_eq!(master.total, ResourceDescriptor::cpus(3));
    assert_eq!(other.total, ResourceDescriptor::cpus(4));
}

#[test]
fn test_built_scheduler_without_withholding() {
    let cfg = SchedulerConfig {
        withhold_master_unit: false,
        ..SchedulerConfig::default()
    };
    let scheduler = build_scheduler(&cfg).unwrap();
    let snap = scheduler.add_worker(
        WorkerKey::permanent("localhost"),
        &ResourceDescriptor::cpus(2),
        AdaptorConfig::default(),
    );
    assert_eq!(snap.total, ResourceDescriptor::cpus(2));
}

#[test]
fn test_build_agent_status() {
    let agent = build_agent(&SchedulerConfig::default()).unwrap();
    let status = agent.status();
    assert_eq!(status.workers, 0);
    assert_eq!(status.sessions, 0);
    assert_eq!(status.policy, "fifo");
}
