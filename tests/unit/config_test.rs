//! Tests for configuration validation

use elastic_runtime_core::config::{PolicyConfig, SchedulerConfig};

#[test]
fn test_default_config_is_valid() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.policy, PolicyConfig::Fifo);
    assert_eq!(cfg.local_node, "localhost");
    assert!(cfg.withhold_master_unit);
}

#[test]
fn test_config_invalid_local_node() {
    let cfg = SchedulerConfig {
        local_node: String::new(),
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());

    let cfg = SchedulerConfig {
        local_node: "master node".into(),
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "policy": "load_balancing",
        "local_node": "master01",
        "withhold_master_unit": false,
        "history_limit": 32
    }"#;
    let cfg = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.policy, PolicyConfig::LoadBalancing);
    assert_eq!(cfg.local_node, "master01");
    assert!(!cfg.withhold_master_unit);
    assert_eq!(cfg.history_limit, 32);
}

#[test]
fn test_config_from_partial_json_uses_defaults() {
    let cfg = SchedulerConfig::from_json_str(r#"{ "policy": "data_locality" }"#).unwrap();
    assert_eq!(cfg.policy, PolicyConfig::DataLocality);
    assert_eq!(cfg.history_limit, SchedulerConfig::default().history_limit);
}

#[test]
fn test_config_from_json_rejects_unknown_policy() {
    assert!(SchedulerConfig::from_json_str(r#"{ "policy": "random" }"#).is_err());
    assert!(SchedulerConfig::from_json_str("not json").is_err());
}

#[test]
fn test_policy_parse_and_display() {
    for policy in [
        PolicyConfig::Fifo,
        PolicyConfig::DataLocality,
        PolicyConfig::LoadBalancing,
    ] {
        assert_eq!(policy.to_string().parse::<PolicyConfig>().unwrap(), policy);
    }
    assert_eq!("Load-Balancing".parse::<PolicyConfig>().unwrap(), PolicyConfig::LoadBalancing);
}
