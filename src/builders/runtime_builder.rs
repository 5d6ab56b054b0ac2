//! Wiring a registry, pool, policy and scheduler from a [`SchedulerConfig`].

use std::sync::Arc;

use tracing::info;

use crate::config::{PolicyConfig, SchedulerConfig};
use crate::core::{
    CoreError, DataLocalityPolicy, FifoPolicy, LoadBalancingPolicy, ResourcePoolManager,
    SchedulingPolicy, TaskScheduler,
};
use crate::data::DataRegistry;
use crate::runtime::Agent;

/// Instantiate the policy named by `policy`.
pub fn build_policy(policy: PolicyConfig, registry: &Arc<DataRegistry>) -> Box<dyn SchedulingPolicy> {
    match policy {
        PolicyConfig::Fifo => Box::new(FifoPolicy),
        PolicyConfig::DataLocality => Box::new(DataLocalityPolicy::new(Arc::clone(registry))),
        PolicyConfig::LoadBalancing => Box::new(LoadBalancingPolicy),
    }
}

/// Build a scheduler with a fresh registry and an empty pool.
///
/// # Errors
///
/// [`CoreError::InvalidConfig`] if `cfg` does not validate.
pub fn build_scheduler(cfg: &SchedulerConfig) -> Result<Arc<TaskScheduler>, CoreError> {
    cfg.validate()?;
    let registry = Arc::new(DataRegistry::new());
    let pool = ResourcePoolManager::new(Arc::clone(&registry))
        .with_local_node(cfg.local_node.clone())
        .with_master_withholding(cfg.withhold_master_unit);
    let policy = build_policy(cfg.policy, &registry);
    info!(policy = %cfg.policy, local_node = %cfg.local_node, "building scheduler");
    Ok(TaskScheduler::new(Arc::new(pool), policy, cfg.history_limit))
}

/// Build an [`Agent`] over a fresh scheduler.
///
/// # Errors
///
/// [`CoreError::InvalidConfig`] if `cfg` does not validate.
pub fn build_agent(cfg: &SchedulerConfig) -> Result<Agent, CoreError> {
    build_scheduler(cfg).map(Agent::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_rejects_invalid_config() {
        let cfg = SchedulerConfig {
            local_node: "  ".into(),
            ..SchedulerConfig::default()
        };
        assert!(matches!(build_scheduler(&cfg), Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_build_selects_policy() {
        let cfg = SchedulerConfig {
            policy: PolicyConfig::DataLocality,
            ..SchedulerConfig::default()
        };
        let scheduler = build_scheduler(&cfg).unwrap();
        assert_eq!(scheduler.policy_name(), "data_locality");
    }
}
