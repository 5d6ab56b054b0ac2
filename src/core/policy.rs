//! Scoring policies that rank (action, worker, implementation) candidates.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::core::action::{AllocatableAction, Implementation};
use crate::core::pool::WorkerSnapshot;
use crate::data::DataRegistry;

/// Ordered score of one candidate binding.
///
/// Fields compare lexicographically, higher wins; on equal fields the lower
/// action id wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Score {
    /// Policy-defined fields, most significant first.
    pub fields: Vec<i64>,
    /// Action the score belongs to.
    pub action: u64,
}

impl Score {
    /// Build a score.
    pub const fn new(fields: Vec<i64>, action: u64) -> Self {
        Self { fields, action }
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fields
            .cmp(&other.fields)
            .then_with(|| other.action.cmp(&self.action))
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pluggable ranking of candidate bindings.
pub trait SchedulingPolicy: Send + Sync {
    /// Short policy name, used in logs.
    fn name(&self) -> &'static str;

    /// Score binding `action` to `worker` with `implementation`.
    fn score(
        &self,
        action: &AllocatableAction,
        worker: &WorkerSnapshot,
        implementation: &Implementation,
    ) -> Score;
}

/// Priority first, then submission order.
#[derive(Debug, Default, Clone, Copy)]
pub struct FifoPolicy;

impl SchedulingPolicy for FifoPolicy {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn score(&self, action: &AllocatableAction, _: &WorkerSnapshot, _: &Implementation) -> Score {
        let seq = i64::try_from(action.sequence).unwrap_or(i64::MAX);
        Score::new(vec![i64::from(action.priority), -seq], action.id)
    }
}

/// Priority first, then how many inputs are already on the candidate host.
pub struct DataLocalityPolicy {
    registry: Arc<DataRegistry>,
}

impl DataLocalityPolicy {
    /// Policy reading replica locality from `registry`.
    pub const fn new(registry: Arc<DataRegistry>) -> Self {
        Self { registry }
    }
}

impl SchedulingPolicy for DataLocalityPolicy {
    fn name(&self) -> &'static str {
        "data_locality"
    }

    fn score(&self, action: &AllocatableAction, worker: &WorkerSnapshot, _: &Implementation) -> Score {
        let resident = action
            .dependencies
            .iter()
            .filter(|dep| self.registry.resolve(dep, worker.host()).is_some())
            .count();
        Score::new(
            vec![
                i64::from(action.priority),
                i64::try_from(resident).unwrap_or(i64::MAX),
            ],
            action.id,
        )
    }
}

/// Priority, group priority, age, then the least loaded worker.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadBalancingPolicy;

impl SchedulingPolicy for LoadBalancingPolicy {
    fn name(&self) -> &'static str {
        "load_balancing"
    }

    fn score(&self, action: &AllocatableAction, worker: &WorkerSnapshot, _: &Implementation) -> Score {
        let id = i64::try_from(action.id).unwrap_or(i64::MAX);
        let depth = i64::try_from(worker.queue_depth).unwrap_or(i64::MAX);
        Score::new(
            vec![
                i64::from(action.priority),
                i64::from(action.group_priority),
                -id,
                -depth,
            ],
            action.id,
        )
    }
}
