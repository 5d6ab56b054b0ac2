//! Integration tests for the task scheduler
//!
//! These tests validate:
//! - Capacity-bound binding and release under the FIFO policy
//! - Priority ordering across ready actions
//! - Load balancing and data locality candidate selection
//! - Implementation choice and deterministic tie-breaks
//! - Scheduler listener notifications

use std::sync::Arc;

use parking_lot::Mutex;

use elastic_runtime_core::core::{
    ActionEvent, ActionState, AdaptorConfig, Assignment, DataLocalityPolicy, FifoPolicy,
    Implementation, LoadBalancingPolicy, ProcessorKind, ProducedValue, RecordingMonitor,
    ResourceDescriptor, ResourcePoolManager, SchedulerListener, SchedulingPolicy, TaskScheduler,
    TaskSubmission, WorkerKey,
};
use elastic_runtime_core::data::{DataLocation, DataRegistry};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn scheduler_with(policy: impl FnOnce(&Arc<DataRegistry>) -> Box<dyn SchedulingPolicy>) -> Arc<TaskScheduler> {
    let registry = Arc::new(DataRegistry::new());
    let policy = policy(&registry);
    let pool = Arc::new(ResourcePoolManager::new(registry));
    TaskScheduler::new(pool, policy, 256)
}

fn fifo() -> Arc<TaskScheduler> {
    scheduler_with(|_| Box::new(FifoPolicy))
}

fn add(s: &TaskScheduler, name: &str, cpus: u32) {
    s.add_worker(WorkerKey::permanent(name), &ResourceDescriptor::cpus(cpus), AdaptorConfig::named("comm"));
}

fn task(cpus: u32, priority: i32) -> TaskSubmission {
    TaskSubmission::single(ResourceDescriptor::cpus(cpus), "app.task").with_priority(priority)
}

#[derive(Default)]
struct AssignmentLog {
    assignments: Mutex<Vec<Assignment>>,
    capacity_changes: Mutex<usize>,
}

impl SchedulerListener for AssignmentLog {
    fn on_assignment(&self, assignment: &Assignment) {
        self.assignments.lock().push(assignment.clone());
    }

    fn on_capacity_change(&self, _worker: &WorkerKey, _free: &ResourceDescriptor) {
        *self.capacity_changes.lock() += 1;
    }
}

// ============================================================================
// FIFO
// ============================================================================

#[test]
fn test_fifo_binds_until_capacity_exhausted() {
    let s = fifo();
    add(&s, "w1", 4);
    let monitor = Arc::new(RecordingMonitor::default());
    let a = s.submit(task(2, 1), monitor.clone());
    let b = s.submit(task(2, 1), monitor.clone());
    let c = s.submit(task(1, 1), monitor.clone());

    assert_eq!(s.action_state(a), Some(ActionState::Assigned));
    assert_eq!(s.action_state(b), Some(ActionState::Assigned));
    assert_eq!(s.action_state(c), Some(ActionState::Ready));
    assert!(s.pool().worker(&WorkerKey::permanent("w1")).unwrap().free.is_empty());

    s.on_completion(a, Vec::new()).unwrap();
    assert_eq!(s.action_state(c), Some(ActionState::Assigned));
    let w1 = s.pool().worker(&WorkerKey::permanent("w1")).unwrap();
    assert_eq!(w1.free, ResourceDescriptor::cpus(1));
    assert_eq!(w1.queue_depth, 2);
}

#[test]
fn test_higher_priority_ready_action_binds_first() {
    let s = fifo();
    let monitor = Arc::new(RecordingMonitor::default());
    let low = s.submit(task(1, 0), monitor.clone());
    let high = s.submit(task(1, 9), monitor.clone());
    assert_eq!(s.ready_count(), 2);

    add(&s, "w1", 1);
    assert_eq!(s.action_state(high), Some(ActionState::Assigned));
    assert_eq!(s.action_state(low), Some(ActionState::Ready));
}

#[test]
fn test_equal_priority_keeps_submission_order() {
    let s = fifo();
    let monitor = Arc::new(RecordingMonitor::default());
    let first = s.submit(task(1, 3), monitor.clone());
    let second = s.submit(task(1, 3), monitor.clone());
    add(&s, "w1", 1);
    assert_eq!(s.action_state(first), Some(ActionState::Assigned));
    assert_eq!(s.action_state(second), Some(ActionState::Ready));
}

// ============================================================================
// LOAD BALANCING AND LOCALITY
// ============================================================================

#[test]
fn test_load_balancing_prefers_worker_with_fewer_actions() {
    let s = scheduler_with(|_| Box::new(LoadBalancingPolicy));
    add(&s, "w1", 4);
    add(&s, "w2", 4);
    let monitor = Arc::new(RecordingMonitor::default());

    let warmup = s.submit(task(1, 0), monitor.clone());
    assert_eq!(s.binding_of(warmup), Some(WorkerKey::permanent("w1")));

    let urgent = s.submit(task(1, 5), monitor.clone());
    assert_eq!(s.binding_of(urgent), Some(WorkerKey::permanent("w2")));
}

#[test]
fn test_data_locality_prefers_host_holding_inputs() {
    let s = scheduler_with(|registry| Box::new(DataLocalityPolicy::new(Arc::clone(registry))));
    add(&s, "w1", 2);
    add(&s, "w2", 2);
    s.registry().add_location("matrix", DataLocation::private("w2", "/data/matrix"));

    let monitor = Arc::new(RecordingMonitor::default());
    let id = s.submit(task(1, 0).reading("matrix"), monitor);
    assert_eq!(s.binding_of(id), Some(WorkerKey::permanent("w2")));
}

#[test]
fn test_data_locality_falls_back_to_registration_order() {
    let s = scheduler_with(|registry| Box::new(DataLocalityPolicy::new(Arc::clone(registry))));
    add(&s, "w1", 2);
    add(&s, "w2", 2);
    s.registry().add_location("shared-in", DataLocation::persistent("psco-1"));
    let id = s.submit(task(1, 0).reading("shared-in"), Arc::new(RecordingMonitor::default()));
    assert_eq!(s.binding_of(id), Some(WorkerKey::permanent("w1")));
}

// ============================================================================
// IMPLEMENTATIONS AND DETERMINISM
// ============================================================================

#[test]
fn test_first_fitting_implementation_is_chosen() {
    let s = fifo();
    add(&s, "cpu-only", 4);
    let submission = TaskSubmission {
        implementations: vec![
            Implementation::new(ResourceDescriptor::cpus(1).with(ProcessorKind::Gpu, 1), "gpu.kernel"),
            Implementation::new(ResourceDescriptor::cpus(2), "cpu.kernel"),
            Implementation::new(ResourceDescriptor::cpus(1), "cpu.small"),
        ],
        ..TaskSubmission::default()
    };
    let monitor = Arc::new(RecordingMonitor::default());
    let id = s.submit(submission, monitor.clone());
    assert!(monitor.events_for(id).contains(&ActionEvent::Assigned {
        action: id,
        worker: WorkerKey::permanent("cpu-only"),
        implementation: 1,
    }));
}

#[test]
fn test_identical_state_yields_identical_assignments() {
    fn run() -> Vec<(u64, String)> {
        let s = scheduler_with(|_| Box::new(LoadBalancingPolicy));
        let log = Arc::new(AssignmentLog::default());
        s.set_listener(log.clone());
        for (name, cpus) in [("n1", 2), ("n2", 3), ("n3", 1)] {
            add(&s, name, cpus);
        }
        let monitor = Arc::new(RecordingMonitor::default());
        for i in 0..8 {
            s.submit(task(1 + i % 2, i32::try_from(i % 3).unwrap()), monitor.clone());
        }
        let assignments = log.assignments.lock();
        assignments
            .iter()
            .map(|a| (a.action, a.worker.name.clone()))
            .collect()
    }
    let first = run();
    assert!(!first.is_empty());
    assert_eq!(first, run());
}

// ============================================================================
// LISTENER AND OUTPUTS
// ============================================================================

#[test]
fn test_listener_sees_assignments_and_capacity_changes() {
    let s = fifo();
    let log = Arc::new(AssignmentLog::default());
    s.set_listener(log.clone());
    add(&s, "w1", 2);
    let id = s.submit(task(2, 0), Arc::new(RecordingMonitor::default()));

    let assignments = log.assignments.lock().clone();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].action, id);
    assert_eq!(assignments[0].requirement, ResourceDescriptor::cpus(2));
    assert_eq!(assignments[0].handler.0, "app.task");
    // registration plus the reservation
    assert!(*log.capacity_changes.lock() >= 2);
}

#[test]
fn test_outputs_unblock_dependents_in_chain() {
    let s = fifo();
    add(&s, "w1", 1);
    let monitor = Arc::new(RecordingMonitor::default());
    let producer = s.submit(task(1, 0).producing("stage1"), monitor.clone());
    let consumer = s.submit(task(1, 0).reading("stage1").producing("stage2"), monitor.clone());
    let last = s.submit(task(1, 0).reading("stage2"), monitor.clone());
    assert_eq!(s.blocked_count(), 2);

    s.on_completion(
        producer,
        vec![ProducedValue::new("stage1", "file", DataLocation::private("w1", "/s1"))],
    )
    .unwrap();
    assert_eq!(s.action_state(consumer), Some(ActionState::Assigned));
    assert_eq!(s.action_state(last), Some(ActionState::Blocked));

    s.on_completion(
        consumer,
        vec![ProducedValue::new("stage2", "file", DataLocation::private("w1", "/s2"))],
    )
    .unwrap();
    assert_eq!(s.action_state(last), Some(ActionState::Assigned));
}

#[test]
fn test_each_lifecycle_event_delivered_once() {
    let s = fifo();
    add(&s, "w1", 1);
    let monitor = Arc::new(RecordingMonitor::default());
    let id = s.submit(task(1, 0), monitor.clone());
    s.mark_running(id).unwrap();
    s.on_completion(id, Vec::new()).unwrap();
    assert!(s.cancel(id).is_ok());

    let events = monitor.events_for(id);
    assert_eq!(
        events,
        vec![
            ActionEvent::Created { action: id },
            ActionEvent::Ready { action: id },
            ActionEvent::Assigned {
                action: id,
                worker: WorkerKey::permanent("w1"),
                implementation: 0,
            },
            ActionEvent::Completed { action: id },
        ]
    );
}
