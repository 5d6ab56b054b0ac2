//! Task scheduler: ready/blocked queues, policy-driven binding and the action
//! lifecycle.
//!
//! One scheduler-wide mutex guards the queues and the live action table. It is
//! held while scoring and binding and released before any monitor, listener or
//! removal hook runs; everything observable is collected into an outbox and
//! delivered afterwards.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::core::action::{
    ActionId, ActionState, AllocatableAction, FailureReason, HandlerRef, ProducedValue,
    TaskSubmission,
};
use crate::core::monitor::{ActionEvent, ActionMonitor, SchedulerListener};
use crate::core::policy::{SchedulingPolicy, Score};
use crate::core::pool::{
    AdaptorConfig, LostWorker, RemovalHook, RemovalStatus, RemovedWorker, ResourcePoolManager,
    Worker, WorkerKey, WorkerSnapshot,
};
use crate::core::resources::ResourceDescriptor;
use crate::core::CoreError;
use crate::data::{AvailabilityListener, DataRegistry};

/// A binding decision: run `handler` for `action` on `worker`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Bound action.
    pub action: ActionId,
    /// Worker the capacity was reserved on.
    pub worker: WorkerKey,
    /// Index of the chosen implementation.
    pub implementation: usize,
    /// Handler of the chosen implementation.
    pub handler: HandlerRef,
    /// Capacity reserved.
    pub requirement: ResourceDescriptor,
}

struct ActionEntry {
    action: AllocatableAction,
    state: ActionState,
    monitor: Arc<dyn ActionMonitor>,
    delivered: u8,
    missing: BTreeSet<String>,
    binding: Option<WorkerKey>,
}

impl ActionEntry {
    /// Queue `event` unless its variant was already delivered.
    fn emit(&mut self, event: ActionEvent, outbox: &mut Outbox) -> bool {
        let bit = event.once_bit();
        if self.delivered & bit != 0 {
            return false;
        }
        self.delivered |= bit;
        outbox.events.push((Arc::clone(&self.monitor), event));
        true
    }
}

#[derive(Default)]
struct SchedulerState {
    actions: HashMap<ActionId, ActionEntry>,
    ready: BTreeSet<ActionId>,
    blocked: HashMap<String, BTreeSet<ActionId>>,
    history: VecDeque<(ActionId, ActionState)>,
    next_seq: u64,
}

impl SchedulerState {
    /// Detach `entry` from the ready and blocked queues.
    fn unqueue(&mut self, id: ActionId, entry: &ActionEntry) {
        self.ready.remove(&id);
        for name in &entry.missing {
            if let Some(waiting) = self.blocked.get_mut(name) {
                waiting.remove(&id);
                if waiting.is_empty() {
                    self.blocked.remove(name);
                }
            }
        }
    }

    fn remember(&mut self, id: ActionId, state: ActionState, limit: usize) {
        if limit == 0 {
            return;
        }
        if self.history.len() >= limit {
            self.history.pop_front();
        }
        self.history.push_back((id, state));
    }

    fn past_state(&self, id: ActionId) -> Option<&ActionState> {
        self.history.iter().rev().find(|(a, _)| *a == id).map(|(_, s)| s)
    }
}

/// Everything observable a locked section produced.
#[derive(Default)]
struct Outbox {
    events: Vec<(Arc<dyn ActionMonitor>, ActionEvent)>,
    assignments: Vec<Assignment>,
    capacity: Vec<(WorkerKey, ResourceDescriptor)>,
    drained: Vec<Arc<Worker>>,
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct Rank {
    score: Score,
    worker_seq: Reverse<u64>,
    implementation: Reverse<usize>,
}

struct Candidate {
    action: ActionId,
    worker: usize,
    implementation: usize,
}

/// Dispatches submitted actions onto the resource pool.
pub struct TaskScheduler {
    pool: Arc<ResourcePoolManager>,
    registry: Arc<DataRegistry>,
    policy: Box<dyn SchedulingPolicy>,
    state: Mutex<SchedulerState>,
    next_id: AtomicU64,
    history_limit: usize,
    listener: RwLock<Option<Arc<dyn SchedulerListener>>>,
}

impl TaskScheduler {
    /// Create a scheduler over `pool`, subscribed to its data registry so
    /// blocked actions are promoted as their inputs appear.
    pub fn new(
        pool: Arc<ResourcePoolManager>,
        policy: Box<dyn SchedulingPolicy>,
        history_limit: usize,
    ) -> Arc<Self> {
        let registry = Arc::clone(pool.registry());
        info!(policy = policy.name(), history_limit, "task scheduler created");
        let scheduler = Arc::new(Self {
            pool,
            registry,
            policy,
            state: Mutex::new(SchedulerState::default()),
            next_id: AtomicU64::new(1),
            history_limit,
            listener: RwLock::new(None),
        });
        let weak: Weak<dyn AvailabilityListener> = Arc::downgrade(&scheduler) as Weak<Self>;
        scheduler.registry.subscribe(weak);
        scheduler
    }

    /// Install the scheduler-wide observer, replacing any previous one.
    pub fn set_listener(&self, listener: Arc<dyn SchedulerListener>) {
        *self.listener.write() = Some(listener);
    }

    /// The resource pool.
    pub const fn pool(&self) -> &Arc<ResourcePoolManager> {
        &self.pool
    }

    /// The data registry.
    pub const fn registry(&self) -> &Arc<DataRegistry> {
        &self.registry
    }

    /// Name of the active policy.
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Accept a task. It becomes Ready when every dependency is available,
    /// Blocked otherwise, and a scheduling pass runs.
    pub fn submit(&self, submission: TaskSubmission, monitor: Arc<dyn ActionMonitor>) -> ActionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut outbox = Outbox::default();
        {
            let mut state = self.state.lock();
            state.next_seq += 1;
            let action = AllocatableAction::from_submission(id, state.next_seq, submission);
            let missing: BTreeSet<String> = action
                .dependencies
                .iter()
                .filter(|d| !self.registry.is_available(d))
                .cloned()
                .collect();
            let mut entry = ActionEntry {
                action,
                state: ActionState::Blocked,
                monitor,
                delivered: 0,
                missing,
                binding: None,
            };
            entry.emit(ActionEvent::Created { action: id }, &mut outbox);
            if entry.missing.is_empty() {
                entry.state = ActionState::Ready;
                entry.emit(ActionEvent::Ready { action: id }, &mut outbox);
                state.ready.insert(id);
                debug!(action = id, "action ready");
            } else {
                for name in &entry.missing {
                    state.blocked.entry(name.clone()).or_default().insert(id);
                }
                debug!(action = id, missing = entry.missing.len(), "action blocked on data");
            }
            state.actions.insert(id, entry);
        }
        self.flush(outbox);
        self.schedule_pass();
        id
    }

    /// Bind ready actions to workers until nothing more fits, best candidate
    /// first. Returns the bindings made by this pass.
    pub fn schedule_pass(&self) -> Vec<Assignment> {
        let mut outbox = Outbox::default();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let mut workers: Vec<WorkerSnapshot> = self
                .pool
                .snapshot()
                .into_iter()
                .filter(|w| !w.removing)
                .collect();

            while let Some(choice) = self.best_candidate(&state.actions, &state.ready, &workers) {
                let Some(entry) = state.actions.get_mut(&choice.action) else {
                    state.ready.remove(&choice.action);
                    continue;
                };
                let implementation = &entry.action.implementations[choice.implementation];
                let requirement = implementation.requirement.clone();
                let handler = implementation.handler.clone();
                let key = workers[choice.worker].key.clone();

                if let Some(free) = self.pool.try_reserve(&key, choice.action, &requirement) {
                    let worker = &mut workers[choice.worker];
                    worker.free = free.clone();
                    worker.queue_depth += 1;
                    state.ready.remove(&choice.action);
                    entry.state = ActionState::Assigned;
                    entry.binding = Some(key.clone());
                    entry.emit(
                        ActionEvent::Assigned {
                            action: choice.action,
                            worker: key.clone(),
                            implementation: choice.implementation,
                        },
                        &mut outbox,
                    );
                    info!(
                        action = choice.action,
                        worker = %key,
                        implementation = choice.implementation,
                        policy = self.policy.name(),
                        "action assigned"
                    );
                    outbox.assignments.push(Assignment {
                        action: choice.action,
                        worker: key.clone(),
                        implementation: choice.implementation,
                        handler,
                        requirement,
                    });
                    outbox.capacity.push((key, free));
                } else {
                    // The pool changed under us: refresh the worker, or drop
                    // it from this pass if it still looks like it fits.
                    match self.pool.worker(&key) {
                        Some(fresh) if !fresh.removing && !fresh.free.contains(&requirement) => {
                            workers[choice.worker] = fresh;
                        }
                        _ => {
                            workers.remove(choice.worker);
                        }
                    }
                }
            }

            // eligibility covers every registered worker, including any
            // dropped from this pass
            let registered: Vec<WorkerSnapshot> = self
                .pool
                .snapshot()
                .into_iter()
                .filter(|w| !w.removing)
                .collect();
            for id in &state.ready {
                let Some(entry) = state.actions.get_mut(id) else {
                    continue;
                };
                let eligible = registered.iter().any(|w| {
                    entry
                        .action
                        .implementations
                        .iter()
                        .any(|i| w.total.contains(&i.requirement))
                });
                if !eligible && entry.emit(ActionEvent::NoEligibleResource { action: *id }, &mut outbox) {
                    warn!(action = *id, "no registered worker can ever run this action");
                }
            }
        }
        let assignments = outbox.assignments.clone();
        self.flush(outbox);
        assignments
    }

    fn best_candidate(
        &self,
        actions: &HashMap<ActionId, ActionEntry>,
        ready: &BTreeSet<ActionId>,
        workers: &[WorkerSnapshot],
    ) -> Option<Candidate> {
        let mut best: Option<(Rank, Candidate)> = None;
        for id in ready {
            let Some(entry) = actions.get(id) else {
                continue;
            };
            for (w, worker) in workers.iter().enumerate() {
                for (i, implementation) in entry.action.implementations.iter().enumerate() {
                    if !worker.free.contains(&implementation.requirement) {
                        continue;
                    }
                    let rank = Rank {
                        score: self.policy.score(&entry.action, worker, implementation),
                        worker_seq: Reverse(worker.seq),
                        implementation: Reverse(i),
                    };
                    if best.as_ref().is_none_or(|(b, _)| rank > *b) {
                        best = Some((
                            rank,
                            Candidate {
                                action: *id,
                                worker: w,
                                implementation: i,
                            },
                        ));
                    }
                }
            }
        }
        best.map(|(_, c)| c)
    }

    /// Assigned → Running once execution started.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownAction`] unless the action is Assigned or Running.
    pub fn mark_running(&self, id: ActionId) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        let entry = state
            .actions
            .get_mut(&id)
            .filter(|e| e.state.holds_capacity())
            .ok_or(CoreError::UnknownAction(id))?;
        entry.state = ActionState::Running;
        debug!(action = id, "action running");
        Ok(())
    }

    /// A bound action finished: release its capacity, register its outputs
    /// and run a new pass.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownAction`] unless the action is Assigned or Running.
    pub fn on_completion(&self, id: ActionId, outputs: Vec<ProducedValue>) -> Result<(), CoreError> {
        let mut outbox = Outbox::default();
        {
            let mut state = self.state.lock();
            if !state.actions.get(&id).is_some_and(|e| e.state.holds_capacity()) {
                return Err(CoreError::UnknownAction(id));
            }
            let Some(mut entry) = state.actions.remove(&id) else {
                return Err(CoreError::UnknownAction(id));
            };
            state.unqueue(id, &entry);
            self.release_binding(&mut entry, &mut outbox);
            for value in &outputs {
                entry.emit(
                    ActionEvent::ValueProduced {
                        action: id,
                        name: value.name.clone(),
                        data_type: value.data_type.clone(),
                        location: value.location.clone(),
                    },
                    &mut outbox,
                );
            }
            entry.state = ActionState::Completed;
            entry.emit(ActionEvent::Completed { action: id }, &mut outbox);
            state.remember(id, ActionState::Completed, self.history_limit);
            info!(action = id, outputs = outputs.len(), "action completed");
        }
        for value in outputs {
            self.registry.add_location(&value.name, value.location);
        }
        self.flush(outbox);
        self.schedule_pass();
        Ok(())
    }

    /// A live action failed: release whatever it holds and report it.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownAction`] if the action is not live.
    pub fn on_failure(&self, id: ActionId, reason: FailureReason) -> Result<(), CoreError> {
        let mut outbox = Outbox::default();
        {
            let mut state = self.state.lock();
            let mut entry = state.actions.remove(&id).ok_or(CoreError::UnknownAction(id))?;
            state.unqueue(id, &entry);
            self.release_binding(&mut entry, &mut outbox);
            warn!(action = id, %reason, "action failed");
            entry.state = ActionState::Failed(reason.clone());
            entry.emit(ActionEvent::Failed { action: id, reason: reason.clone() }, &mut outbox);
            state.remember(id, ActionState::Failed(reason), self.history_limit);
        }
        self.flush(outbox);
        self.schedule_pass();
        Ok(())
    }

    /// Cancel an action. Returns `false` when it had already terminated.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownAction`] if the id was never seen (or fell out of
    /// the terminal history).
    pub fn cancel(&self, id: ActionId) -> Result<bool, CoreError> {
        let mut outbox = Outbox::default();
        {
            let mut state = self.state.lock();
            let Some(mut entry) = state.actions.remove(&id) else {
                return if state.past_state(id).is_some() {
                    Ok(false)
                } else {
                    Err(CoreError::UnknownAction(id))
                };
            };
            state.unqueue(id, &entry);
            self.release_binding(&mut entry, &mut outbox);
            entry.state = ActionState::Cancelled;
            entry.emit(ActionEvent::Cancelled { action: id }, &mut outbox);
            state.remember(id, ActionState::Cancelled, self.history_limit);
            info!(action = id, "action cancelled");
        }
        self.flush(outbox);
        self.schedule_pass();
        Ok(true)
    }

    fn release_binding(&self, entry: &mut ActionEntry, outbox: &mut Outbox) {
        let Some(key) = entry.binding.take() else {
            return;
        };
        match self.pool.release(&key, entry.action.id) {
            Ok(Some(released)) => {
                outbox.capacity.push((key, released.free));
                outbox.drained.extend(released.drained);
            }
            Ok(None) => debug!(action = entry.action.id, worker = %key, "worker already gone"),
            Err(err) => warn!(action = entry.action.id, worker = %key, %err, "release refused"),
        }
    }

    /// Current state of an action, live or recently terminated.
    pub fn action_state(&self, id: ActionId) -> Option<ActionState> {
        let state = self.state.lock();
        state
            .actions
            .get(&id)
            .map(|e| e.state.clone())
            .or_else(|| state.past_state(id).cloned())
    }

    /// Worker an action is bound to.
    pub fn binding_of(&self, id: ActionId) -> Option<WorkerKey> {
        self.state.lock().actions.get(&id).and_then(|e| e.binding.clone())
    }

    /// Number of Ready actions.
    pub fn ready_count(&self) -> usize {
        self.state.lock().ready.len()
    }

    /// Number of Blocked actions.
    pub fn blocked_count(&self) -> usize {
        self.state
            .lock()
            .actions
            .values()
            .filter(|e| e.state == ActionState::Blocked)
            .count()
    }

    /// Number of non-terminal actions.
    pub fn live_count(&self) -> usize {
        self.state.lock().actions.len()
    }

    /// Register capacity and run a pass.
    pub fn add_worker(
        &self,
        key: WorkerKey,
        description: &ResourceDescriptor,
        adaptor: AdaptorConfig,
    ) -> WorkerSnapshot {
        let snapshot = self.pool.add_worker(key, description, adaptor);
        self.notify_capacity(&snapshot.key, &snapshot.free);
        self.schedule_pass();
        snapshot
    }

    /// Shrink a worker.
    ///
    /// # Errors
    ///
    /// See [`ResourcePoolManager::reduce_worker`].
    pub fn reduce_worker(
        &self,
        key: &WorkerKey,
        reduction: &ResourceDescriptor,
    ) -> Result<WorkerSnapshot, CoreError> {
        let snapshot = self.pool.reduce_worker(key, reduction)?;
        self.notify_capacity(key, &snapshot.free);
        Ok(snapshot)
    }

    /// Gracefully remove a worker.
    ///
    /// # Errors
    ///
    /// See [`ResourcePoolManager::remove_whole_worker`].
    pub fn remove_whole_worker(
        &self,
        key: &WorkerKey,
        hook: Option<RemovalHook>,
    ) -> Result<RemovalStatus, CoreError> {
        let status = self.pool.remove_whole_worker(key, hook)?;
        if let RemovalStatus::Removed(removed) = &status {
            self.notify_capacity(key, &ResourceDescriptor::new());
            self.notify_removed(removed);
        }
        Ok(status)
    }

    /// Forcefully remove a worker; every action bound there fails with
    /// [`FailureReason::NodeLost`].
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownResource`] if the worker is not registered.
    pub fn notify_whole_worker_lost(&self, key: &WorkerKey) -> Result<LostWorker, CoreError> {
        let lost = self.pool.notify_whole_worker_lost(key)?;
        let mut outbox = Outbox::default();
        {
            let mut state = self.state.lock();
            for id in &lost.bound_actions {
                let bound_here = state
                    .actions
                    .get(id)
                    .is_some_and(|e| e.binding.as_ref() == Some(key));
                if !bound_here {
                    continue;
                }
                let Some(mut entry) = state.actions.remove(id) else {
                    continue;
                };
                entry.binding = None;
                entry.state = ActionState::Failed(FailureReason::NodeLost);
                entry.emit(
                    ActionEvent::Failed {
                        action: *id,
                        reason: FailureReason::NodeLost,
                    },
                    &mut outbox,
                );
                state.remember(*id, ActionState::Failed(FailureReason::NodeLost), self.history_limit);
                warn!(action = *id, worker = %key, error = %CoreError::NodeLost(key.to_string()), "action failed");
            }
        }
        outbox.capacity.push((key.clone(), ResourceDescriptor::new()));
        self.flush(outbox);
        self.notify_removed(&lost.removed);
        Ok(lost)
    }

    fn notify_capacity(&self, key: &WorkerKey, free: &ResourceDescriptor) {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener.on_capacity_change(key, free);
        }
    }

    fn flush(&self, outbox: Outbox) {
        for (monitor, event) in &outbox.events {
            monitor.on_event(event);
        }
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            for assignment in &outbox.assignments {
                listener.on_assignment(assignment);
            }
            for (key, free) in &outbox.capacity {
                listener.on_capacity_change(key, free);
            }
        }
        for worker in outbox.drained {
            if let Some(removed) = self.pool.complete_removal(&worker) {
                debug!(worker = %removed.key, rescues = removed.rescues.len(), "drained worker removed");
                self.notify_capacity(&removed.key, &ResourceDescriptor::new());
                let taken = self.notify_removed(&removed);
                if !removed.claimed && !taken {
                    for order in &removed.rescues {
                        error!(
                            worker = %removed.key,
                            data = %order.data,
                            host = %order.host,
                            source = %order.source,
                            "rescue owed but no hook or listener claimed it"
                        );
                    }
                }
            }
        }
    }

    /// Hand a removal record to the listener. True when it took the rescues.
    fn notify_removed(&self, removed: &RemovedWorker) -> bool {
        let listener = self.listener.read().clone();
        listener.is_some_and(|l| l.on_worker_removed(removed))
    }
}

impl AvailabilityListener for TaskScheduler {
    fn on_data_available(&self, name: &str) {
        let mut outbox = Outbox::default();
        let mut promoted = 0usize;
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(waiting) = state.blocked.remove(name) else {
                return;
            };
            for id in waiting {
                let Some(entry) = state.actions.get_mut(&id) else {
                    continue;
                };
                entry.missing.remove(name);
                if entry.missing.is_empty() && entry.state == ActionState::Blocked {
                    entry.state = ActionState::Ready;
                    entry.emit(ActionEvent::Ready { action: id }, &mut outbox);
                    state.ready.insert(id);
                    promoted += 1;
                }
            }
        }
        if promoted > 0 {
            debug!(data = name, promoted, "blocked actions promoted");
            self.flush(outbox);
            self.schedule_pass();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::monitor::RecordingMonitor;
    use crate::core::policy::FifoPolicy;
    use crate::data::DataLocation;

    fn scheduler() -> Arc<TaskScheduler> {
        let pool = Arc::new(ResourcePoolManager::new(Arc::new(DataRegistry::new())));
        TaskScheduler::new(pool, Box::new(FifoPolicy), 16)
    }

    fn cpu_task(cpus: u32) -> TaskSubmission {
        TaskSubmission::single(ResourceDescriptor::cpus(cpus), "run")
    }

    #[test]
    fn test_submit_binds_when_capacity_exists() {
        let s = scheduler();
        s.add_worker(WorkerKey::permanent("w1"), &ResourceDescriptor::cpus(2), AdaptorConfig::default());
        let monitor = Arc::new(RecordingMonitor::default());
        let id = s.submit(cpu_task(1), monitor.clone());
        assert_eq!(s.action_state(id), Some(ActionState::Assigned));
        assert_eq!(s.binding_of(id), Some(WorkerKey::permanent("w1")));
        let events = monitor.events();
        assert_eq!(events[0], ActionEvent::Created { action: id });
        assert_eq!(events[1], ActionEvent::Ready { action: id });
        assert!(matches!(events[2], ActionEvent::Assigned { .. }));
    }

    #[test]
    fn test_blocked_until_dependency_arrives() {
        let s = scheduler();
        s.add_worker(WorkerKey::permanent("w1"), &ResourceDescriptor::cpus(1), AdaptorConfig::default());
        let monitor = Arc::new(RecordingMonitor::default());
        let id = s.submit(cpu_task(1).reading("input"), monitor.clone());
        assert_eq!(s.action_state(id), Some(ActionState::Blocked));
        assert_eq!(s.blocked_count(), 1);

        s.registry().add_location("input", DataLocation::private("w1", "/in"));
        assert_eq!(s.action_state(id), Some(ActionState::Assigned));
        assert_eq!(s.blocked_count(), 0);
    }

    #[test]
    fn test_completion_releases_and_registers_outputs() {
        let s = scheduler();
        let key = WorkerKey::permanent("w1");
        s.add_worker(key.clone(), &ResourceDescriptor::cpus(1), AdaptorConfig::default());
        let monitor = Arc::new(RecordingMonitor::default());
        let first = s.submit(cpu_task(1), monitor.clone());
        let second = s.submit(cpu_task(1).reading("out"), monitor.clone());
        assert_eq!(s.action_state(second), Some(ActionState::Blocked));

        s.mark_running(first).unwrap();
        assert_eq!(s.action_state(first), Some(ActionState::Running));
        s.on_completion(first, vec![ProducedValue::new("out", "file", DataLocation::private("w1", "/o"))])
            .unwrap();

        assert_eq!(s.action_state(first), Some(ActionState::Completed));
        assert_eq!(s.action_state(second), Some(ActionState::Assigned));
        assert!(s.registry().is_available("out"));
        assert!(monitor
            .events_for(first)
            .iter()
            .any(|e| matches!(e, ActionEvent::ValueProduced { name, .. } if name == "out")));
        assert_eq!(s.on_completion(first, Vec::new()), Err(CoreError::UnknownAction(first)));
    }

    #[test]
    fn test_cancel_paths() {
        let s = scheduler();
        let key = WorkerKey::permanent("w1");
        s.add_worker(key.clone(), &ResourceDescriptor::cpus(1), AdaptorConfig::default());
        let monitor = Arc::new(RecordingMonitor::default());
        let bound = s.submit(cpu_task(1), monitor.clone());
        let waiting = s.submit(cpu_task(1), monitor.clone());
        assert_eq!(s.action_state(waiting), Some(ActionState::Ready));

        assert_eq!(s.cancel(waiting), Ok(true));
        assert_eq!(s.cancel(bound), Ok(true));
        assert_eq!(s.pool().worker(&key).unwrap().free, ResourceDescriptor::cpus(1));
        assert_eq!(s.cancel(bound), Ok(false));
        assert_eq!(s.cancel(999), Err(CoreError::UnknownAction(999)));
        assert_eq!(s.live_count(), 0);
    }

    #[test]
    fn test_no_eligible_reported_once() {
        let s = scheduler();
        s.add_worker(WorkerKey::permanent("small"), &ResourceDescriptor::cpus(1), AdaptorConfig::default());
        let monitor = Arc::new(RecordingMonitor::default());
        let id = s.submit(cpu_task(8), monitor.clone());
        s.schedule_pass();
        s.schedule_pass();
        let reports = monitor
            .events_for(id)
            .into_iter()
            .filter(|e| matches!(e, ActionEvent::NoEligibleResource { .. }))
            .count();
        assert_eq!(reports, 1);
        assert_eq!(s.action_state(id), Some(ActionState::Ready));

        s.add_worker(WorkerKey::permanent("big"), &ResourceDescriptor::cpus(8), AdaptorConfig::default());
        assert_eq!(s.action_state(id), Some(ActionState::Assigned));
    }

    #[test]
    fn test_lost_worker_fails_bound_actions() {
        let s = scheduler();
        let key = WorkerKey::permanent("w1");
        s.add_worker(key.clone(), &ResourceDescriptor::cpus(2), AdaptorConfig::default());
        let monitor = Arc::new(RecordingMonitor::default());
        let id = s.submit(cpu_task(1), monitor.clone());
        let lost = s.notify_whole_worker_lost(&key).unwrap();
        assert_eq!(lost.bound_actions, vec![id]);
        assert_eq!(
            s.action_state(id),
            Some(ActionState::Failed(FailureReason::NodeLost))
        );
        assert!(monitor.events_for(id).contains(&ActionEvent::Failed {
            action: id,
            reason: FailureReason::NodeLost,
        }));
    }

    #[test]
    fn test_graceful_removal_completes_on_last_release() {
        let s = scheduler();
        let key = WorkerKey::permanent("w1");
        s.add_worker(key.clone(), &ResourceDescriptor::cpus(1), AdaptorConfig::default());
        let id = s.submit(cpu_task(1), Arc::new(RecordingMonitor::default()));
        let done = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&done);
        let status = s
            .remove_whole_worker(&key, Some(Box::new(move |_: &crate::core::pool::RemovedWorker| *flag.lock() = true)))
            .unwrap();
        assert_eq!(status, RemovalStatus::Draining(1));
        assert!(!*done.lock());
        s.on_completion(id, Vec::new()).unwrap();
        assert!(*done.lock());
        assert!(s.pool().worker(&key).is_none());
    }

    #[test]
    fn test_history_is_bounded() {
        let pool = Arc::new(ResourcePoolManager::new(Arc::new(DataRegistry::new())));
        let s = TaskScheduler::new(pool, Box::new(FifoPolicy), 1);
        let monitor = Arc::new(RecordingMonitor::default());
        let a = s.submit(cpu_task(1), monitor.clone());
        let b = s.submit(cpu_task(1), monitor);
        s.cancel(a).unwrap();
        s.cancel(b).unwrap();
        assert_eq!(s.action_state(a), None);
        assert_eq!(s.action_state(b), Some(ActionState::Cancelled));
    }
}
