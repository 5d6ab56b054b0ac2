//! Elastic resource pool: worker registration, capacity accounting and
//! graceful or forced removal.
//!
//! Workers are keyed by `(name, scope)`. The worker name doubles as the host
//! name replica locations refer to, so several scoped workers can share one
//! host; a host's data is only rescued once the last of them is gone.
//!
//! Lock order is pool map → worker. Nothing here ever takes a scheduler or
//! datum lock while holding either, and removal hooks run with no lock held.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::action::ActionId;
use crate::core::resources::{ProcessorKind, ResourceDescriptor};
use crate::core::CoreError;
use crate::data::{DataRegistry, RescueOrder};

/// Identifier of a running application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub Uuid);

impl ApplicationId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Pool key of a worker: its name plus the application it is scoped to,
/// `None` for the permanent pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerKey {
    /// Worker (and host) name.
    pub name: String,
    /// Owning application, `None` for the permanent pool.
    pub scope: Option<ApplicationId>,
}

impl WorkerKey {
    /// Key in the permanent pool.
    pub fn permanent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: None,
        }
    }

    /// Key scoped to one application.
    pub fn scoped(name: impl Into<String>, app: ApplicationId) -> Self {
        Self {
            name: name.into(),
            scope: Some(app),
        }
    }
}

impl fmt::Display for WorkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(app) => write!(f, "{}_{app}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Opaque connection binding of a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptorConfig {
    /// Adaptor (transport) name.
    pub adaptor: String,
    /// Adaptor-specific properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl AdaptorConfig {
    /// Config for the named adaptor with no properties.
    pub fn named(adaptor: impl Into<String>) -> Self {
        Self {
            adaptor: adaptor.into(),
            properties: BTreeMap::new(),
        }
    }
}

/// What a removed worker leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedWorker {
    /// Key of the removed worker.
    pub key: WorkerKey,
    /// Capacity reclaimed from the pool.
    pub reclaimed: ResourceDescriptor,
    /// Data whose last replica was on the host and must be saved.
    pub rescues: Vec<RescueOrder>,
    /// True when the worker was lost rather than drained.
    pub forced: bool,
    /// True when at least one removal hook received this record.
    pub claimed: bool,
}

/// Callback fired once a worker has left the pool.
pub type RemovalHook = Box<dyn FnOnce(&RemovedWorker) + Send>;

/// Result of a graceful removal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalStatus {
    /// Nothing was bound; the worker is gone.
    Removed(RemovedWorker),
    /// Waiting for this many bound actions to finish.
    Draining(usize),
}

/// Result of a forced removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LostWorker {
    /// Actions that were Assigned or Running on the worker.
    pub bound_actions: Vec<ActionId>,
    /// The removal itself.
    pub removed: RemovedWorker,
}

/// Point-in-time view of a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    /// Pool key.
    pub key: WorkerKey,
    /// Registration order, used for deterministic tie-breaks.
    pub seq: u64,
    /// Free capacity.
    pub free: ResourceDescriptor,
    /// Schedulable capacity (free + reserved).
    pub total: ResourceDescriptor,
    /// Capacity withheld for the orchestration node.
    pub withheld: ResourceDescriptor,
    /// Number of actions currently bound.
    pub queue_depth: usize,
    /// Removal requested; no new bindings accepted.
    pub removing: bool,
}

impl WorkerSnapshot {
    /// Host name replica locations refer to.
    pub fn host(&self) -> &str {
        &self.key.name
    }
}

#[derive(Default)]
struct WorkerState {
    total: ResourceDescriptor,
    free: ResourceDescriptor,
    withheld: ResourceDescriptor,
    reservations: BTreeMap<ActionId, ResourceDescriptor>,
    removing: bool,
    gone: bool,
    hooks: Vec<RemovalHook>,
}

/// A schedulable resource pool entry.
pub struct Worker {
    key: WorkerKey,
    seq: u64,
    adaptor: AdaptorConfig,
    state: Mutex<WorkerState>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("key", &self.key)
            .field("seq", &self.seq)
            .field("adaptor", &self.adaptor.adaptor)
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// Pool key.
    pub const fn key(&self) -> &WorkerKey {
        &self.key
    }

    /// Adaptor binding.
    pub const fn adaptor(&self) -> &AdaptorConfig {
        &self.adaptor
    }

    /// Current view of the worker.
    pub fn snapshot(&self) -> WorkerSnapshot {
        let state = self.state.lock();
        WorkerSnapshot {
            key: self.key.clone(),
            seq: self.seq,
            free: state.free.clone(),
            total: state.total.clone(),
            withheld: state.withheld.clone(),
            queue_depth: state.reservations.len(),
            removing: state.removing,
        }
    }

    /// Actions currently bound here.
    pub fn bound_actions(&self) -> Vec<ActionId> {
        self.state.lock().reservations.keys().copied().collect()
    }
}

/// Outcome of releasing an action's capacity.
pub(crate) struct Released {
    pub(crate) free: ResourceDescriptor,
    /// Set when the release drained a worker awaiting graceful removal.
    pub(crate) drained: Option<Arc<Worker>>,
}

/// Owner of every [`Worker`] and its live capacity.
pub struct ResourcePoolManager {
    workers: RwLock<HashMap<WorkerKey, Arc<Worker>>>,
    next_seq: AtomicU64,
    registry: Arc<DataRegistry>,
    local_nodes: Vec<String>,
    withhold_master_unit: bool,
}

impl ResourcePoolManager {
    /// Create an empty pool whose removals rescue data through `registry`.
    pub fn new(registry: Arc<DataRegistry>) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            registry,
            local_nodes: Vec::new(),
            withhold_master_unit: true,
        }
    }

    /// Treat `name` as the local orchestration node.
    #[must_use]
    pub fn with_local_node(mut self, name: impl Into<String>) -> Self {
        self.local_nodes.push(name.into());
        self
    }

    /// Enable or disable the master carve-out.
    #[must_use]
    pub const fn with_master_withholding(mut self, enabled: bool) -> Self {
        self.withhold_master_unit = enabled;
        self
    }

    /// The data registry removals rescue through.
    pub fn registry(&self) -> &Arc<DataRegistry> {
        &self.registry
    }

    /// True when `name` designates the local orchestration node.
    pub fn is_local_node(&self, name: &str) -> bool {
        let host = host_part(name);
        name == "localhost"
            || host == "localhost"
            || self.local_nodes.iter().any(|n| n == name || n == host)
    }

    /// Register capacity for `key`, creating the worker on first use and
    /// growing it in place afterwards.
    pub fn add_worker(
        &self,
        key: WorkerKey,
        description: &ResourceDescriptor,
        adaptor: AdaptorConfig,
    ) -> WorkerSnapshot {
        let local = self.withhold_master_unit && self.is_local_node(&key.name);
        let mut workers = self.workers.write();
        let worker = Arc::clone(workers.entry(key.clone()).or_insert_with(|| {
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            info!(worker = %key, seq, adaptor = %adaptor.adaptor, "worker registered");
            Arc::new(Worker {
                key: key.clone(),
                seq,
                adaptor,
                state: Mutex::new(WorkerState::default()),
            })
        }));
        let mut state = worker.state.lock();
        drop(workers);

        let mut offered = description.clone();
        if local && state.withheld.get(ProcessorKind::PRIMARY) == 0 {
            let units = offered.get(ProcessorKind::PRIMARY);
            if units > 0 {
                offered.set(ProcessorKind::PRIMARY, units - 1);
                state.withheld.set(ProcessorKind::PRIMARY, 1);
                debug!(worker = %key, "withheld one {} unit for the orchestration node", ProcessorKind::PRIMARY);
            }
        }
        if state.removing {
            warn!(worker = %key, "capacity added to a worker pending removal");
        }
        state.total.merge_in_place(&offered);
        state.free.merge_in_place(&offered);
        info!(worker = %key, added = %offered, total = %state.total, "worker capacity increased");
        drop(state);
        worker.snapshot()
    }

    /// Shrink the capacity of `key` by `reduction`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownResource`] if the worker is not registered,
    /// [`CoreError::CapacityUnderflow`] if the reduction exceeds free capacity.
    pub fn reduce_worker(
        &self,
        key: &WorkerKey,
        reduction: &ResourceDescriptor,
    ) -> Result<WorkerSnapshot, CoreError> {
        let worker = self.lookup(key)?;
        {
            let mut state = worker.state.lock();
            state.free.subtract_in_place(reduction)?;
            state.total.subtract_in_place(reduction)?;
            info!(worker = %key, removed = %reduction, total = %state.total, "worker capacity reduced");
        }
        Ok(worker.snapshot())
    }

    /// Gracefully remove `key`: new bindings are refused immediately and the
    /// worker leaves once every bound action finished. `hook` fires on the
    /// thread that completes the removal.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownResource`] if the worker is not registered.
    pub fn remove_whole_worker(
        &self,
        key: &WorkerKey,
        hook: Option<RemovalHook>,
    ) -> Result<RemovalStatus, CoreError> {
        let worker = self.lookup(key)?;
        let pending = {
            let mut state = worker.state.lock();
            state.removing = true;
            state.hooks.extend(hook);
            state.reservations.len()
        };
        if pending > 0 {
            info!(worker = %key, pending, "worker draining before removal");
            return Ok(RemovalStatus::Draining(pending));
        }
        self.complete_removal(&worker)
            .map(RemovalStatus::Removed)
            .ok_or_else(|| CoreError::UnknownResource(key.to_string()))
    }

    /// Forcefully remove `key` without waiting for bound actions.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownResource`] if the worker is not registered.
    pub fn notify_whole_worker_lost(&self, key: &WorkerKey) -> Result<LostWorker, CoreError> {
        let worker = self
            .workers
            .write()
            .remove(key)
            .ok_or_else(|| CoreError::UnknownResource(key.to_string()))?;
        let (bound_actions, reclaimed, hooks) = {
            let mut state = worker.state.lock();
            state.gone = true;
            state.removing = true;
            let bound: Vec<ActionId> = std::mem::take(&mut state.reservations).into_keys().collect();
            state.free = ResourceDescriptor::new();
            let reclaimed = std::mem::take(&mut state.total);
            (bound, reclaimed, std::mem::take(&mut state.hooks))
        };
        warn!(worker = %key, bound = bound_actions.len(), "worker lost");
        let removed = RemovedWorker {
            key: key.clone(),
            reclaimed,
            rescues: self.rescue_host(&key.name),
            forced: true,
            claimed: !hooks.is_empty(),
        };
        for hook in hooks {
            hook(&removed);
        }
        Ok(LostWorker {
            bound_actions,
            removed,
        })
    }

    /// Finish a graceful removal once the worker is drained. Returns `None`
    /// if the worker already left the pool.
    pub(crate) fn complete_removal(&self, worker: &Arc<Worker>) -> Option<RemovedWorker> {
        {
            let mut workers = self.workers.write();
            match workers.get(&worker.key) {
                Some(current) if Arc::ptr_eq(current, worker) => {
                    workers.remove(&worker.key);
                }
                _ => return None,
            }
        }
        let (reclaimed, hooks) = {
            let mut state = worker.state.lock();
            state.gone = true;
            state.free = ResourceDescriptor::new();
            let reclaimed = std::mem::take(&mut state.total);
            (reclaimed, std::mem::take(&mut state.hooks))
        };
        info!(worker = %worker.key, reclaimed = %reclaimed, "worker removed");
        let removed = RemovedWorker {
            key: worker.key.clone(),
            reclaimed,
            rescues: self.rescue_host(&worker.key.name),
            forced: false,
            claimed: !hooks.is_empty(),
        };
        for hook in hooks {
            hook(&removed);
        }
        Some(removed)
    }

    /// Rescue orders for a host nobody serves any more.
    fn rescue_host(&self, host: &str) -> Vec<RescueOrder> {
        if self.workers.read().keys().any(|k| k.name == host) {
            debug!(host, "host still served by another worker, no rescue");
            return Vec::new();
        }
        let mut orders = Vec::new();
        for name in self.registry.data_on_host(host) {
            if let Some(source) = self.registry.remove_host_and_rescue(&name, host) {
                orders.push(RescueOrder {
                    data: name,
                    host: host.to_owned(),
                    source,
                });
            }
        }
        self.registry.unmount_host(host);
        self.registry.forget_host(host);
        if !orders.is_empty() {
            warn!(host, owed = orders.len(), "rescue copies owed for departing host");
        }
        orders
    }

    /// Atomically reserve `requirement` on `key` for `action`. Returns the
    /// new free capacity, or `None` when the worker is gone, draining or too
    /// small. Nothing is reserved on `None`.
    pub(crate) fn try_reserve(
        &self,
        key: &WorkerKey,
        action: ActionId,
        requirement: &ResourceDescriptor,
    ) -> Option<ResourceDescriptor> {
        let worker = self.workers.read().get(key).cloned()?;
        let mut state = worker.state.lock();
        if state.gone || state.removing || !state.free.contains(requirement) {
            return None;
        }
        state.free.subtract_in_place(requirement).ok()?;
        state.reservations.insert(action, requirement.clone());
        Some(state.free.clone())
    }

    /// Return the capacity `action` holds on `key`.
    ///
    /// Returns `Ok(None)` when the worker already left the pool (its
    /// reservations went with it).
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownAction`] if the action holds nothing there, which
    /// means a double release.
    pub(crate) fn release(
        &self,
        key: &WorkerKey,
        action: ActionId,
    ) -> Result<Option<Released>, CoreError> {
        let Some(worker) = self.workers.read().get(key).cloned() else {
            return Ok(None);
        };
        let mut state = worker.state.lock();
        if state.gone {
            return Ok(None);
        }
        let held = state
            .reservations
            .remove(&action)
            .ok_or(CoreError::UnknownAction(action))?;
        state.free.merge_in_place(&held);
        let drained = state.removing && state.reservations.is_empty();
        let free = state.free.clone();
        drop(state);
        Ok(Some(Released {
            free,
            drained: drained.then(|| Arc::clone(&worker)),
        }))
    }

    fn lookup(&self, key: &WorkerKey) -> Result<Arc<Worker>, CoreError> {
        self.workers
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| CoreError::UnknownResource(key.to_string()))
    }

    /// View of one worker.
    pub fn worker(&self, key: &WorkerKey) -> Option<WorkerSnapshot> {
        self.workers.read().get(key).map(|w| w.snapshot())
    }

    /// Handle to one worker.
    pub fn get(&self, key: &WorkerKey) -> Option<Arc<Worker>> {
        self.workers.read().get(key).cloned()
    }

    /// Views of every worker in registration order.
    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        let workers: Vec<Arc<Worker>> = self.workers.read().values().cloned().collect();
        let mut snapshots: Vec<WorkerSnapshot> = workers.iter().map(|w| w.snapshot()).collect();
        snapshots.sort_by_key(|s| s.seq);
        snapshots
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    /// True when the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.workers.read().is_empty()
    }

    /// Keys of every worker scoped to `app`.
    pub fn workers_of(&self, app: ApplicationId) -> Vec<WorkerKey> {
        let mut keys: Vec<WorkerKey> = self
            .workers
            .read()
            .keys()
            .filter(|k| k.scope == Some(app))
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

/// Host component of a worker name that may be written as a URL.
fn host_part(name: &str) -> &str {
    let rest = name.split_once("://").map_or(name, |(_, r)| r);
    let rest = rest.split('/').next().unwrap_or(rest);
    rest.rsplit_once(':').map_or(rest, |(h, _)| h)
}
