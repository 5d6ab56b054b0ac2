//! Distributed data registry: replica tracking, copy deduplication and
//! rescue decisions on host removal.
//!
//! Every [`LogicalData`] carries its own lock. Cross-datum indexes (host
//! back-references and shared disk mounts) have their own locks which are
//! only ever taken *after* a datum lock, never before, and no callback runs
//! while any of them is held.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::core::CoreError;
use crate::data::location::{DataLocation, SharedMounts};
use crate::data::logical_data::{
    CopyHandle, CopyId, CopyListener, CopyOutcome, CopyRecord, DataInfo, DataState, LogicalData,
};

/// Receives a notification when a datum gains its first replica.
pub trait AvailabilityListener: Send + Sync {
    /// `name` resolved to at least one location.
    fn on_data_available(&self, name: &str);
}

#[derive(Debug, Default)]
struct HostEntry {
    data: BTreeSet<String>,
    obsolete: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct DiskIndex {
    mounts: SharedMounts,
    data: HashMap<String, BTreeSet<String>>,
}

/// Notifications gathered under a datum lock and released after it.
#[derive(Default)]
struct Deferred {
    available: Vec<String>,
    listeners: Vec<(CopyListener, CopyOutcome)>,
    data: String,
}

/// Owner of every [`LogicalData`] and its replica locations.
#[derive(Default)]
pub struct DataRegistry {
    data: RwLock<HashMap<String, Arc<LogicalData>>>,
    hosts: RwLock<HashMap<String, HostEntry>>,
    disks: RwLock<DiskIndex>,
    next_copy: AtomicU64,
    listeners: RwLock<Vec<Weak<dyn AvailabilityListener>>>,
}

impl DataRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to first-replica notifications. Dropped listeners are pruned.
    pub fn subscribe(&self, listener: Weak<dyn AvailabilityListener>) {
        let mut listeners = self.listeners.write();
        listeners.retain(|l| l.strong_count() > 0);
        listeners.push(listener);
    }

    /// Get or create the datum called `name`.
    pub fn register(&self, name: &str) -> Arc<LogicalData> {
        if let Some(existing) = self.data.read().get(name) {
            return Arc::clone(existing);
        }
        let mut data = self.data.write();
        Arc::clone(data.entry(name.to_owned()).or_insert_with(|| {
            debug!(data = name, "registered logical data");
            Arc::new(LogicalData::new(name))
        }))
    }

    /// Look up a datum by any of its names.
    pub fn get(&self, name: &str) -> Option<Arc<LogicalData>> {
        self.data.read().get(name).cloned()
    }

    /// Number of registered names (aliases included).
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Make `alias` another name for the datum `existing`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownData`] if `existing` is not registered.
    pub fn link(&self, alias: &str, existing: &str) -> Result<Arc<LogicalData>, CoreError> {
        let datum = self
            .get(existing)
            .ok_or_else(|| CoreError::UnknownData(existing.to_owned()))?;
        self.data
            .write()
            .insert(alias.to_owned(), Arc::clone(&datum));
        let available = {
            let mut state = datum.lock();
            if !state.names.iter().any(|n| n == alias) {
                state.names.push(alias.to_owned());
            }
            !state.locations.is_empty()
        };
        debug!(alias, data = existing, "linked data alias");
        if available {
            self.notify_available(&[alias.to_owned()]);
        }
        Ok(datum)
    }

    /// True when `name` is registered and has at least one replica.
    pub fn is_available(&self, name: &str) -> bool {
        self.get(name).is_some_and(|d| d.is_available())
    }

    /// Snapshot of a datum.
    pub fn info(&self, name: &str) -> Option<DataInfo> {
        self.get(name).map(|d| d.info())
    }

    /// Record that `host` mounts `disk` at `mount_point`.
    pub fn mount_shared_disk(&self, disk: &str, host: &str, mount_point: &str) {
        self.disks.write().mounts.mount(disk, host, mount_point);
        debug!(disk, host, mount_point, "shared disk mounted");
    }

    /// Remove `host` from every shared disk it mounts.
    pub fn unmount_host(&self, host: &str) -> Vec<String> {
        self.disks.write().mounts.unmount_host(host)
    }

    /// Add a replica. Duplicate inserts are no-ops.
    ///
    /// Returns `true` when the location was new.
    pub fn add_location(&self, name: &str, location: DataLocation) -> bool {
        let datum = self.register(name);
        let mut deferred = Deferred::default();
        let added = {
            let mut state = datum.lock();
            self.insert_location(&datum, &mut state, location, &mut deferred)
        };
        self.release(deferred);
        added
    }

    fn insert_location(
        &self,
        datum: &LogicalData,
        state: &mut DataState,
        location: DataLocation,
        deferred: &mut Deferred,
    ) -> bool {
        let was_empty = state.locations.is_empty();
        if state.locations.contains(&location) {
            return false;
        }
        state.rescue_issued = false;
        match &location {
            DataLocation::Private { host, .. } => {
                self.hosts
                    .write()
                    .entry(host.clone())
                    .or_default()
                    .data
                    .insert(datum.name().to_owned());
            }
            DataLocation::Binding { host, id } => {
                if state.binding_id.is_none() {
                    state.binding_id = Some(id.clone());
                }
                self.hosts
                    .write()
                    .entry(host.clone())
                    .or_default()
                    .data
                    .insert(datum.name().to_owned());
            }
            DataLocation::Shared { disk, .. } => {
                self.disks
                    .write()
                    .data
                    .entry(disk.clone())
                    .or_default()
                    .insert(datum.name().to_owned());
            }
            DataLocation::Persistent { id } => {
                state.persistent_id = Some(id.clone());
            }
        }
        debug!(data = datum.name(), location = %location, "location added");
        state.locations.insert(location);
        if was_empty {
            deferred.available.extend(state.names.iter().cloned());
        }
        true
    }

    fn release(&self, deferred: Deferred) {
        for (listener, outcome) in deferred.listeners {
            listener(&deferred.data, &outcome);
        }
        if !deferred.available.is_empty() {
            self.notify_available(&deferred.available);
        }
    }

    fn notify_available(&self, names: &[String]) {
        let listeners: Vec<Arc<dyn AvailabilityListener>> =
            self.listeners.read().iter().filter_map(Weak::upgrade).collect();
        for listener in &listeners {
            for name in names {
                listener.on_data_available(name);
            }
        }
    }

    /// A location of `name` already present on `host`.
    ///
    /// Real copies on the host are preferred over a persistent location,
    /// which counts as present everywhere.
    pub fn resolve(&self, name: &str, host: &str) -> Option<DataLocation> {
        let datum = self.get(name)?;
        let state = datum.lock();
        let disks = self.disks.read();
        let mut persistent = None;
        for location in &state.locations {
            match location {
                DataLocation::Persistent { .. } => {
                    if persistent.is_none() {
                        persistent = Some(location.clone());
                    }
                }
                _ => {
                    if location.path_on(host, &disks.mounts).is_some() {
                        return Some(location.clone());
                    }
                }
            }
        }
        persistent
    }

    /// Paths through which `host` can read `name`.
    pub fn paths_on_host(&self, name: &str, host: &str) -> Vec<String> {
        let Some(datum) = self.get(name) else {
            return Vec::new();
        };
        let state = datum.lock();
        let disks = self.disks.read();
        state
            .locations
            .iter()
            .filter_map(|l| l.path_on(host, &disks.mounts))
            .collect()
    }

    /// Every host holding a replica of `name`.
    pub fn all_hosts(&self, name: &str) -> BTreeSet<String> {
        let Some(datum) = self.get(name) else {
            return BTreeSet::new();
        };
        let state = datum.lock();
        let disks = self.disks.read();
        hosts_of(&state, &disks.mounts)
    }

    /// Canonical names of every datum with a replica on `host`, directly or
    /// through a shared disk the host mounts.
    pub fn data_on_host(&self, host: &str) -> BTreeSet<String> {
        let mut names = self
            .hosts
            .read()
            .get(host)
            .map(|h| h.data.clone())
            .unwrap_or_default();
        let disks = self.disks.read();
        for disk in disks.mounts.disks_of(host) {
            if let Some(on_disk) = disks.data.get(&disk) {
                names.extend(on_disk.iter().cloned());
            }
        }
        names
    }

    /// Start copying `name` to `target`, or join the copy already in flight
    /// to the same target. `listener`, if given, is released when the copy
    /// finishes or fails.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownData`] if `name` is not registered.
    pub fn start_copy(
        &self,
        name: &str,
        target: DataLocation,
        listener: Option<CopyListener>,
    ) -> Result<CopyHandle, CoreError> {
        let datum = self
            .get(name)
            .ok_or_else(|| CoreError::UnknownData(name.to_owned()))?;
        let mut state = datum.lock();
        if let Some(record) = state.copies.iter_mut().find(|c| c.target == target) {
            record.listeners.extend(listener);
            debug!(data = datum.name(), copy = record.id, "joined copy in flight");
            return Ok(CopyHandle {
                id: record.id,
                data: datum.name().to_owned(),
                target,
                is_new: false,
            });
        }
        let id: CopyId = self.next_copy.fetch_add(1, Ordering::Relaxed) + 1;
        state.copies.push(CopyRecord {
            id,
            target: target.clone(),
            listeners: listener.into_iter().collect(),
        });
        debug!(data = datum.name(), copy = id, target = %target, "copy started");
        Ok(CopyHandle {
            id,
            data: datum.name().to_owned(),
            target,
            is_new: true,
        })
    }

    /// Attach a listener to an in-flight copy. Returns the listener back if
    /// the copy is no longer in flight.
    pub fn add_copy_listener(
        &self,
        handle: &CopyHandle,
        listener: CopyListener,
    ) -> Result<(), CopyListener> {
        let Some(datum) = self.get(&handle.data) else {
            return Err(listener);
        };
        let mut state = datum.lock();
        match state.copies.iter_mut().find(|c| c.id == handle.id) {
            Some(record) => {
                record.listeners.push(listener);
                Ok(())
            }
            None => Err(listener),
        }
    }

    /// Handles of every copy of `name` currently in flight.
    pub fn copies_in_progress(&self, name: &str) -> Vec<CopyHandle> {
        let Some(datum) = self.get(name) else {
            return Vec::new();
        };
        let state = datum.lock();
        state
            .copies
            .iter()
            .map(|c| CopyHandle {
                id: c.id,
                data: datum.name().to_owned(),
                target: c.target.clone(),
                is_new: false,
            })
            .collect()
    }

    /// Complete a copy: the target joins the replica set and every listener
    /// receives it. Returns `None` if the copy was already finished.
    pub fn finish_copy(&self, handle: &CopyHandle) -> Option<DataLocation> {
        let datum = self.get(&handle.data)?;
        let mut deferred = Deferred {
            data: datum.name().to_owned(),
            ..Deferred::default()
        };
        let location = {
            let mut state = datum.lock();
            let pos = state.copies.iter().position(|c| c.id == handle.id)?;
            let record = state.copies.remove(pos);
            self.insert_location(&datum, &mut state, record.target.clone(), &mut deferred);
            let outcome = CopyOutcome::Completed(record.target.clone());
            deferred
                .listeners
                .extend(record.listeners.into_iter().map(|l| (l, outcome.clone())));
            record.target
        };
        debug!(data = %deferred.data, copy = handle.id, "copy finished");
        self.release(deferred);
        Some(location)
    }

    /// Abandon a copy: listeners receive the failure. Returns `false` if the
    /// copy was not in flight.
    pub fn fail_copy(&self, handle: &CopyHandle, reason: &str) -> bool {
        let Some(datum) = self.get(&handle.data) else {
            return false;
        };
        let mut deferred = Deferred {
            data: datum.name().to_owned(),
            ..Deferred::default()
        };
        {
            let mut state = datum.lock();
            let Some(pos) = state.copies.iter().position(|c| c.id == handle.id) else {
                return false;
            };
            let record = state.copies.remove(pos);
            let outcome = CopyOutcome::Failed(reason.to_owned());
            deferred
                .listeners
                .extend(record.listeners.into_iter().map(|l| (l, outcome.clone())));
        }
        warn!(data = %deferred.data, copy = handle.id, reason, "copy failed");
        self.release(deferred);
        true
    }

    /// Drop every replica of `name` hosted on `host` and decide whether a
    /// rescue copy is owed.
    ///
    /// Returns the location to save elsewhere when the removal emptied the
    /// replica set of a non-persistent datum. A datum hands out at most one
    /// rescue location until a new replica is added, so a repeated call for
    /// the same removal returns `None`.
    pub fn remove_host_and_rescue(&self, name: &str, host: &str) -> Option<DataLocation> {
        let datum = self.get(name)?;
        let mut state = datum.lock();

        let mut private_copy = None;
        let mut binding_copy = None;
        let mut shared_copy = None;
        let mut removed = Vec::new();
        {
            let disks = self.disks.read();
            for location in &state.locations {
                match location {
                    DataLocation::Private { host: h, .. } if h == host => {
                        private_copy.get_or_insert_with(|| location.clone());
                        removed.push(location.clone());
                    }
                    DataLocation::Binding { host: h, .. } if h == host => {
                        binding_copy.get_or_insert_with(|| location.clone());
                        removed.push(location.clone());
                    }
                    DataLocation::Shared { disk, .. }
                        if disks.mounts.mount_point(disk, host).is_some()
                            && !disks.mounts.has_other_host(disk, host) =>
                    {
                        shared_copy.get_or_insert_with(|| location.clone());
                        removed.push(location.clone());
                    }
                    _ => {}
                }
            }
        }
        for location in &removed {
            state.locations.remove(location);
        }
        if let Some(entry) = self.hosts.write().get_mut(host) {
            entry.data.remove(datum.name());
        }
        if !removed.is_empty() {
            debug!(data = datum.name(), host, removed = removed.len(), "host locations removed");
        }

        if state.persistent_id.is_some() || state.rescue_issued {
            return None;
        }
        if removed.is_empty() || !state.locations.is_empty() {
            return None;
        }
        let rescue = private_copy.or(binding_copy).or(shared_copy)?;
        state.rescue_issued = true;
        warn!(data = datum.name(), host, location = %rescue, "last replica leaving, rescue owed");
        Some(rescue)
    }

    /// Flag `name` as superseded and queue it for lazy reclamation on every
    /// host holding it. The entity itself stays registered.
    pub fn mark_obsolete(&self, name: &str) -> bool {
        let Some(datum) = self.get(name) else {
            return false;
        };
        let mut state = datum.lock();
        state.obsolete = true;
        let holders = {
            let disks = self.disks.read();
            hosts_of(&state, &disks.mounts)
        };
        let mut hosts = self.hosts.write();
        for host in &holders {
            hosts
                .entry(host.clone())
                .or_default()
                .obsolete
                .insert(datum.name().to_owned());
        }
        info!(data = datum.name(), hosts = holders.len(), "data marked obsolete");
        true
    }

    /// Drain the obsolete queue of `host`.
    pub fn take_obsolete(&self, host: &str) -> Vec<String> {
        self.hosts
            .write()
            .get_mut(host)
            .map(|h| std::mem::take(&mut h.obsolete).into_iter().collect())
            .unwrap_or_default()
    }

    /// Forget the host's back-references and obsolete queue.
    pub fn forget_host(&self, host: &str) {
        self.hosts.write().remove(host);
    }

    /// Record whether the value is held in local memory.
    pub fn set_in_memory(&self, name: &str, in_memory: bool) {
        self.register(name).lock().in_memory = in_memory;
    }

    /// Record the datum's size in bytes.
    pub fn set_size(&self, name: &str, size: u64) {
        self.register(name).lock().size = size;
    }
}

fn hosts_of(state: &DataState, mounts: &SharedMounts) -> BTreeSet<String> {
    state
        .locations
        .iter()
        .flat_map(|l| l.resolve(mounts))
        .map(|(host, _)| host)
        .collect()
}
