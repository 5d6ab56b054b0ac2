//! Per-action event sinks.
//!
//! Provides a no-op monitor, a bounded in-memory recorder for testing and dev,
//! and a channel-backed monitor for consumers on another thread.

use std::collections::VecDeque;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::action::{ActionId, FailureReason};
use crate::core::pool::{RemovedWorker, WorkerKey};
use crate::core::resources::ResourceDescriptor;
use crate::data::DataLocation;
use crate::util::clock::now_ms;

/// Lifecycle notification for one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ActionEvent {
    /// The action was accepted.
    Created {
        /// Action id.
        action: ActionId,
    },
    /// All dependencies are satisfied.
    Ready {
        /// Action id.
        action: ActionId,
    },
    /// Bound to a worker.
    Assigned {
        /// Action id.
        action: ActionId,
        /// Worker the action was bound to.
        worker: WorkerKey,
        /// Index of the chosen implementation.
        implementation: usize,
    },
    /// The action produced a datum.
    ValueProduced {
        /// Action id.
        action: ActionId,
        /// Data name.
        name: String,
        /// Caller-defined type tag.
        data_type: String,
        /// Where the value lives.
        location: DataLocation,
    },
    /// No implementation fits any registered worker.
    NoEligibleResource {
        /// Action id.
        action: ActionId,
    },
    /// Finished successfully.
    Completed {
        /// Action id.
        action: ActionId,
    },
    /// Finished with a failure.
    Failed {
        /// Action id.
        action: ActionId,
        /// Why it failed.
        reason: FailureReason,
    },
    /// Cancelled by a caller.
    Cancelled {
        /// Action id.
        action: ActionId,
    },
}

impl ActionEvent {
    /// The action this event is about.
    pub const fn action(&self) -> ActionId {
        match self {
            Self::Created { action }
            | Self::Ready { action }
            | Self::Assigned { action, .. }
            | Self::ValueProduced { action, .. }
            | Self::NoEligibleResource { action }
            | Self::Completed { action }
            | Self::Failed { action, .. }
            | Self::Cancelled { action } => *action,
        }
    }

    /// True for Completed, Failed and Cancelled.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }

    /// Bit used to enforce at-most-once delivery per variant.
    /// `ValueProduced` is per output and has no bit.
    pub(crate) const fn once_bit(&self) -> u8 {
        match self {
            Self::Created { .. } => 1,
            Self::Ready { .. } => 1 << 1,
            Self::Assigned { .. } => 1 << 2,
            Self::ValueProduced { .. } => 0,
            Self::NoEligibleResource { .. } => 1 << 3,
            Self::Completed { .. } => 1 << 4,
            Self::Failed { .. } => 1 << 5,
            Self::Cancelled { .. } => 1 << 6,
        }
    }
}

/// Event sink attached to an action at submission.
///
/// Events may be delivered from any thread, never while scheduler state is
/// locked, so implementations may call back into the scheduler.
pub trait ActionMonitor: Send + Sync {
    /// Receive one event.
    fn on_event(&self, event: &ActionEvent);
}

/// Monitor that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl ActionMonitor for NoopMonitor {
    fn on_event(&self, _event: &ActionEvent) {}
}

/// Event plus the time it was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// The event.
    pub event: ActionEvent,
    /// Milliseconds since epoch.
    pub recorded_at_ms: u128,
}

/// In-memory monitor with a bounded buffer, for testing and dev.
pub struct RecordingMonitor {
    events: Mutex<VecDeque<EventRecord>>,
    max_events: usize,
}

impl RecordingMonitor {
    /// Create a recorder keeping at most `max_events` records.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events,
        }
    }

    /// Snapshot of stored records.
    pub fn records(&self) -> Vec<EventRecord> {
        self.events.lock().iter().cloned().collect()
    }

    /// Snapshot of stored events.
    pub fn events(&self) -> Vec<ActionEvent> {
        self.events.lock().iter().map(|r| r.event.clone()).collect()
    }

    /// Events concerning `action`.
    pub fn events_for(&self, action: ActionId) -> Vec<ActionEvent> {
        self.events
            .lock()
            .iter()
            .filter(|r| r.event.action() == action)
            .map(|r| r.event.clone())
            .collect()
    }
}

impl Default for RecordingMonitor {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl ActionMonitor for RecordingMonitor {
    fn on_event(&self, event: &ActionEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(EventRecord {
            event: event.clone(),
            recorded_at_ms: now_ms(),
        });
    }
}

/// Monitor forwarding every event into a channel.
#[derive(Clone)]
pub struct ChannelMonitor {
    tx: Sender<ActionEvent>,
}

impl ChannelMonitor {
    /// Create a monitor and the receiving end of its channel.
    pub fn channel() -> (Self, Receiver<ActionEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl ActionMonitor for ChannelMonitor {
    fn on_event(&self, event: &ActionEvent) {
        if self.tx.send(event.clone()).is_err() {
            tracing::debug!(action = event.action(), "event receiver dropped");
        }
    }
}

/// Scheduler-wide observer of binding decisions and capacity changes.
pub trait SchedulerListener: Send + Sync {
    /// An action was bound to a worker.
    fn on_assignment(&self, assignment: &crate::core::scheduler::Assignment);

    /// The free capacity of a worker changed.
    fn on_capacity_change(&self, _worker: &WorkerKey, _free: &ResourceDescriptor) {}

    /// A worker left the pool. Return `true` to take over its rescue
    /// orders; unclaimed orders of a drained worker are logged as errors.
    fn on_worker_removed(&self, _removed: &RemovedWorker) -> bool {
        false
    }
}
