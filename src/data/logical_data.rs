//! The registry's record of one named datum.

use std::collections::BTreeSet;
use std::fmt;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::data::location::DataLocation;

/// Identifier of an in-flight copy.
pub type CopyId = u64;

/// Outcome delivered to copy listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The copy finished; the datum now also lives here.
    Completed(DataLocation),
    /// The transfer failed.
    Failed(String),
}

/// Callback released when a copy finishes or fails.
pub type CopyListener = Box<dyn FnOnce(&str, &CopyOutcome) + Send>;

/// Handle to an in-flight copy.
///
/// Several callers asking for the same (datum, target) copy get handles with
/// the same id; only the first `start_copy` sees `is_new == true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyHandle {
    /// Copy identifier, unique per registry.
    pub id: CopyId,
    /// Canonical name of the datum being copied.
    pub data: String,
    /// Where the copy lands.
    pub target: DataLocation,
    /// False when this handle joined a copy already in flight.
    pub is_new: bool,
}

pub(crate) struct CopyRecord {
    pub(crate) id: CopyId,
    pub(crate) target: DataLocation,
    pub(crate) listeners: Vec<CopyListener>,
}

impl fmt::Debug for CopyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyRecord")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[derive(Debug, Default)]
pub(crate) struct DataState {
    /// Every name that refers to this datum: canonical first, then aliases.
    pub(crate) names: Vec<String>,
    pub(crate) in_memory: bool,
    pub(crate) size: u64,
    pub(crate) persistent_id: Option<String>,
    pub(crate) binding_id: Option<String>,
    pub(crate) locations: BTreeSet<DataLocation>,
    pub(crate) copies: Vec<CopyRecord>,
    pub(crate) obsolete: bool,
    /// Set when a rescue location was handed out; cleared by the next added location.
    pub(crate) rescue_issued: bool,
}

/// A named datum and everywhere it currently resides.
///
/// All mutable state sits behind the datum's own lock, so operations on
/// different data never contend.
#[derive(Debug)]
pub struct LogicalData {
    name: String,
    state: Mutex<DataState>,
}

impl LogicalData {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            state: Mutex::new(DataState {
                names: vec![name.to_owned()],
                ..DataState::default()
            }),
        }
    }

    /// Canonical name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, DataState> {
        self.state.lock()
    }

    /// Snapshot of the current replica set.
    pub fn locations(&self) -> Vec<DataLocation> {
        self.state.lock().locations.iter().cloned().collect()
    }

    /// True when at least one replica exists.
    pub fn is_available(&self) -> bool {
        !self.state.lock().locations.is_empty()
    }

    /// Point-in-time description of the datum.
    pub fn info(&self) -> DataInfo {
        let state = self.state.lock();
        DataInfo {
            name: self.name.clone(),
            aliases: state.names.iter().skip(1).cloned().collect(),
            locations: state.locations.iter().cloned().collect(),
            persistent_id: state.persistent_id.clone(),
            binding_id: state.binding_id.clone(),
            in_memory: state.in_memory,
            size: state.size,
            obsolete: state.obsolete,
            copies_in_flight: state.copies.len(),
        }
    }
}

/// Serializable snapshot of a [`LogicalData`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataInfo {
    /// Canonical name.
    pub name: String,
    /// Other names linked to the same datum.
    pub aliases: Vec<String>,
    /// Replica set.
    pub locations: Vec<DataLocation>,
    /// External persistent id, if durably stored.
    pub persistent_id: Option<String>,
    /// Binding object id, if any.
    pub binding_id: Option<String>,
    /// Value held in local memory.
    pub in_memory: bool,
    /// Size in bytes, zero when unknown.
    pub size: u64,
    /// Superseded by a newer version.
    pub obsolete: bool,
    /// Number of copies in flight.
    pub copies_in_flight: usize,
}
