//! Capacity vectors over processor categories.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::CoreError;

/// Processor category a capacity is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    /// General purpose compute units.
    Cpu,
    /// GPU devices.
    Gpu,
    /// FPGA devices.
    Fpga,
    /// Any other accelerator.
    Other,
}

impl ProcessorKind {
    /// The category the master carve-out is taken from.
    pub const PRIMARY: Self = Self::Cpu;
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
            Self::Fpga => "fpga",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Unit count per processor category.
///
/// A category whose count reaches zero is dropped from the map, so two
/// descriptors describing the same capacity always compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<ProcessorKind, u32>",
    into = "BTreeMap<ProcessorKind, u32>"
)]
pub struct ResourceDescriptor {
    units: BTreeMap<ProcessorKind, u32>,
}

impl ResourceDescriptor {
    /// An empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder helper: set `kind` to `units` (zero removes the entry).
    #[must_use]
    pub fn with(mut self, kind: ProcessorKind, units: u32) -> Self {
        self.set(kind, units);
        self
    }

    /// Shorthand for a cpu-only descriptor.
    pub fn cpus(units: u32) -> Self {
        Self::new().with(ProcessorKind::Cpu, units)
    }

    /// Descriptor for the local machine: one cpu unit per logical core.
    pub fn local_node() -> Self {
        let cores = u32::try_from(num_cpus::get()).unwrap_or(u32::MAX);
        Self::cpus(cores)
    }

    /// Units available in `kind` (zero when absent).
    pub fn get(&self, kind: ProcessorKind) -> u32 {
        self.units.get(&kind).copied().unwrap_or(0)
    }

    /// Set `kind` to `units`, dropping the entry at zero.
    pub fn set(&mut self, kind: ProcessorKind, units: u32) {
        if units == 0 {
            self.units.remove(&kind);
        } else {
            self.units.insert(kind, units);
        }
    }

    /// True when no category holds any unit.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Iterate over `(kind, units)` pairs in category order.
    pub fn iter(&self) -> impl Iterator<Item = (ProcessorKind, u32)> + '_ {
        self.units.iter().map(|(k, v)| (*k, *v))
    }

    /// Total units across categories.
    pub fn total_units(&self) -> u64 {
        self.units.values().map(|v| u64::from(*v)).sum()
    }

    /// True when every category of `requirement` fits in `self`.
    pub fn contains(&self, requirement: &Self) -> bool {
        requirement.iter().all(|(kind, units)| self.get(kind) >= units)
    }

    /// Per-category sum of `self` and `other`.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.merge_in_place(other);
        out
    }

    /// Add `other` into `self`.
    pub fn merge_in_place(&mut self, other: &Self) {
        for (kind, units) in other.iter() {
            let sum = self.get(kind).saturating_add(units);
            self.set(kind, sum);
        }
    }

    /// Per-category difference `self - other`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CapacityUnderflow`] for the first category of
    /// `other` that exceeds what `self` holds.
    pub fn subtract(&self, other: &Self) -> Result<Self, CoreError> {
        let mut out = self.clone();
        out.subtract_in_place(other)?;
        Ok(out)
    }

    /// Subtract `other` from `self`; on error `self` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CapacityUnderflow`] when a category would go negative.
    pub fn subtract_in_place(&mut self, other: &Self) -> Result<(), CoreError> {
        for (kind, units) in other.iter() {
            let available = self.get(kind);
            if units > available {
                return Err(CoreError::CapacityUnderflow {
                    kind,
                    available,
                    requested: units,
                });
            }
        }
        for (kind, units) in other.iter() {
            let left = self.get(kind) - units;
            self.set(kind, left);
        }
        Ok(())
    }
}

impl From<BTreeMap<ProcessorKind, u32>> for ResourceDescriptor {
    fn from(units: BTreeMap<ProcessorKind, u32>) -> Self {
        units.into_iter().collect()
    }
}

impl From<ResourceDescriptor> for BTreeMap<ProcessorKind, u32> {
    fn from(d: ResourceDescriptor) -> Self {
        d.units
    }
}

impl FromIterator<(ProcessorKind, u32)> for ResourceDescriptor {
    fn from_iter<I: IntoIterator<Item = (ProcessorKind, u32)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (kind, units) in iter {
            let sum = out.get(kind).saturating_add(units);
            out.set(kind, sum);
        }
        out
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("{}");
        }
        f.write_str("{")?;
        for (i, (kind, units)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{kind}: {units}")?;
        }
        f.write_str("}")
    }
}
