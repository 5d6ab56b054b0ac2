//! Distributed data registry: logical data, replica locations, copies and rescue.

pub mod location;
pub mod logical_data;
pub mod registry;
pub mod rescue;

pub use location::{DataLocation, SharedMounts};
pub use logical_data::{CopyHandle, CopyId, CopyListener, CopyOutcome, DataInfo, LogicalData};
pub use registry::{AvailabilityListener, DataRegistry};
pub use rescue::{perform_rescues, DataTransfer, RescueOrder, RescueReport};
