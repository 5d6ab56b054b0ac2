//! Configuration models for the scheduler and the orchestration node.

pub mod scheduler;

pub use scheduler::{PolicyConfig, SchedulerConfig};
