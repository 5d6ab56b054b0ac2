//! Builders to construct scheduler components from configuration.

pub mod runtime_builder;

pub use runtime_builder::{build_agent, build_policy, build_scheduler};
