//! # Elastic Runtime Core
//!
//! The runtime core of a distributed task-parallel execution platform: an
//! elastic resource pool, a pluggable task scheduler, and a distributed data
//! registry that never silently loses the last replica of a datum.
//!
//! ## Subsystems
//!
//! - **Resource pool** ([`core::pool`]): workers register, grow, shrink and
//!   leave at runtime. Graceful removal drains bound actions first; forced
//!   removal fails them with `NodeLost`.
//! - **Task scheduler** ([`core::scheduler`]): actions wait Blocked on missing
//!   data, become Ready, and are bound to the best (worker, implementation)
//!   according to a [`core::SchedulingPolicy`].
//! - **Data registry** ([`data`]): replica locations, copy deduplication and
//!   rescue decisions when a host leaves.
//! - **Agent** ([`runtime::Agent`]): the inbound surface, with one session per
//!   running application.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use elastic_runtime_core::builders::build_scheduler;
//! use elastic_runtime_core::config::SchedulerConfig;
//! use elastic_runtime_core::core::{
//!     AdaptorConfig, RecordingMonitor, ResourceDescriptor, TaskSubmission, WorkerKey,
//! };
//!
//! let scheduler = build_scheduler(&SchedulerConfig::default())?;
//! scheduler.add_worker(
//!     WorkerKey::permanent("node1"),
//!     &ResourceDescriptor::cpus(4),
//!     AdaptorConfig::named("comm"),
//! );
//! let monitor = Arc::new(RecordingMonitor::default());
//! let id = scheduler.submit(TaskSubmission::single(ResourceDescriptor::cpus(2), "app.task"), monitor);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Configuration models for the scheduler.
pub mod config;
/// Resources, actions, policies, the pool and the scheduler.
pub mod core;
/// Replica tracking and rescue.
pub mod data;
/// Agent facade, sessions and runtime adapters.
pub mod runtime;
/// Shared utilities.
pub mod util;
