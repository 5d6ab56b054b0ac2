//! Error types for pool, scheduler and registry operations.

use thiserror::Error;

use crate::core::action::ActionId;
use crate::core::resources::ProcessorKind;

/// Errors produced by the runtime core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The `(name, scope)` pair is not registered in the pool.
    #[error("unknown resource: {0}")]
    UnknownResource(String),
    /// A reduction or release would drive a category below zero.
    #[error("capacity underflow on {kind}: requested {requested}, available {available}")]
    CapacityUnderflow {
        /// Category that would underflow.
        kind: ProcessorKind,
        /// Units currently available in that category.
        available: u32,
        /// Units the caller tried to remove.
        requested: u32,
    },
    /// No implementation of the action fits any registered worker.
    #[error("no eligible resource for action {0}")]
    NoEligibleResource(ActionId),
    /// The worker vanished while actions were bound to it.
    #[error("node lost: {0}")]
    NodeLost(String),
    /// A rescue copy was owed but the transfer executing it failed.
    #[error("rescue of data `{data}` failed: {reason}")]
    DataRescueFailure {
        /// Name of the datum whose last replica could not be saved.
        data: String,
        /// Failure reported by the transfer.
        reason: String,
    },
    /// The action id is not tracked (never submitted or already reported).
    #[error("unknown action: {0}")]
    UnknownAction(ActionId),
    /// No session is registered for the application id.
    #[error("unknown application: {0}")]
    UnknownApplication(String),
    /// The data name is not registered.
    #[error("unknown data: {0}")]
    UnknownData(String),
    /// A remote data import could not add a single source location.
    #[error("could not add any source for data {0}")]
    NoDataSources(String),
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
