//! Inbound agent surface: sessions, request models, and rescue execution on
//! an async runtime.

use std::future::Future;

pub mod agent;
pub mod api;
pub mod dispatch;
pub mod session;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_spawner;

pub use agent::Agent;
pub use api::{
    AgentStatus, NodeRequest, ReduceNodeRequest, RemoteDataRequest, RemoteSource, ResourceOffer,
    TaskRequest,
};
pub use dispatch::{RescueDispatcher, RescueSink};
pub use session::{SessionMonitor, SessionRegistry};
#[cfg(feature = "tokio-runtime")]
pub use tokio_spawner::TokioSpawner;

/// Abstraction for spawning background work on a runtime.
pub trait Spawn {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
