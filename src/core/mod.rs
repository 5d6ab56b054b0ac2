//! Core scheduling abstractions and capacity accounting.

pub mod action;
pub mod error;
pub mod monitor;
pub mod policy;
pub mod pool;
pub mod resources;
pub mod scheduler;

pub use action::{
    ActionId, ActionState, AllocatableAction, FailureReason, HandlerRef, Implementation,
    ProducedValue, TaskSubmission,
};
pub use error::{AppResult, CoreError};
pub use monitor::{
    ActionEvent, ActionMonitor, ChannelMonitor, EventRecord, NoopMonitor, RecordingMonitor,
    SchedulerListener,
};
pub use policy::{DataLocalityPolicy, FifoPolicy, LoadBalancingPolicy, SchedulingPolicy, Score};
pub use pool::{
    AdaptorConfig, ApplicationId, LostWorker, RemovalHook, RemovalStatus, RemovedWorker,
    ResourcePoolManager, Worker, WorkerKey, WorkerSnapshot,
};
pub use resources::{ProcessorKind, ResourceDescriptor};
pub use scheduler::{Assignment, TaskScheduler};
