//! Schedulable actions and the submission model that creates them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::resources::ResourceDescriptor;
use crate::data::DataLocation;

/// Monotonic action identifier.
pub type ActionId = u64;

/// Opaque reference to the code that runs an implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerRef(pub String);

impl From<&str> for HandlerRef {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// One concrete way to execute an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Capacity the implementation occupies while bound.
    pub requirement: ResourceDescriptor,
    /// Opaque handler, invocation is the caller's concern.
    pub handler: HandlerRef,
}

impl Implementation {
    /// Build an implementation from its requirement and handler.
    pub fn new(requirement: ResourceDescriptor, handler: impl Into<HandlerRef>) -> Self {
        Self {
            requirement,
            handler: handler.into(),
        }
    }
}

/// Lifecycle state of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    /// Waiting on at least one data dependency.
    Blocked,
    /// Dependencies satisfied, not yet bound.
    Ready,
    /// Bound to a worker, capacity reserved.
    Assigned,
    /// Execution started on the bound worker.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with a failure.
    Failed(FailureReason),
    /// Cancelled by a caller.
    Cancelled,
}

impl ActionState {
    /// True for Completed, Failed and Cancelled.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::Cancelled)
    }

    /// True while the action holds capacity on a worker.
    pub const fn holds_capacity(&self) -> bool {
        matches!(self, Self::Assigned | Self::Running)
    }
}

/// Why an action failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The worker it was bound to vanished.
    NodeLost,
    /// The execution reported an error.
    Execution(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeLost => f.write_str("node lost"),
            Self::Execution(msg) => write!(f, "execution error: {msg}"),
        }
    }
}

/// Inbound task submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSubmission {
    /// Candidate implementations in preference order.
    pub implementations: Vec<Implementation>,
    /// Names of data the task reads.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Names of data the task is expected to produce.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Ordering hint, higher is scheduled first.
    #[serde(default)]
    pub priority: i32,
    /// Secondary ordering hint for grouped/nested tasks.
    #[serde(default)]
    pub group_priority: i32,
}

impl TaskSubmission {
    /// Submission with a single implementation.
    pub fn single(requirement: ResourceDescriptor, handler: impl Into<HandlerRef>) -> Self {
        Self {
            implementations: vec![Implementation::new(requirement, handler)],
            ..Self::default()
        }
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the group priority.
    #[must_use]
    pub const fn with_group_priority(mut self, group_priority: i32) -> Self {
        self.group_priority = group_priority;
        self
    }

    /// Add a data dependency.
    #[must_use]
    pub fn reading(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Declare a produced datum.
    #[must_use]
    pub fn producing(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }
}

/// Immutable view of a submitted action, as seen by scoring policies.
#[derive(Debug, Clone)]
pub struct AllocatableAction {
    /// Action identifier.
    pub id: ActionId,
    /// Ordering hint.
    pub priority: i32,
    /// Secondary ordering hint.
    pub group_priority: i32,
    /// Submission sequence number.
    pub sequence: u64,
    /// Candidate implementations.
    pub implementations: Vec<Implementation>,
    /// Data names the action reads.
    pub dependencies: Vec<String>,
    /// Data names the action produces.
    pub outputs: Vec<String>,
}

impl AllocatableAction {
    pub(crate) fn from_submission(id: ActionId, sequence: u64, s: TaskSubmission) -> Self {
        Self {
            id,
            priority: s.priority,
            group_priority: s.group_priority,
            sequence,
            implementations: s.implementations,
            dependencies: s.dependencies,
            outputs: s.outputs,
        }
    }
}

/// A value an action produced, reported on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducedValue {
    /// Data name.
    pub name: String,
    /// Caller-defined type tag.
    pub data_type: String,
    /// Where the value now lives.
    pub location: DataLocation,
}

impl ProducedValue {
    /// Build a produced value.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, location: DataLocation) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            location,
        }
    }
}
