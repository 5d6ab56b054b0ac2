//! Request and response models of the agent surface.

use serde::{Deserialize, Serialize};

use crate::core::{AdaptorConfig, ApplicationId, ResourceDescriptor, TaskSubmission};
use crate::data::DataLocation;

/// A node offering capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOffer {
    /// Worker (and host) name.
    pub name: String,
    /// Offered capacity.
    #[serde(default)]
    pub description: ResourceDescriptor,
    /// Connection binding.
    #[serde(default)]
    pub adaptor: AdaptorConfig,
}

impl ResourceOffer {
    /// Offer `description` on `name` with the default adaptor.
    pub fn new(name: impl Into<String>, description: ResourceDescriptor) -> Self {
        Self {
            name: name.into(),
            description,
            adaptor: AdaptorConfig::default(),
        }
    }
}

/// Shrink a node's capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceNodeRequest {
    /// Worker name.
    pub name: String,
    /// Capacity to stop using.
    pub reduction: ResourceDescriptor,
    /// Owning application, `None` for the permanent pool.
    #[serde(default)]
    pub app: Option<ApplicationId>,
}

/// Remove (gracefully) or drop (lost) a whole node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRequest {
    /// Worker name.
    pub name: String,
    /// Owning application, `None` for the permanent pool.
    #[serde(default)]
    pub app: Option<ApplicationId>,
}

/// One place a remote datum can be read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteSource {
    /// A replica; `resource` registers its host if the pool does not know it.
    Location {
        /// Replica location.
        location: DataLocation,
        /// Host to register on first sight.
        #[serde(default)]
        resource: Option<ResourceOffer>,
    },
    /// The datum already exists locally under another name.
    LocalAlias {
        /// Existing data name.
        name: String,
    },
}

/// Import of a datum produced elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDataRequest {
    /// Name the datum is known by here.
    pub renaming: String,
    /// Candidate sources.
    pub sources: Vec<RemoteSource>,
}

/// Run one task as its own application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// The task itself.
    pub submission: TaskSubmission,
    /// Nodes usable by this application only.
    #[serde(default)]
    pub resources: Vec<ResourceOffer>,
    /// Inputs to import before submission.
    #[serde(default)]
    pub remote_data: Vec<RemoteDataRequest>,
}

/// Point-in-time summary of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Registered workers.
    pub workers: usize,
    /// Non-terminal actions.
    pub live_actions: usize,
    /// Ready actions waiting for capacity.
    pub ready_actions: usize,
    /// Open application sessions.
    pub sessions: usize,
    /// Active scheduling policy.
    pub policy: String,
}
