//! The agent facade: the inbound surface applications and node managers
//! talk to.
//!
//! Node requests are keyed by `(name, application)`. When an application id
//! is given the node is the ephemeral worker of that application and the
//! session must be open; without one the permanent pool is addressed.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::core::{
    ActionId, ActionMonitor, ApplicationId, CoreError, LostWorker, ProcessorKind, RemovalHook,
    RemovalStatus, RemovedWorker, TaskScheduler, WorkerKey, WorkerSnapshot,
};
use crate::data::RescueOrder;
use crate::runtime::api::{
    AgentStatus, NodeRequest, ReduceNodeRequest, RemoteDataRequest, RemoteSource, ResourceOffer,
    TaskRequest,
};
use crate::runtime::dispatch::RescueSink;
use crate::runtime::session::{SessionMonitor, SessionRegistry};

struct AgentInner {
    scheduler: Arc<TaskScheduler>,
    sessions: SessionRegistry,
    rescue: RwLock<Option<Arc<dyn RescueSink>>>,
}

impl AgentInner {
    fn dispatch_rescues(&self, orders: Vec<RescueOrder>) {
        if orders.is_empty() {
            return;
        }
        let sink = self.rescue.read().clone();
        match sink {
            Some(sink) => sink.dispatch(orders),
            None => {
                for order in &orders {
                    warn!(
                        data = %order.data,
                        host = %order.host,
                        source = %order.source,
                        "rescue owed but no transfer is configured"
                    );
                }
            }
        }
    }

    fn end_session(self: &Arc<Self>, app: ApplicationId) {
        let Some(nodes) = self.sessions.finish(app) else {
            return;
        };
        for key in nodes {
            match self.scheduler.remove_whole_worker(&key, Some(rescue_hook(self))) {
                Ok(status) => debug!(worker = %key, ?status, "session node released"),
                Err(err) => debug!(worker = %key, %err, "session node already gone"),
            }
        }
    }
}

/// Dispatches rescues of graceful removals; forced ones are dispatched by
/// [`Agent::lost_node`].
fn rescue_hook(inner: &Arc<AgentInner>) -> RemovalHook {
    let weak: Weak<AgentInner> = Arc::downgrade(inner);
    Box::new(move |removed: &RemovedWorker| {
        if removed.forced {
            return;
        }
        if let Some(inner) = weak.upgrade() {
            inner.dispatch_rescues(removed.rescues.clone());
        }
    })
}

/// Inbound surface over a [`TaskScheduler`].
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    /// Agent over `scheduler` with no rescue transfer.
    pub fn new(scheduler: Arc<TaskScheduler>) -> Self {
        Self {
            inner: Arc::new(AgentInner {
                scheduler,
                sessions: SessionRegistry::new(),
                rescue: RwLock::new(None),
            }),
        }
    }

    /// Route rescue orders of departing nodes to `sink`.
    pub fn set_rescue_sink(&self, sink: Arc<dyn RescueSink>) {
        *self.inner.rescue.write() = Some(sink);
    }

    /// The scheduler behind the agent.
    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.inner.scheduler
    }

    /// Open application sessions.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    fn key_for(&self, name: &str, app: Option<ApplicationId>) -> Result<WorkerKey, CoreError> {
        match app {
            Some(app) => {
                self.inner.sessions.ensure(app)?;
                Ok(WorkerKey::scoped(name, app))
            }
            None => Ok(WorkerKey::permanent(name)),
        }
    }

    /// Add capacity, to the permanent pool or to an application.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownApplication`] if `app` has no open session.
    pub fn add_resources(
        &self,
        offer: ResourceOffer,
        app: Option<ApplicationId>,
    ) -> Result<WorkerSnapshot, CoreError> {
        let key = self.key_for(&offer.name, app)?;
        info!(worker = %key, offered = %offer.description, "adding resources");
        let snapshot = self
            .inner
            .scheduler
            .add_worker(key.clone(), &offer.description, offer.adaptor);
        if let Some(app) = app {
            self.inner.sessions.add_node(app, key)?;
        }
        Ok(snapshot)
    }

    /// Stop using part of a node.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownApplication`], [`CoreError::UnknownResource`] or
    /// [`CoreError::CapacityUnderflow`].
    pub fn remove_resources(&self, request: &ReduceNodeRequest) -> Result<WorkerSnapshot, CoreError> {
        let key = self.key_for(&request.name, request.app)?;
        info!(worker = %key, reduction = %request.reduction, "removing resources");
        self.inner.scheduler.reduce_worker(&key, &request.reduction)
    }

    /// Stop using a whole node once its bound actions finish.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownApplication`] or [`CoreError::UnknownResource`].
    pub fn remove_node(&self, request: &NodeRequest) -> Result<RemovalStatus, CoreError> {
        let key = self.key_for(&request.name, request.app)?;
        info!(worker = %key, "removing node");
        self.inner
            .scheduler
            .remove_whole_worker(&key, Some(rescue_hook(&self.inner)))
    }

    /// Drop a node the agent lost contact with. Bound actions fail with
    /// `NodeLost` and owed rescues are dispatched.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownApplication`] or [`CoreError::UnknownResource`].
    pub fn lost_node(&self, request: &NodeRequest) -> Result<LostWorker, CoreError> {
        let key = self.key_for(&request.name, request.app)?;
        let lost = self.inner.scheduler.notify_whole_worker_lost(&key)?;
        warn!(worker = %key, failed = lost.bound_actions.len(), "node lost");
        self.inner.dispatch_rescues(lost.removed.rescues.clone());
        Ok(lost)
    }

    /// Import a datum produced elsewhere. Returns the number of sources
    /// recorded.
    ///
    /// # Errors
    ///
    /// [`CoreError::NoDataSources`] when no source could be recorded.
    pub fn add_remote_data(&self, request: RemoteDataRequest) -> Result<usize, CoreError> {
        let registry = self.inner.scheduler.registry();
        let mut added = 0usize;
        let mut alias_of = None;
        let mut locations = Vec::new();
        for source in request.sources {
            match source {
                RemoteSource::LocalAlias { name } => {
                    if registry.get(&name).is_some() {
                        alias_of = Some(name);
                        added += 1;
                    } else {
                        warn!(data = %request.renaming, alias = %name, "alias source not registered, ignored");
                    }
                }
                RemoteSource::Location { location, resource } => {
                    if let Some(offer) = resource {
                        let key = WorkerKey::permanent(offer.name.clone());
                        if self.inner.scheduler.pool().worker(&key).is_none() {
                            self.inner
                                .scheduler
                                .add_worker(key, &offer.description, offer.adaptor);
                        }
                    }
                    locations.push(location);
                }
            }
        }
        if registry.get(&request.renaming).is_none() {
            if let Some(existing) = alias_of {
                registry.link(&request.renaming, &existing)?;
            }
        }
        for location in locations {
            registry.add_location(&request.renaming, location);
            added += 1;
        }
        if added == 0 {
            return Err(CoreError::NoDataSources(request.renaming));
        }
        debug!(data = %request.renaming, sources = added, "remote data registered");
        Ok(added)
    }

    /// Run one task as a new application. Its nodes are released when the
    /// task reaches a terminal state.
    ///
    /// # Errors
    ///
    /// Any error raised while registering the application's nodes or data;
    /// the session is closed again in that case.
    pub fn run_task(
        &self,
        request: TaskRequest,
        monitor: Arc<dyn ActionMonitor>,
    ) -> Result<(ApplicationId, ActionId), CoreError> {
        let app = self.inner.sessions.start(Arc::clone(&monitor));
        if let Err(err) = self.prepare(app, request.resources, request.remote_data) {
            warn!(%app, %err, "task preparation failed");
            self.inner.end_session(app);
            return Err(err);
        }
        let weak = Arc::downgrade(&self.inner);
        let session_monitor = SessionMonitor::new(
            app,
            monitor,
            Box::new(move |app| {
                if let Some(inner) = weak.upgrade() {
                    inner.end_session(app);
                }
            }),
        );
        let action = self
            .inner
            .scheduler
            .submit(request.submission, Arc::new(session_monitor));
        info!(%app, action, "task submitted");
        Ok((app, action))
    }

    fn prepare(
        &self,
        app: ApplicationId,
        resources: Vec<ResourceOffer>,
        remote_data: Vec<RemoteDataRequest>,
    ) -> Result<(), CoreError> {
        for offer in resources {
            if offer.description.get(ProcessorKind::Cpu) == 0 {
                debug!(%app, node = %offer.name, "offer without cpu skipped");
                continue;
            }
            self.add_resources(offer, Some(app))?;
        }
        for remote in remote_data {
            self.add_remote_data(remote)?;
        }
        Ok(())
    }

    /// Close an application early, releasing its nodes.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownApplication`].
    pub fn finish_application(&self, app: ApplicationId) -> Result<(), CoreError> {
        self.inner.sessions.ensure(app)?;
        self.inner.end_session(app);
        Ok(())
    }

    /// Summary of the agent.
    pub fn status(&self) -> AgentStatus {
        let scheduler = &self.inner.scheduler;
        AgentStatus {
            workers: scheduler.pool().len(),
            live_actions: scheduler.live_count(),
            ready_actions: scheduler.ready_count(),
            sessions: self.inner.sessions.len(),
            policy: scheduler.policy_name().to_owned(),
        }
    }
}
