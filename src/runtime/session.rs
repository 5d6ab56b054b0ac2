//! Application sessions: the monitor and ephemeral nodes of each running
//! application, keyed by [`ApplicationId`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::core::{ActionEvent, ActionMonitor, ApplicationId, CoreError, WorkerKey};
use crate::util::now_ms;

struct Session {
    monitor: Arc<dyn ActionMonitor>,
    nodes: BTreeSet<WorkerKey>,
    started_at_ms: u128,
}

/// Map of live sessions. Entries are inserted when an application starts
/// and removed when it reaches a terminal state.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ApplicationId, Session>>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session reporting to `monitor`.
    pub fn start(&self, monitor: Arc<dyn ActionMonitor>) -> ApplicationId {
        let app = ApplicationId::new();
        self.sessions.write().insert(
            app,
            Session {
                monitor,
                nodes: BTreeSet::new(),
                started_at_ms: now_ms(),
            },
        );
        info!(%app, "session started");
        app
    }

    /// Monitor of a live session.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownApplication`] when no session is open for `app`.
    pub fn monitor(&self, app: ApplicationId) -> Result<Arc<dyn ActionMonitor>, CoreError> {
        self.sessions
            .read()
            .get(&app)
            .map(|s| Arc::clone(&s.monitor))
            .ok_or_else(|| CoreError::UnknownApplication(app.to_string()))
    }

    /// Fail unless a session is open for `app`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownApplication`].
    pub fn ensure(&self, app: ApplicationId) -> Result<(), CoreError> {
        if self.sessions.read().contains_key(&app) {
            Ok(())
        } else {
            Err(CoreError::UnknownApplication(app.to_string()))
        }
    }

    /// Record an ephemeral node of `app`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownApplication`].
    pub fn add_node(&self, app: ApplicationId, key: WorkerKey) -> Result<(), CoreError> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(&app)
            .ok_or_else(|| CoreError::UnknownApplication(app.to_string()))?;
        session.nodes.insert(key);
        Ok(())
    }

    /// Ephemeral nodes of `app`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownApplication`].
    pub fn nodes(&self, app: ApplicationId) -> Result<Vec<WorkerKey>, CoreError> {
        self.sessions
            .read()
            .get(&app)
            .map(|s| s.nodes.iter().cloned().collect())
            .ok_or_else(|| CoreError::UnknownApplication(app.to_string()))
    }

    /// Close a session and hand back its nodes. `None` if already closed.
    pub fn finish(&self, app: ApplicationId) -> Option<Vec<WorkerKey>> {
        let session = self.sessions.write().remove(&app)?;
        let lifetime_ms = now_ms().saturating_sub(session.started_at_ms);
        info!(%app, nodes = session.nodes.len(), lifetime_ms, "session finished");
        Some(session.nodes.into_iter().collect())
    }

    /// True while `app` is open.
    pub fn contains(&self, app: ApplicationId) -> bool {
        self.sessions.read().contains_key(&app)
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// True when no session is open.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

/// Callback run once when a session's main action terminates.
pub type SessionEnd = Box<dyn Fn(ApplicationId) + Send + Sync>;

/// Monitor of an application's main action: forwards every event and ends
/// the session on the first terminal one.
pub struct SessionMonitor {
    app: ApplicationId,
    inner: Arc<dyn ActionMonitor>,
    ended: AtomicBool,
    on_end: SessionEnd,
}

impl SessionMonitor {
    /// Wrap `inner` for `app`.
    pub fn new(app: ApplicationId, inner: Arc<dyn ActionMonitor>, on_end: SessionEnd) -> Self {
        Self {
            app,
            inner,
            ended: AtomicBool::new(false),
            on_end,
        }
    }
}

impl fmt::Debug for SessionMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionMonitor")
            .field("app", &self.app)
            .field("ended", &self.ended.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ActionMonitor for SessionMonitor {
    fn on_event(&self, event: &ActionEvent) {
        self.inner.on_event(event);
        if event.is_terminal() && !self.ended.swap(true, Ordering::AcqRel) {
            debug!(app = %self.app, action = event.action(), "main action terminated");
            (self.on_end)(self.app);
        }
    }
}
