//! Running owed rescue copies in the background.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{error, info, warn};

use crate::data::{perform_rescues, DataRegistry, DataTransfer, RescueOrder, RescueReport};
use crate::runtime::Spawn;

/// Destination for rescue orders produced by worker removals.
pub trait RescueSink: Send + Sync {
    /// Start saving every datum in `orders`. Must not block.
    fn dispatch(&self, orders: Vec<RescueOrder>);
}

/// Executes rescue batches through a [`DataTransfer`] on a spawner.
pub struct RescueDispatcher<S> {
    registry: Arc<DataRegistry>,
    transfer: Arc<dyn DataTransfer>,
    spawner: S,
    reports: Option<Sender<RescueReport>>,
}

impl<S: Spawn> RescueDispatcher<S> {
    /// Dispatcher registering saved replicas in `registry`.
    pub fn new(registry: Arc<DataRegistry>, transfer: Arc<dyn DataTransfer>, spawner: S) -> Self {
        Self {
            registry,
            transfer,
            spawner,
            reports: None,
        }
    }

    /// Also publish each batch report on the returned channel.
    #[must_use]
    pub fn with_reports(mut self) -> (Self, Receiver<RescueReport>) {
        let (tx, rx) = unbounded();
        self.reports = Some(tx);
        (self, rx)
    }
}

impl<S: Spawn + Send + Sync> RescueSink for RescueDispatcher<S> {
    fn dispatch(&self, orders: Vec<RescueOrder>) {
        if orders.is_empty() {
            return;
        }
        info!(count = orders.len(), "dispatching rescue copies");
        let registry = Arc::clone(&self.registry);
        let transfer = Arc::clone(&self.transfer);
        let reports = self.reports.clone();
        self.spawner.spawn(async move {
            let report = perform_rescues(&registry, orders, transfer.as_ref()).await;
            if report.is_clean() {
                info!(saved = report.saved.len(), "rescue batch finished");
            } else {
                error!(
                    saved = report.saved.len(),
                    lost = report.failures.len(),
                    "rescue batch finished with data loss"
                );
            }
            if let Some(tx) = reports {
                if tx.send(report).is_err() {
                    warn!("rescue report receiver dropped");
                }
            }
        });
    }
}
