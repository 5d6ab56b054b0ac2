//! Executing the rescue copies the registry decides are owed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::core::CoreError;
use crate::data::location::DataLocation;
use crate::data::registry::DataRegistry;

/// A datum whose last replica is leaving, and the copy to save it from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescueOrder {
    /// Canonical data name.
    pub data: String,
    /// Host being removed.
    pub host: String,
    /// The replica to save elsewhere.
    pub source: DataLocation,
}

/// Caller-supplied transfer used to save a rescued replica.
#[async_trait]
pub trait DataTransfer: Send + Sync {
    /// Copy `source` of `data` somewhere that survives the host removal and
    /// return the new location.
    async fn save(&self, data: &str, source: &DataLocation) -> Result<DataLocation, String>;
}

/// Outcome of a batch of rescues.
#[derive(Debug, Default)]
pub struct RescueReport {
    /// Data saved, with their new location.
    pub saved: Vec<(String, DataLocation)>,
    /// Data lost: one [`CoreError::DataRescueFailure`] each.
    pub failures: Vec<CoreError>,
}

impl RescueReport {
    /// True when every owed rescue succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run every rescue in `orders` through `transfer`, registering each saved
/// location. Failures leave the datum with an empty replica set and are
/// logged at error level and returned.
pub async fn perform_rescues<T>(
    registry: &DataRegistry,
    orders: Vec<RescueOrder>,
    transfer: &T,
) -> RescueReport
where
    T: DataTransfer + ?Sized,
{
    let mut report = RescueReport::default();
    for order in orders {
        match transfer.save(&order.data, &order.source).await {
            Ok(saved) => {
                info!(data = %order.data, from = %order.source, to = %saved, "data rescued");
                registry.add_location(&order.data, saved.clone());
                report.saved.push((order.data, saved));
            }
            Err(reason) => {
                error!(
                    data = %order.data,
                    host = %order.host,
                    source = %order.source,
                    %reason,
                    "DATA LOST: rescue transfer failed, no replica remains"
                );
                report.failures.push(CoreError::DataRescueFailure {
                    data: order.data,
                    reason,
                });
            }
        }
    }
    report
}
