use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{MonitorStore, StoreError};

/// Answers whether alerting for a target is paused at a given instant. Holds
/// no state of its own, so clones can be shared freely between resolutions.
#[derive(Clone)]
pub struct MaintenanceSuppressor {
    store: Arc<dyn MonitorStore>,
}

impl MaintenanceSuppressor {
    pub fn new(store: Arc<dyn MonitorStore>) -> Self {
        Self { store }
    }

    /// True iff an active window of `target_id` has `starts_at <= at <= ends_at`.
    pub async fn is_suppressed(&self, target_id: i32, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let windows = self.store.maintenance_windows_covering(target_id, at).await?;
        Ok(windows.iter().any(|w| w.covers(at)))
    }
}
