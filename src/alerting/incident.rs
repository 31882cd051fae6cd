//! Root cause lookups around a single probe record.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

use crate::db::entities::{monitored_target, probe_record};
use crate::db::{MonitorStore, StoreError};

/// Records returned on each side of the incident.
pub const RCA_WINDOW: u64 = 5;

#[derive(Error, Debug)]
pub enum RcaError {
    #[error("Probe record {0} not found")]
    NotFound(i32),
    #[error("Caller is not allowed to inspect probe record {0}")]
    Unauthorized(i32),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentReport {
    pub incident: probe_record::Model,
    pub target: monitored_target::Model,
    pub dependencies: Vec<monitored_target::Model>,
    /// Oldest first.
    pub preceding: Vec<probe_record::Model>,
    /// Oldest first.
    pub following: Vec<probe_record::Model>,
}

pub struct IncidentLocator {
    store: Arc<dyn MonitorStore>,
}

impl IncidentLocator {
    pub fn new(store: Arc<dyn MonitorStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn locate(&self, caller_user_id: i32, record_id: i32) -> Result<IncidentReport, RcaError> {
        let incident = self
            .store
            .get_probe_record(record_id)
            .await?
            .ok_or(RcaError::NotFound(record_id))?;
        let target = self
            .store
            .get_target(incident.target_id)
            .await?
            .ok_or(RcaError::NotFound(record_id))?;
        if target.user_id != caller_user_id {
            return Err(RcaError::Unauthorized(record_id));
        }

        let dependencies = self.store.dependencies_of(target.id).await?;
        let mut preceding = self.store.probe_records_before(&incident, RCA_WINDOW).await?;
        preceding.reverse();
        let following = self.store.probe_records_after(&incident, RCA_WINDOW).await?;

        Ok(IncidentReport {
            incident,
            target,
            dependencies,
            preceding,
            following,
        })
    }
}
