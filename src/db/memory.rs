//! Process-local [`MonitorStore`]. Ordering and filtering follow the same
//! rules as the database-backed store so the two are interchangeable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::entities::{
    maintenance_window, monitored_target, notification_attempt, probe_record, user,
};
use super::enums::{DispatchOutcome, MonitorStatus};
use super::services::probe_record_service::new_record_model;
use super::store::{
    MonitorStore, NewMaintenanceWindow, NewNotificationAttempt, NewTarget,
    DEFAULT_MIN_INTERVAL_MINUTES,
};
use super::StoreError;
use crate::monitoring::outcome::ProbeOutcome;

#[derive(Default)]
struct Tables {
    last_id: i32,
    users: BTreeMap<i32, user::Model>,
    targets: BTreeMap<i32, monitored_target::Model>,
    dependencies: Vec<(i32, i32)>,
    records: BTreeMap<i32, probe_record::Model>,
    windows: BTreeMap<i32, maintenance_window::Model>,
    // Keyed by probe_record_id.
    attempts: BTreeMap<i32, notification_attempt::Model>,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn records_of(&self, target_id: i32) -> Vec<probe_record::Model> {
        let mut records: Vec<probe_record::Model> = self
            .records
            .values()
            .filter(|r| r.target_id == target_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.checked_at, r.id));
        records
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MonitorStore for InMemoryStore {
    async fn insert_user(
        &self,
        username: &str,
        display_name: &str,
    ) -> Result<user::Model, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == username) {
            return Err(StoreError::InvalidInput(format!(
                "username '{username}' already exists"
            )));
        }
        let model = user::Model {
            id: tables.next_id(),
            username: username.to_string(),
            display_name: display_name.to_string(),
            created_at: Utc::now(),
        };
        tables.users.insert(model.id, model.clone());
        Ok(model)
    }

    async fn get_user(&self, user_id: i32) -> Result<Option<user::Model>, StoreError> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    async fn insert_target(
        &self,
        target: NewTarget,
    ) -> Result<monitored_target::Model, StoreError> {
        let target = target.clamp_interval(DEFAULT_MIN_INTERVAL_MINUTES);
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&target.user_id) {
            return Err(StoreError::NotFound(format!("user {}", target.user_id)));
        }
        let model = monitored_target::Model {
            id: tables.next_id(),
            user_id: target.user_id,
            name: target.name,
            url: target.url,
            target_type: target.target_type,
            check_interval_minutes: target.check_interval_minutes,
            status: MonitorStatus::Pending,
            is_active: target.is_active,
            alerts_enabled: target.alerts_enabled,
            alert_destination: target.alert_destination,
            last_checked_at: None,
            created_at: Utc::now(),
        };
        tables.targets.insert(model.id, model.clone());
        Ok(model)
    }

    async fn add_dependency(&self, target_id: i32, depends_on_id: i32) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        for id in [target_id, depends_on_id] {
            if !tables.targets.contains_key(&id) {
                return Err(StoreError::NotFound(format!("target {id}")));
            }
        }
        if !tables.dependencies.contains(&(target_id, depends_on_id)) {
            tables.dependencies.push((target_id, depends_on_id));
        }
        Ok(())
    }

    async fn get_target(
        &self,
        target_id: i32,
    ) -> Result<Option<monitored_target::Model>, StoreError> {
        Ok(self.tables.read().await.targets.get(&target_id).cloned())
    }

    async fn list_active_targets(&self) -> Result<Vec<monitored_target::Model>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .targets
            .values()
            .filter(|t| t.is_active)
            .cloned()
            .collect())
    }

    async fn list_target_ids(&self) -> Result<Vec<i32>, StoreError> {
        Ok(self.tables.read().await.targets.keys().copied().collect())
    }

    async fn dependencies_of(
        &self,
        target_id: i32,
    ) -> Result<Vec<monitored_target::Model>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .dependencies
            .iter()
            .filter(|(from, _)| *from == target_id)
            .filter_map(|(_, to)| tables.targets.get(to).cloned())
            .collect())
    }

    async fn update_target_status(
        &self,
        target_id: i32,
        status: MonitorStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let target = tables
            .targets
            .get_mut(&target_id)
            .ok_or_else(|| StoreError::NotFound(format!("target {target_id}")))?;
        target.status = status;
        target.last_checked_at = Some(checked_at);
        Ok(())
    }

    async fn insert_probe_record(
        &self,
        target_id: i32,
        outcome: &ProbeOutcome,
    ) -> Result<probe_record::Model, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.targets.contains_key(&target_id) {
            return Err(StoreError::NotFound(format!("target {target_id}")));
        }
        let id = tables.next_id();
        let model = new_record_model(id, target_id, outcome);
        tables.records.insert(id, model.clone());
        Ok(model)
    }

    async fn get_probe_record(
        &self,
        record_id: i32,
    ) -> Result<Option<probe_record::Model>, StoreError> {
        Ok(self.tables.read().await.records.get(&record_id).cloned())
    }

    async fn latest_probe_record(
        &self,
        target_id: i32,
    ) -> Result<Option<probe_record::Model>, StoreError> {
        Ok(self.tables.read().await.records_of(target_id).pop())
    }

    async fn probe_records_ascending(
        &self,
        target_id: i32,
    ) -> Result<Vec<probe_record::Model>, StoreError> {
        Ok(self.tables.read().await.records_of(target_id))
    }

    async fn recent_probe_records(
        &self,
        target_id: i32,
        limit: u64,
    ) -> Result<Vec<probe_record::Model>, StoreError> {
        let records = self.tables.read().await.records_of(target_id);
        Ok(records.into_iter().rev().take(limit as usize).collect())
    }

    async fn probe_records_before(
        &self,
        record: &probe_record::Model,
        limit: u64,
    ) -> Result<Vec<probe_record::Model>, StoreError> {
        let cursor = (record.checked_at, record.id);
        let records = self.tables.read().await.records_of(record.target_id);
        Ok(records
            .into_iter()
            .rev()
            .filter(|r| (r.checked_at, r.id) < cursor)
            .take(limit as usize)
            .collect())
    }

    async fn probe_records_after(
        &self,
        record: &probe_record::Model,
        limit: u64,
    ) -> Result<Vec<probe_record::Model>, StoreError> {
        let cursor = (record.checked_at, record.id);
        let records = self.tables.read().await.records_of(record.target_id);
        Ok(records
            .into_iter()
            .filter(|r| (r.checked_at, r.id) > cursor)
            .take(limit as usize)
            .collect())
    }

    async fn delete_probe_records(&self, record_ids: &[i32]) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let mut deleted = 0;
        for id in record_ids {
            if tables.records.remove(id).is_some() {
                tables.attempts.remove(id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn insert_maintenance_window(
        &self,
        window: NewMaintenanceWindow,
    ) -> Result<maintenance_window::Model, StoreError> {
        if window.ends_at < window.starts_at {
            return Err(StoreError::InvalidInput(
                "maintenance window ends before it starts".to_string(),
            ));
        }
        let mut tables = self.tables.write().await;
        if !tables.targets.contains_key(&window.target_id) {
            return Err(StoreError::NotFound(format!("target {}", window.target_id)));
        }
        let model = maintenance_window::Model {
            id: tables.next_id(),
            target_id: window.target_id,
            starts_at: window.starts_at,
            ends_at: window.ends_at,
            reason: window.reason,
            created_by: window.created_by,
            is_active: window.is_active,
        };
        tables.windows.insert(model.id, model.clone());
        Ok(model)
    }

    async fn set_maintenance_window_active(
        &self,
        window_id: i32,
        is_active: bool,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.windows.get_mut(&window_id) {
            Some(window) => {
                window.is_active = is_active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn maintenance_windows_covering(
        &self,
        target_id: i32,
        at: DateTime<Utc>,
    ) -> Result<Vec<maintenance_window::Model>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .windows
            .values()
            .filter(|w| w.target_id == target_id && w.covers(at))
            .cloned()
            .collect())
    }

    async fn claim_notification(
        &self,
        attempt: NewNotificationAttempt,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.attempts.contains_key(&attempt.probe_record_id) {
            return Ok(false);
        }
        let model = notification_attempt::Model {
            id: tables.next_id(),
            target_id: attempt.target_id,
            probe_record_id: attempt.probe_record_id,
            from_status: attempt.from_status,
            to_status: attempt.to_status,
            outcome: attempt.outcome,
            detail: None,
            created_at: Utc::now(),
        };
        tables.attempts.insert(attempt.probe_record_id, model);
        Ok(true)
    }

    async fn complete_notification(
        &self,
        probe_record_id: i32,
        outcome: DispatchOutcome,
        detail: Option<String>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let attempt = tables.attempts.get_mut(&probe_record_id).ok_or_else(|| {
            StoreError::NotFound(format!("notification for record {probe_record_id}"))
        })?;
        attempt.outcome = outcome;
        attempt.detail = detail;
        Ok(())
    }

    async fn notification_attempts_for_target(
        &self,
        target_id: i32,
    ) -> Result<Vec<notification_attempt::Model>, StoreError> {
        let mut attempts: Vec<notification_attempt::Model> = self
            .tables
            .read()
            .await
            .attempts
            .values()
            .filter(|a| a.target_id == target_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.probe_record_id);
        Ok(attempts)
    }
}
