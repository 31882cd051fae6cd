use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::entities::{
    maintenance_window, monitored_target, notification_attempt, probe_record, user,
};
use super::enums::{DispatchOutcome, MonitorStatus, TargetType};
use super::StoreError;
use crate::monitoring::outcome::ProbeOutcome;

/// Lowest check interval accepted at creation time.
pub const DEFAULT_MIN_INTERVAL_MINUTES: i32 = 1;

/// Registration payload for a monitored target.
#[derive(Debug, Clone)]
pub struct NewTarget {
    pub user_id: i32,
    pub name: String,
    pub url: String,
    pub target_type: TargetType,
    pub check_interval_minutes: i32,
    pub is_active: bool,
    pub alerts_enabled: bool,
    pub alert_destination: Option<serde_json::Value>,
}

impl NewTarget {
    pub fn website(user_id: i32, name: &str, url: &str) -> Self {
        Self {
            user_id,
            name: name.to_string(),
            url: url.to_string(),
            target_type: TargetType::Website,
            check_interval_minutes: 5,
            is_active: true,
            alerts_enabled: false,
            alert_destination: None,
        }
    }

    pub fn with_alerts(mut self, destination: serde_json::Value) -> Self {
        self.alerts_enabled = true;
        self.alert_destination = Some(destination);
        self
    }

    /// Raises the interval to `floor` when it is lower (including zero and
    /// negative values).
    pub fn clamp_interval(mut self, floor: i32) -> Self {
        let floor = floor.max(DEFAULT_MIN_INTERVAL_MINUTES);
        self.check_interval_minutes = self.check_interval_minutes.max(floor);
        self
    }
}

#[derive(Debug, Clone)]
pub struct NewMaintenanceWindow {
    pub target_id: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub reason: String,
    pub created_by: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewNotificationAttempt {
    pub target_id: i32,
    pub probe_record_id: i32,
    pub from_status: MonitorStatus,
    pub to_status: MonitorStatus,
    pub outcome: DispatchOutcome,
}

#[async_trait]
pub trait MonitorStore: Send + Sync {
    async fn insert_user(&self, username: &str, display_name: &str)
        -> Result<user::Model, StoreError>;

    async fn get_user(&self, user_id: i32) -> Result<Option<user::Model>, StoreError>;

    /// Persists a new target with status `pending`. Intervals below
    /// [`DEFAULT_MIN_INTERVAL_MINUTES`] are raised to it.
    async fn insert_target(&self, target: NewTarget)
        -> Result<monitored_target::Model, StoreError>;

    async fn add_dependency(&self, target_id: i32, depends_on_id: i32) -> Result<(), StoreError>;

    async fn get_target(&self, target_id: i32)
        -> Result<Option<monitored_target::Model>, StoreError>;

    async fn list_active_targets(&self) -> Result<Vec<monitored_target::Model>, StoreError>;

    async fn list_target_ids(&self) -> Result<Vec<i32>, StoreError>;

    async fn dependencies_of(&self, target_id: i32)
        -> Result<Vec<monitored_target::Model>, StoreError>;

    /// Writes the current status unconditionally, so repeating it is harmless.
    async fn update_target_status(
        &self,
        target_id: i32,
        status: MonitorStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn insert_probe_record(
        &self,
        target_id: i32,
        outcome: &ProbeOutcome,
    ) -> Result<probe_record::Model, StoreError>;

    async fn get_probe_record(&self, record_id: i32)
        -> Result<Option<probe_record::Model>, StoreError>;

    async fn latest_probe_record(&self, target_id: i32)
        -> Result<Option<probe_record::Model>, StoreError>;

    /// Full history of a target, oldest first.
    async fn probe_records_ascending(&self, target_id: i32)
        -> Result<Vec<probe_record::Model>, StoreError>;

    /// Most recent records of a target, newest first.
    async fn recent_probe_records(
        &self,
        target_id: i32,
        limit: u64,
    ) -> Result<Vec<probe_record::Model>, StoreError>;

    /// Records of the same target strictly before `record`, newest first.
    async fn probe_records_before(
        &self,
        record: &probe_record::Model,
        limit: u64,
    ) -> Result<Vec<probe_record::Model>, StoreError>;

    /// Records of the same target strictly after `record`, oldest first.
    async fn probe_records_after(
        &self,
        record: &probe_record::Model,
        limit: u64,
    ) -> Result<Vec<probe_record::Model>, StoreError>;

    async fn delete_probe_records(&self, record_ids: &[i32]) -> Result<u64, StoreError>;

    async fn insert_maintenance_window(
        &self,
        window: NewMaintenanceWindow,
    ) -> Result<maintenance_window::Model, StoreError>;

    /// Returns false when no such window exists.
    async fn set_maintenance_window_active(
        &self,
        window_id: i32,
        is_active: bool,
    ) -> Result<bool, StoreError>;

    /// Active windows of `target_id` whose inclusive interval contains `at`.
    async fn maintenance_windows_covering(
        &self,
        target_id: i32,
        at: DateTime<Utc>,
    ) -> Result<Vec<maintenance_window::Model>, StoreError>;

    /// Inserts a ledger entry for a transition. Returns false when the
    /// transition was already claimed.
    async fn claim_notification(&self, attempt: NewNotificationAttempt)
        -> Result<bool, StoreError>;

    async fn complete_notification(
        &self,
        probe_record_id: i32,
        outcome: DispatchOutcome,
        detail: Option<String>,
    ) -> Result<(), StoreError>;

    async fn notification_attempts_for_target(
        &self,
        target_id: i32,
    ) -> Result<Vec<notification_attempt::Model>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_raised_to_the_floor() {
        let mut target = NewTarget::website(1, "site", "example.com");
        target.check_interval_minutes = 0;
        assert_eq!(target.clone().clamp_interval(5).check_interval_minutes, 5);

        target.check_interval_minutes = -3;
        assert_eq!(target.clone().clamp_interval(0).check_interval_minutes, 1);

        target.check_interval_minutes = 30;
        assert_eq!(target.clamp_interval(5).check_interval_minutes, 30);
    }
}
