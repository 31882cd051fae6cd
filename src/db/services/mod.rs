//! The `services` module holds the database queries behind [`SeaOrmStore`].
//!
//! Each sub-module is a set of free functions over a `DatabaseConnection`,
//! grouped by entity. [`SeaOrmStore`] adapts them to the [`MonitorStore`]
//! trait the rest of the engine depends on.

pub mod maintenance_service;
pub mod notification_attempt_service;
pub mod probe_record_service;
pub mod target_service;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use std::time::Duration;
use tracing::info;

use super::entities::{
    maintenance_window, monitored_target, notification_attempt, prelude::*, probe_record, user,
};
use super::enums::{DispatchOutcome, MonitorStatus};
use super::store::{MonitorStore, NewMaintenanceWindow, NewNotificationAttempt, NewTarget};
use super::StoreError;
use crate::monitoring::outcome::ProbeOutcome;

/// Creates every table (and declared index) that does not exist yet.
/// Parents are created before children so foreign keys resolve.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut tables = vec![
        schema.create_table_from_entity(User),
        schema.create_table_from_entity(MonitoredTarget),
        schema.create_table_from_entity(TargetDependency),
        schema.create_table_from_entity(ProbeRecord),
        schema.create_table_from_entity(MaintenanceWindow),
        schema.create_table_from_entity(NotificationAttempt),
    ];
    for table in tables.iter_mut() {
        table.if_not_exists();
        db.execute(backend.build(&*table)).await?;
    }

    let mut indexes = schema.create_index_from_entity(ProbeRecord);
    indexes.extend(schema.create_index_from_entity(MaintenanceWindow));
    for index in indexes.iter_mut() {
        index.if_not_exists();
        db.execute(backend.build(&*index)).await?;
    }

    info!("Database schema is up to date.");
    Ok(())
}

#[derive(Clone, Debug)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Opens a pooled connection to `database_url` and makes sure the schema
    /// exists.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let mut opt = ConnectOptions::new(database_url.to_owned());
        opt.max_connections(max_connections)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let db = Database::connect(opt).await?;
        ensure_schema(&db).await?;
        Ok(Self::new(db))
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl MonitorStore for SeaOrmStore {
    async fn insert_user(
        &self,
        username: &str,
        display_name: &str,
    ) -> Result<user::Model, StoreError> {
        Ok(target_service::create_user(&self.db, username, display_name).await?)
    }

    async fn get_user(&self, user_id: i32) -> Result<Option<user::Model>, StoreError> {
        Ok(target_service::get_user_by_id(&self.db, user_id).await?)
    }

    async fn insert_target(
        &self,
        target: NewTarget,
    ) -> Result<monitored_target::Model, StoreError> {
        Ok(target_service::create_target(&self.db, target).await?)
    }

    async fn add_dependency(&self, target_id: i32, depends_on_id: i32) -> Result<(), StoreError> {
        Ok(target_service::add_dependency(&self.db, target_id, depends_on_id).await?)
    }

    async fn get_target(
        &self,
        target_id: i32,
    ) -> Result<Option<monitored_target::Model>, StoreError> {
        Ok(target_service::get_target_by_id(&self.db, target_id).await?)
    }

    async fn list_active_targets(&self) -> Result<Vec<monitored_target::Model>, StoreError> {
        Ok(target_service::get_active_targets(&self.db).await?)
    }

    async fn list_target_ids(&self) -> Result<Vec<i32>, StoreError> {
        Ok(target_service::get_all_target_ids(&self.db).await?)
    }

    async fn dependencies_of(
        &self,
        target_id: i32,
    ) -> Result<Vec<monitored_target::Model>, StoreError> {
        Ok(target_service::get_dependencies(&self.db, target_id).await?)
    }

    async fn update_target_status(
        &self,
        target_id: i32,
        status: MonitorStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        target_service::update_target_status(&self.db, target_id, status, checked_at)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("target {target_id}")))?;
        Ok(())
    }

    async fn insert_probe_record(
        &self,
        target_id: i32,
        outcome: &ProbeOutcome,
    ) -> Result<probe_record::Model, StoreError> {
        Ok(probe_record_service::insert_probe_record(&self.db, target_id, outcome).await?)
    }

    async fn get_probe_record(
        &self,
        record_id: i32,
    ) -> Result<Option<probe_record::Model>, StoreError> {
        Ok(probe_record_service::get_probe_record(&self.db, record_id).await?)
    }

    async fn latest_probe_record(
        &self,
        target_id: i32,
    ) -> Result<Option<probe_record::Model>, StoreError> {
        Ok(probe_record_service::latest_probe_record(&self.db, target_id).await?)
    }

    async fn probe_records_ascending(
        &self,
        target_id: i32,
    ) -> Result<Vec<probe_record::Model>, StoreError> {
        Ok(probe_record_service::probe_records_ascending(&self.db, target_id).await?)
    }

    async fn recent_probe_records(
        &self,
        target_id: i32,
        limit: u64,
    ) -> Result<Vec<probe_record::Model>, StoreError> {
        Ok(probe_record_service::recent_probe_records(&self.db, target_id, limit).await?)
    }

    async fn probe_records_before(
        &self,
        record: &probe_record::Model,
        limit: u64,
    ) -> Result<Vec<probe_record::Model>, StoreError> {
        Ok(probe_record_service::probe_records_before(&self.db, record, limit).await?)
    }

    async fn probe_records_after(
        &self,
        record: &probe_record::Model,
        limit: u64,
    ) -> Result<Vec<probe_record::Model>, StoreError> {
        Ok(probe_record_service::probe_records_after(&self.db, record, limit).await?)
    }

    async fn delete_probe_records(&self, record_ids: &[i32]) -> Result<u64, StoreError> {
        Ok(probe_record_service::delete_probe_records(&self.db, record_ids).await?)
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
        Ok(maintenance_service::create_window(&self.db, window).await?)
    }

    async fn set_maintenance_window_active(
        &self,
        window_id: i32,
        is_active: bool,
    ) -> Result<bool, StoreError> {
        Ok(maintenance_service::set_window_active(&self.db, window_id, is_active).await?)
    }

    async fn maintenance_windows_covering(
        &self,
        target_id: i32,
        at: DateTime<Utc>,
    ) -> Result<Vec<maintenance_window::Model>, StoreError> {
        Ok(maintenance_service::get_windows_covering(&self.db, target_id, at).await?)
    }

    async fn claim_notification(
        &self,
        attempt: NewNotificationAttempt,
    ) -> Result<bool, StoreError> {
        Ok(notification_attempt_service::claim_attempt(&self.db, attempt).await?)
    }

    async fn complete_notification(
        &self,
        probe_record_id: i32,
        outcome: DispatchOutcome,
        detail: Option<String>,
    ) -> Result<(), StoreError> {
        let found = notification_attempt_service::complete_attempt(
            &self.db,
            probe_record_id,
            outcome,
            detail,
        )
        .await?;
        if !found {
            return Err(StoreError::NotFound(format!(
                "notification for record {probe_record_id}"
            )));
        }
        Ok(())
    }

    async fn notification_attempts_for_target(
        &self,
        target_id: i32,
    ) -> Result<Vec<notification_attempt::Model>, StoreError> {
        Ok(notification_attempt_service::get_attempts_for_target(&self.db, target_id).await?)
    }
}
