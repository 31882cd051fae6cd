//! Maintenance window storage.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};

use crate::db::entities::{maintenance_window, prelude::*};
use crate::db::store::NewMaintenanceWindow;

pub async fn create_window(
    db: &DatabaseConnection,
    window: NewMaintenanceWindow,
) -> Result<maintenance_window::Model, DbErr> {
    maintenance_window::ActiveModel {
        target_id: Set(window.target_id),
        starts_at: Set(window.starts_at),
        ends_at: Set(window.ends_at),
        reason: Set(window.reason),
        created_by: Set(window.created_by),
        is_active: Set(window.is_active),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn set_window_active(
    db: &DatabaseConnection,
    window_id: i32,
    is_active: bool,
) -> Result<bool, DbErr> {
    let Some(window) = MaintenanceWindow::find_by_id(window_id).one(db).await? else {
        return Ok(false);
    };
    let mut active: maintenance_window::ActiveModel = window.into();
    active.is_active = Set(is_active);
    active.update(db).await?;
    Ok(true)
}

pub async fn get_windows_covering(
    db: &DatabaseConnection,
    target_id: i32,
    at: DateTime<Utc>,
) -> Result<Vec<maintenance_window::Model>, DbErr> {
    MaintenanceWindow::find()
        .filter(maintenance_window::Column::TargetId.eq(target_id))
        .filter(maintenance_window::Column::IsActive.eq(true))
        .filter(maintenance_window::Column::StartsAt.lte(at))
        .filter(maintenance_window::Column::EndsAt.gte(at))
        .all(db)
        .await
}
