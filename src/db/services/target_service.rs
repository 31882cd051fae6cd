//! Accounts, monitored targets and their dependency links.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::db::entities::{monitored_target, prelude::*, target_dependency, user};
use crate::db::enums::MonitorStatus;
use crate::db::store::{NewTarget, DEFAULT_MIN_INTERVAL_MINUTES};

pub async fn create_user(
    db: &DatabaseConnection,
    username: &str,
    display_name: &str,
) -> Result<user::Model, DbErr> {
    user::ActiveModel {
        username: Set(username.to_string()),
        display_name: Set(display_name.to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn get_user_by_id(db: &DatabaseConnection, user_id: i32) -> Result<Option<user::Model>, DbErr> {
    User::find_by_id(user_id).one(db).await
}

pub async fn create_target(
    db: &DatabaseConnection,
    target: NewTarget,
) -> Result<monitored_target::Model, DbErr> {
    let target = target.clamp_interval(DEFAULT_MIN_INTERVAL_MINUTES);
    monitored_target::ActiveModel {
        user_id: Set(target.user_id),
        name: Set(target.name),
        url: Set(target.url),
        target_type: Set(target.target_type),
        check_interval_minutes: Set(target.check_interval_minutes),
        status: Set(MonitorStatus::Pending),
        is_active: Set(target.is_active),
        alerts_enabled: Set(target.alerts_enabled),
        alert_destination: Set(target.alert_destination),
        last_checked_at: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn add_dependency(
    db: &DatabaseConnection,
    target_id: i32,
    depends_on_id: i32,
) -> Result<(), DbErr> {
    let existing = TargetDependency::find_by_id((target_id, depends_on_id))
        .one(db)
        .await?;
    if existing.is_none() {
        target_dependency::ActiveModel {
            target_id: Set(target_id),
            depends_on_id: Set(depends_on_id),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

pub async fn get_target_by_id(
    db: &DatabaseConnection,
    target_id: i32,
) -> Result<Option<monitored_target::Model>, DbErr> {
    MonitoredTarget::find_by_id(target_id).one(db).await
}

pub async fn get_active_targets(
    db: &DatabaseConnection,
) -> Result<Vec<monitored_target::Model>, DbErr> {
    MonitoredTarget::find()
        .filter(monitored_target::Column::IsActive.eq(true))
        .order_by_asc(monitored_target::Column::Id)
        .all(db)
        .await
}

pub async fn get_all_target_ids(db: &DatabaseConnection) -> Result<Vec<i32>, DbErr> {
    let targets = MonitoredTarget::find()
        .order_by_asc(monitored_target::Column::Id)
        .all(db)
        .await?;
    Ok(targets.into_iter().map(|t| t.id).collect())
}

pub async fn get_dependencies(
    db: &DatabaseConnection,
    target_id: i32,
) -> Result<Vec<monitored_target::Model>, DbErr> {
    let links = TargetDependency::find()
        .filter(target_dependency::Column::TargetId.eq(target_id))
        .all(db)
        .await?;

    if links.is_empty() {
        return Ok(Vec::new());
    }

    let dependency_ids: Vec<i32> = links.into_iter().map(|l| l.depends_on_id).collect();
    MonitoredTarget::find()
        .filter(monitored_target::Column::Id.is_in(dependency_ids))
        .order_by_asc(monitored_target::Column::Id)
        .all(db)
        .await
}

pub async fn update_target_status(
    db: &DatabaseConnection,
    target_id: i32,
    status: MonitorStatus,
    checked_at: DateTime<Utc>,
) -> Result<Option<monitored_target::Model>, DbErr> {
    let Some(target) = MonitoredTarget::find_by_id(target_id).one(db).await? else {
        return Ok(None);
    };

    let mut active: monitored_target::ActiveModel = target.into();
    active.status = Set(status);
    active.last_checked_at = Set(Some(checked_at));
    active.update(db).await.map(Some)
}
