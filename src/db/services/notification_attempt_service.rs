//! Notification ledger: one row per transition record.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::db::entities::{notification_attempt, prelude::*};
use crate::db::enums::DispatchOutcome;
use crate::db::store::NewNotificationAttempt;

async fn find_by_record(
    db: &DatabaseConnection,
    probe_record_id: i32,
) -> Result<Option<notification_attempt::Model>, DbErr> {
    NotificationAttempt::find()
        .filter(notification_attempt::Column::ProbeRecordId.eq(probe_record_id))
        .one(db)
        .await
}

pub async fn claim_attempt(
    db: &DatabaseConnection,
    attempt: NewNotificationAttempt,
) -> Result<bool, DbErr> {
    if find_by_record(db, attempt.probe_record_id).await?.is_some() {
        return Ok(false);
    }

    let inserted = notification_attempt::ActiveModel {
        target_id: Set(attempt.target_id),
        probe_record_id: Set(attempt.probe_record_id),
        from_status: Set(attempt.from_status),
        to_status: Set(attempt.to_status),
        outcome: Set(attempt.outcome),
        detail: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await;

    match inserted {
        Ok(_) => Ok(true),
        // Lost a race against another writer on the unique record id.
        Err(e) if find_by_record(db, attempt.probe_record_id).await?.is_some() => {
            tracing::debug!(error = %e, "Notification claim already taken.");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

pub async fn complete_attempt(
    db: &DatabaseConnection,
    probe_record_id: i32,
    outcome: DispatchOutcome,
    detail: Option<String>,
) -> Result<bool, DbErr> {
    let Some(attempt) = find_by_record(db, probe_record_id).await? else {
        return Ok(false);
    };
    let mut active: notification_attempt::ActiveModel = attempt.into();
    active.outcome = Set(outcome);
    active.detail = Set(detail);
    active.update(db).await?;
    Ok(true)
}

pub async fn get_attempts_for_target(
    db: &DatabaseConnection,
    target_id: i32,
) -> Result<Vec<notification_attempt::Model>, DbErr> {
    NotificationAttempt::find()
        .filter(notification_attempt::Column::TargetId.eq(target_id))
        .order_by_asc(notification_attempt::Column::ProbeRecordId)
        .all(db)
        .await
}
