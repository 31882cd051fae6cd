//! Probe history queries.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};

use crate::db::entities::{prelude::*, probe_record};
use crate::monitoring::outcome::ProbeOutcome;

/// Flattens a probe outcome into a record row with the given id.
pub fn new_record_model(id: i32, target_id: i32, outcome: &ProbeOutcome) -> probe_record::Model {
    let tls = outcome.tls.as_ref();
    probe_record::Model {
        id,
        target_id,
        checked_at: outcome.checked_at,
        status: outcome.status,
        status_code: outcome.status_code.map(i32::from),
        response_time_ms: outcome.response_time_ms,
        dns_ms: outcome.timings.dns_ms,
        tcp_ms: outcome.timings.tcp_ms,
        tls_ms: outcome.timings.tls_ms,
        first_byte_ms: outcome.timings.first_byte_ms,
        transfer_ms: outcome.timings.transfer_ms,
        total_ms: outcome.timings.total_ms,
        tls_subject: tls.map(|c| c.subject.clone()),
        tls_issuer: tls.map(|c| c.issuer.clone()),
        tls_valid_from: tls.map(|c| c.valid_from),
        tls_valid_to: tls.map(|c| c.valid_to),
        tls_days_until_expiry: tls.map(|c| c.days_until_expiry),
        body_snippet: outcome.body_snippet.clone(),
        error_message: outcome.error.as_ref().map(|e| e.message.clone()),
        error_code: outcome.error.as_ref().map(|e| e.code().to_string()),
    }
}

pub async fn insert_probe_record(
    db: &DatabaseConnection,
    target_id: i32,
    outcome: &ProbeOutcome,
) -> Result<probe_record::Model, DbErr> {
    let row = new_record_model(0, target_id, outcome);
    let active = probe_record::ActiveModel {
        target_id: Set(row.target_id),
        checked_at: Set(row.checked_at),
        status: Set(row.status),
        status_code: Set(row.status_code),
        response_time_ms: Set(row.response_time_ms),
        dns_ms: Set(row.dns_ms),
        tcp_ms: Set(row.tcp_ms),
        tls_ms: Set(row.tls_ms),
        first_byte_ms: Set(row.first_byte_ms),
        transfer_ms: Set(row.transfer_ms),
        total_ms: Set(row.total_ms),
        tls_subject: Set(row.tls_subject),
        tls_issuer: Set(row.tls_issuer),
        tls_valid_from: Set(row.tls_valid_from),
        tls_valid_to: Set(row.tls_valid_to),
        tls_days_until_expiry: Set(row.tls_days_until_expiry),
        body_snippet: Set(row.body_snippet),
        error_message: Set(row.error_message),
        error_code: Set(row.error_code),
        ..Default::default()
    };
    active.insert(db).await
}

pub async fn get_probe_record(
    db: &DatabaseConnection,
    record_id: i32,
) -> Result<Option<probe_record::Model>, DbErr> {
    ProbeRecord::find_by_id(record_id).one(db).await
}

pub async fn latest_probe_record(
    db: &DatabaseConnection,
    target_id: i32,
) -> Result<Option<probe_record::Model>, DbErr> {
    ProbeRecord::find()
        .filter(probe_record::Column::TargetId.eq(target_id))
        .order_by_desc(probe_record::Column::CheckedAt)
        .order_by_desc(probe_record::Column::Id)
        .one(db)
        .await
}

pub async fn probe_records_ascending(
    db: &DatabaseConnection,
    target_id: i32,
) -> Result<Vec<probe_record::Model>, DbErr> {
    ProbeRecord::find()
        .filter(probe_record::Column::TargetId.eq(target_id))
        .order_by_asc(probe_record::Column::CheckedAt)
        .order_by_asc(probe_record::Column::Id)
        .all(db)
        .await
}

pub async fn recent_probe_records(
    db: &DatabaseConnection,
    target_id: i32,
    limit: u64,
) -> Result<Vec<probe_record::Model>, DbErr> {
    ProbeRecord::find()
        .filter(probe_record::Column::TargetId.eq(target_id))
        .order_by_desc(probe_record::Column::CheckedAt)
        .order_by_desc(probe_record::Column::Id)
        .limit(limit)
        .all(db)
        .await
}

pub async fn probe_records_before(
    db: &DatabaseConnection,
    record: &probe_record::Model,
    limit: u64,
) -> Result<Vec<probe_record::Model>, DbErr> {
    let earlier = Condition::any()
        .add(probe_record::Column::CheckedAt.lt(record.checked_at))
        .add(
            Condition::all()
                .add(probe_record::Column::CheckedAt.eq(record.checked_at))
                .add(probe_record::Column::Id.lt(record.id)),
        );

    ProbeRecord::find()
        .filter(probe_record::Column::TargetId.eq(record.target_id))
        .filter(earlier)
        .order_by_desc(probe_record::Column::CheckedAt)
        .order_by_desc(probe_record::Column::Id)
        .limit(limit)
        .all(db)
        .await
}

pub async fn probe_records_after(
    db: &DatabaseConnection,
    record: &probe_record::Model,
    limit: u64,
) -> Result<Vec<probe_record::Model>, DbErr> {
    let later = Condition::any()
        .add(probe_record::Column::CheckedAt.gt(record.checked_at))
        .add(
            Condition::all()
                .add(probe_record::Column::CheckedAt.eq(record.checked_at))
                .add(probe_record::Column::Id.gt(record.id)),
        );

    ProbeRecord::find()
        .filter(probe_record::Column::TargetId.eq(record.target_id))
        .filter(later)
        .order_by_asc(probe_record::Column::CheckedAt)
        .order_by_asc(probe_record::Column::Id)
        .limit(limit)
        .all(db)
        .await
}

pub async fn delete_probe_records(db: &DatabaseConnection, record_ids: &[i32]) -> Result<u64, DbErr> {
    if record_ids.is_empty() {
        return Ok(0);
    }
    let result = ProbeRecord::delete_many()
        .filter(probe_record::Column::Id.is_in(record_ids.iter().copied()))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::MonitorStatus;
    use crate::monitoring::outcome::{
        PhaseTimings, ProbeErrorKind, ProbeFailure, TlsCertificate,
    };
    use chrono::{Duration, Utc};

    #[test]
    fn outcome_fields_are_flattened_into_the_row() {
        let now = Utc::now();
        let mut outcome = ProbeOutcome::online(
            now,
            503,
            PhaseTimings {
                dns_ms: 1,
                tcp_ms: 2,
                tls_ms: 3,
                first_byte_ms: 4,
                transfer_ms: 5,
                total_ms: 15,
            },
        );
        outcome.tls = Some(TlsCertificate {
            subject: "CN=example.com".to_string(),
            issuer: "CN=Example CA".to_string(),
            valid_from: now - Duration::days(30),
            valid_to: now + Duration::days(60),
            days_until_expiry: 60,
        });

        let row = new_record_model(7, 3, &outcome);
        assert_eq!(row.id, 7);
        assert_eq!(row.target_id, 3);
        assert_eq!(row.status, MonitorStatus::Online);
        assert_eq!(row.status_code, Some(503));
        assert_eq!(row.response_time_ms, 15);
        assert_eq!(row.tls_ms, 3);
        assert_eq!(row.tls_days_until_expiry, Some(60));
        assert_eq!(row.error_code, None);
    }

    #[test]
    fn failure_is_stored_as_code_and_message() {
        let outcome = ProbeOutcome::offline(
            Utc::now(),
            PhaseTimings::default(),
            ProbeFailure::new(ProbeErrorKind::Timeout, "no response within 10s"),
        );
        let row = new_record_model(1, 1, &outcome);
        assert_eq!(row.status, MonitorStatus::Offline);
        assert_eq!(row.error_code.as_deref(), Some("TIMEOUT"));
        assert_eq!(
            row.error_detail().as_deref(),
            Some("TIMEOUT: no response within 10s")
        );
    }
}
