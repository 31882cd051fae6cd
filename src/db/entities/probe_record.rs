use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::MonitorStatus;

/// One persisted health check. Rows are immutable once written; the
/// retention manager is the only code path that deletes them.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "probe_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub target_id: i32,
    pub checked_at: ChronoDateTimeUtc,
    pub status: MonitorStatus,
    #[sea_orm(nullable)]
    pub status_code: Option<i32>,
    pub response_time_ms: i64,
    pub dns_ms: i64,
    pub tcp_ms: i64,
    pub tls_ms: i64,
    pub first_byte_ms: i64,
    pub transfer_ms: i64,
    pub total_ms: i64,
    #[sea_orm(nullable)]
    pub tls_subject: Option<String>,
    #[sea_orm(nullable)]
    pub tls_issuer: Option<String>,
    #[sea_orm(nullable)]
    pub tls_valid_from: Option<ChronoDateTimeUtc>,
    #[sea_orm(nullable)]
    pub tls_valid_to: Option<ChronoDateTimeUtc>,
    #[sea_orm(nullable)]
    pub tls_days_until_expiry: Option<i64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub body_snippet: Option<String>,
    #[sea_orm(nullable)]
    pub error_message: Option<String>,
    #[sea_orm(nullable)]
    pub error_code: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::monitored_target::Entity",
        from = "Column::TargetId",
        to = "super::monitored_target::Column::Id",
        on_delete = "Cascade"
    )]
    MonitoredTarget,
}

impl Related<super::monitored_target::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MonitoredTarget.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Human readable error detail for alert payloads.
    pub fn error_detail(&self) -> Option<String> {
        match (&self.error_code, &self.error_message) {
            (Some(code), Some(message)) => Some(format!("{code}: {message}")),
            (None, Some(message)) => Some(message.clone()),
            (Some(code), None) => Some(code.clone()),
            (None, None) => None,
        }
    }
}
