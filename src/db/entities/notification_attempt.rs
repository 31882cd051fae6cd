use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::{DispatchOutcome, MonitorStatus};

/// Ledger of alert dispatches. `probe_record_id` identifies the transition,
/// so each transition can be claimed at most once.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "notification_attempts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub target_id: i32,
    #[sea_orm(unique)]
    pub probe_record_id: i32,
    pub from_status: MonitorStatus,
    pub to_status: MonitorStatus,
    pub outcome: DispatchOutcome,
    #[sea_orm(nullable)]
    pub detail: Option<String>,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::probe_record::Entity",
        from = "Column::ProbeRecordId",
        to = "super::probe_record::Column::Id",
        on_delete = "Cascade"
    )]
    ProbeRecord,
}

impl Related<super::probe_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProbeRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
