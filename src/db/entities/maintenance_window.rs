use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "maintenance_windows")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub target_id: i32,
    pub starts_at: ChronoDateTimeUtc,
    pub ends_at: ChronoDateTimeUtc,
    pub reason: String,
    pub created_by: i32,
    pub is_active: bool,
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
    /// Inclusive on both ends; an inactive window never covers anything.
    pub fn covers(&self, at: chrono::DateTime<chrono::Utc>) -> bool {
        self.is_active && self.starts_at <= at && at <= self.ends_at
    }
}
