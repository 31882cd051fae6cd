use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::{MonitorStatus, TargetType};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "monitored_targets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub url: String,
    pub target_type: TargetType,
    pub check_interval_minutes: i32,
    pub status: MonitorStatus,
    pub is_active: bool,
    pub alerts_enabled: bool,
    // Serialized `ChannelConfig`.
    #[sea_orm(column_type = "Json", nullable)]
    pub alert_destination: Option<Json>,
    #[sea_orm(nullable)]
    pub last_checked_at: Option<ChronoDateTimeUtc>,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,

    #[sea_orm(has_many = "super::probe_record::Entity")]
    ProbeRecord,

    #[sea_orm(has_many = "super::maintenance_window::Entity")]
    MaintenanceWindow,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::probe_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProbeRecord.def()
    }
}

impl Related<super::maintenance_window::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MaintenanceWindow.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// True when the target has never been checked or its interval, raised to
    /// `floor_minutes`, has elapsed to within `slack`.
    ///
    /// `last_checked_at` is stamped by the probe itself, a little after the
    /// sweep that picked the target up. `slack` absorbs that lag so a target
    /// whose interval matches the sweep cadence is due on every tick.
    pub fn is_due(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        floor_minutes: i32,
        slack: chrono::Duration,
    ) -> bool {
        let interval = self.check_interval_minutes.max(floor_minutes).max(1);
        match self.last_checked_at {
            None => true,
            Some(last) => last + chrono::Duration::minutes(i64::from(interval)) - slack <= now,
        }
    }
}
