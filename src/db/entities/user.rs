use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Account owning monitored targets. Only the fields the monitoring engine
/// reads are mapped here; the account CRUD layer owns the rest.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub username: String,
    pub display_name: String,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::monitored_target::Entity")]
    MonitoredTargets,
}

impl Related<super::monitored_target::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MonitoredTargets.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
