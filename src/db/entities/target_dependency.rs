use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A declared dependency: `target_id` relies on `depends_on_id`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "target_dependencies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub target_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub depends_on_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::monitored_target::Entity",
        from = "Column::TargetId",
        to = "super::monitored_target::Column::Id",
        on_delete = "Cascade"
    )]
    Target,

    #[sea_orm(
        belongs_to = "super::monitored_target::Entity",
        from = "Column::DependsOnId",
        to = "super::monitored_target::Column::Id",
        on_delete = "Cascade"
    )]
    DependsOn,
}

impl ActiveModelBehavior for ActiveModel {}
