use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Link between a project BOM and the sales orders driving its forecast
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_bom_sale_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub bom_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub sale_order_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project_bom::Entity",
        from = "Column::BomId",
        to = "super::project_bom::Column::Id",
        on_delete = "Cascade"
    )]
    ProjectBom,
}

impl Related<super::project_bom::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProjectBom.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
