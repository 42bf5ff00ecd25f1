use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_bom_line_versions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub bom_line_id: i64,
    pub version: String,
    pub product_id: i64,
    pub product_uom_id: i64,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub product_qty: Decimal,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project_bom_line::Entity",
        from = "Column::BomLineId",
        to = "super::project_bom_line::Column::Id",
        on_delete = "Cascade"
    )]
    BomLine,
}

impl Related<super::project_bom_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomLine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
