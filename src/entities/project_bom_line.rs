use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_bom_lines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub bom_id: i64,
    pub sequence: i32,
    pub product_tmpl_id: i64,
    pub product_type_id: Option<i64>,
    pub product_id: Option<i64>,
    pub product_uom_id: i64,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub product_qty: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub price_unit: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub avg_price_unit: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub price_subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub direct_price_subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub forecast_product_qty: Decimal,
    pub partner_id: Option<i64>,
    pub description: Option<String>,
    pub editable: bool,
    pub approve: bool,
    pub production_line_id: Option<i64>,
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
    #[sea_orm(has_many = "super::project_bom_line_operation::Entity")]
    Operations,
    #[sea_orm(has_many = "super::project_bom_line_version::Entity")]
    Versions,
}

impl Related<super::project_bom::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProjectBom.def()
    }
}

impl Related<super::project_bom_line_operation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Operations.def()
    }
}

impl Related<super::project_bom_line_version::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Versions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
