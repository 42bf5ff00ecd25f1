use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_boms")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub code: Option<String>,
    pub version: String,
    pub sequence: i32,
    pub active: bool,
    pub product_tmpl_id: i64,
    pub product_id: Option<i64>,
    pub product_uom_id: i64,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub product_qty: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub bulk_product_qty: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub forecast_product_qty: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub amount_untaxed: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub direct_amount_untaxed: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub standard_amount_untaxed: Decimal,
    /// `PriceUnitType` in its snake_case string form
    pub price_unit_type: Option<String>,
    pub currency_code: String,
    pub task_id: Option<i64>,
    pub partner_id: Option<i64>,
    pub note: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::project_bom_line::Entity")]
    Lines,
    #[sea_orm(has_many = "super::project_bom_sale_order::Entity")]
    SaleOrders,
}

impl Related<super::project_bom_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl Related<super::project_bom_sale_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SaleOrders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
