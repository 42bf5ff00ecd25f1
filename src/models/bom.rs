use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::{Validate, ValidationError};

/// Policy used to pick a unit price for every line of a project BOM.
///
/// A header without a policy keeps the prices entered by hand.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PriceUnitType {
    /// Received-quantity weighted average of historical purchases
    Avg,
    /// Highest purchase price
    Top,
    /// Lowest purchase price
    Low,
    /// Most recent purchase by planned date
    Last,
    /// Earliest purchase by planned date
    First,
}

/// Top-level project bill of materials for one subject product and version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomHeader {
    pub id: i64,
    pub code: Option<String>,
    pub version: String,
    pub sequence: i32,
    pub active: bool,
    pub product_tmpl_id: i64,
    pub product_id: Option<i64>,
    pub product_uom_id: i64,
    pub product_qty: Decimal,
    pub bulk_product_qty: Decimal,
    pub forecast_product_qty: Decimal,
    pub amount_untaxed: Decimal,
    pub direct_amount_untaxed: Decimal,
    pub standard_amount_untaxed: Decimal,
    pub price_unit_type: Option<PriceUnitType>,
    pub currency_code: String,
    pub task_id: Option<i64>,
    pub partner_id: Option<i64>,
    pub sale_order_ids: Vec<i64>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BomHeader {
    /// Batch divisor used to scale imported quantities; anything not strictly
    /// positive counts as a batch of one.
    pub fn effective_bulk_qty(&self) -> Decimal {
        if self.bulk_product_qty > Decimal::ZERO {
            self.bulk_product_qty
        } else {
            Decimal::ONE
        }
    }

    pub fn display_name(&self, template_name: &str) -> String {
        match &self.code {
            Some(code) => format!("({}) {}", code, template_name),
            None => template_name.to_string(),
        }
    }
}

/// Input payload for creating a project BOM header
#[derive(Debug, Clone, Validate)]
pub struct NewBomHeader {
    pub code: Option<String>,
    #[validate(length(min = 1, message = "Version is required"))]
    pub version: String,
    pub sequence: i32,
    pub product_tmpl_id: i64,
    pub product_id: Option<i64>,
    pub product_uom_id: i64,
    #[validate(custom = "non_negative")]
    pub product_qty: Decimal,
    pub bulk_product_qty: Decimal,
    #[validate(custom = "non_negative")]
    pub forecast_product_qty: Decimal,
    pub price_unit_type: Option<PriceUnitType>,
    pub currency_code: String,
    pub task_id: Option<i64>,
    pub partner_id: Option<i64>,
    pub note: Option<String>,
}

impl NewBomHeader {
    pub fn new(product_tmpl_id: i64, product_uom_id: i64, currency_code: impl Into<String>) -> Self {
        Self {
            code: None,
            version: "1.0".to_string(),
            sequence: 1,
            product_tmpl_id,
            product_id: None,
            product_uom_id,
            product_qty: Decimal::ONE,
            bulk_product_qty: Decimal::ONE,
            forecast_product_qty: Decimal::ONE,
            price_unit_type: None,
            currency_code: currency_code.into(),
            task_id: None,
            partner_id: None,
            note: None,
        }
    }
}

/// One component entry of a project BOM.
///
/// `product_id`, `product_uom_id` and `product_qty` are the values promoted
/// into the production line referenced by `production_line_id` on approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomLine {
    pub id: i64,
    pub bom_id: i64,
    pub sequence: i32,
    pub product_tmpl_id: i64,
    pub product_type_id: Option<i64>,
    pub product_id: Option<i64>,
    pub product_uom_id: i64,
    pub product_qty: Decimal,
    pub price_unit: Decimal,
    pub avg_price_unit: Decimal,
    pub price_subtotal: Decimal,
    pub direct_price_subtotal: Decimal,
    pub forecast_product_qty: Decimal,
    pub partner_id: Option<i64>,
    pub description: Option<String>,
    pub editable: bool,
    pub approve: bool,
    pub production_line_id: Option<i64>,
}

impl BomLine {
    /// Recomputes the derived amounts against the header's forecast quantity.
    pub fn refresh_amounts(&mut self, header_forecast_qty: Decimal) {
        self.price_subtotal = self.product_qty * header_forecast_qty * self.price_unit;
        self.direct_price_subtotal = self.product_qty * self.price_unit;
        self.forecast_product_qty = self.product_qty * header_forecast_qty;
    }
}

/// Input payload for adding a line to a project BOM
#[derive(Debug, Clone, Validate)]
pub struct NewBomLine {
    pub bom_id: i64,
    pub sequence: i32,
    pub product_tmpl_id: i64,
    pub product_type_id: Option<i64>,
    pub product_id: Option<i64>,
    pub product_uom_id: i64,
    #[validate(custom = "non_negative")]
    pub product_qty: Decimal,
    pub price_unit: Decimal,
    pub partner_id: Option<i64>,
    pub description: Option<String>,
    pub editable: bool,
}

impl NewBomLine {
    pub fn new(bom_id: i64, product_tmpl_id: i64, product_uom_id: i64, product_qty: Decimal) -> Self {
        Self {
            bom_id,
            sequence: 1,
            product_tmpl_id,
            product_type_id: None,
            product_id: None,
            product_uom_id,
            product_qty,
            price_unit: Decimal::ZERO,
            partner_id: None,
            description: None,
            editable: false,
        }
    }
}

/// Detail row recording which concrete product contributed which quantity
/// to a line, and under which operation label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomLineOperation {
    pub id: i64,
    pub bom_line_id: i64,
    pub bom_id: i64,
    pub sequence: i32,
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub product_id: Option<i64>,
    pub source_product_id: Option<i64>,
    pub product_uom_id: Option<i64>,
    pub product_qty: Decimal,
    pub attribute_value_ids: Vec<i64>,
}

impl BomLineOperation {
    pub fn display_name(&self) -> String {
        let name = self.name.as_deref().unwrap_or_default();
        match &self.code {
            Some(code) => format!("[{}] {}", code, name),
            None => name.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewBomLineOperation {
    pub bom_line_id: i64,
    pub bom_id: i64,
    pub sequence: i32,
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub product_id: Option<i64>,
    pub source_product_id: Option<i64>,
    pub product_uom_id: Option<i64>,
    pub product_qty: Decimal,
    pub attribute_value_ids: Vec<i64>,
}

impl From<&BomLineOperation> for NewBomLineOperation {
    fn from(op: &BomLineOperation) -> Self {
        Self {
            bom_line_id: op.bom_line_id,
            bom_id: op.bom_id,
            sequence: op.sequence,
            name: op.name.clone(),
            code: op.code.clone(),
            description: op.description.clone(),
            product_id: op.product_id,
            source_product_id: op.source_product_id,
            product_uom_id: op.product_uom_id,
            product_qty: op.product_qty,
            attribute_value_ids: op.attribute_value_ids.clone(),
        }
    }
}

/// Approved product/quantity/UOM of a line, frozen under a version label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomLineVersion {
    pub id: i64,
    pub bom_line_id: i64,
    pub version: String,
    pub product_id: i64,
    pub product_uom_id: i64,
    pub product_qty: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBomLineVersion {
    pub bom_line_id: i64,
    pub version: String,
    pub product_id: i64,
    pub product_uom_id: i64,
    pub product_qty: Decimal,
}

/// Production-facing BOM line shared with the manufacturing side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionBomLine {
    pub id: i64,
    pub product_id: i64,
    pub product_uom_id: i64,
    pub product_qty: Decimal,
}

/// Header-level totals produced by a recompute pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomTotals {
    pub amount_untaxed: Decimal,
    pub direct_amount_untaxed: Decimal,
    pub standard_amount_untaxed: Decimal,
}

pub(crate) fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("All product quantities must be greater or equal to 0".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn price_unit_type_round_trips_through_strings() {
        assert_eq!(PriceUnitType::Avg.to_string(), "avg");
        assert_eq!(PriceUnitType::from_str("first").unwrap(), PriceUnitType::First);
        assert!(PriceUnitType::from_str("median").is_err());
    }

    #[test]
    fn negative_line_quantity_is_rejected() {
        let mut line = NewBomLine::new(1, 2, 3, dec!(-1));
        assert!(line.validate().is_err());
        line.product_qty = dec!(0);
        assert!(line.validate().is_ok());
    }

    #[test]
    fn refresh_amounts_applies_forecast_only_to_the_total() {
        let mut line = BomLine {
            id: 1,
            bom_id: 1,
            sequence: 1,
            product_tmpl_id: 1,
            product_type_id: None,
            product_id: None,
            product_uom_id: 1,
            product_qty: dec!(2),
            price_unit: dec!(4.5),
            avg_price_unit: Decimal::ZERO,
            price_subtotal: Decimal::ZERO,
            direct_price_subtotal: Decimal::ZERO,
            forecast_product_qty: Decimal::ZERO,
            partner_id: None,
            description: None,
            editable: false,
            approve: false,
            production_line_id: None,
        };
        line.refresh_amounts(dec!(10));
        assert_eq!(line.price_subtotal, dec!(90));
        assert_eq!(line.direct_price_subtotal, dec!(9));
        assert_eq!(line.forecast_product_qty, dec!(20));
    }

    #[test]
    fn operation_display_name_uses_code_when_present() {
        let mut op = BomLineOperation {
            id: 1,
            bom_line_id: 1,
            bom_id: 1,
            sequence: 1,
            name: Some("Cutting".into()),
            code: Some("OP10".into()),
            description: None,
            product_id: None,
            source_product_id: None,
            product_uom_id: None,
            product_qty: dec!(1),
            attribute_value_ids: vec![],
        };
        assert_eq!(op.display_name(), "[OP10] Cutting");
        op.code = None;
        assert_eq!(op.display_name(), "Cutting");
    }
}
