use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Unit of measure.
///
/// `factor` is how many of this unit make one reference unit of the category
/// (kilogram 1, gram 1000).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Uom {
    pub id: i64,
    pub name: String,
    pub category_id: i64,
    pub factor: Decimal,
}

impl Uom {
    /// Converts a price expressed per `self` into a price per `to`.
    pub fn compute_price(&self, price: Decimal, to: &Uom) -> Decimal {
        if self.id == to.id || to.factor.is_zero() {
            return price;
        }
        price * self.factor / to.factor
    }

    /// Converts a quantity expressed in `self` into `to`.
    pub fn compute_quantity(&self, qty: Decimal, to: &Uom) -> Decimal {
        if self.id == to.id || self.factor.is_zero() {
            return qty;
        }
        qty / self.factor * to.factor
    }

    pub fn same_category(&self, other: &Uom) -> bool {
        self.category_id == other.category_id
    }
}

/// Classification used to order BOM lines (sequence is the numeric code).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductType {
    pub id: i64,
    pub name: String,
    pub code: Option<String>,
    pub sequence: i32,
}

impl ProductType {
    pub fn line_sequence(&self) -> i32 {
        line_sequence(Some(self))
    }
}

/// Line sequence derived from a product type code; missing or non-numeric
/// codes sort first.
pub fn line_sequence(product_type: Option<&ProductType>) -> i32 {
    product_type
        .and_then(|t| t.code.as_deref())
        .and_then(|code| code.trim().parse::<i32>().ok())
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCategory {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub product_type_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductTemplate {
    pub id: i64,
    pub name: String,
    pub default_code: Option<String>,
    pub uom_id: i64,
    pub categ_id: Option<i64>,
    pub product_type_id: Option<i64>,
    pub standard_price: Decimal,
    /// Every attribute value offered by the template's attribute lines
    pub attribute_value_ids: Vec<i64>,
}

/// Concrete product variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub product_tmpl_id: i64,
    pub default_code: Option<String>,
    pub uom_id: i64,
    pub standard_price: Decimal,
    pub direct_standard_price: Decimal,
    pub attribute_value_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn uom(id: i64, factor: Decimal) -> Uom {
        Uom {
            id,
            name: format!("uom-{}", id),
            category_id: 1,
            factor,
        }
    }

    #[test]
    fn compute_price_scales_by_factor_ratio() {
        let kg = uom(1, dec!(1));
        let gram = uom(2, dec!(1000));
        assert_eq!(kg.compute_price(dec!(10), &gram), dec!(0.01));
        assert_eq!(gram.compute_price(dec!(0.01), &kg), dec!(10));
        assert_eq!(kg.compute_price(dec!(5), &kg), dec!(5));
    }

    #[test]
    fn compute_quantity_is_the_inverse_of_price() {
        let kg = uom(1, dec!(1));
        let gram = uom(2, dec!(1000));
        assert_eq!(kg.compute_quantity(dec!(2), &gram), dec!(2000));
        assert_eq!(gram.compute_quantity(dec!(500), &kg), dec!(0.5));
    }

    #[test]
    fn line_sequence_parses_numeric_codes_only() {
        let mut product_type = ProductType {
            id: 1,
            name: "Raw".into(),
            code: Some("20".into()),
            sequence: 1,
        };
        assert_eq!(product_type.line_sequence(), 20);
        product_type.code = Some("RAW".into());
        assert_eq!(product_type.line_sequence(), 0);
        assert_eq!(line_sequence(None), 0);
    }
}
