use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PurchaseState {
    Draft,
    Sent,
    ToApprove,
    Purchase,
    Done,
    Cancel,
}

impl PurchaseState {
    /// States whose prices count as observed purchase history
    pub const CONFIRMED: [PurchaseState; 2] = [PurchaseState::Purchase, PurchaseState::Done];
}

/// One purchase order line as seen by the price resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub partner_id: Option<i64>,
    pub state: PurchaseState,
    pub price_unit: Decimal,
    pub product_qty: Decimal,
    pub qty_received: Decimal,
    pub product_uom_id: i64,
    pub tax_ids: Vec<i64>,
    pub currency_code: String,
    pub date_planned: DateTime<Utc>,
    pub date_order: DateTime<Utc>,
    pub date_approve: Option<DateTime<Utc>>,
}

impl PurchaseLine {
    /// Date used to convert the order currency into the company currency
    pub fn conversion_date(&self) -> NaiveDate {
        self.date_approve.unwrap_or(self.date_order).date_naive()
    }
}

/// Vendor price list entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierPrice {
    pub id: i64,
    pub partner_id: i64,
    pub product_tmpl_id: i64,
    pub product_id: Option<i64>,
    pub product_uom_id: i64,
    pub sequence: i32,
    pub min_qty: Decimal,
    pub price: Decimal,
    pub currency_code: String,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
}

impl SupplierPrice {
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.date_start.map_or(true, |start| start <= date)
            && self.date_end.map_or(true, |end| date <= end)
    }
}

/// Result of the host platform's tax computation for one unit price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub total_excluded: Decimal,
    pub total_included: Decimal,
    pub taxes: Vec<TaxAmount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxAmount {
    pub tax_id: i64,
    pub amount: Decimal,
}

/// Tax definition used by the reference tax engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tax {
    pub id: i64,
    pub name: String,
    /// Percentage, e.g. 21 for 21 %
    pub amount: Decimal,
    pub price_include: bool,
}
