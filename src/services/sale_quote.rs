use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::BomLine;
use crate::repositories::{BomRepository, CatalogRepository};
use crate::services::currency::{CurrencyConverter, TaxEngine};

/// Parameters for turning project BOMs into sale order lines.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaleQuoteRequest {
    #[validate(length(min = 1, message = "At least one project BOM is required"))]
    pub bom_ids: Vec<i64>,
    /// Currency of the target sale order
    pub currency_code: String,
    /// Conversion date for prices held in the company currency
    pub date: NaiveDate,
    /// Number of finished units quoted
    pub product_uom_qty: Decimal,
    /// Multiplier applied to every converted unit price
    pub save_coefficient: Decimal,
    /// Discount percentage copied onto every line
    pub discount: Decimal,
    pub tax_ids: Vec<i64>,
    pub partner_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleQuoteLine {
    pub bom_id: i64,
    pub bom_line_id: i64,
    pub product_tmpl_id: i64,
    pub product_id: i64,
    pub product_uom_id: i64,
    pub product_uom_qty: Decimal,
    pub price_unit: Decimal,
    pub discount: Decimal,
    pub price_subtotal: Decimal,
    pub price_tax: Decimal,
    pub price_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleQuote {
    pub currency_code: String,
    pub lines: Vec<SaleQuoteLine>,
    /// BOM lines left out (zero quantity or no sellable variant)
    pub skipped: Vec<i64>,
}

impl SaleQuote {
    pub fn amount_untaxed(&self) -> Decimal {
        self.lines.iter().map(|l| l.price_subtotal).sum()
    }

    pub fn amount_total(&self) -> Decimal {
        self.lines.iter().map(|l| l.price_total).sum()
    }
}

/// Builds sale quote lines from project BOM lines.
#[derive(Clone)]
pub struct SaleQuoteBuilder {
    boms: Arc<dyn BomRepository>,
    catalog: Arc<dyn CatalogRepository>,
    currency: Arc<dyn CurrencyConverter>,
    taxes: Arc<dyn TaxEngine>,
    company_currency: String,
}

impl SaleQuoteBuilder {
    pub fn new(
        boms: Arc<dyn BomRepository>,
        catalog: Arc<dyn CatalogRepository>,
        currency: Arc<dyn CurrencyConverter>,
        taxes: Arc<dyn TaxEngine>,
        company_currency: impl Into<String>,
    ) -> Self {
        Self {
            boms,
            catalog,
            currency,
            taxes,
            company_currency: company_currency.into(),
        }
    }

    #[instrument(skip(self, request), fields(boms = request.bom_ids.len()))]
    pub async fn build(&self, request: &SaleQuoteRequest) -> Result<SaleQuote, ServiceError> {
        request.validate()?;

        let mut quote = SaleQuote {
            currency_code: request.currency_code.clone(),
            lines: Vec::new(),
            skipped: Vec::new(),
        };
        for &bom_id in &request.bom_ids {
            for line in self.boms.find_lines(bom_id).await? {
                match self.quote_line(&line, request).await? {
                    Some(quoted) => quote.lines.push(quoted),
                    None => quote.skipped.push(line.id),
                }
            }
        }
        debug!(
            lines = quote.lines.len(),
            skipped = quote.skipped.len(),
            "sale quote built"
        );
        Ok(quote)
    }

    async fn quote_line(
        &self,
        line: &BomLine,
        request: &SaleQuoteRequest,
    ) -> Result<Option<SaleQuoteLine>, ServiceError> {
        let qty = line.product_qty * request.product_uom_qty;
        if qty.is_zero() {
            return Ok(None);
        }
        let Some(product_id) = self.sellable_product(line).await? else {
            return Ok(None);
        };

        let mut price_unit = line.price_unit;
        if request.currency_code != self.company_currency {
            price_unit = self.currency.convert(
                price_unit,
                &self.company_currency,
                &request.currency_code,
                request.date,
            )?;
        }
        price_unit *= request.save_coefficient;

        let discounted = price_unit * (Decimal::ONE - request.discount / Decimal::ONE_HUNDRED);
        let breakdown = self.taxes.compute_taxes(
            discounted,
            &request.tax_ids,
            qty,
            &request.currency_code,
            Some(product_id),
            request.partner_id,
        )?;
        let price_subtotal = self
            .currency
            .round(breakdown.total_excluded, &request.currency_code);
        let price_total = self
            .currency
            .round(breakdown.total_included, &request.currency_code);

        Ok(Some(SaleQuoteLine {
            bom_id: line.bom_id,
            bom_line_id: line.id,
            product_tmpl_id: line.product_tmpl_id,
            product_id,
            product_uom_id: line.product_uom_id,
            product_uom_qty: qty,
            price_unit,
            discount: request.discount,
            price_subtotal,
            price_tax: price_total - price_subtotal,
            price_total,
        }))
    }

    /// The line's variant, else the template's only variant.
    async fn sellable_product(&self, line: &BomLine) -> Result<Option<i64>, ServiceError> {
        if let Some(product_id) = line.product_id {
            return Ok(Some(product_id));
        }
        let variants = self.catalog.find_variants(line.product_tmpl_id).await?;
        Ok(match variants.as_slice() {
            [only] => Some(only.id),
            _ => None,
        })
    }
}
