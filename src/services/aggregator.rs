use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::errors::ServiceError;
use crate::models::{BomHeader, BomLine, BomTotals};
use crate::repositories::{BomRepository, CatalogRepository, DemandSource};
use crate::services::currency::CurrencyConverter;

/// Refreshes every line's amounts and returns the unrounded
/// `(Σ price_subtotal, Σ direct_price_subtotal)`.
pub fn line_totals(lines: &mut [BomLine], forecast_product_qty: Decimal) -> (Decimal, Decimal) {
    lines.iter_mut().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(amount, direct), line| {
            line.refresh_amounts(forecast_product_qty);
            (amount + line.price_subtotal, direct + line.direct_price_subtotal)
        },
    )
}

/// Keeps header totals consistent with the line collection and pushes the
/// direct cost onto the subject product.
#[derive(Clone)]
pub struct BomAggregator {
    boms: Arc<dyn BomRepository>,
    catalog: Arc<dyn CatalogRepository>,
    demand: Arc<dyn DemandSource>,
    currency: Arc<dyn CurrencyConverter>,
}

impl BomAggregator {
    pub fn new(
        boms: Arc<dyn BomRepository>,
        catalog: Arc<dyn CatalogRepository>,
        demand: Arc<dyn DemandSource>,
        currency: Arc<dyn CurrencyConverter>,
    ) -> Self {
        Self {
            boms,
            catalog,
            demand,
            currency,
        }
    }

    /// Recomputes line amounts and header totals, persists both and
    /// propagates the direct cost. Running it twice yields the same totals.
    #[instrument(skip(self))]
    pub async fn recompute(&self, bom_id: i64) -> Result<BomTotals, ServiceError> {
        let mut header = self.boms.find_header(bom_id).await?;
        let mut lines = self.boms.find_lines(bom_id).await?;
        let previous = lines.clone();

        let (amount, direct) = line_totals(&mut lines, header.forecast_product_qty);
        for (line, before) in lines.iter().zip(previous.iter()) {
            if line != before {
                self.boms.update_line(line).await?;
            }
        }

        let standard_price = self.standard_price(&header).await?;
        let totals = BomTotals {
            amount_untaxed: self.currency.round(amount, &header.currency_code),
            direct_amount_untaxed: self.currency.round(direct, &header.currency_code),
            standard_amount_untaxed: self
                .currency
                .round(header.forecast_product_qty * standard_price, &header.currency_code),
        };

        if header.amount_untaxed != totals.amount_untaxed
            || header.direct_amount_untaxed != totals.direct_amount_untaxed
            || header.standard_amount_untaxed != totals.standard_amount_untaxed
        {
            header.amount_untaxed = totals.amount_untaxed;
            header.direct_amount_untaxed = totals.direct_amount_untaxed;
            header.standard_amount_untaxed = totals.standard_amount_untaxed;
            self.boms.update_header(&header).await?;
        }

        self.propagate_direct_cost(&header, totals.direct_amount_untaxed)
            .await?;

        debug!(
            amount_untaxed = %totals.amount_untaxed,
            direct_amount_untaxed = %totals.direct_amount_untaxed,
            standard_amount_untaxed = %totals.standard_amount_untaxed,
            "project BOM totals recomputed"
        );
        Ok(totals)
    }

    /// Sums the linked demand for the header's product into its forecast
    /// quantity. An empty demand signal keeps the previous value.
    #[instrument(skip(self))]
    pub async fn recompute_forecast(&self, bom_id: i64) -> Result<Decimal, ServiceError> {
        let mut header = self.boms.find_header(bom_id).await?;
        let Some(product_id) = header.product_id else {
            debug!("header has no product variant; forecast left unchanged");
            return Ok(header.forecast_product_qty);
        };

        let demand: Decimal = self
            .demand
            .demand_lines(&header.sale_order_ids)
            .await?
            .iter()
            .filter(|line| line.product_id == product_id)
            .map(|line| line.product_uom_qty)
            .sum();

        if demand.is_zero() {
            debug!(
                forecast = %header.forecast_product_qty,
                "no matching demand; forecast left unchanged"
            );
            return Ok(header.forecast_product_qty);
        }

        header.forecast_product_qty = demand;
        self.boms.update_header(&header).await?;
        info!(forecast = %demand, "forecast quantity updated from demand");
        self.recompute(bom_id).await?;
        Ok(demand)
    }

    async fn standard_price(&self, header: &BomHeader) -> Result<Decimal, ServiceError> {
        match header.product_id {
            Some(product_id) => Ok(self.catalog.find_product(product_id).await?.standard_price),
            None => Ok(self
                .catalog
                .find_template(header.product_tmpl_id)
                .await?
                .standard_price),
        }
    }

    async fn propagate_direct_cost(
        &self,
        header: &BomHeader,
        direct: Decimal,
    ) -> Result<(), ServiceError> {
        let product_id = match header.product_id {
            Some(id) => id,
            None => {
                let variants = self.catalog.find_variants(header.product_tmpl_id).await?;
                match variants.as_slice() {
                    [only] => only.id,
                    _ => {
                        debug!(
                            variants = variants.len(),
                            "direct cost not propagated to a multi-variant template"
                        );
                        return Ok(());
                    }
                }
            }
        };
        self.catalog
            .set_direct_standard_price(product_id, direct)
            .await
    }
}
