use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::errors::ServiceError;
use crate::models::{
    BomHeader, BomLine, PriceUnitType, Product, PurchaseLine, PurchaseState, SupplierPrice,
};
use crate::repositories::{CatalogRepository, PurchaseHistory};
use crate::services::currency::{CurrencyConverter, TaxEngine};

/// Lines repriced under a policy, with the subtotal they accumulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyOutcome {
    pub policy: PriceUnitType,
    pub lines: Vec<BomLine>,
    pub subtotal: Decimal,
}

impl PolicyOutcome {
    /// Header-level unit price: the accumulated subtotal spread over the forecast quantity.
    pub fn unit_price(&self, forecast_product_qty: Decimal) -> Result<Decimal, ServiceError> {
        if forecast_product_qty.is_zero() {
            return Err(ServiceError::DivisionByZero(
                "forecast quantity is zero".to_string(),
            ));
        }
        Ok(self.subtotal / forecast_product_qty)
    }
}

/// Every price observation available for one line's template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCandidates {
    pub product_tmpl_id: i64,
    pub product_uom_id: i64,
    /// Template standard price, or the mean over variants when there are several
    pub standard_price: Decimal,
    /// Confirmed purchases of every variant, newest planned date first
    pub purchases: Vec<PurchaseLine>,
    pub suppliers: Vec<SupplierPrice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceChoice {
    Purchase(i64),
    Supplier(i64),
    Standard,
}

/// Picks the purchase line a positional policy selects.
///
/// Ties keep the earliest line in the given order.
pub fn select_purchase(lines: &[PurchaseLine], policy: PriceUnitType) -> Option<&PurchaseLine> {
    if policy == PriceUnitType::Avg {
        return None;
    }
    lines.iter().fold(None, |best, candidate| match best {
        Some(current) if !outranks(candidate, current, policy) => Some(current),
        _ => Some(candidate),
    })
}

fn outranks(candidate: &PurchaseLine, current: &PurchaseLine, policy: PriceUnitType) -> bool {
    match policy {
        PriceUnitType::Last => candidate.date_planned > current.date_planned,
        PriceUnitType::First => candidate.date_planned < current.date_planned,
        PriceUnitType::Top => candidate.price_unit > current.price_unit,
        PriceUnitType::Low => candidate.price_unit < current.price_unit,
        PriceUnitType::Avg => false,
    }
}

/// Σ(price × qty) / Σ qty, with a zero denominator replaced by one.
pub fn weighted_average(observations: &[(Decimal, Decimal)]) -> Decimal {
    let (amount, qty) = observations
        .iter()
        .fold((Decimal::ZERO, Decimal::ZERO), |(amount, qty), (price, received)| {
            (amount + price * received, qty + received)
        });
    let qty = if qty.is_zero() { Decimal::ONE } else { qty };
    amount / qty
}

/// Selects unit prices for BOM lines from purchase history, vendor price
/// lists or standard cost. Every price it returns is tax-excluded, in the
/// product's unit of measure and in the company currency.
#[derive(Clone)]
pub struct PriceResolver {
    catalog: Arc<dyn CatalogRepository>,
    purchases: Arc<dyn PurchaseHistory>,
    currency: Arc<dyn CurrencyConverter>,
    taxes: Arc<dyn TaxEngine>,
    company_currency: String,
}

impl PriceResolver {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        purchases: Arc<dyn PurchaseHistory>,
        currency: Arc<dyn CurrencyConverter>,
        taxes: Arc<dyn TaxEngine>,
        company_currency: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            purchases,
            currency,
            taxes,
            company_currency: company_currency.into(),
        }
    }

    pub fn company_currency(&self) -> &str {
        &self.company_currency
    }

    /// Purchase price of `product` stripped of taxes, scaled to the product's
    /// unit of measure and converted at the order's approval date.
    pub async fn normalize_purchase_price(
        &self,
        purchase: &PurchaseLine,
        product: &Product,
    ) -> Result<Decimal, ServiceError> {
        let mut price = purchase.price_unit;
        if !purchase.tax_ids.is_empty() {
            price = self
                .taxes
                .compute_taxes(
                    price,
                    &purchase.tax_ids,
                    Decimal::ONE,
                    &purchase.currency_code,
                    Some(purchase.product_id),
                    purchase.partner_id,
                )?
                .total_excluded;
        }
        if purchase.product_uom_id != product.uom_id {
            let purchase_uom = self.catalog.find_uom(purchase.product_uom_id).await?;
            let product_uom = self.catalog.find_uom(product.uom_id).await?;
            price = purchase_uom.compute_price(price, &product_uom);
        }
        if purchase.currency_code != self.company_currency {
            price = self.currency.convert(
                price,
                &purchase.currency_code,
                &self.company_currency,
                purchase.conversion_date(),
            )?;
        }
        Ok(price)
    }

    /// Received-quantity weighted average of every confirmed purchase of the
    /// template's variants; zero when nothing was received.
    #[instrument(skip(self))]
    pub async fn average_price(&self, product_tmpl_id: i64) -> Result<Decimal, ServiceError> {
        let mut observations = Vec::new();
        for variant in self.catalog.find_variants(product_tmpl_id).await? {
            let lines = self
                .purchases
                .purchase_lines(variant.id, &PurchaseState::CONFIRMED)
                .await?;
            for purchase in lines.iter().filter(|p| !p.qty_received.is_zero()) {
                let price = self.normalize_purchase_price(purchase, &variant).await?;
                observations.push((price, purchase.qty_received));
            }
        }
        Ok(weighted_average(&observations))
    }

    /// Reprices `lines` under the header's policy. Returns `None` when the
    /// header keeps manually entered prices.
    #[instrument(skip(self, header, lines), fields(bom_id = header.id))]
    pub async fn apply_policy(
        &self,
        header: &BomHeader,
        lines: Vec<BomLine>,
    ) -> Result<Option<PolicyOutcome>, ServiceError> {
        let Some(policy) = header.price_unit_type else {
            return Ok(None);
        };

        let mut subtotal = Decimal::ZERO;
        let mut repriced = Vec::with_capacity(lines.len());
        for mut line in lines {
            if policy == PriceUnitType::Avg {
                let avg = self.average_price(line.product_tmpl_id).await?;
                line.avg_price_unit = avg;
                line.price_unit = avg;
                line.refresh_amounts(header.forecast_product_qty);
                subtotal += line.price_subtotal;
            } else {
                for variant in self.catalog.find_variants(line.product_tmpl_id).await? {
                    let history = self
                        .purchases
                        .purchase_lines(variant.id, &PurchaseState::CONFIRMED)
                        .await?;
                    if let Some(purchase) = select_purchase(&history, policy) {
                        line.price_unit = self.normalize_purchase_price(purchase, &variant).await?;
                        line.refresh_amounts(header.forecast_product_qty);
                        subtotal += line.price_subtotal;
                    }
                }
            }
            repriced.push(line);
        }

        debug!(%policy, %subtotal, lines = repriced.len(), "lines repriced");
        Ok(Some(PolicyOutcome {
            policy,
            lines: repriced,
            subtotal,
        }))
    }

    /// Unit price used when a single product is moved: the manual price if
    /// set, else the latest confirmed purchase, else the standard cost.
    #[instrument(skip(self))]
    pub async fn unit_price_for_move(
        &self,
        product_id: i64,
        manual_price: Decimal,
    ) -> Result<Decimal, ServiceError> {
        if !manual_price.is_zero() {
            return Ok(manual_price);
        }
        let product = self.catalog.find_product(product_id).await?;
        let history = self
            .purchases
            .purchase_lines(product_id, &PurchaseState::CONFIRMED)
            .await?;
        match select_purchase(&history, PriceUnitType::Last) {
            Some(purchase) => self.normalize_purchase_price(purchase, &product).await,
            None => Ok(product.standard_price),
        }
    }

    /// First vendor entry, by sequence, that matches one of the template's
    /// variants, the partner (when given), the quantity and the date.
    pub async fn select_seller(
        &self,
        product_tmpl_id: i64,
        partner_id: Option<i64>,
        quantity: Decimal,
        uom_id: i64,
        date: NaiveDate,
    ) -> Result<Option<SupplierPrice>, ServiceError> {
        let sellers = self.purchases.supplier_prices(product_tmpl_id).await?;
        if sellers.is_empty() {
            return Ok(None);
        }
        let uom = self.catalog.find_uom(uom_id).await?;
        for variant in self.catalog.find_variants(product_tmpl_id).await? {
            for seller in &sellers {
                if seller.product_id.map_or(false, |id| id != variant.id) {
                    continue;
                }
                if partner_id.map_or(false, |p| p != seller.partner_id) {
                    continue;
                }
                if !seller.is_valid_on(date) {
                    continue;
                }
                let qty_in_seller_uom = if seller.product_uom_id == uom.id {
                    quantity
                } else {
                    let seller_uom = self.catalog.find_uom(seller.product_uom_id).await?;
                    uom.compute_quantity(quantity, &seller_uom)
                };
                if qty_in_seller_uom < seller.min_qty {
                    continue;
                }
                return Ok(Some(seller.clone()));
            }
        }
        Ok(None)
    }

    /// Vendor price for a line's current quantity and unit, converted to the
    /// company currency and to the line's unit of measure.
    #[instrument(skip(self, line), fields(line_id = line.id))]
    pub async fn seller_price(&self, line: &BomLine) -> Result<Option<Decimal>, ServiceError> {
        let today = Utc::now().date_naive();
        let Some(seller) = self
            .select_seller(
                line.product_tmpl_id,
                line.partner_id,
                line.product_qty,
                line.product_uom_id,
                today,
            )
            .await?
        else {
            return Ok(None);
        };

        let mut price = seller.price;
        if !price.is_zero() && seller.currency_code != self.company_currency {
            price = self
                .currency
                .convert(price, &seller.currency_code, &self.company_currency, today)?;
        }
        if seller.product_uom_id != line.product_uom_id {
            let seller_uom = self.catalog.find_uom(seller.product_uom_id).await?;
            let line_uom = self.catalog.find_uom(line.product_uom_id).await?;
            price = seller_uom.compute_price(price, &line_uom);
        }
        Ok(Some(price))
    }

    /// Collects the prices a user can choose from for a line.
    #[instrument(skip(self, line), fields(line_id = line.id))]
    pub async fn price_candidates(&self, line: &BomLine) -> Result<PriceCandidates, ServiceError> {
        let template = self.catalog.find_template(line.product_tmpl_id).await?;
        let variants = self.catalog.find_variants(template.id).await?;

        let mut purchases = Vec::new();
        for variant in &variants {
            purchases.extend(
                self.purchases
                    .purchase_lines(variant.id, &PurchaseState::CONFIRMED)
                    .await?,
            );
        }
        purchases.sort_by(|a, b| b.date_planned.cmp(&a.date_planned));

        let standard_price = if variants.len() > 1 {
            let total: Decimal = variants.iter().map(|v| v.standard_price).sum();
            total / Decimal::from(variants.len())
        } else {
            template.standard_price
        };

        Ok(PriceCandidates {
            product_tmpl_id: template.id,
            product_uom_id: line.product_uom_id,
            standard_price,
            purchases,
            suppliers: self.purchases.supplier_prices(template.id).await?,
        })
    }

    /// Normalized price of the chosen candidate.
    pub async fn candidate_price(
        &self,
        candidates: &PriceCandidates,
        choice: PriceChoice,
    ) -> Result<Decimal, ServiceError> {
        match choice {
            PriceChoice::Standard => Ok(candidates.standard_price),
            PriceChoice::Purchase(id) => {
                let purchase = candidates
                    .purchases
                    .iter()
                    .find(|p| p.id == id)
                    .ok_or_else(|| ServiceError::not_found("Purchase line", id))?;
                let product = self.catalog.find_product(purchase.product_id).await?;
                self.normalize_purchase_price(purchase, &product).await
            }
            PriceChoice::Supplier(id) => {
                let seller = candidates
                    .suppliers
                    .iter()
                    .find(|s| s.id == id)
                    .ok_or_else(|| ServiceError::not_found("Supplier price", id))?;
                let product_uom_id = match seller.product_id {
                    Some(product_id) => self.catalog.find_product(product_id).await?.uom_id,
                    None => self.catalog.find_template(seller.product_tmpl_id).await?.uom_id,
                };
                let mut price = seller.price;
                if seller.product_uom_id != product_uom_id {
                    let seller_uom = self.catalog.find_uom(seller.product_uom_id).await?;
                    let product_uom = self.catalog.find_uom(product_uom_id).await?;
                    price = seller_uom.compute_price(price, &product_uom);
                }
                if seller.currency_code != self.company_currency {
                    price = self.currency.convert(
                        price,
                        &seller.currency_code,
                        &self.company_currency,
                        Utc::now().date_naive(),
                    )?;
                }
                Ok(price)
            }
        }
    }
}
