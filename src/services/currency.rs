//! Currency conversion and tax computation seams.
//!
//! The engine treats both as pure functions supplied by the host platform.
//! `RateTableConverter` and `PercentTaxEngine` are reference implementations
//! backed by in-process tables.

use chrono::NaiveDate;
use dashmap::DashMap;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;

use crate::errors::ServiceError;
use crate::models::{Tax, TaxAmount, TaxBreakdown};

pub trait CurrencyConverter: Send + Sync {
    /// Converts `amount` from one currency into another at the rate valid on `date`.
    fn convert(
        &self,
        amount: Decimal,
        from: &str,
        to: &str,
        date: NaiveDate,
    ) -> Result<Decimal, ServiceError>;

    /// Rounds an amount with the rounding rule of `currency`.
    fn round(&self, amount: Decimal, currency: &str) -> Decimal;
}

pub trait TaxEngine: Send + Sync {
    /// Splits `price_unit * quantity` into excluded/included totals for the given taxes.
    fn compute_taxes(
        &self,
        price_unit: Decimal,
        tax_ids: &[i64],
        quantity: Decimal,
        currency: &str,
        product_id: Option<i64>,
        partner_id: Option<i64>,
    ) -> Result<TaxBreakdown, ServiceError>;
}

/// Dated exchange rates relative to the company currency.
///
/// A rate is the number of units of the currency worth one unit of the
/// company currency; the company currency itself always has rate 1.
#[derive(Debug)]
pub struct RateTableConverter {
    company_currency: String,
    default_decimal_places: u32,
    rates: DashMap<String, Vec<(NaiveDate, Decimal)>>,
    decimal_places: DashMap<String, u32>,
}

impl RateTableConverter {
    pub fn new(company_currency: impl Into<String>, default_decimal_places: u32) -> Self {
        Self {
            company_currency: company_currency.into(),
            default_decimal_places,
            rates: DashMap::new(),
            decimal_places: DashMap::new(),
        }
    }

    pub fn add_rate(&self, currency: &str, date: NaiveDate, rate: Decimal) {
        let mut entry = self.rates.entry(currency.to_string()).or_default();
        entry.push((date, rate));
        entry.sort_by_key(|(d, _)| *d);
    }

    pub fn set_decimal_places(&self, currency: &str, places: u32) {
        self.decimal_places.insert(currency.to_string(), places);
    }

    /// Latest rate on or before `date`, falling back to the earliest known rate
    fn rate(&self, currency: &str, date: NaiveDate) -> Result<Decimal, ServiceError> {
        if currency == self.company_currency {
            return Ok(Decimal::ONE);
        }
        let rates = self.rates.get(currency).ok_or_else(|| {
            ServiceError::NotFound(format!("No exchange rate for currency {}", currency))
        })?;
        let rate = rates
            .iter()
            .rev()
            .find(|(d, _)| *d <= date)
            .or_else(|| rates.first())
            .map(|(_, r)| *r)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("No exchange rate for currency {}", currency))
            })?;
        if rate.is_zero() {
            return Err(ServiceError::DivisionByZero(format!(
                "Exchange rate of {} is zero",
                currency
            )));
        }
        Ok(rate)
    }
}

impl CurrencyConverter for RateTableConverter {
    fn convert(
        &self,
        amount: Decimal,
        from: &str,
        to: &str,
        date: NaiveDate,
    ) -> Result<Decimal, ServiceError> {
        if from == to || amount.is_zero() {
            return Ok(amount);
        }
        let from_rate = self.rate(from, date)?;
        let to_rate = self.rate(to, date)?;
        Ok(amount / from_rate * to_rate)
    }

    fn round(&self, amount: Decimal, currency: &str) -> Decimal {
        let places = self
            .decimal_places
            .get(currency)
            .map(|p| *p)
            .unwrap_or(self.default_decimal_places);
        amount.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero)
    }
}

/// Percentage taxes, either added on top of the price or included in it.
#[derive(Debug, Default)]
pub struct PercentTaxEngine {
    taxes: HashMap<i64, Tax>,
}

impl PercentTaxEngine {
    pub fn new(taxes: impl IntoIterator<Item = Tax>) -> Self {
        Self {
            taxes: taxes.into_iter().map(|t| (t.id, t)).collect(),
        }
    }
}

impl TaxEngine for PercentTaxEngine {
    fn compute_taxes(
        &self,
        price_unit: Decimal,
        tax_ids: &[i64],
        quantity: Decimal,
        _currency: &str,
        _product_id: Option<i64>,
        _partner_id: Option<i64>,
    ) -> Result<TaxBreakdown, ServiceError> {
        let taxes = tax_ids
            .iter()
            .map(|id| {
                self.taxes
                    .get(id)
                    .ok_or_else(|| ServiceError::not_found("Tax", id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let gross = price_unit * quantity;
        let included_pct: Decimal = taxes
            .iter()
            .filter(|t| t.price_include)
            .map(|t| t.amount)
            .sum();
        let divisor = Decimal::ONE + included_pct / Decimal::ONE_HUNDRED;
        if divisor.is_zero() {
            return Err(ServiceError::DivisionByZero(
                "Included taxes cancel out the price".to_string(),
            ));
        }
        let total_excluded = gross / divisor;

        let amounts: Vec<TaxAmount> = taxes
            .iter()
            .map(|t| TaxAmount {
                tax_id: t.id,
                amount: total_excluded * t.amount / Decimal::ONE_HUNDRED,
            })
            .collect();
        let total_included = total_excluded + amounts.iter().map(|a| a.amount).sum::<Decimal>();

        Ok(TaxBreakdown {
            total_excluded,
            total_included,
            taxes: amounts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn converts_through_the_company_currency() {
        let converter = RateTableConverter::new("EUR", 2);
        converter.add_rate("USD", day(1), dec!(1.25));
        converter.add_rate("USD", day(10), dec!(2));
        converter.add_rate("GBP", day(1), dec!(0.5));

        assert_eq!(converter.convert(dec!(10), "USD", "EUR", day(5)).unwrap(), dec!(8));
        assert_eq!(converter.convert(dec!(10), "USD", "EUR", day(12)).unwrap(), dec!(5));
        assert_eq!(converter.convert(dec!(10), "EUR", "GBP", day(5)).unwrap(), dec!(5));
        assert_eq!(converter.convert(dec!(10), "EUR", "EUR", day(5)).unwrap(), dec!(10));
    }

    #[test]
    fn unknown_currency_is_not_found() {
        let converter = RateTableConverter::new("EUR", 2);
        let err = converter
            .convert(dec!(1), "JPY", "EUR", day(1))
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn rounding_follows_currency_precision() {
        let converter = RateTableConverter::new("EUR", 2);
        converter.set_decimal_places("JPY", 0);
        assert_eq!(converter.round(dec!(2.345), "EUR"), dec!(2.35));
        assert_eq!(converter.round(dec!(2.5), "JPY"), dec!(3));
    }

    #[test]
    fn included_tax_is_stripped_from_the_price() {
        let engine = PercentTaxEngine::new(vec![
            Tax {
                id: 1,
                name: "VAT 25 incl.".into(),
                amount: dec!(25),
                price_include: true,
            },
            Tax {
                id: 2,
                name: "Eco 10".into(),
                amount: dec!(10),
                price_include: false,
            },
        ]);
        let included = engine
            .compute_taxes(dec!(125), &[1], dec!(1), "EUR", None, None)
            .unwrap();
        assert_eq!(included.total_excluded, dec!(100));
        assert_eq!(included.total_included, dec!(125));

        let excluded = engine
            .compute_taxes(dec!(100), &[2], dec!(2), "EUR", None, None)
            .unwrap();
        assert_eq!(excluded.total_excluded, dec!(200));
        assert_eq!(excluded.total_included, dec!(220));
    }
}
