use std::sync::Arc;

use crate::repositories::{
    BomLineVersionRepository, BomRepository, CatalogRepository, DemandSource, InMemoryStore,
    PurchaseHistory,
};

// Pricing
pub mod currency;
pub mod price_resolver;

// Totals, versions and classification
pub mod aggregator;
pub mod classification;
pub mod version_store;

// BOM import
pub mod importer;
pub mod remote;

// Sales
pub mod sale_quote;

// Facade
pub mod project_bom;

use currency::{CurrencyConverter, TaxEngine};

/// Collaborators shared by every project BOM service.
#[derive(Clone)]
pub struct BomContext {
    pub boms: Arc<dyn BomRepository>,
    pub versions: Arc<dyn BomLineVersionRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub purchases: Arc<dyn PurchaseHistory>,
    pub demand: Arc<dyn DemandSource>,
    pub currency: Arc<dyn CurrencyConverter>,
    pub taxes: Arc<dyn TaxEngine>,
    pub company_currency: String,
}

impl BomContext {
    /// Context where one in-memory store plays every repository role.
    pub fn in_memory(
        store: Arc<InMemoryStore>,
        currency: Arc<dyn CurrencyConverter>,
        taxes: Arc<dyn TaxEngine>,
        company_currency: impl Into<String>,
    ) -> Self {
        Self {
            boms: store.clone(),
            versions: store.clone(),
            catalog: store.clone(),
            purchases: store.clone(),
            demand: store,
            currency,
            taxes,
            company_currency: company_currency.into(),
        }
    }

    /// Replaces the owned-record repositories, keeping the host-side ones.
    pub fn with_bom_storage<R>(mut self, repository: Arc<R>) -> Self
    where
        R: BomRepository + BomLineVersionRepository + 'static,
    {
        self.boms = repository.clone();
        self.versions = repository;
        self
    }
}
