#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use project_bom::{
    models::{
        NewBomHeader, Product, ProductCategory, ProductTemplate, ProductType, PurchaseLine,
        PurchaseState, Tax, Uom,
    },
    repositories::{InMemoryStore, SeaOrmBomRepository},
    services::{
        currency::{PercentTaxEngine, RateTableConverter},
        importer::{BomExplorer, LocalBomExplorer},
    },
    BomContext, ProjectBomService,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const UNITS: i64 = 1;
pub const KG: i64 = 10;
pub const GRAM: i64 = 11;

pub const TYPE_FRAME: i64 = 100;
pub const TYPE_HARDWARE: i64 = 200;

pub const VAT_25_INCLUDED: i64 = 1;

/// Test harness: one in-memory store behind every repository seam.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub rates: Arc<RateTableConverter>,
    pub service: ProjectBomService,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Arc::new(InMemoryStore::new()), None, None)
    }

    pub fn with_explorer(explorer: Arc<dyn BomExplorer>) -> Self {
        Self::build(Arc::new(InMemoryStore::new()), Some(explorer), None)
    }

    /// Harness persisting project BOM records through SeaORM; the catalog
    /// and purchase data stay in memory.
    pub fn with_bom_storage(repository: Arc<SeaOrmBomRepository>) -> Self {
        Self::build(Arc::new(InMemoryStore::new()), None, Some(repository))
    }

    /// Harness whose explorer reads exploded BOMs registered on the returned handle.
    pub fn with_local_explorer() -> (Self, Arc<LocalBomExplorer>) {
        let store = Arc::new(InMemoryStore::new());
        let explorer = Arc::new(LocalBomExplorer::new(store.clone()));
        let harness = Self::build(store, Some(explorer.clone()), None);
        (harness, explorer)
    }

    fn build(
        store: Arc<InMemoryStore>,
        explorer: Option<Arc<dyn BomExplorer>>,
        storage: Option<Arc<SeaOrmBomRepository>>,
    ) -> Self {
        seed_reference_data(&store);

        let rates = Arc::new(RateTableConverter::new("EUR", 2));
        rates.add_rate("USD", day(0).date_naive(), dec!(2));

        let taxes = Arc::new(PercentTaxEngine::new(vec![Tax {
            id: VAT_25_INCLUDED,
            name: "VAT 25% included".into(),
            amount: dec!(25),
            price_include: true,
        }]));

        let mut ctx = BomContext::in_memory(store.clone(), rates.clone(), taxes, "EUR");
        if let Some(repository) = storage {
            ctx = ctx.with_bom_storage(repository);
        }
        let service = ProjectBomService::new(ctx, explorer);
        Self {
            store,
            rates,
            service,
        }
    }

    /// Adds a template with a single variant sharing its id.
    pub fn add_item(&self, id: i64, code: &str, uom_id: i64, standard_price: Decimal) -> i64 {
        self.add_template(id, code, uom_id, standard_price, None);
        self.add_variant(id, id, code, uom_id, standard_price);
        id
    }

    pub fn add_template(
        &self,
        id: i64,
        code: &str,
        uom_id: i64,
        standard_price: Decimal,
        categ_id: Option<i64>,
    ) {
        self.store.add_template(ProductTemplate {
            id,
            name: format!("Template {}", code),
            default_code: Some(code.to_string()),
            uom_id,
            categ_id,
            product_type_id: None,
            standard_price,
            attribute_value_ids: vec![],
        });
    }

    pub fn add_variant(
        &self,
        id: i64,
        product_tmpl_id: i64,
        code: &str,
        uom_id: i64,
        standard_price: Decimal,
    ) {
        self.store.add_product(Product {
            id,
            product_tmpl_id,
            default_code: Some(code.to_string()),
            uom_id,
            standard_price,
            direct_standard_price: Decimal::ZERO,
            attribute_value_ids: vec![],
        });
    }

    pub async fn header_for(&self, product_id: i64) -> i64 {
        let product = self.store.product(product_id).expect("product seeded");
        let mut header = NewBomHeader::new(product.product_tmpl_id, product.uom_id, "EUR");
        header.product_id = Some(product_id);
        self.service
            .create_header(header)
            .await
            .expect("header created")
            .id
    }
}

pub fn day(offset: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(offset)
}

/// Confirmed EUR purchase of `qty` units at `price`, planned `offset` days
/// after the first of January 2024, fully received.
pub fn purchase(id: i64, product_id: i64, price: Decimal, qty: Decimal, offset: i64) -> PurchaseLine {
    PurchaseLine {
        id,
        order_id: id,
        product_id,
        partner_id: Some(900),
        state: PurchaseState::Purchase,
        price_unit: price,
        product_qty: qty,
        qty_received: qty,
        product_uom_id: UNITS,
        tax_ids: vec![],
        currency_code: "EUR".into(),
        date_planned: day(offset),
        date_order: day(offset),
        date_approve: None,
    }
}

fn seed_reference_data(store: &InMemoryStore) {
    store.add_uom(Uom {
        id: UNITS,
        name: "Units".into(),
        category_id: 1,
        factor: dec!(1),
    });
    store.add_uom(Uom {
        id: KG,
        name: "kg".into(),
        category_id: 2,
        factor: dec!(1),
    });
    store.add_uom(Uom {
        id: GRAM,
        name: "g".into(),
        category_id: 2,
        factor: dec!(1000),
    });

    store.add_product_type(ProductType {
        id: TYPE_FRAME,
        name: "Frame".into(),
        code: Some("10".into()),
        sequence: 1,
    });
    store.add_product_type(ProductType {
        id: TYPE_HARDWARE,
        name: "Hardware".into(),
        code: Some("30".into()),
        sequence: 2,
    });

    // Structure (frame) > Welded (no type) ; Fasteners (hardware)
    store.add_category(ProductCategory {
        id: 1,
        name: "Structure".into(),
        parent_id: None,
        product_type_id: Some(TYPE_FRAME),
    });
    store.add_category(ProductCategory {
        id: 2,
        name: "Welded".into(),
        parent_id: Some(1),
        product_type_id: None,
    });
    store.add_category(ProductCategory {
        id: 3,
        name: "Fasteners".into(),
        parent_id: None,
        product_type_id: Some(TYPE_HARDWARE),
    });
}
