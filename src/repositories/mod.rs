//! Repository seams between the BOM engine and the host platform.
//!
//! The engine only talks to these traits. `InMemoryStore` implements every
//! one of them; `SeaOrmBomRepository` persists the records owned by this
//! module (headers, lines, operations, versions and production lines).

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::ServiceError;
use crate::models::{
    BomHeader, BomLine, BomLineOperation, BomLineVersion, DemandLine, NewBomHeader, NewBomLine,
    NewBomLineOperation, NewBomLineVersion, Product, ProductCategory, ProductTemplate,
    ProductType, ProductionBomLine, PurchaseLine, PurchaseState, SupplierPrice, Uom,
};

pub mod in_memory;
pub mod sea_orm_bom;

pub use in_memory::InMemoryStore;
pub use sea_orm_bom::SeaOrmBomRepository;

/// Storage of project BOM headers, lines and line operations.
///
/// Lines come back ordered by `(sequence, id)`. Inserting or updating a line
/// whose template already appears on another line of the same header fails
/// with `ServiceError::ValidationError`.
#[async_trait]
pub trait BomRepository: Send + Sync {
    async fn find_header(&self, id: i64) -> Result<BomHeader, ServiceError>;
    async fn insert_header(&self, header: NewBomHeader) -> Result<BomHeader, ServiceError>;
    async fn update_header(&self, header: &BomHeader) -> Result<(), ServiceError>;
    /// Removes the header with its lines, their operations and versions
    async fn delete_header(&self, id: i64) -> Result<(), ServiceError>;

    async fn find_lines(&self, bom_id: i64) -> Result<Vec<BomLine>, ServiceError>;
    async fn find_line(&self, id: i64) -> Result<BomLine, ServiceError>;
    async fn insert_line(&self, line: NewBomLine) -> Result<BomLine, ServiceError>;
    async fn update_line(&self, line: &BomLine) -> Result<(), ServiceError>;
    /// Removes lines together with their operations and versions
    async fn delete_lines(&self, ids: &[i64]) -> Result<(), ServiceError>;

    async fn find_operations(&self, bom_line_id: i64)
        -> Result<Vec<BomLineOperation>, ServiceError>;
    async fn find_operation(&self, id: i64) -> Result<BomLineOperation, ServiceError>;
    async fn insert_operation(
        &self,
        operation: NewBomLineOperation,
    ) -> Result<BomLineOperation, ServiceError>;
    async fn update_operation(&self, operation: &BomLineOperation) -> Result<(), ServiceError>;
}

/// Version snapshots and the production lines they are synchronised with.
///
/// `(bom_line_id, version)` is unique; a second insert for the same pair
/// fails with `ServiceError::ValidationError`.
#[async_trait]
pub trait BomLineVersionRepository: Send + Sync {
    async fn find_version(
        &self,
        bom_line_id: i64,
        version: &str,
    ) -> Result<Option<BomLineVersion>, ServiceError>;
    async fn find_versions(&self, bom_line_id: i64) -> Result<Vec<BomLineVersion>, ServiceError>;
    async fn insert_version(
        &self,
        version: NewBomLineVersion,
    ) -> Result<BomLineVersion, ServiceError>;

    async fn find_production_line(&self, id: i64) -> Result<ProductionBomLine, ServiceError>;
    async fn insert_production_line(
        &self,
        product_id: i64,
        product_uom_id: i64,
        product_qty: Decimal,
    ) -> Result<ProductionBomLine, ServiceError>;
    async fn update_production_line(&self, line: &ProductionBomLine) -> Result<(), ServiceError>;
}

/// Read access to products, templates, categories and units of measure,
/// plus the two cost fields this module writes back.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_product(&self, id: i64) -> Result<Product, ServiceError>;
    async fn find_template(&self, id: i64) -> Result<ProductTemplate, ServiceError>;
    async fn find_variants(&self, product_tmpl_id: i64) -> Result<Vec<Product>, ServiceError>;
    async fn search_products_by_code(&self, code: &str) -> Result<Vec<Product>, ServiceError>;
    async fn search_templates_by_code(
        &self,
        code: &str,
    ) -> Result<Vec<ProductTemplate>, ServiceError>;
    async fn find_category(&self, id: i64) -> Result<Option<ProductCategory>, ServiceError>;
    async fn find_product_type(&self, id: i64) -> Result<Option<ProductType>, ServiceError>;
    async fn find_uom(&self, id: i64) -> Result<Uom, ServiceError>;

    async fn set_direct_standard_price(
        &self,
        product_id: i64,
        price: Decimal,
    ) -> Result<(), ServiceError>;
    async fn set_template_standard_price(
        &self,
        product_tmpl_id: i64,
        price: Decimal,
    ) -> Result<(), ServiceError>;
}

/// Purchase history and vendor price lists.
#[async_trait]
pub trait PurchaseHistory: Send + Sync {
    /// Purchase lines of one product in the given states, in the host's
    /// natural order. Selection ties are broken by this order.
    async fn purchase_lines(
        &self,
        product_id: i64,
        states: &[PurchaseState],
    ) -> Result<Vec<PurchaseLine>, ServiceError>;

    /// Vendor price entries for a template, ordered by `sequence`
    async fn supplier_prices(&self, product_tmpl_id: i64)
        -> Result<Vec<SupplierPrice>, ServiceError>;
}

/// Demand signal (sales order lines) used to recompute forecast quantities.
#[async_trait]
pub trait DemandSource: Send + Sync {
    async fn demand_lines(&self, sale_order_ids: &[i64]) -> Result<Vec<DemandLine>, ServiceError>;
}
