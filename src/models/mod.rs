// Project BOM records
pub mod bom;

// Host platform records consumed by the engine
pub mod catalog;
pub mod demand;
pub mod purchase;

pub use bom::{
    BomHeader, BomLine, BomLineOperation, BomLineVersion, BomTotals, NewBomHeader, NewBomLine,
    NewBomLineOperation, NewBomLineVersion, PriceUnitType, ProductionBomLine,
};
pub use catalog::{Product, ProductCategory, ProductTemplate, ProductType, Uom};
pub use demand::{DemandLine, TaskMaterial, TaskMaterials};
pub use purchase::{PurchaseLine, PurchaseState, SupplierPrice, Tax, TaxAmount, TaxBreakdown};
