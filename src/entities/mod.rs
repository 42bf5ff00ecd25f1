//! Database tables owned by the project BOM engine.

pub mod production_bom_line;
pub mod project_bom;
pub mod project_bom_line;
pub mod project_bom_line_operation;
pub mod project_bom_line_version;
pub mod project_bom_sale_order;
