use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Sales order line feeding a header's forecast quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandLine {
    pub order_id: i64,
    pub product_id: i64,
    pub product_uom_qty: Decimal,
}

/// Material list of a project task, used to seed a project BOM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMaterials {
    pub task_id: i64,
    pub name: String,
    pub product_tmpl_id: Option<i64>,
    pub product_id: Option<i64>,
    pub materials: Vec<TaskMaterial>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMaterial {
    pub product_id: i64,
    pub quantity: Decimal,
}
