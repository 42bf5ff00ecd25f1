use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicI64, Ordering};

use super::{
    BomLineVersionRepository, BomRepository, CatalogRepository, DemandSource, PurchaseHistory,
};
use crate::errors::ServiceError;
use crate::models::{
    BomHeader, BomLine, BomLineOperation, BomLineVersion, BomTotals, DemandLine, NewBomHeader,
    NewBomLine, NewBomLineOperation, NewBomLineVersion, Product, ProductCategory, ProductTemplate,
    ProductType, ProductionBomLine, PurchaseLine, PurchaseState, SupplierPrice, Uom,
};

/// Process-local store implementing every repository seam.
///
/// Backs the engine in tests and in hosts that keep BOM data in memory.
/// Catalog, purchase and demand data are seeded through the `add_*` methods.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    sequence: AtomicI64,
    headers: DashMap<i64, BomHeader>,
    lines: DashMap<i64, BomLine>,
    operations: DashMap<i64, BomLineOperation>,
    versions: DashMap<i64, BomLineVersion>,
    production_lines: DashMap<i64, ProductionBomLine>,
    products: DashMap<i64, Product>,
    templates: DashMap<i64, ProductTemplate>,
    categories: DashMap<i64, ProductCategory>,
    product_types: DashMap<i64, ProductType>,
    uoms: DashMap<i64, Uom>,
    purchase_lines: DashMap<i64, PurchaseLine>,
    supplier_prices: DashMap<i64, SupplierPrice>,
    demand: DashMap<i64, Vec<DemandLine>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn add_uom(&self, uom: Uom) {
        self.uoms.insert(uom.id, uom);
    }

    pub fn add_product_type(&self, product_type: ProductType) {
        self.product_types.insert(product_type.id, product_type);
    }

    pub fn add_category(&self, category: ProductCategory) {
        self.categories.insert(category.id, category);
    }

    pub fn add_template(&self, template: ProductTemplate) {
        self.templates.insert(template.id, template);
    }

    pub fn add_product(&self, product: Product) {
        self.products.insert(product.id, product);
    }

    /// Purchase lines keep their insertion order, which stands in for the
    /// host's natural ordering. Ids must be increasing.
    pub fn add_purchase_line(&self, line: PurchaseLine) {
        self.purchase_lines.insert(line.id, line);
    }

    pub fn add_supplier_price(&self, price: SupplierPrice) {
        self.supplier_prices.insert(price.id, price);
    }

    pub fn add_demand_line(&self, line: DemandLine) {
        self.demand.entry(line.order_id).or_default().push(line);
    }

    pub fn product(&self, id: i64) -> Option<Product> {
        self.products.get(&id).map(|p| p.clone())
    }

    pub fn template(&self, id: i64) -> Option<ProductTemplate> {
        self.templates.get(&id).map(|t| t.clone())
    }

    fn check_unique_template(
        &self,
        bom_id: i64,
        product_tmpl_id: i64,
        exclude_line: Option<i64>,
    ) -> Result<(), ServiceError> {
        let duplicate = self.lines.iter().any(|entry| {
            let line = entry.value();
            line.bom_id == bom_id
                && line.product_tmpl_id == product_tmpl_id
                && Some(line.id) != exclude_line
        });
        if duplicate {
            return Err(ServiceError::ValidationError(format!(
                "Project line product {} should be only present one time in project products list",
                product_tmpl_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BomRepository for InMemoryStore {
    async fn find_header(&self, id: i64) -> Result<BomHeader, ServiceError> {
        self.headers
            .get(&id)
            .map(|h| h.clone())
            .ok_or_else(|| ServiceError::not_found("Project BOM", id))
    }

    async fn insert_header(&self, header: NewBomHeader) -> Result<BomHeader, ServiceError> {
        let now = Utc::now();
        let totals = BomTotals {
            amount_untaxed: Decimal::ZERO,
            direct_amount_untaxed: Decimal::ZERO,
            standard_amount_untaxed: Decimal::ZERO,
        };
        let created = BomHeader {
            id: self.next_id(),
            code: header.code,
            version: header.version,
            sequence: header.sequence,
            active: true,
            product_tmpl_id: header.product_tmpl_id,
            product_id: header.product_id,
            product_uom_id: header.product_uom_id,
            product_qty: header.product_qty,
            bulk_product_qty: header.bulk_product_qty,
            forecast_product_qty: header.forecast_product_qty,
            amount_untaxed: totals.amount_untaxed,
            direct_amount_untaxed: totals.direct_amount_untaxed,
            standard_amount_untaxed: totals.standard_amount_untaxed,
            price_unit_type: header.price_unit_type,
            currency_code: header.currency_code,
            task_id: header.task_id,
            partner_id: header.partner_id,
            sale_order_ids: Vec::new(),
            note: header.note,
            created_at: now,
            updated_at: now,
        };
        self.headers.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_header(&self, header: &BomHeader) -> Result<(), ServiceError> {
        let mut stored = self
            .headers
            .get_mut(&header.id)
            .ok_or_else(|| ServiceError::not_found("Project BOM", header.id))?;
        *stored = BomHeader {
            updated_at: Utc::now(),
            ..header.clone()
        };
        Ok(())
    }

    async fn delete_header(&self, id: i64) -> Result<(), ServiceError> {
        if self.headers.remove(&id).is_none() {
            return Err(ServiceError::not_found("Project BOM", id));
        }
        let line_ids: Vec<i64> = self
            .lines
            .iter()
            .filter(|entry| entry.bom_id == id)
            .map(|entry| entry.id)
            .collect();
        self.delete_lines(&line_ids).await
    }

    async fn find_lines(&self, bom_id: i64) -> Result<Vec<BomLine>, ServiceError> {
        let mut lines: Vec<BomLine> = self
            .lines
            .iter()
            .filter(|entry| entry.bom_id == bom_id)
            .map(|entry| entry.value().clone())
            .collect();
        lines.sort_by_key(|line| (line.sequence, line.id));
        Ok(lines)
    }

    async fn find_line(&self, id: i64) -> Result<BomLine, ServiceError> {
        self.lines
            .get(&id)
            .map(|l| l.clone())
            .ok_or_else(|| ServiceError::not_found("BOM line", id))
    }

    async fn insert_line(&self, line: NewBomLine) -> Result<BomLine, ServiceError> {
        if !self.headers.contains_key(&line.bom_id) {
            return Err(ServiceError::not_found("Project BOM", line.bom_id));
        }
        self.check_unique_template(line.bom_id, line.product_tmpl_id, None)?;
        let created = BomLine {
            id: self.next_id(),
            bom_id: line.bom_id,
            sequence: line.sequence,
            product_tmpl_id: line.product_tmpl_id,
            product_type_id: line.product_type_id,
            product_id: line.product_id,
            product_uom_id: line.product_uom_id,
            product_qty: line.product_qty,
            price_unit: line.price_unit,
            avg_price_unit: Decimal::ZERO,
            price_subtotal: Decimal::ZERO,
            direct_price_subtotal: Decimal::ZERO,
            forecast_product_qty: Decimal::ZERO,
            partner_id: line.partner_id,
            description: line.description,
            editable: line.editable,
            approve: false,
            production_line_id: None,
        };
        self.lines.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_line(&self, line: &BomLine) -> Result<(), ServiceError> {
        if !self.lines.contains_key(&line.id) {
            return Err(ServiceError::not_found("BOM line", line.id));
        }
        self.check_unique_template(line.bom_id, line.product_tmpl_id, Some(line.id))?;
        self.lines.insert(line.id, line.clone());
        Ok(())
    }

    async fn delete_lines(&self, ids: &[i64]) -> Result<(), ServiceError> {
        for id in ids {
            self.lines.remove(id);
        }
        self.operations.retain(|_, op| !ids.contains(&op.bom_line_id));
        self.versions.retain(|_, v| !ids.contains(&v.bom_line_id));
        Ok(())
    }

    async fn find_operations(
        &self,
        bom_line_id: i64,
    ) -> Result<Vec<BomLineOperation>, ServiceError> {
        let mut operations: Vec<BomLineOperation> = self
            .operations
            .iter()
            .filter(|entry| entry.bom_line_id == bom_line_id)
            .map(|entry| entry.value().clone())
            .collect();
        operations.sort_by_key(|op| (op.sequence, op.id));
        Ok(operations)
    }

    async fn find_operation(&self, id: i64) -> Result<BomLineOperation, ServiceError> {
        self.operations
            .get(&id)
            .map(|op| op.clone())
            .ok_or_else(|| ServiceError::not_found("BOM line operation", id))
    }

    async fn insert_operation(
        &self,
        operation: NewBomLineOperation,
    ) -> Result<BomLineOperation, ServiceError> {
        if !self.lines.contains_key(&operation.bom_line_id) {
            return Err(ServiceError::not_found("BOM line", operation.bom_line_id));
        }
        let created = BomLineOperation {
            id: self.next_id(),
            bom_line_id: operation.bom_line_id,
            bom_id: operation.bom_id,
            sequence: operation.sequence,
            name: operation.name,
            code: operation.code,
            description: operation.description,
            product_id: operation.product_id,
            source_product_id: operation.source_product_id,
            product_uom_id: operation.product_uom_id,
            product_qty: operation.product_qty,
            attribute_value_ids: operation.attribute_value_ids,
        };
        self.operations.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_operation(&self, operation: &BomLineOperation) -> Result<(), ServiceError> {
        let mut stored = self
            .operations
            .get_mut(&operation.id)
            .ok_or_else(|| ServiceError::not_found("BOM line operation", operation.id))?;
        *stored = operation.clone();
        Ok(())
    }
}

#[async_trait]
impl BomLineVersionRepository for InMemoryStore {
    async fn find_version(
        &self,
        bom_line_id: i64,
        version: &str,
    ) -> Result<Option<BomLineVersion>, ServiceError> {
        Ok(self
            .versions
            .iter()
            .find(|entry| entry.bom_line_id == bom_line_id && entry.version == version)
            .map(|entry| entry.value().clone()))
    }

    async fn find_versions(&self, bom_line_id: i64) -> Result<Vec<BomLineVersion>, ServiceError> {
        let mut versions: Vec<BomLineVersion> = self
            .versions
            .iter()
            .filter(|entry| entry.bom_line_id == bom_line_id)
            .map(|entry| entry.value().clone())
            .collect();
        versions.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(versions)
    }

    async fn insert_version(
        &self,
        version: NewBomLineVersion,
    ) -> Result<BomLineVersion, ServiceError> {
        if self
            .find_version(version.bom_line_id, &version.version)
            .await?
            .is_some()
        {
            return Err(ServiceError::ValidationError(
                "Version already exists!".to_string(),
            ));
        }
        let created = BomLineVersion {
            id: self.next_id(),
            bom_line_id: version.bom_line_id,
            version: version.version,
            product_id: version.product_id,
            product_uom_id: version.product_uom_id,
            product_qty: version.product_qty,
            created_at: Utc::now(),
        };
        self.versions.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_production_line(&self, id: i64) -> Result<ProductionBomLine, ServiceError> {
        self.production_lines
            .get(&id)
            .map(|l| l.clone())
            .ok_or_else(|| ServiceError::not_found("Production BOM line", id))
    }

    async fn insert_production_line(
        &self,
        product_id: i64,
        product_uom_id: i64,
        product_qty: Decimal,
    ) -> Result<ProductionBomLine, ServiceError> {
        let created = ProductionBomLine {
            id: self.next_id(),
            product_id,
            product_uom_id,
            product_qty,
        };
        self.production_lines.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_production_line(&self, line: &ProductionBomLine) -> Result<(), ServiceError> {
        let mut stored = self
            .production_lines
            .get_mut(&line.id)
            .ok_or_else(|| ServiceError::not_found("Production BOM line", line.id))?;
        *stored = line.clone();
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn find_product(&self, id: i64) -> Result<Product, ServiceError> {
        self.product(id)
            .ok_or_else(|| ServiceError::not_found("Product", id))
    }

    async fn find_template(&self, id: i64) -> Result<ProductTemplate, ServiceError> {
        self.template(id)
            .ok_or_else(|| ServiceError::not_found("Product template", id))
    }

    async fn find_variants(&self, product_tmpl_id: i64) -> Result<Vec<Product>, ServiceError> {
        let mut variants: Vec<Product> = self
            .products
            .iter()
            .filter(|entry| entry.product_tmpl_id == product_tmpl_id)
            .map(|entry| entry.value().clone())
            .collect();
        variants.sort_by_key(|p| p.id);
        Ok(variants)
    }

    async fn search_products_by_code(&self, code: &str) -> Result<Vec<Product>, ServiceError> {
        let mut products: Vec<Product> = self
            .products
            .iter()
            .filter(|entry| entry.default_code.as_deref() == Some(code))
            .map(|entry| entry.value().clone())
            .collect();
        products.sort_by_key(|p| p.id);
        Ok(products)
    }

    async fn search_templates_by_code(
        &self,
        code: &str,
    ) -> Result<Vec<ProductTemplate>, ServiceError> {
        let mut templates: Vec<ProductTemplate> = self
            .templates
            .iter()
            .filter(|entry| entry.default_code.as_deref() == Some(code))
            .map(|entry| entry.value().clone())
            .collect();
        templates.sort_by_key(|t| t.id);
        Ok(templates)
    }

    async fn find_category(&self, id: i64) -> Result<Option<ProductCategory>, ServiceError> {
        Ok(self.categories.get(&id).map(|c| c.clone()))
    }

    async fn find_product_type(&self, id: i64) -> Result<Option<ProductType>, ServiceError> {
        Ok(self.product_types.get(&id).map(|t| t.clone()))
    }

    async fn find_uom(&self, id: i64) -> Result<Uom, ServiceError> {
        self.uoms
            .get(&id)
            .map(|u| u.clone())
            .ok_or_else(|| ServiceError::not_found("Unit of measure", id))
    }

    async fn set_direct_standard_price(
        &self,
        product_id: i64,
        price: Decimal,
    ) -> Result<(), ServiceError> {
        let mut product = self
            .products
            .get_mut(&product_id)
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;
        product.direct_standard_price = price;
        Ok(())
    }

    async fn set_template_standard_price(
        &self,
        product_tmpl_id: i64,
        price: Decimal,
    ) -> Result<(), ServiceError> {
        let mut template = self
            .templates
            .get_mut(&product_tmpl_id)
            .ok_or_else(|| ServiceError::not_found("Product template", product_tmpl_id))?;
        template.standard_price = price;
        Ok(())
    }
}

#[async_trait]
impl PurchaseHistory for InMemoryStore {
    async fn purchase_lines(
        &self,
        product_id: i64,
        states: &[PurchaseState],
    ) -> Result<Vec<PurchaseLine>, ServiceError> {
        let mut lines: Vec<PurchaseLine> = self
            .purchase_lines
            .iter()
            .filter(|entry| entry.product_id == product_id && states.contains(&entry.state))
            .map(|entry| entry.value().clone())
            .collect();
        lines.sort_by_key(|l| l.id);
        Ok(lines)
    }

    async fn supplier_prices(
        &self,
        product_tmpl_id: i64,
    ) -> Result<Vec<SupplierPrice>, ServiceError> {
        let mut prices: Vec<SupplierPrice> = self
            .supplier_prices
            .iter()
            .filter(|entry| entry.product_tmpl_id == product_tmpl_id)
            .map(|entry| entry.value().clone())
            .collect();
        prices.sort_by_key(|p| (p.sequence, p.id));
        Ok(prices)
    }
}

#[async_trait]
impl DemandSource for InMemoryStore {
    async fn demand_lines(&self, sale_order_ids: &[i64]) -> Result<Vec<DemandLine>, ServiceError> {
        Ok(sale_order_ids
            .iter()
            .filter_map(|order_id| self.demand.get(order_id).map(|lines| lines.clone()))
            .flatten()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn store_with_header() -> (InMemoryStore, BomHeader) {
        let store = InMemoryStore::new();
        let header = store
            .insert_header(NewBomHeader::new(100, 1, "EUR"))
            .await
            .unwrap();
        (store, header)
    }

    #[tokio::test]
    async fn duplicate_template_on_same_header_is_rejected() {
        let (store, header) = store_with_header().await;
        store
            .insert_line(NewBomLine::new(header.id, 7, 1, dec!(1)))
            .await
            .unwrap();
        let err = store
            .insert_line(NewBomLine::new(header.id, 7, 1, dec!(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn lines_are_ordered_by_sequence_then_id() {
        let (store, header) = store_with_header().await;
        let mut late = NewBomLine::new(header.id, 1, 1, dec!(1));
        late.sequence = 20;
        let mut early = NewBomLine::new(header.id, 2, 1, dec!(1));
        early.sequence = 10;
        store.insert_line(late).await.unwrap();
        store.insert_line(early).await.unwrap();

        let templates: Vec<i64> = store
            .find_lines(header.id)
            .await
            .unwrap()
            .iter()
            .map(|l| l.product_tmpl_id)
            .collect();
        assert_eq!(templates, vec![2, 1]);
    }

    #[tokio::test]
    async fn deleting_header_cascades_to_lines_operations_and_versions() {
        let (store, header) = store_with_header().await;
        let line = store
            .insert_line(NewBomLine::new(header.id, 7, 1, dec!(1)))
            .await
            .unwrap();
        store
            .insert_operation(NewBomLineOperation {
                bom_line_id: line.id,
                bom_id: header.id,
                sequence: 1,
                name: Some("assembly".into()),
                code: None,
                description: None,
                product_id: None,
                source_product_id: None,
                product_uom_id: None,
                product_qty: dec!(1),
                attribute_value_ids: vec![],
            })
            .await
            .unwrap();
        store
            .insert_version(NewBomLineVersion {
                bom_line_id: line.id,
                version: "1.0".into(),
                product_id: 5,
                product_uom_id: 1,
                product_qty: dec!(1),
            })
            .await
            .unwrap();

        store.delete_header(header.id).await.unwrap();

        assert!(store.find_line(line.id).await.is_err());
        assert!(store.find_operations(line.id).await.unwrap().is_empty());
        assert!(store.find_versions(line.id).await.unwrap().is_empty());
    }
}
