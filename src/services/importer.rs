//! BOM explosion import.
//!
//! A [`BomExplorer`] resolves a subject product by internal reference and
//! explodes its BOM into `bom label -> component code -> component`. The
//! importer merges that tree into a project BOM: lines produced by a previous
//! import are replaced, hand-written lines are kept, and every component
//! leaves an operation row behind as an audit trail.
//!
//! Import is best effort. A failed exploration or an unknown component code
//! is logged and recorded in the [`ImportReport`]; the rest of the tree is
//! still imported.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::errors::ServiceError;
use crate::models::catalog::line_sequence;
use crate::models::{BomHeader, BomLine, NewBomLine, NewBomLineOperation, PriceUnitType};
use crate::repositories::{BomRepository, CatalogRepository};
use crate::services::classification::ProductClassifier;

/// One exploded component: its quantity for the requested batch and the
/// label of the operation that consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplodedComponent {
    pub product_qty: Decimal,
    #[serde(default, deserialize_with = "false_as_none")]
    pub operation: Option<String>,
}

/// Peers encode "no value" as `false`.
fn false_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Label {
        Text(String),
        Flag(bool),
    }
    Ok(match Option::<Label>::deserialize(deserializer)? {
        Some(Label::Text(text)) => Some(text),
        Some(Label::Flag(_)) | None => None,
    })
}

/// `bom label -> component internal reference -> component`
pub type ExplodedBom = BTreeMap<String, BTreeMap<String, ExplodedComponent>>;

/// Source of exploded BOMs, local or on a peer instance.
#[async_trait]
pub trait BomExplorer: Send + Sync {
    /// Products whose internal reference is `code`; when none match, every
    /// variant of the templates carrying that reference.
    async fn resolve_products(&self, code: &str) -> Result<Vec<i64>, ServiceError>;

    /// Explodes the BOM of `product_id` for a batch of `bulk_qty`.
    async fn explore(&self, product_id: i64, bulk_qty: Decimal)
        -> Result<ExplodedBom, ServiceError>;

    /// Remote explorers report batch quantities that are scaled back to a
    /// per-unit rate on import.
    fn is_remote(&self) -> bool;
}

/// Explorer over the local catalog. Exploded BOMs come from the host's
/// manufacturing data and are registered per product.
pub struct LocalBomExplorer {
    catalog: Arc<dyn CatalogRepository>,
    exploded: DashMap<i64, ExplodedBom>,
}

impl LocalBomExplorer {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self {
            catalog,
            exploded: DashMap::new(),
        }
    }

    pub fn register(&self, product_id: i64, bom: ExplodedBom) {
        self.exploded.insert(product_id, bom);
    }
}

#[async_trait]
impl BomExplorer for LocalBomExplorer {
    async fn resolve_products(&self, code: &str) -> Result<Vec<i64>, ServiceError> {
        resolve_local_products(self.catalog.as_ref(), code).await
    }

    async fn explore(
        &self,
        product_id: i64,
        _bulk_qty: Decimal,
    ) -> Result<ExplodedBom, ServiceError> {
        Ok(self
            .exploded
            .get(&product_id)
            .map(|bom| bom.clone())
            .unwrap_or_default())
    }

    fn is_remote(&self) -> bool {
        false
    }
}

async fn resolve_local_products(
    catalog: &dyn CatalogRepository,
    code: &str,
) -> Result<Vec<i64>, ServiceError> {
    let products = catalog.search_products_by_code(code).await?;
    if !products.is_empty() {
        return Ok(products.into_iter().map(|p| p.id).collect());
    }
    let mut ids = BTreeSet::new();
    for template in catalog.search_templates_by_code(code).await? {
        ids.extend(catalog.find_variants(template.id).await?.into_iter().map(|p| p.id));
    }
    Ok(ids.into_iter().collect())
}

/// Outcome of one import run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    /// No explorer was available (e.g. incomplete remote settings)
    pub disabled: bool,
    pub explored_products: Vec<i64>,
    /// Components merged into lines
    pub imported: usize,
    /// Component codes with no local product
    pub skipped: Vec<String>,
    /// Previously imported lines removed before merging
    pub removed_lines: usize,
    pub errors: Vec<String>,
}

impl ImportReport {
    fn disabled() -> Self {
        Self {
            disabled: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.imported == 0
    }
}

/// Merges exploded BOMs into a project BOM's line collection.
#[derive(Clone)]
pub struct BomImporter {
    boms: Arc<dyn BomRepository>,
    catalog: Arc<dyn CatalogRepository>,
    classifier: ProductClassifier,
    explorer: Option<Arc<dyn BomExplorer>>,
}

impl BomImporter {
    pub fn new(
        boms: Arc<dyn BomRepository>,
        catalog: Arc<dyn CatalogRepository>,
        explorer: Option<Arc<dyn BomExplorer>>,
    ) -> Self {
        Self {
            classifier: ProductClassifier::new(catalog.clone()),
            boms,
            catalog,
            explorer,
        }
    }

    /// Imports the BOM of the product identified by `default_code`, or by
    /// the header's product (then template) reference when no code is given.
    #[instrument(skip(self))]
    pub async fn import(
        &self,
        bom_id: i64,
        default_code: Option<&str>,
    ) -> Result<ImportReport, ServiceError> {
        let Some(explorer) = self.explorer.as_ref() else {
            info!("no BOM explorer configured; import skipped");
            return Ok(ImportReport::disabled());
        };

        let mut header = self.boms.find_header(bom_id).await?;
        let Some(code) = self.subject_code(&header, default_code).await? else {
            warn!("no internal reference to import from");
            return Ok(ImportReport::default());
        };

        let mut report = ImportReport::default();
        let products = match explorer.resolve_products(&code).await {
            Ok(products) => products,
            Err(err) if err.is_recoverable() => {
                warn!(%code, error = %err, "subject product lookup failed");
                report.errors.push(err.to_string());
                return Ok(report);
            }
            Err(err) => return Err(err),
        };
        if products.is_empty() {
            debug!(%code, "no product matches the internal reference");
            return Ok(report);
        }

        let bulk_qty = if explorer.is_remote() {
            header.effective_bulk_qty()
        } else {
            Decimal::ONE
        };

        let mut current: Option<Vec<BomLine>> = None;
        for product_id in products {
            let exploded = match explorer.explore(product_id, bulk_qty).await {
                Ok(exploded) => exploded,
                Err(err) if err.is_recoverable() => {
                    warn!(product_id, error = %err, "BOM exploration failed");
                    report.errors.push(format!("product {}: {}", product_id, err));
                    continue;
                }
                Err(err) => return Err(err),
            };
            report.explored_products.push(product_id);
            if exploded.is_empty() {
                continue;
            }

            let lines = match current.take() {
                Some(lines) => lines,
                None => self.remove_imported_lines(bom_id, &mut report).await?,
            };
            let lines = current.insert(lines);

            for components in exploded.values() {
                for (component_code, component) in components {
                    self.merge_component(
                        &header,
                        lines,
                        product_id,
                        component_code,
                        component,
                        bulk_qty,
                        explorer.is_remote(),
                        &mut report,
                    )
                    .await?;
                }
            }
        }

        if current.is_some() {
            header.price_unit_type = Some(PriceUnitType::Avg);
            self.boms.update_header(&header).await?;
        }

        info!(
            imported = report.imported,
            skipped = report.skipped.len(),
            removed = report.removed_lines,
            "BOM import finished"
        );
        Ok(report)
    }

    async fn subject_code(
        &self,
        header: &BomHeader,
        default_code: Option<&str>,
    ) -> Result<Option<String>, ServiceError> {
        if let Some(code) = default_code.filter(|c| !c.trim().is_empty()) {
            return Ok(Some(code.to_string()));
        }
        if let Some(product_id) = header.product_id {
            if let Some(code) = self.catalog.find_product(product_id).await?.default_code {
                return Ok(Some(code));
            }
        }
        Ok(self
            .catalog
            .find_template(header.product_tmpl_id)
            .await?
            .default_code)
    }

    /// Deletes the header's editable lines and returns the surviving ones.
    async fn remove_imported_lines(
        &self,
        bom_id: i64,
        report: &mut ImportReport,
    ) -> Result<Vec<BomLine>, ServiceError> {
        let (editable, kept): (Vec<BomLine>, Vec<BomLine>) = self
            .boms
            .find_lines(bom_id)
            .await?
            .into_iter()
            .partition(|line| line.editable);
        let ids: Vec<i64> = editable.iter().map(|line| line.id).collect();
        if !ids.is_empty() {
            self.boms.delete_lines(&ids).await?;
        }
        report.removed_lines += ids.len();
        Ok(kept)
    }

    #[allow(clippy::too_many_arguments)]
    async fn merge_component(
        &self,
        header: &BomHeader,
        lines: &mut Vec<BomLine>,
        source_product_id: i64,
        component_code: &str,
        component: &ExplodedComponent,
        bulk_qty: Decimal,
        remote: bool,
        report: &mut ImportReport,
    ) -> Result<(), ServiceError> {
        let Some(product) = self
            .catalog
            .search_products_by_code(component_code)
            .await?
            .into_iter()
            .next()
        else {
            warn!(component_code, "component has no local product; skipped");
            report.skipped.push(component_code.to_string());
            return Ok(());
        };
        let template = self.catalog.find_template(product.product_tmpl_id).await?;

        let mut qty = component.product_qty / bulk_qty;
        if remote && qty.is_zero() {
            qty = Decimal::ONE;
        }

        let line = match lines.iter_mut().find(|l| l.product_tmpl_id == template.id) {
            Some(line) => {
                line.product_qty += qty;
                self.boms.update_line(line).await?;
                line.clone()
            }
            None => {
                let product_type = self.classifier.resolve(&template).await?;
                let mut new_line =
                    NewBomLine::new(header.id, template.id, template.uom_id, qty);
                new_line.product_type_id = product_type.as_ref().map(|t| t.id);
                new_line.sequence = line_sequence(product_type.as_ref());
                new_line.product_id = Some(product.id);
                new_line.price_unit = template.standard_price;
                new_line.editable = true;
                let line = self.boms.insert_line(new_line).await?;
                lines.push(line.clone());
                line
            }
        };

        self.boms
            .insert_operation(NewBomLineOperation {
                bom_line_id: line.id,
                bom_id: header.id,
                sequence: 1,
                name: component.operation.clone(),
                code: None,
                description: None,
                product_id: Some(product.id),
                source_product_id: Some(source_product_id),
                product_uom_id: Some(template.uom_id),
                product_qty: qty * bulk_qty,
                attribute_value_ids: Vec::new(),
            })
            .await?;
        report.imported += 1;
        Ok(())
    }
}
