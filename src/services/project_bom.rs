use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::bom::non_negative;
use crate::models::catalog::line_sequence;
use crate::models::{
    BomHeader, BomLine, BomLineOperation, BomLineVersion, BomTotals, NewBomHeader, NewBomLine,
    NewBomLineOperation, PriceUnitType, ProductTemplate, TaskMaterials,
};
use crate::repositories::{BomRepository, CatalogRepository};
use crate::services::aggregator::BomAggregator;
use crate::services::classification::ProductClassifier;
use crate::services::importer::{BomExplorer, BomImporter, ImportReport};
use crate::services::price_resolver::{PriceCandidates, PriceChoice, PriceResolver};
use crate::services::sale_quote::{SaleQuote, SaleQuoteBuilder, SaleQuoteRequest};
use crate::services::version_store::{ApprovalOutcome, BomLineVersionStore};
use crate::services::BomContext;

const UOM_CATEGORY_WARNING: &str =
    "The Product Unit of Measure you chose has a different category than in the product form.";

/// Header sequence derived from a dotted version label: `"1.2"` gives 1020.
pub fn version_sequence(version: &str) -> Result<i32, ServiceError> {
    let invalid = || {
        ServiceError::InvalidInput(format!(
            "Version '{}' is not of the form <major>.<minor>",
            version
        ))
    };
    let mut parts = version.split('.');
    let major: i32 = parts
        .next()
        .and_then(|p| p.trim().parse().ok())
        .ok_or_else(invalid)?;
    let minor: i32 = parts
        .next()
        .and_then(|p| p.trim().parse().ok())
        .ok_or_else(invalid)?;
    major
        .checked_mul(1000)
        .and_then(|m| minor.checked_mul(10).and_then(|n| m.checked_add(n)))
        .ok_or_else(invalid)
}

fn ensure_non_negative(qty: Decimal) -> Result<(), ServiceError> {
    if qty < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "All product quantities must be greater or equal to 0".to_string(),
        ));
    }
    Ok(())
}

/// A line after a create or update, with the UOM warning raised on the way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineChange {
    pub line: BomLine,
    pub warning: Option<String>,
}

/// An operation row entered by hand.
#[derive(Debug, Clone, Validate)]
pub struct OperationInput {
    pub product_id: i64,
    #[validate(custom = "non_negative")]
    pub product_qty: Decimal,
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
}

impl OperationInput {
    pub fn new(product_id: i64, product_qty: Decimal) -> Self {
        Self {
            product_id,
            product_qty,
            name: None,
            code: None,
            description: None,
        }
    }
}

/// Result of repricing a header under its policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepriceOutcome {
    pub policy: PriceUnitType,
    /// Accumulated subtotal per forecast unit; zero when the forecast is zero
    pub unit_price: Decimal,
    pub totals: BomTotals,
}

/// Entry point for every project BOM operation.
///
/// Each mutation that touches prices or quantities ends with a recompute of
/// the owning header, so totals are always consistent with the lines.
#[derive(Clone)]
pub struct ProjectBomService {
    boms: Arc<dyn BomRepository>,
    catalog: Arc<dyn CatalogRepository>,
    classifier: ProductClassifier,
    resolver: PriceResolver,
    aggregator: BomAggregator,
    versions: BomLineVersionStore,
    importer: BomImporter,
    quotes: SaleQuoteBuilder,
}

impl ProjectBomService {
    pub fn new(ctx: BomContext, explorer: Option<Arc<dyn BomExplorer>>) -> Self {
        Self {
            classifier: ProductClassifier::new(ctx.catalog.clone()),
            resolver: PriceResolver::new(
                ctx.catalog.clone(),
                ctx.purchases.clone(),
                ctx.currency.clone(),
                ctx.taxes.clone(),
                ctx.company_currency.clone(),
            ),
            aggregator: BomAggregator::new(
                ctx.boms.clone(),
                ctx.catalog.clone(),
                ctx.demand.clone(),
                ctx.currency.clone(),
            ),
            versions: BomLineVersionStore::new(ctx.versions.clone(), ctx.boms.clone()),
            importer: BomImporter::new(ctx.boms.clone(), ctx.catalog.clone(), explorer),
            quotes: SaleQuoteBuilder::new(
                ctx.boms.clone(),
                ctx.catalog.clone(),
                ctx.currency,
                ctx.taxes,
                ctx.company_currency,
            ),
            boms: ctx.boms,
            catalog: ctx.catalog,
        }
    }

    pub fn resolver(&self) -> &PriceResolver {
        &self.resolver
    }

    pub async fn header(&self, bom_id: i64) -> Result<BomHeader, ServiceError> {
        self.boms.find_header(bom_id).await
    }

    pub async fn lines(&self, bom_id: i64) -> Result<Vec<BomLine>, ServiceError> {
        self.boms.find_lines(bom_id).await
    }

    pub async fn operations(&self, bom_line_id: i64) -> Result<Vec<BomLineOperation>, ServiceError> {
        self.boms.find_operations(bom_line_id).await
    }

    pub async fn line_versions(&self, bom_line_id: i64) -> Result<Vec<BomLineVersion>, ServiceError> {
        self.versions.versions(bom_line_id).await
    }

    // ----- headers -----

    #[instrument(skip(self, header), fields(product_tmpl_id = header.product_tmpl_id))]
    pub async fn create_header(&self, header: NewBomHeader) -> Result<BomHeader, ServiceError> {
        header.validate()?;
        let header = self.boms.insert_header(header).await?;
        info!(bom_id = header.id, "project BOM created");
        self.aggregator.recompute(header.id).await?;
        self.boms.find_header(header.id).await
    }

    /// Builds a header from a task's material list. Materials sharing a
    /// template are merged into one line.
    #[instrument(skip(self, task), fields(task_id = task.task_id))]
    pub async fn create_from_task(&self, task: &TaskMaterials) -> Result<BomHeader, ServiceError> {
        let product_tmpl_id = match (task.product_tmpl_id, task.product_id) {
            (Some(tmpl_id), _) => tmpl_id,
            (None, Some(product_id)) => self.catalog.find_product(product_id).await?.product_tmpl_id,
            (None, None) => {
                return Err(ServiceError::InvalidInput(format!(
                    "Task {} has no product to build a BOM for",
                    task.task_id
                )))
            }
        };
        let template = self.catalog.find_template(product_tmpl_id).await?;

        let mut new_header = NewBomHeader::new(
            template.id,
            template.uom_id,
            self.resolver.company_currency(),
        );
        new_header.code = Some(task.name.clone());
        new_header.version = "01.01".to_string();
        new_header.product_id = task.product_id;
        new_header.task_id = Some(task.task_id);
        new_header.validate()?;
        let header = self.boms.insert_header(new_header).await?;

        let mut pending: Vec<NewBomLine> = Vec::new();
        for material in &task.materials {
            let product = self.catalog.find_product(material.product_id).await?;
            if let Some(existing) = pending
                .iter_mut()
                .find(|l| l.product_tmpl_id == product.product_tmpl_id)
            {
                existing.product_qty += material.quantity;
                continue;
            }
            let component = self.catalog.find_template(product.product_tmpl_id).await?;
            let mut line =
                NewBomLine::new(header.id, component.id, component.uom_id, material.quantity);
            self.classify(&mut line, &component).await?;
            pending.push(line);
        }
        for line in pending {
            line.validate()?;
            self.boms.insert_line(line).await?;
        }

        info!(bom_id = header.id, materials = task.materials.len(), "project BOM created from task");
        self.aggregator.recompute(header.id).await?;
        self.boms.find_header(header.id).await
    }

    pub async fn set_active(&self, bom_id: i64, active: bool) -> Result<BomHeader, ServiceError> {
        let mut header = self.boms.find_header(bom_id).await?;
        if header.active != active {
            header.active = active;
            self.boms.update_header(&header).await?;
        }
        Ok(header)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, bom_id: i64) -> Result<(), ServiceError> {
        self.boms.delete_header(bom_id).await?;
        info!("project BOM deleted");
        Ok(())
    }

    /// Stores `version_sequence(header.version)` as the header sequence.
    pub async fn apply_version_sequence(&self, bom_id: i64) -> Result<BomHeader, ServiceError> {
        let mut header = self.boms.find_header(bom_id).await?;
        header.sequence = version_sequence(&header.version)?;
        self.boms.update_header(&header).await?;
        Ok(header)
    }

    /// Re-applies the product type sequence to every line of the header.
    pub async fn sort_lines(&self, bom_id: i64) -> Result<Vec<BomLine>, ServiceError> {
        for mut line in self.boms.find_lines(bom_id).await? {
            let sequence = self.classifier.sequence_for(line.product_type_id).await?;
            if line.sequence != sequence {
                line.sequence = sequence;
                self.boms.update_line(&line).await?;
            }
        }
        self.boms.find_lines(bom_id).await
    }

    pub async fn set_forecast_qty(&self, bom_id: i64, qty: Decimal) -> Result<BomTotals, ServiceError> {
        ensure_non_negative(qty)?;
        let mut header = self.boms.find_header(bom_id).await?;
        header.forecast_product_qty = qty;
        self.boms.update_header(&header).await?;
        self.aggregator.recompute(bom_id).await
    }

    /// Links sales orders to the header and refreshes its forecast from them.
    #[instrument(skip(self))]
    pub async fn link_demand(
        &self,
        bom_id: i64,
        sale_order_ids: Vec<i64>,
    ) -> Result<Decimal, ServiceError> {
        let mut header = self.boms.find_header(bom_id).await?;
        header.sale_order_ids = sale_order_ids
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.boms.update_header(&header).await?;
        self.aggregator.recompute_forecast(bom_id).await
    }

    pub async fn recompute(&self, bom_id: i64) -> Result<BomTotals, ServiceError> {
        self.aggregator.recompute(bom_id).await
    }

    /// Copies the untaxed amount into the subject template's standard price.
    pub async fn store_standard_price(&self, bom_id: i64) -> Result<Decimal, ServiceError> {
        let header = self.boms.find_header(bom_id).await?;
        self.catalog
            .set_template_standard_price(header.product_tmpl_id, header.amount_untaxed)
            .await?;
        Ok(header.amount_untaxed)
    }

    // ----- pricing -----

    /// Sets (or clears) the header's price policy and reprices under it.
    pub async fn set_price_policy(
        &self,
        bom_id: i64,
        policy: Option<PriceUnitType>,
    ) -> Result<Option<RepriceOutcome>, ServiceError> {
        let mut header = self.boms.find_header(bom_id).await?;
        header.price_unit_type = policy;
        self.boms.update_header(&header).await?;
        self.reprice(bom_id).await
    }

    /// Reprices every line under the header's policy. Headers without a
    /// policy keep their manual prices and return `None`.
    #[instrument(skip(self))]
    pub async fn reprice(&self, bom_id: i64) -> Result<Option<RepriceOutcome>, ServiceError> {
        let header = self.boms.find_header(bom_id).await?;
        let lines = self.boms.find_lines(bom_id).await?;
        let Some(outcome) = self.resolver.apply_policy(&header, lines).await? else {
            return Ok(None);
        };
        for line in &outcome.lines {
            self.boms.update_line(line).await?;
        }

        let unit_price = match outcome.unit_price(header.forecast_product_qty) {
            Ok(price) => price,
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "header unit price undefined");
                Decimal::ZERO
            }
            Err(err) => return Err(err),
        };
        let totals = self.aggregator.recompute(bom_id).await?;
        Ok(Some(RepriceOutcome {
            policy: outcome.policy,
            unit_price,
            totals,
        }))
    }

    pub async fn price_candidates(&self, bom_line_id: i64) -> Result<PriceCandidates, ServiceError> {
        let line = self.boms.find_line(bom_line_id).await?;
        self.resolver.price_candidates(&line).await
    }

    /// Writes the chosen candidate's normalized price to the line; no choice
    /// means the standard price.
    #[instrument(skip(self))]
    pub async fn apply_price_choice(
        &self,
        bom_line_id: i64,
        choice: Option<PriceChoice>,
    ) -> Result<BomLine, ServiceError> {
        let mut line = self.boms.find_line(bom_line_id).await?;
        let candidates = self.resolver.price_candidates(&line).await?;
        line.price_unit = self
            .resolver
            .candidate_price(&candidates, choice.unwrap_or(PriceChoice::Standard))
            .await?;
        self.boms.update_line(&line).await?;
        self.aggregator.recompute(line.bom_id).await?;
        self.boms.find_line(bom_line_id).await
    }

    pub async fn unit_price_for_move(
        &self,
        product_id: i64,
        manual_price: Decimal,
    ) -> Result<Decimal, ServiceError> {
        self.resolver.unit_price_for_move(product_id, manual_price).await
    }

    // ----- lines -----

    #[instrument(skip(self, line), fields(bom_id = line.bom_id, product_tmpl_id = line.product_tmpl_id))]
    pub async fn add_line(&self, mut line: NewBomLine) -> Result<LineChange, ServiceError> {
        line.validate()?;
        self.boms.find_header(line.bom_id).await?;
        let template = self.catalog.find_template(line.product_tmpl_id).await?;

        let (uom_id, warning) = self.checked_uom(&template, line.product_uom_id).await?;
        line.product_uom_id = uom_id;
        if line.product_type_id.is_none() {
            self.classify(&mut line, &template).await?;
        }

        let mut created = self.boms.insert_line(line).await?;
        if created.price_unit.is_zero() {
            if let Some(price) = self.seller_price(&created).await? {
                created.price_unit = price;
                self.boms.update_line(&created).await?;
            }
        }

        self.aggregator.recompute(created.bom_id).await?;
        Ok(LineChange {
            line: self.boms.find_line(created.id).await?,
            warning,
        })
    }

    /// Updates a line. A quantity or UOM change reseeds the price from the
    /// vendor list, and an approved line keeps its production line mirrored.
    #[instrument(skip(self, line), fields(line_id = line.id))]
    pub async fn update_line(&self, mut line: BomLine) -> Result<LineChange, ServiceError> {
        ensure_non_negative(line.product_qty)?;
        let existing = self.boms.find_line(line.id).await?;
        let template = self.catalog.find_template(line.product_tmpl_id).await?;

        let (uom_id, warning) = self.checked_uom(&template, line.product_uom_id).await?;
        line.product_uom_id = uom_id;
        if line.product_type_id != existing.product_type_id {
            line.sequence = self.classifier.sequence_for(line.product_type_id).await?;
        }
        if line.product_qty != existing.product_qty || line.product_uom_id != existing.product_uom_id {
            if let Some(price) = self.seller_price(&line).await? {
                line.price_unit = price;
            }
        }
        // approval is only changed through set_approval
        line.approve = existing.approve;
        if existing.approve && line.product_id.is_some() {
            self.versions.push_to_production(&mut line).await?;
        }

        self.boms.update_line(&line).await?;
        self.aggregator.recompute(line.bom_id).await?;
        Ok(LineChange {
            line: self.boms.find_line(line.id).await?,
            warning,
        })
    }

    pub async fn remove_lines(&self, ids: &[i64]) -> Result<(), ServiceError> {
        let mut bom_ids = BTreeSet::new();
        for &id in ids {
            bom_ids.insert(self.boms.find_line(id).await?.bom_id);
        }
        self.boms.delete_lines(ids).await?;
        for bom_id in bom_ids {
            self.aggregator.recompute(bom_id).await?;
        }
        Ok(())
    }

    pub async fn set_approval(
        &self,
        bom_line_id: i64,
        approve: bool,
    ) -> Result<ApprovalOutcome, ServiceError> {
        self.versions.set_approval(bom_line_id, approve).await
    }

    // ----- operations -----

    /// Adds an operation for a product, routed to the line of its template.
    /// The line is created when the header has none for that template.
    #[instrument(skip(self, input), fields(product_id = input.product_id))]
    pub async fn add_operation(
        &self,
        bom_id: i64,
        input: OperationInput,
    ) -> Result<BomLineOperation, ServiceError> {
        input.validate()?;
        self.boms.find_header(bom_id).await?;
        let product = self.catalog.find_product(input.product_id).await?;

        let lines = self.boms.find_lines(bom_id).await?;
        let line = match lines
            .into_iter()
            .find(|l| l.product_tmpl_id == product.product_tmpl_id)
        {
            Some(line) => line,
            None => {
                let template = self.catalog.find_template(product.product_tmpl_id).await?;
                let mut new_line =
                    NewBomLine::new(bom_id, template.id, template.uom_id, input.product_qty);
                self.classify(&mut new_line, &template).await?;
                debug!(product_tmpl_id = template.id, "line created for operation");
                self.boms.insert_line(new_line).await?
            }
        };

        let operation = self
            .boms
            .insert_operation(NewBomLineOperation {
                bom_line_id: line.id,
                bom_id,
                sequence: 1,
                name: input.name,
                code: input.code,
                description: input.description,
                product_id: Some(product.id),
                source_product_id: None,
                product_uom_id: Some(product.uom_id),
                product_qty: input.product_qty,
                attribute_value_ids: Vec::new(),
            })
            .await?;
        self.sync_line_qty(line.id).await?;
        Ok(operation)
    }

    pub async fn set_operation_qty(
        &self,
        operation_id: i64,
        product_qty: Decimal,
    ) -> Result<BomLineOperation, ServiceError> {
        ensure_non_negative(product_qty)?;
        let mut operation = self.boms.find_operation(operation_id).await?;
        operation.product_qty = product_qty;
        self.boms.update_operation(&operation).await?;
        self.sync_line_qty(operation.bom_line_id).await?;
        Ok(operation)
    }

    pub async fn duplicate_operation(
        &self,
        operation_id: i64,
    ) -> Result<BomLineOperation, ServiceError> {
        let operation = self.boms.find_operation(operation_id).await?;
        let copy = self
            .boms
            .insert_operation(NewBomLineOperation::from(&operation))
            .await?;
        self.sync_line_qty(copy.bom_line_id).await?;
        Ok(copy)
    }

    /// Restricts an operation to the attribute values its product shares
    /// with the header's template. Left unchanged when they share none.
    pub async fn scope_operation_variants(
        &self,
        operation_id: i64,
    ) -> Result<BomLineOperation, ServiceError> {
        let mut operation = self.boms.find_operation(operation_id).await?;
        let Some(product_id) = operation.product_id else {
            return Ok(operation);
        };
        let product = self.catalog.find_product(product_id).await?;
        let header = self.boms.find_header(operation.bom_id).await?;
        let template = self.catalog.find_template(header.product_tmpl_id).await?;

        let shared: Vec<i64> = product
            .attribute_value_ids
            .iter()
            .copied()
            .filter(|v| template.attribute_value_ids.contains(v))
            .collect();
        if !shared.is_empty() {
            operation.attribute_value_ids = shared;
            self.boms.update_operation(&operation).await?;
        }
        Ok(operation)
    }

    // ----- import and quotes -----

    /// Imports an exploded BOM and reprices the header under the average
    /// policy it switches to. Repricing failures are logged, not raised.
    pub async fn import(
        &self,
        bom_id: i64,
        default_code: Option<&str>,
    ) -> Result<ImportReport, ServiceError> {
        let report = self.importer.import(bom_id, default_code).await?;
        if report.is_empty() {
            return Ok(report);
        }
        match self.reprice(bom_id).await {
            Ok(_) => {}
            Err(err) if err.is_recoverable() => {
                warn!(bom_id, error = %err, "repricing after import failed");
                self.aggregator.recompute(bom_id).await?;
            }
            Err(err) => return Err(err),
        }
        Ok(report)
    }

    pub async fn quote(&self, request: &SaleQuoteRequest) -> Result<SaleQuote, ServiceError> {
        self.quotes.build(request).await
    }

    // ----- helpers -----

    async fn classify(
        &self,
        line: &mut NewBomLine,
        template: &ProductTemplate,
    ) -> Result<(), ServiceError> {
        let product_type = self.classifier.resolve(template).await?;
        line.product_type_id = product_type.as_ref().map(|t| t.id);
        line.sequence = line_sequence(product_type.as_ref());
        Ok(())
    }

    async fn checked_uom(
        &self,
        template: &ProductTemplate,
        uom_id: i64,
    ) -> Result<(i64, Option<String>), ServiceError> {
        if uom_id == template.uom_id {
            return Ok((uom_id, None));
        }
        let chosen = self.catalog.find_uom(uom_id).await?;
        let native = self.catalog.find_uom(template.uom_id).await?;
        if chosen.same_category(&native) {
            Ok((uom_id, None))
        } else {
            warn!(uom_id, product_tmpl_id = template.id, "UOM category mismatch corrected");
            Ok((template.uom_id, Some(UOM_CATEGORY_WARNING.to_string())))
        }
    }

    async fn seller_price(&self, line: &BomLine) -> Result<Option<Decimal>, ServiceError> {
        match self.resolver.seller_price(line).await {
            Ok(price) => Ok(price),
            Err(err) if err.is_recoverable() => {
                warn!(line_id = line.id, error = %err, "vendor price lookup failed");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Sets the line quantity to the sum of its operations and recomputes.
    async fn sync_line_qty(&self, bom_line_id: i64) -> Result<(), ServiceError> {
        let mut line = self.boms.find_line(bom_line_id).await?;
        let qty: Decimal = self
            .boms
            .find_operations(bom_line_id)
            .await?
            .iter()
            .map(|op| op.product_qty)
            .sum();
        if line.product_qty != qty {
            line.product_qty = qty;
            self.boms.update_line(&line).await?;
        }
        self.aggregator.recompute(line.bom_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1.0", 1000)]
    #[case("1.2", 1020)]
    #[case("01.01", 1010)]
    #[case("2.15.3", 2150)]
    fn version_sequence_from_label(#[case] version: &str, #[case] expected: i32) {
        assert_eq!(version_sequence(version).unwrap(), expected);
    }

    #[rstest]
    #[case("1")]
    #[case("v1.0")]
    #[case("")]
    fn malformed_versions_are_rejected(#[case] version: &str) {
        assert!(matches!(
            version_sequence(version),
            Err(ServiceError::InvalidInput(_))
        ));
    }
}
