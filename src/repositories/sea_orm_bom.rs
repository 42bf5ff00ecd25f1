use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{BomLineVersionRepository, BomRepository};
use crate::entities::{
    production_bom_line, project_bom, project_bom_line, project_bom_line_operation,
    project_bom_line_version, project_bom_sale_order,
};
use crate::errors::ServiceError;
use crate::models::{
    BomHeader, BomLine, BomLineOperation, BomLineVersion, NewBomHeader, NewBomLine,
    NewBomLineOperation, NewBomLineVersion, PriceUnitType, ProductionBomLine,
};

/// Relational storage for project BOM records.
#[derive(Debug, Clone)]
pub struct SeaOrmBomRepository {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmBomRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn sale_order_ids(&self, bom_id: i64) -> Result<Vec<i64>, ServiceError> {
        let links = project_bom_sale_order::Entity::find()
            .filter(project_bom_sale_order::Column::BomId.eq(bom_id))
            .order_by_asc(project_bom_sale_order::Column::SaleOrderId)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(links.into_iter().map(|l| l.sale_order_id).collect())
    }

    async fn check_unique_template(
        &self,
        bom_id: i64,
        product_tmpl_id: i64,
        exclude_line: Option<i64>,
    ) -> Result<(), ServiceError> {
        let mut query = project_bom_line::Entity::find()
            .filter(project_bom_line::Column::BomId.eq(bom_id))
            .filter(project_bom_line::Column::ProductTmplId.eq(product_tmpl_id));
        if let Some(id) = exclude_line {
            query = query.filter(project_bom_line::Column::Id.ne(id));
        }
        let existing = query
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if existing.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "Project line product {} should be only present one time in project products list",
                product_tmpl_id
            )));
        }
        Ok(())
    }
}

async fn delete_lines_in<C: ConnectionTrait>(conn: &C, ids: &[i64]) -> Result<(), ServiceError> {
    if ids.is_empty() {
        return Ok(());
    }
    project_bom_line_operation::Entity::delete_many()
        .filter(project_bom_line_operation::Column::BomLineId.is_in(ids.to_vec()))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;
    project_bom_line_version::Entity::delete_many()
        .filter(project_bom_line_version::Column::BomLineId.is_in(ids.to_vec()))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;
    project_bom_line::Entity::delete_many()
        .filter(project_bom_line::Column::Id.is_in(ids.to_vec()))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(())
}

fn header_from_model(
    model: project_bom::Model,
    sale_order_ids: Vec<i64>,
) -> Result<BomHeader, ServiceError> {
    let price_unit_type = model
        .price_unit_type
        .as_deref()
        .map(PriceUnitType::from_str)
        .transpose()
        .map_err(|e| ServiceError::SerializationError(e.to_string()))?;
    Ok(BomHeader {
        id: model.id,
        code: model.code,
        version: model.version,
        sequence: model.sequence,
        active: model.active,
        product_tmpl_id: model.product_tmpl_id,
        product_id: model.product_id,
        product_uom_id: model.product_uom_id,
        product_qty: model.product_qty,
        bulk_product_qty: model.bulk_product_qty,
        forecast_product_qty: model.forecast_product_qty,
        amount_untaxed: model.amount_untaxed,
        direct_amount_untaxed: model.direct_amount_untaxed,
        standard_amount_untaxed: model.standard_amount_untaxed,
        price_unit_type,
        currency_code: model.currency_code,
        task_id: model.task_id,
        partner_id: model.partner_id,
        sale_order_ids,
        note: model.note,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

impl From<project_bom_line::Model> for BomLine {
    fn from(model: project_bom_line::Model) -> Self {
        BomLine {
            id: model.id,
            bom_id: model.bom_id,
            sequence: model.sequence,
            product_tmpl_id: model.product_tmpl_id,
            product_type_id: model.product_type_id,
            product_id: model.product_id,
            product_uom_id: model.product_uom_id,
            product_qty: model.product_qty,
            price_unit: model.price_unit,
            avg_price_unit: model.avg_price_unit,
            price_subtotal: model.price_subtotal,
            direct_price_subtotal: model.direct_price_subtotal,
            forecast_product_qty: model.forecast_product_qty,
            partner_id: model.partner_id,
            description: model.description,
            editable: model.editable,
            approve: model.approve,
            production_line_id: model.production_line_id,
        }
    }
}

fn operation_from_model(
    model: project_bom_line_operation::Model,
) -> Result<BomLineOperation, ServiceError> {
    let attribute_value_ids: Vec<i64> = serde_json::from_str(&model.attribute_value_ids)?;
    Ok(BomLineOperation {
        id: model.id,
        bom_line_id: model.bom_line_id,
        bom_id: model.bom_id,
        sequence: model.sequence,
        name: model.name,
        code: model.code,
        description: model.description,
        product_id: model.product_id,
        source_product_id: model.source_product_id,
        product_uom_id: model.product_uom_id,
        product_qty: model.product_qty,
        attribute_value_ids,
    })
}

impl From<project_bom_line_version::Model> for BomLineVersion {
    fn from(model: project_bom_line_version::Model) -> Self {
        BomLineVersion {
            id: model.id,
            bom_line_id: model.bom_line_id,
            version: model.version,
            product_id: model.product_id,
            product_uom_id: model.product_uom_id,
            product_qty: model.product_qty,
            created_at: model.created_at,
        }
    }
}

impl From<production_bom_line::Model> for ProductionBomLine {
    fn from(model: production_bom_line::Model) -> Self {
        ProductionBomLine {
            id: model.id,
            product_id: model.product_id,
            product_uom_id: model.product_uom_id,
            product_qty: model.product_qty,
        }
    }
}

#[async_trait]
impl BomRepository for SeaOrmBomRepository {
    async fn find_header(&self, id: i64) -> Result<BomHeader, ServiceError> {
        let model = project_bom::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Project BOM", id))?;
        let sale_order_ids = self.sale_order_ids(id).await?;
        header_from_model(model, sale_order_ids)
    }

    #[instrument(skip(self, header))]
    async fn insert_header(&self, header: NewBomHeader) -> Result<BomHeader, ServiceError> {
        let now = Utc::now();
        let model = project_bom::ActiveModel {
            code: Set(header.code),
            version: Set(header.version),
            sequence: Set(header.sequence),
            active: Set(true),
            product_tmpl_id: Set(header.product_tmpl_id),
            product_id: Set(header.product_id),
            product_uom_id: Set(header.product_uom_id),
            product_qty: Set(header.product_qty),
            bulk_product_qty: Set(header.bulk_product_qty),
            forecast_product_qty: Set(header.forecast_product_qty),
            amount_untaxed: Set(Decimal::ZERO),
            direct_amount_untaxed: Set(Decimal::ZERO),
            standard_amount_untaxed: Set(Decimal::ZERO),
            price_unit_type: Set(header.price_unit_type.map(|p| p.to_string())),
            currency_code: Set(header.currency_code),
            task_id: Set(header.task_id),
            partner_id: Set(header.partner_id),
            note: Set(header.note),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;
        debug!(bom_id = model.id, "project BOM header stored");
        header_from_model(model, Vec::new())
    }

    async fn update_header(&self, header: &BomHeader) -> Result<(), ServiceError> {
        let existing = project_bom::Entity::find_by_id(header.id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Project BOM", header.id))?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let mut active: project_bom::ActiveModel = existing.into();
        active.code = Set(header.code.clone());
        active.version = Set(header.version.clone());
        active.sequence = Set(header.sequence);
        active.active = Set(header.active);
        active.product_tmpl_id = Set(header.product_tmpl_id);
        active.product_id = Set(header.product_id);
        active.product_uom_id = Set(header.product_uom_id);
        active.product_qty = Set(header.product_qty);
        active.bulk_product_qty = Set(header.bulk_product_qty);
        active.forecast_product_qty = Set(header.forecast_product_qty);
        active.amount_untaxed = Set(header.amount_untaxed);
        active.direct_amount_untaxed = Set(header.direct_amount_untaxed);
        active.standard_amount_untaxed = Set(header.standard_amount_untaxed);
        active.price_unit_type = Set(header.price_unit_type.map(|p| p.to_string()));
        active.currency_code = Set(header.currency_code.clone());
        active.task_id = Set(header.task_id);
        active.partner_id = Set(header.partner_id);
        active.note = Set(header.note.clone());
        active.updated_at = Set(Utc::now());
        active.update(&txn).await.map_err(ServiceError::db_error)?;

        project_bom_sale_order::Entity::delete_many()
            .filter(project_bom_sale_order::Column::BomId.eq(header.id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let mut sale_order_ids = header.sale_order_ids.clone();
        sale_order_ids.sort_unstable();
        sale_order_ids.dedup();
        if !sale_order_ids.is_empty() {
            let links = sale_order_ids
                .into_iter()
                .map(|sale_order_id| project_bom_sale_order::ActiveModel {
                    bom_id: Set(header.id),
                    sale_order_id: Set(sale_order_id),
                });
            project_bom_sale_order::Entity::insert_many(links)
                .exec_without_returning(&txn)
                .await
                .map_err(ServiceError::db_error)?;
        }
        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_header(&self, id: i64) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let line_ids: Vec<i64> = project_bom_line::Entity::find()
            .filter(project_bom_line::Column::BomId.eq(id))
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|l| l.id)
            .collect();
        delete_lines_in(&txn, &line_ids).await?;
        project_bom_sale_order::Entity::delete_many()
            .filter(project_bom_sale_order::Column::BomId.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let result = project_bom::Entity::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Project BOM", id));
        }
        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(())
    }

    async fn find_lines(&self, bom_id: i64) -> Result<Vec<BomLine>, ServiceError> {
        let lines = project_bom_line::Entity::find()
            .filter(project_bom_line::Column::BomId.eq(bom_id))
            .order_by_asc(project_bom_line::Column::Sequence)
            .order_by_asc(project_bom_line::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(lines.into_iter().map(BomLine::from).collect())
    }

    async fn find_line(&self, id: i64) -> Result<BomLine, ServiceError> {
        project_bom_line::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .map(BomLine::from)
            .ok_or_else(|| ServiceError::not_found("BOM line", id))
    }

    async fn insert_line(&self, line: NewBomLine) -> Result<BomLine, ServiceError> {
        self.check_unique_template(line.bom_id, line.product_tmpl_id, None)
            .await?;
        let model = project_bom_line::ActiveModel {
            bom_id: Set(line.bom_id),
            sequence: Set(line.sequence),
            product_tmpl_id: Set(line.product_tmpl_id),
            product_type_id: Set(line.product_type_id),
            product_id: Set(line.product_id),
            product_uom_id: Set(line.product_uom_id),
            product_qty: Set(line.product_qty),
            price_unit: Set(line.price_unit),
            avg_price_unit: Set(Decimal::ZERO),
            price_subtotal: Set(Decimal::ZERO),
            direct_price_subtotal: Set(Decimal::ZERO),
            forecast_product_qty: Set(Decimal::ZERO),
            partner_id: Set(line.partner_id),
            description: Set(line.description),
            editable: Set(line.editable),
            approve: Set(false),
            production_line_id: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;
        Ok(model.into())
    }

    async fn update_line(&self, line: &BomLine) -> Result<(), ServiceError> {
        let existing = project_bom_line::Entity::find_by_id(line.id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("BOM line", line.id))?;
        self.check_unique_template(line.bom_id, line.product_tmpl_id, Some(line.id))
            .await?;

        let mut active: project_bom_line::ActiveModel = existing.into();
        active.sequence = Set(line.sequence);
        active.product_tmpl_id = Set(line.product_tmpl_id);
        active.product_type_id = Set(line.product_type_id);
        active.product_id = Set(line.product_id);
        active.product_uom_id = Set(line.product_uom_id);
        active.product_qty = Set(line.product_qty);
        active.price_unit = Set(line.price_unit);
        active.avg_price_unit = Set(line.avg_price_unit);
        active.price_subtotal = Set(line.price_subtotal);
        active.direct_price_subtotal = Set(line.direct_price_subtotal);
        active.forecast_product_qty = Set(line.forecast_product_qty);
        active.partner_id = Set(line.partner_id);
        active.description = Set(line.description.clone());
        active.editable = Set(line.editable);
        active.approve = Set(line.approve);
        active.production_line_id = Set(line.production_line_id);
        active.update(&*self.db).await.map_err(ServiceError::db_error)?;
        Ok(())
    }

    async fn delete_lines(&self, ids: &[i64]) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        delete_lines_in(&txn, ids).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(())
    }

    async fn find_operations(
        &self,
        bom_line_id: i64,
    ) -> Result<Vec<BomLineOperation>, ServiceError> {
        project_bom_line_operation::Entity::find()
            .filter(project_bom_line_operation::Column::BomLineId.eq(bom_line_id))
            .order_by_asc(project_bom_line_operation::Column::Sequence)
            .order_by_asc(project_bom_line_operation::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(operation_from_model)
            .collect()
    }

    async fn find_operation(&self, id: i64) -> Result<BomLineOperation, ServiceError> {
        let model = project_bom_line_operation::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("BOM line operation", id))?;
        operation_from_model(model)
    }

    async fn insert_operation(
        &self,
        operation: NewBomLineOperation,
    ) -> Result<BomLineOperation, ServiceError> {
        let attribute_value_ids = serde_json::to_string(&operation.attribute_value_ids)?;
        let model = project_bom_line_operation::ActiveModel {
            bom_line_id: Set(operation.bom_line_id),
            bom_id: Set(operation.bom_id),
            sequence: Set(operation.sequence),
            name: Set(operation.name),
            code: Set(operation.code),
            description: Set(operation.description),
            product_id: Set(operation.product_id),
            source_product_id: Set(operation.source_product_id),
            product_uom_id: Set(operation.product_uom_id),
            product_qty: Set(operation.product_qty),
            attribute_value_ids: Set(attribute_value_ids),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;
        operation_from_model(model)
    }

    async fn update_operation(&self, operation: &BomLineOperation) -> Result<(), ServiceError> {
        let existing = project_bom_line_operation::Entity::find_by_id(operation.id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("BOM line operation", operation.id))?;
        let mut active: project_bom_line_operation::ActiveModel = existing.into();
        active.sequence = Set(operation.sequence);
        active.name = Set(operation.name.clone());
        active.code = Set(operation.code.clone());
        active.description = Set(operation.description.clone());
        active.product_id = Set(operation.product_id);
        active.source_product_id = Set(operation.source_product_id);
        active.product_uom_id = Set(operation.product_uom_id);
        active.product_qty = Set(operation.product_qty);
        active.attribute_value_ids = Set(serde_json::to_string(&operation.attribute_value_ids)?);
        active.update(&*self.db).await.map_err(ServiceError::db_error)?;
        Ok(())
    }
}

#[async_trait]
impl BomLineVersionRepository for SeaOrmBomRepository {
    async fn find_version(
        &self,
        bom_line_id: i64,
        version: &str,
    ) -> Result<Option<BomLineVersion>, ServiceError> {
        Ok(project_bom_line_version::Entity::find()
            .filter(project_bom_line_version::Column::BomLineId.eq(bom_line_id))
            .filter(project_bom_line_version::Column::Version.eq(version))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .map(BomLineVersion::from))
    }

    async fn find_versions(&self, bom_line_id: i64) -> Result<Vec<BomLineVersion>, ServiceError> {
        Ok(project_bom_line_version::Entity::find()
            .filter(project_bom_line_version::Column::BomLineId.eq(bom_line_id))
            .order_by_asc(project_bom_line_version::Column::Version)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(BomLineVersion::from)
            .collect())
    }

    async fn insert_version(
        &self,
        version: NewBomLineVersion,
    ) -> Result<BomLineVersion, ServiceError> {
        // The unique index reports a racing duplicate as a validation error too
        if self
            .find_version(version.bom_line_id, &version.version)
            .await?
            .is_some()
        {
            return Err(ServiceError::ValidationError(
                "Version already exists!".to_string(),
            ));
        }
        let model = project_bom_line_version::ActiveModel {
            bom_line_id: Set(version.bom_line_id),
            version: Set(version.version),
            product_id: Set(version.product_id),
            product_uom_id: Set(version.product_uom_id),
            product_qty: Set(version.product_qty),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;
        Ok(model.into())
    }

    async fn find_production_line(&self, id: i64) -> Result<ProductionBomLine, ServiceError> {
        production_bom_line::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .map(ProductionBomLine::from)
            .ok_or_else(|| ServiceError::not_found("Production BOM line", id))
    }

    async fn insert_production_line(
        &self,
        product_id: i64,
        product_uom_id: i64,
        product_qty: Decimal,
    ) -> Result<ProductionBomLine, ServiceError> {
        let model = production_bom_line::ActiveModel {
            product_id: Set(product_id),
            product_uom_id: Set(product_uom_id),
            product_qty: Set(product_qty),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;
        Ok(model.into())
    }

    async fn update_production_line(&self, line: &ProductionBomLine) -> Result<(), ServiceError> {
        let existing = production_bom_line::Entity::find_by_id(line.id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Production BOM line", line.id))?;
        let mut active: production_bom_line::ActiveModel = existing.into();
        active.product_id = Set(line.product_id);
        active.product_uom_id = Set(line.product_uom_id);
        active.product_qty = Set(line.product_qty);
        active.update(&*self.db).await.map_err(ServiceError::db_error)?;
        Ok(())
    }
}
