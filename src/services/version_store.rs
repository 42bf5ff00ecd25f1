use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::errors::ServiceError;
use crate::models::{BomLine, BomLineVersion, NewBomLineVersion};
use crate::repositories::{BomLineVersionRepository, BomRepository};

/// What an approval toggle did to the production line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApprovalOutcome {
    /// Line values pushed into the production line and recorded under `version`
    Promoted {
        production_line_id: i64,
        version: String,
    },
    /// Production line rolled back to the snapshot stored under `version`
    Restored {
        production_line_id: i64,
        version: String,
    },
    /// Nothing to roll back to
    Unchanged,
}

/// Snapshots approved line states per version label and keeps the shared
/// production line in step with approvals.
#[derive(Clone)]
pub struct BomLineVersionStore {
    versions: Arc<dyn BomLineVersionRepository>,
    boms: Arc<dyn BomRepository>,
}

impl BomLineVersionStore {
    pub fn new(versions: Arc<dyn BomLineVersionRepository>, boms: Arc<dyn BomRepository>) -> Self {
        Self { versions, boms }
    }

    /// Records the line's product, UOM and quantity under `version` unless a
    /// snapshot already exists for that label, in which case it is returned
    /// untouched.
    #[instrument(skip(self, line), fields(line_id = line.id))]
    pub async fn snapshot(
        &self,
        line: &BomLine,
        version: &str,
    ) -> Result<BomLineVersion, ServiceError> {
        if let Some(existing) = self.versions.find_version(line.id, version).await? {
            debug!("snapshot already recorded for this version");
            return Ok(existing);
        }
        let product_id = line.product_id.ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "BOM line {} needs a product variant before it can be approved",
                line.id
            ))
        })?;
        let inserted = self
            .versions
            .insert_version(NewBomLineVersion {
                bom_line_id: line.id,
                version: version.to_string(),
                product_id,
                product_uom_id: line.product_uom_id,
                product_qty: line.product_qty,
            })
            .await;
        match inserted {
            // another writer recorded this label first
            Err(err @ ServiceError::ValidationError(_)) => {
                match self.versions.find_version(line.id, version).await? {
                    Some(existing) => {
                        debug!("snapshot recorded concurrently for this version");
                        Ok(existing)
                    }
                    None => Err(err),
                }
            }
            other => other,
        }
    }

    pub async fn restore(
        &self,
        bom_line_id: i64,
        version: &str,
    ) -> Result<Option<BomLineVersion>, ServiceError> {
        self.versions.find_version(bom_line_id, version).await
    }

    pub async fn versions(&self, bom_line_id: i64) -> Result<Vec<BomLineVersion>, ServiceError> {
        self.versions.find_versions(bom_line_id).await
    }

    /// Mirrors the line into its production line, creating the production
    /// line on first use. Returns the production line id.
    pub async fn push_to_production(&self, line: &mut BomLine) -> Result<i64, ServiceError> {
        let product_id = line.product_id.ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "BOM line {} needs a product variant before it can be approved",
                line.id
            ))
        })?;
        match line.production_line_id {
            Some(id) => {
                let mut production = self.versions.find_production_line(id).await?;
                production.product_id = product_id;
                production.product_uom_id = line.product_uom_id;
                production.product_qty = line.product_qty;
                self.versions.update_production_line(&production).await?;
                Ok(id)
            }
            None => {
                let production = self
                    .versions
                    .insert_production_line(product_id, line.product_uom_id, line.product_qty)
                    .await?;
                line.production_line_id = Some(production.id);
                Ok(production.id)
            }
        }
    }

    /// Applies an approval toggle on a line under its header's current version.
    #[instrument(skip(self))]
    pub async fn set_approval(
        &self,
        bom_line_id: i64,
        approve: bool,
    ) -> Result<ApprovalOutcome, ServiceError> {
        let mut line = self.boms.find_line(bom_line_id).await?;
        let header = self.boms.find_header(line.bom_id).await?;

        if approve {
            self.snapshot(&line, &header.version).await?;
            let production_line_id = self.push_to_production(&mut line).await?;
            line.approve = true;
            self.boms.update_line(&line).await?;
            info!(production_line_id, version = %header.version, "BOM line approved");
            return Ok(ApprovalOutcome::Promoted {
                production_line_id,
                version: header.version,
            });
        }

        line.approve = false;
        self.boms.update_line(&line).await?;

        let snapshot = self.restore(line.id, &header.version).await?;
        match (snapshot, line.production_line_id) {
            (Some(snapshot), Some(production_line_id)) => {
                let mut production = self.versions.find_production_line(production_line_id).await?;
                production.product_id = snapshot.product_id;
                production.product_uom_id = snapshot.product_uom_id;
                production.product_qty = snapshot.product_qty;
                self.versions.update_production_line(&production).await?;
                info!(production_line_id, version = %header.version, "BOM line restored");
                Ok(ApprovalOutcome::Restored {
                    production_line_id,
                    version: header.version,
                })
            }
            _ => {
                debug!(version = %header.version, "no snapshot to restore");
                Ok(ApprovalOutcome::Unchanged)
            }
        }
    }
}
