use anyhow::Result;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_project_boms_table::Migration),
            Box::new(m20240301_000002_create_project_bom_lines_table::Migration),
            Box::new(m20240301_000003_create_production_bom_lines_table::Migration),
            Box::new(m20240301_000004_create_project_bom_line_versions_table::Migration),
        ]
    }
}

mod m20240301_000001_create_project_boms_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_project_boms_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProjectBoms::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProjectBoms::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ProjectBoms::Code).string().null())
                        .col(ColumnDef::new(ProjectBoms::Version).string().not_null())
                        .col(
                            ColumnDef::new(ProjectBoms::Sequence)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(ProjectBoms::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(ProjectBoms::ProductTmplId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProjectBoms::ProductId).big_integer().null())
                        .col(
                            ColumnDef::new(ProjectBoms::ProductUomId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectBoms::ProductQty)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(ProjectBoms::BulkProductQty)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(ProjectBoms::ForecastProductQty)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(ProjectBoms::AmountUntaxed)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProjectBoms::DirectAmountUntaxed)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProjectBoms::StandardAmountUntaxed)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(ProjectBoms::PriceUnitType).string().null())
                        .col(ColumnDef::new(ProjectBoms::CurrencyCode).string().not_null())
                        .col(ColumnDef::new(ProjectBoms::TaskId).big_integer().null())
                        .col(ColumnDef::new(ProjectBoms::PartnerId).big_integer().null())
                        .col(ColumnDef::new(ProjectBoms::Note).text().null())
                        .col(
                            ColumnDef::new(ProjectBoms::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectBoms::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_project_boms_product_tmpl_id")
                        .table(ProjectBoms::Table)
                        .col(ProjectBoms::ProductTmplId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProjectBomSaleOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProjectBomSaleOrders::BomId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectBomSaleOrders::SaleOrderId)
                                .big_integer()
                                .not_null(),
                        )
                        .primary_key(
                            Index::create()
                                .col(ProjectBomSaleOrders::BomId)
                                .col(ProjectBomSaleOrders::SaleOrderId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_project_bom_sale_orders_bom_id")
                                .from(ProjectBomSaleOrders::Table, ProjectBomSaleOrders::BomId)
                                .to(ProjectBoms::Table, ProjectBoms::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProjectBomSaleOrders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProjectBoms::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum ProjectBoms {
        Table,
        Id,
        Code,
        Version,
        Sequence,
        Active,
        ProductTmplId,
        ProductId,
        ProductUomId,
        ProductQty,
        BulkProductQty,
        ForecastProductQty,
        AmountUntaxed,
        DirectAmountUntaxed,
        StandardAmountUntaxed,
        PriceUnitType,
        CurrencyCode,
        TaskId,
        PartnerId,
        Note,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ProjectBomSaleOrders {
        Table,
        BomId,
        SaleOrderId,
    }
}

mod m20240301_000002_create_project_bom_lines_table {

    use super::m20240301_000001_create_project_boms_table::ProjectBoms;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_project_bom_lines_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProjectBomLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProjectBomLines::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ProjectBomLines::BomId).big_integer().not_null())
                        .col(
                            ColumnDef::new(ProjectBomLines::Sequence)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLines::ProductTmplId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLines::ProductTypeId)
                                .big_integer()
                                .null(),
                        )
                        .col(ColumnDef::new(ProjectBomLines::ProductId).big_integer().null())
                        .col(
                            ColumnDef::new(ProjectBomLines::ProductUomId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLines::ProductQty)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLines::PriceUnit)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLines::AvgPriceUnit)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLines::PriceSubtotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLines::DirectPriceSubtotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLines::ForecastProductQty)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(ProjectBomLines::PartnerId).big_integer().null())
                        .col(ColumnDef::new(ProjectBomLines::Description).text().null())
                        .col(
                            ColumnDef::new(ProjectBomLines::Editable)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLines::Approve)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLines::ProductionLineId)
                                .big_integer()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_project_bom_lines_bom_id")
                                .from(ProjectBomLines::Table, ProjectBomLines::BomId)
                                .to(ProjectBoms::Table, ProjectBoms::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // One line per template and header
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("uq_project_bom_lines_bom_tmpl")
                        .table(ProjectBomLines::Table)
                        .col(ProjectBomLines::BomId)
                        .col(ProjectBomLines::ProductTmplId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProjectBomLineOperations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProjectBomLineOperations::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLineOperations::BomLineId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLineOperations::BomId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLineOperations::Sequence)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(ProjectBomLineOperations::Name).string().null())
                        .col(ColumnDef::new(ProjectBomLineOperations::Code).string().null())
                        .col(
                            ColumnDef::new(ProjectBomLineOperations::Description)
                                .text()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLineOperations::ProductId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLineOperations::SourceProductId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLineOperations::ProductUomId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLineOperations::ProductQty)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLineOperations::AttributeValueIds)
                                .text()
                                .not_null()
                                .default("[]"),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_project_bom_line_operations_bom_line_id")
                                .from(
                                    ProjectBomLineOperations::Table,
                                    ProjectBomLineOperations::BomLineId,
                                )
                                .to(ProjectBomLines::Table, ProjectBomLines::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_project_bom_line_operations_bom_line_id")
                        .table(ProjectBomLineOperations::Table)
                        .col(ProjectBomLineOperations::BomLineId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(ProjectBomLineOperations::Table)
                        .to_owned(),
                )
                .await?;
            manager
                .drop_table(Table::drop().table(ProjectBomLines::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum ProjectBomLines {
        Table,
        Id,
        BomId,
        Sequence,
        ProductTmplId,
        ProductTypeId,
        ProductId,
        ProductUomId,
        ProductQty,
        PriceUnit,
        AvgPriceUnit,
        PriceSubtotal,
        DirectPriceSubtotal,
        ForecastProductQty,
        PartnerId,
        Description,
        Editable,
        Approve,
        ProductionLineId,
    }

    #[derive(DeriveIden)]
    enum ProjectBomLineOperations {
        Table,
        Id,
        BomLineId,
        BomId,
        Sequence,
        Name,
        Code,
        Description,
        ProductId,
        SourceProductId,
        ProductUomId,
        ProductQty,
        AttributeValueIds,
    }
}

mod m20240301_000003_create_production_bom_lines_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_production_bom_lines_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductionBomLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductionBomLines::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ProductionBomLines::ProductId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionBomLines::ProductUomId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionBomLines::ProductQty)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductionBomLines::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ProductionBomLines {
        Table,
        Id,
        ProductId,
        ProductUomId,
        ProductQty,
    }
}

mod m20240301_000004_create_project_bom_line_versions_table {

    use super::m20240301_000002_create_project_bom_lines_table::ProjectBomLines;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_project_bom_line_versions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProjectBomLineVersions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProjectBomLineVersions::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLineVersions::BomLineId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLineVersions::Version)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLineVersions::ProductId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLineVersions::ProductUomId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLineVersions::ProductQty)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProjectBomLineVersions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_project_bom_line_versions_bom_line_id")
                                .from(
                                    ProjectBomLineVersions::Table,
                                    ProjectBomLineVersions::BomLineId,
                                )
                                .to(ProjectBomLines::Table, ProjectBomLines::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // First snapshot per label wins
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("uq_project_bom_line_versions_line_version")
                        .table(ProjectBomLineVersions::Table)
                        .col(ProjectBomLineVersions::BomLineId)
                        .col(ProjectBomLineVersions::Version)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(ProjectBomLineVersions::Table)
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ProjectBomLineVersions {
        Table,
        Id,
        BomLineId,
        Version,
        ProductId,
        ProductUomId,
        ProductQty,
        CreatedAt,
    }
}

pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;

    info!("Running database migrations");

    match Migrator::up(&db, None).await {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}
