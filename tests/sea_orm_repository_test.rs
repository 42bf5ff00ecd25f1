mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use common::*;
use project_bom::{
    migrator::Migrator,
    models::{NewBomLine, NewBomLineVersion, PriceUnitType},
    repositories::{BomLineVersionRepository, BomRepository, SeaOrmBomRepository},
    services::version_store::ApprovalOutcome,
    ServiceError,
};
use rust_decimal_macros::dec;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;

async fn sqlite_repository() -> Arc<SeaOrmBomRepository> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.expect("sqlite connection");
    Migrator::up(&db, None).await.expect("migrations applied");
    Arc::new(SeaOrmBomRepository::new(Arc::new(db)))
}

#[tokio::test]
async fn migrations_apply_on_sqlite() {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.expect("sqlite connection");
    Migrator::up(&db, None).await.expect("migrations applied");
    let applied = Migrator::get_applied_migrations(&db).await.unwrap();
    assert_eq!(applied.len(), 4);
    // applying again is a no-op
    Migrator::up(&db, None).await.unwrap();
}

#[tokio::test]
async fn headers_and_lines_round_trip_through_the_database() {
    let repository = sqlite_repository().await;
    let h = Harness::with_bom_storage(repository.clone());
    let bolt = h.add_item(1, "BOLT", UNITS, dec!(1));
    let subject = h.add_item(500, "FINISHED", UNITS, dec!(4));
    let bom_id = h.header_for(subject).await;

    let mut line = NewBomLine::new(bom_id, bolt, UNITS, dec!(2));
    line.price_unit = dec!(2.5);
    line.description = Some("M8 bolt".into());
    let created = h.service.add_line(line).await.unwrap().line;

    let header = repository.find_header(bom_id).await.unwrap();
    assert_eq!(header.amount_untaxed, dec!(5));
    assert_eq!(header.standard_amount_untaxed, dec!(4));
    assert_eq!(header.version, "1.0");

    let stored = repository.find_line(created.id).await.unwrap();
    assert_eq!(stored.product_qty, dec!(2));
    assert_eq!(stored.price_subtotal, dec!(5));
    assert_eq!(stored.description.as_deref(), Some("M8 bolt"));

    h.service
        .set_price_policy(bom_id, Some(PriceUnitType::Last))
        .await
        .unwrap();
    assert_eq!(
        repository.find_header(bom_id).await.unwrap().price_unit_type,
        Some(PriceUnitType::Last)
    );
}

#[tokio::test]
async fn linked_sale_orders_are_stored_once_each() {
    let repository = sqlite_repository().await;
    let h = Harness::with_bom_storage(repository.clone());
    let subject = h.add_item(500, "FINISHED", UNITS, dec!(0));
    let bom_id = h.header_for(subject).await;

    h.service.link_demand(bom_id, vec![9, 3, 9]).await.unwrap();
    assert_eq!(repository.find_header(bom_id).await.unwrap().sale_order_ids, vec![3, 9]);

    h.service.link_demand(bom_id, vec![4]).await.unwrap();
    assert_eq!(repository.find_header(bom_id).await.unwrap().sale_order_ids, vec![4]);
}

#[tokio::test]
async fn duplicate_templates_and_versions_are_rejected() {
    let repository = sqlite_repository().await;
    let h = Harness::with_bom_storage(repository.clone());
    let bolt = h.add_item(1, "BOLT", UNITS, dec!(1));
    let subject = h.add_item(500, "FINISHED", UNITS, dec!(0));
    let bom_id = h.header_for(subject).await;
    let line = h
        .service
        .add_line(NewBomLine::new(bom_id, bolt, UNITS, dec!(1)))
        .await
        .unwrap()
        .line;

    let err = h
        .service
        .add_line(NewBomLine::new(bom_id, bolt, UNITS, dec!(1)))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let version = NewBomLineVersion {
        bom_line_id: line.id,
        version: "1.0".into(),
        product_id: bolt,
        product_uom_id: UNITS,
        product_qty: dec!(1),
    };
    repository.insert_version(version.clone()).await.unwrap();
    let err = repository.insert_version(version).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn approval_round_trip_persists_snapshots_and_production_lines() {
    let repository = sqlite_repository().await;
    let h = Harness::with_bom_storage(repository.clone());
    let bolt = h.add_item(1, "BOLT", UNITS, dec!(1));
    let subject = h.add_item(500, "FINISHED", UNITS, dec!(0));
    let bom_id = h.header_for(subject).await;
    let mut new_line = NewBomLine::new(bom_id, bolt, UNITS, dec!(3));
    new_line.product_id = Some(bolt);
    let line = h.service.add_line(new_line).await.unwrap().line;

    let outcome = h.service.set_approval(line.id, true).await.unwrap();
    let ApprovalOutcome::Promoted { production_line_id, .. } = outcome else {
        panic!("expected a promotion, got {:?}", outcome);
    };

    let mut changed = repository.find_line(line.id).await.unwrap();
    changed.product_qty = dec!(5);
    h.service.update_line(changed).await.unwrap();
    assert_eq!(
        repository.find_production_line(production_line_id).await.unwrap().product_qty,
        dec!(5)
    );

    h.service.set_approval(line.id, false).await.unwrap();
    assert_eq!(
        repository.find_production_line(production_line_id).await.unwrap().product_qty,
        dec!(3)
    );
    let versions = repository.find_versions(line.id).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].product_qty, dec!(3));

    h.service.delete(bom_id).await.unwrap();
    assert!(repository.find_versions(line.id).await.unwrap().is_empty());
    assert_matches!(
        repository.find_line(line.id).await,
        Err(ServiceError::NotFound(_))
    );
}
