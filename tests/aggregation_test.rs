mod common;

use common::*;
use project_bom::{
    models::{BomLine, DemandLine, NewBomHeader, NewBomLine},
    services::aggregator::line_totals,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn priced_line(h: &Harness, bom_id: i64, component: i64, qty: Decimal, price: Decimal) {
    let mut line = NewBomLine::new(bom_id, component, UNITS, qty);
    line.price_unit = price;
    h.service.add_line(line).await.unwrap();
}

#[tokio::test]
async fn totals_follow_lines_and_forecast() {
    let h = Harness::new();
    let bolt = h.add_item(1, "BOLT", UNITS, dec!(1));
    let plate = h.add_item(2, "PLATE", UNITS, dec!(1));
    let subject = h.add_item(500, "FINISHED", UNITS, dec!(7));
    let bom_id = h.header_for(subject).await;
    priced_line(&h, bom_id, bolt, dec!(2), dec!(3)).await;
    priced_line(&h, bom_id, plate, dec!(1), dec!(10)).await;

    let totals = h.service.set_forecast_qty(bom_id, dec!(5)).await.unwrap();
    assert_eq!(totals.amount_untaxed, dec!(80));
    assert_eq!(totals.direct_amount_untaxed, dec!(16));
    assert_eq!(totals.standard_amount_untaxed, dec!(35));

    let header = h.service.header(bom_id).await.unwrap();
    assert_eq!(header.amount_untaxed, dec!(80));
    let lines = h.service.lines(bom_id).await.unwrap();
    let bolt_line = lines.iter().find(|l| l.product_tmpl_id == bolt).unwrap();
    assert_eq!(bolt_line.forecast_product_qty, dec!(10));
    assert_eq!(bolt_line.price_subtotal, dec!(30));
    assert_eq!(bolt_line.direct_price_subtotal, dec!(6));

    assert_eq!(h.store.product(subject).unwrap().direct_standard_price, dec!(16));
}

#[tokio::test]
async fn recompute_is_idempotent() {
    let h = Harness::new();
    let bolt = h.add_item(1, "BOLT", UNITS, dec!(1));
    let subject = h.add_item(500, "FINISHED", UNITS, dec!(2));
    let bom_id = h.header_for(subject).await;
    priced_line(&h, bom_id, bolt, dec!(3), dec!(1.5)).await;

    let first = h.service.recompute(bom_id).await.unwrap();
    let header = h.service.header(bom_id).await.unwrap();
    let second = h.service.recompute(bom_id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.service.header(bom_id).await.unwrap(), header);
}

#[tokio::test]
async fn header_amounts_use_the_currency_rounding() {
    let h = Harness::new();
    let bolt = h.add_item(1, "BOLT", UNITS, dec!(1));
    let subject = h.add_item(500, "FINISHED", UNITS, dec!(0));
    let bom_id = h.header_for(subject).await;
    priced_line(&h, bom_id, bolt, dec!(1), dec!(0.333)).await;

    let totals = h.service.recompute(bom_id).await.unwrap();
    assert_eq!(totals.amount_untaxed, dec!(0.33));
    let line = h.service.lines(bom_id).await.unwrap().remove(0);
    assert_eq!(line.price_subtotal, dec!(0.333));
}

#[tokio::test]
async fn forecast_comes_from_linked_demand() {
    let h = Harness::new();
    let subject = h.add_item(500, "FINISHED", UNITS, dec!(0));
    let bom_id = h.header_for(subject).await;
    let demand = |order_id: i64, product_id: i64, qty: Decimal| DemandLine {
        order_id,
        product_id,
        product_uom_qty: qty,
    };
    h.store.add_demand_line(demand(1, subject, dec!(3)));
    h.store.add_demand_line(demand(2, subject, dec!(4)));
    h.store.add_demand_line(demand(2, 999, dec!(10)));
    h.store.add_demand_line(demand(3, 999, dec!(2)));

    let forecast = h.service.link_demand(bom_id, vec![2, 1, 2]).await.unwrap();
    assert_eq!(forecast, dec!(7));
    let header = h.service.header(bom_id).await.unwrap();
    assert_eq!(header.forecast_product_qty, dec!(7));
    assert_eq!(header.sale_order_ids, vec![1, 2]);

    // no demand for the subject product: the previous forecast stays
    let forecast = h.service.link_demand(bom_id, vec![3]).await.unwrap();
    assert_eq!(forecast, dec!(7));
    assert_eq!(h.service.header(bom_id).await.unwrap().forecast_product_qty, dec!(7));
}

#[tokio::test]
async fn template_headers_push_direct_cost_to_their_only_variant() {
    let h = Harness::new();
    let bolt = h.add_item(1, "BOLT", UNITS, dec!(1));
    h.add_template(600, "FRAME", UNITS, dec!(0), None);
    h.add_variant(601, 600, "FRAME-A", UNITS, dec!(0));
    let bom_id = h
        .service
        .create_header(NewBomHeader::new(600, UNITS, "EUR"))
        .await
        .unwrap()
        .id;

    priced_line(&h, bom_id, bolt, dec!(4), dec!(2.5)).await;
    assert_eq!(h.store.product(601).unwrap().direct_standard_price, dec!(10));

    h.add_variant(602, 600, "FRAME-B", UNITS, dec!(0));
    priced_line(&h, bom_id, h.add_item(2, "NUT", UNITS, dec!(1)), dec!(1), dec!(1)).await;
    assert_eq!(h.store.product(601).unwrap().direct_standard_price, dec!(10));
    assert_eq!(h.store.product(602).unwrap().direct_standard_price, Decimal::ZERO);
}

#[tokio::test]
async fn standard_price_is_stored_on_the_subject_template() {
    let h = Harness::new();
    let bolt = h.add_item(1, "BOLT", UNITS, dec!(1));
    let subject = h.add_item(500, "FINISHED", UNITS, dec!(0));
    let bom_id = h.header_for(subject).await;
    priced_line(&h, bom_id, bolt, dec!(2), dec!(4.25)).await;

    let stored = h.service.store_standard_price(bom_id).await.unwrap();
    assert_eq!(stored, dec!(8.5));
    assert_eq!(h.store.template(subject).unwrap().standard_price, dec!(8.5));
}

fn bom_line(id: i64, qty: Decimal, price: Decimal) -> BomLine {
    BomLine {
        id,
        bom_id: 1,
        sequence: 0,
        product_tmpl_id: id,
        product_type_id: None,
        product_id: None,
        product_uom_id: UNITS,
        product_qty: qty,
        price_unit: price,
        avg_price_unit: Decimal::ZERO,
        price_subtotal: Decimal::ZERO,
        direct_price_subtotal: Decimal::ZERO,
        forecast_product_qty: Decimal::ZERO,
        partner_id: None,
        description: None,
        editable: false,
        approve: false,
        production_line_id: None,
    }
}

proptest! {
    #[test]
    fn line_totals_are_stable_and_scale_with_forecast(
        entries in prop::collection::vec((0i64..100_000, 0i64..1_000_000), 0..20),
        forecast in 0i64..10_000,
    ) {
        let forecast = Decimal::new(forecast, 1);
        let mut lines: Vec<BomLine> = entries
            .iter()
            .enumerate()
            .map(|(i, (qty, price))| bom_line(i as i64, Decimal::new(*qty, 3), Decimal::new(*price, 2)))
            .collect();

        let first = line_totals(&mut lines, forecast);
        let second = line_totals(&mut lines, forecast);
        prop_assert_eq!(first, second);
        prop_assert_eq!(first.0, first.1 * forecast);
    }
}
