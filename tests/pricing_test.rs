mod common;

use chrono::Utc;
use common::*;
use project_bom::{
    models::{NewBomLine, PriceUnitType, SupplierPrice},
    services::price_resolver::PriceChoice,
};
use rstest::rstest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn header_with_line(h: &Harness, component: i64, qty: Decimal) -> (i64, i64) {
    let subject = h.add_item(500, "FINISHED", UNITS, dec!(0));
    let bom_id = h.header_for(subject).await;
    let change = h
        .service
        .add_line(NewBomLine::new(bom_id, component, UNITS, qty))
        .await
        .unwrap();
    (bom_id, change.line.id)
}

#[tokio::test]
async fn average_policy_weights_purchases_by_received_quantity() {
    let h = Harness::new();
    let component = h.add_item(1, "BOLT", UNITS, dec!(1));
    h.store.add_purchase_line(purchase(1, component, dec!(5), dec!(10), 1));
    h.store.add_purchase_line(purchase(2, component, dec!(8), dec!(5), 2));
    let (bom_id, line_id) = header_with_line(&h, component, dec!(1)).await;

    let outcome = h
        .service
        .set_price_policy(bom_id, Some(PriceUnitType::Avg))
        .await
        .unwrap()
        .unwrap();

    let line = h.service.lines(bom_id).await.unwrap().remove(0);
    assert_eq!(line.id, line_id);
    assert_eq!(line.avg_price_unit, dec!(6));
    assert_eq!(line.price_unit, dec!(6));
    assert_eq!(outcome.unit_price, dec!(6));
    assert_eq!(outcome.totals.amount_untaxed, dec!(6));
}

#[tokio::test]
async fn average_without_receipts_is_zero() {
    let h = Harness::new();
    let component = h.add_item(1, "BOLT", UNITS, dec!(3));
    let mut pending = purchase(1, component, dec!(5), dec!(10), 1);
    pending.qty_received = Decimal::ZERO;
    h.store.add_purchase_line(pending);

    let avg = h.service.resolver().average_price(component).await.unwrap();
    assert_eq!(avg, Decimal::ZERO);
}

#[rstest]
#[case(PriceUnitType::Last, dec!(2))]
#[case(PriceUnitType::First, dec!(9))]
#[case(PriceUnitType::Top, dec!(9))]
#[case(PriceUnitType::Low, dec!(2))]
#[tokio::test]
async fn positional_policies_pick_one_purchase(
    #[case] policy: PriceUnitType,
    #[case] expected: Decimal,
) {
    let h = Harness::new();
    let component = h.add_item(1, "BOLT", UNITS, dec!(1));
    h.store.add_purchase_line(purchase(1, component, dec!(5), dec!(1), 3));
    h.store.add_purchase_line(purchase(2, component, dec!(9), dec!(1), 1));
    h.store.add_purchase_line(purchase(3, component, dec!(2), dec!(1), 7));
    let (bom_id, _) = header_with_line(&h, component, dec!(2)).await;

    let outcome = h
        .service
        .set_price_policy(bom_id, Some(policy))
        .await
        .unwrap()
        .unwrap();

    let line = h.service.lines(bom_id).await.unwrap().remove(0);
    assert_eq!(line.price_unit, expected);
    assert_eq!(outcome.unit_price, expected * dec!(2));
}

#[tokio::test]
async fn lines_without_history_keep_their_price() {
    let h = Harness::new();
    let component = h.add_item(1, "BOLT", UNITS, dec!(1));
    let (bom_id, line_id) = header_with_line(&h, component, dec!(1)).await;
    let mut line = h.service.lines(bom_id).await.unwrap().remove(0);
    line.price_unit = dec!(4);
    h.service.update_line(line).await.unwrap();

    h.service
        .set_price_policy(bom_id, Some(PriceUnitType::Last))
        .await
        .unwrap();

    let line = h.service.lines(bom_id).await.unwrap().remove(0);
    assert_eq!(line.id, line_id);
    assert_eq!(line.price_unit, dec!(4));
}

#[tokio::test]
async fn clearing_the_policy_skips_repricing() {
    let h = Harness::new();
    let component = h.add_item(1, "BOLT", UNITS, dec!(1));
    h.store.add_purchase_line(purchase(1, component, dec!(5), dec!(1), 1));
    let (bom_id, _) = header_with_line(&h, component, dec!(1)).await;

    let outcome = h.service.set_price_policy(bom_id, None).await.unwrap();
    assert!(outcome.is_none());
    let line = h.service.lines(bom_id).await.unwrap().remove(0);
    assert_eq!(line.price_unit, Decimal::ZERO);
}

#[tokio::test]
async fn zero_forecast_leaves_the_header_unit_price_undefined() {
    let h = Harness::new();
    let component = h.add_item(1, "BOLT", UNITS, dec!(1));
    h.store.add_purchase_line(purchase(1, component, dec!(5), dec!(1), 1));
    let (bom_id, _) = header_with_line(&h, component, dec!(1)).await;
    h.service.set_forecast_qty(bom_id, Decimal::ZERO).await.unwrap();

    let outcome = h
        .service
        .set_price_policy(bom_id, Some(PriceUnitType::Top))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.unit_price, Decimal::ZERO);
    let line = h.service.lines(bom_id).await.unwrap().remove(0);
    assert_eq!(line.price_unit, dec!(5));
}

#[tokio::test]
async fn purchase_prices_are_normalized_for_tax_uom_and_currency() {
    let h = Harness::new();
    let component = h.add_item(1, "STEEL", KG, dec!(1));
    let mut line = purchase(1, component, dec!(0.025), dec!(1000), 1);
    line.product_uom_id = GRAM;
    line.tax_ids = vec![VAT_25_INCLUDED];
    line.currency_code = "USD".into();

    let product = h.store.product(component).unwrap();
    let price = h
        .service
        .resolver()
        .normalize_purchase_price(&line, &product)
        .await
        .unwrap();

    // 0.025 USD/g incl. 25% -> 0.02 USD/g -> 20 USD/kg -> 10 EUR/kg
    assert_eq!(price, dec!(10));
}

#[tokio::test]
async fn move_price_prefers_manual_then_latest_purchase_then_standard() {
    let h = Harness::new();
    let bought = h.add_item(1, "BOLT", UNITS, dec!(3));
    let never_bought = h.add_item(2, "NUT", UNITS, dec!(0.5));
    h.store.add_purchase_line(purchase(1, bought, dec!(4), dec!(1), 1));
    h.store.add_purchase_line(purchase(2, bought, dec!(6), dec!(1), 9));

    let resolver = h.service.resolver();
    assert_eq!(resolver.unit_price_for_move(bought, dec!(7)).await.unwrap(), dec!(7));
    assert_eq!(resolver.unit_price_for_move(bought, Decimal::ZERO).await.unwrap(), dec!(6));
    assert_eq!(
        resolver.unit_price_for_move(never_bought, Decimal::ZERO).await.unwrap(),
        dec!(0.5)
    );
}

#[tokio::test]
async fn new_line_price_is_seeded_from_the_matching_vendor_entry() {
    let h = Harness::new();
    let component = h.add_item(1, "STEEL", KG, dec!(1));
    let today = Utc::now().date_naive();
    let seller = |id: i64, sequence: i32, min_qty: Decimal, price: Decimal| SupplierPrice {
        id,
        partner_id: 900,
        product_tmpl_id: component,
        product_id: None,
        product_uom_id: KG,
        sequence,
        min_qty,
        price,
        currency_code: "USD".into(),
        date_start: Some(today - chrono::Duration::days(1)),
        date_end: None,
    };
    // 500 g is 0.5 kg: the first entry needs at least 1 kg
    h.store.add_supplier_price(seller(1, 1, dec!(1), dec!(12)));
    h.store.add_supplier_price(seller(2, 2, dec!(0), dec!(14)));

    let subject = h.add_item(500, "FINISHED", UNITS, dec!(0));
    let bom_id = h.header_for(subject).await;
    let change = h
        .service
        .add_line(NewBomLine::new(bom_id, component, GRAM, dec!(500)))
        .await
        .unwrap();

    assert!(change.warning.is_none());
    assert_eq!(change.line.product_uom_id, GRAM);
    // 14 USD/kg -> 7 EUR/kg -> 0.007 EUR/g
    assert_eq!(change.line.price_unit, dec!(0.007));
}

#[tokio::test]
async fn foreign_uom_category_is_replaced_with_a_warning() {
    let h = Harness::new();
    let component = h.add_item(1, "STEEL", KG, dec!(1));
    let subject = h.add_item(500, "FINISHED", UNITS, dec!(0));
    let bom_id = h.header_for(subject).await;

    let change = h
        .service
        .add_line(NewBomLine::new(bom_id, component, UNITS, dec!(2)))
        .await
        .unwrap();

    assert_eq!(change.line.product_uom_id, KG);
    assert!(change
        .warning
        .as_deref()
        .unwrap()
        .contains("different category"));
}

#[tokio::test]
async fn price_candidates_list_history_and_standard_price() {
    let h = Harness::new();
    h.add_template(3, "PANEL", UNITS, dec!(99), None);
    h.add_variant(31, 3, "PANEL-RED", UNITS, dec!(10));
    h.add_variant(32, 3, "PANEL-BLUE", UNITS, dec!(20));
    h.store.add_purchase_line(purchase(1, 31, dec!(11), dec!(1), 1));
    h.store.add_purchase_line(purchase(2, 32, dec!(13), dec!(1), 5));
    let (_, line_id) = header_with_line(&h, 3, dec!(1)).await;

    let candidates = h.service.price_candidates(line_id).await.unwrap();
    assert_eq!(candidates.standard_price, dec!(15));
    let ids: Vec<i64> = candidates.purchases.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![2, 1]);

    let line = h
        .service
        .apply_price_choice(line_id, Some(PriceChoice::Purchase(1)))
        .await
        .unwrap();
    assert_eq!(line.price_unit, dec!(11));

    let line = h.service.apply_price_choice(line_id, None).await.unwrap();
    assert_eq!(line.price_unit, dec!(15));
}
