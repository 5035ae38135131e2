mod common;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use solarqc_api::errors::ServiceError;
use solarqc_api::services::lot_pool::{AddLotInput, CocFeedRecord};

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

#[tokio::test]
async fn reserve_and_release_keep_consumed_within_received() {
    let app = TestApp::new().await;
    let lot = app
        .seed_lot("Solar Cell", "SC-001", date("2026-01-10"), dec!(1000))
        .await;

    let pool = &app.state.services.lot_pool;
    pool.reserve(lot.id, dec!(600)).await.unwrap();
    pool.reserve(lot.id, dec!(400)).await.unwrap();

    // Fully consumed now; another unit must be refused.
    let err = pool.reserve(lot.id, dec!(1)).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientQuantity(_));

    let current = pool.get_lot(lot.id).await.unwrap().unwrap();
    assert_eq!(current.consumed_quantity, dec!(1000));
    assert_eq!(current.available_quantity(), Decimal::ZERO);

    pool.release(lot.id, dec!(250)).await.unwrap();
    let current = pool.get_lot(lot.id).await.unwrap().unwrap();
    assert_eq!(current.consumed_quantity, dec!(750));
}

#[tokio::test]
async fn failed_reserve_leaves_lot_untouched() {
    let app = TestApp::new().await;
    let lot = app
        .seed_lot("Ribbon", "RB-001", date("2026-01-10"), dec!(50))
        .await;

    let pool = &app.state.services.lot_pool;
    let err = pool.reserve(lot.id, dec!(50.0001)).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientQuantity(_));

    let current = pool.get_lot(lot.id).await.unwrap().unwrap();
    assert_eq!(current.consumed_quantity, Decimal::ZERO);
}

#[tokio::test]
async fn release_more_than_consumed_is_rejected() {
    let app = TestApp::new().await;
    let lot = app
        .seed_lot("Flux", "FX-001", date("2026-01-10"), dec!(100))
        .await;

    let pool = &app.state.services.lot_pool;
    pool.reserve(lot.id, dec!(10)).await.unwrap();
    let err = pool.release(lot.id, dec!(11)).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    let current = pool.get_lot(lot.id).await.unwrap().unwrap();
    assert_eq!(current.consumed_quantity, dec!(10));
}

#[tokio::test]
async fn reserve_unknown_lot_is_not_found() {
    let app = TestApp::new().await;
    let err = app
        .state
        .services
        .lot_pool
        .reserve(9999, dec!(1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn available_lots_come_back_in_fifo_order() {
    let app = TestApp::new().await;
    // Insert out of invoice-date order on purpose.
    let newer = app
        .seed_lot("Solar Cell", "SC-NEW", date("2026-02-01"), dec!(500))
        .await;
    let older = app
        .seed_lot("Solar Cell", "SC-OLD", date("2026-01-01"), dec!(500))
        .await;
    let exhausted = app
        .seed_lot("Solar Cell", "SC-GONE", date("2025-12-01"), dec!(300))
        .await;
    app.state
        .services
        .lot_pool
        .reserve(exhausted.id, dec!(300))
        .await
        .unwrap();

    let lots = app
        .state
        .services
        .lot_pool
        .list_available("Solar Cell")
        .await
        .unwrap();
    let ids: Vec<i64> = lots.iter().map(|l| l.id).collect();
    assert_eq!(ids, vec![older.id, newer.id]);
}

#[tokio::test]
async fn add_lot_rejects_duplicate_sync_key() {
    let app = TestApp::new().await;
    let input = AddLotInput {
        company_name: "Acme Solar".to_string(),
        material_type: "Sealant".to_string(),
        brand: None,
        product_type: None,
        lot_batch_number: "SL-77".to_string(),
        invoice_number: "INV-77".to_string(),
        invoice_date: date("2026-01-15"),
        received_quantity: dec!(200),
        invoice_quantity: None,
        coc_document_url: None,
        iqc_document_url: None,
    };

    app.state
        .services
        .lot_pool
        .add_lot(input.clone())
        .await
        .unwrap();
    let err = app
        .state
        .services
        .lot_pool
        .add_lot(input)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::DuplicateLot(_));
}

#[tokio::test]
async fn delete_lot_requires_zero_consumption() {
    let app = TestApp::new().await;
    let lot = app
        .seed_lot("Junction Box", "JB-01", date("2026-01-15"), dec!(100))
        .await;
    let pool = &app.state.services.lot_pool;

    pool.reserve(lot.id, dec!(1)).await.unwrap();
    let err = pool.delete_lot(lot.id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    pool.release(lot.id, dec!(1)).await.unwrap();
    pool.delete_lot(lot.id).await.unwrap();
    assert!(pool.get_lot(lot.id).await.unwrap().is_none());
}

fn feed_record(lot_batch: &str, qty: Decimal) -> CocFeedRecord {
    CocFeedRecord {
        id: Some(42),
        store_name: "Upstream Store".to_string(),
        material_name: "Glass".to_string(),
        brand: Some("ClearCo".to_string()),
        product_type: None,
        lot_batch_no: lot_batch.to_string(),
        coc_qty: qty,
        invoice_no: format!("INV-{}", lot_batch),
        invoice_qty: qty,
        invoice_date: date("2026-03-01"),
        coc_document_url: Some("https://docs.example/coc.pdf".to_string()),
        iqc_document_url: None,
    }
}

#[tokio::test]
async fn feed_upsert_is_idempotent() {
    let app = TestApp::new().await;
    let pool = &app.state.services.lot_pool;

    let records = vec![feed_record("GL-1", dec!(1000)), feed_record("GL-2", dec!(500))];
    let first = pool.upsert_feed_records(records.clone()).await.unwrap();
    assert_eq!(first.added, 2);
    assert_eq!(first.updated, 0);
    assert_eq!(first.errors, 0);

    // Re-running the same window adds nothing and touches nothing that
    // matters for accounting.
    let second = pool.upsert_feed_records(records).await.unwrap();
    assert_eq!(second.added, 0);
    assert_eq!(second.updated, 2);
    assert_eq!(second.errors, 0);

    let lots = pool.list_available("Glass").await.unwrap();
    assert_eq!(lots.len(), 2);
    let total: Decimal = lots.iter().map(|l| l.received_quantity).sum();
    assert_eq!(total, dec!(1500));
}

#[tokio::test]
async fn feed_upsert_keeps_received_quantity_immutable() {
    let app = TestApp::new().await;
    let pool = &app.state.services.lot_pool;

    pool.upsert_feed_records(vec![feed_record("GL-1", dec!(1000))])
        .await
        .unwrap();
    let lot_id = pool.list_available("Glass").await.unwrap()[0].id;
    pool.reserve(lot_id, dec!(400)).await.unwrap();

    // Upstream re-sends the record with a different quantity; the local
    // received figure must not move under recorded consumption.
    pool.upsert_feed_records(vec![feed_record("GL-1", dec!(10))])
        .await
        .unwrap();

    let lot = pool.get_lot(lot_id).await.unwrap().unwrap();
    assert_eq!(lot.received_quantity, dec!(1000));
    assert_eq!(lot.consumed_quantity, dec!(400));
}

#[tokio::test]
async fn feed_upsert_counts_bad_records_without_failing_batch() {
    let app = TestApp::new().await;
    let pool = &app.state.services.lot_pool;

    let outcome = pool
        .upsert_feed_records(vec![
            feed_record("GL-OK", dec!(100)),
            feed_record("GL-BAD", dec!(-5)),
        ])
        .await
        .unwrap();
    assert_eq!(outcome.added, 1);
    assert_eq!(outcome.errors, 1);
    assert_eq!(outcome.total, 2);
}

#[tokio::test]
async fn material_stock_pads_standard_materials() {
    let app = TestApp::new().await;
    app.seed_lot("Solar Cell", "SC-1", date("2026-01-01"), dec!(1000))
        .await;

    let stock = app
        .state
        .services
        .lot_pool
        .material_stock(None)
        .await
        .unwrap();

    let solar = stock.iter().find(|s| s.material == "Solar Cell").unwrap();
    assert_eq!(solar.available, dec!(1000));
    assert_eq!(solar.lot_count, 1);

    // Materials with no lots still appear, zeroed.
    let ribbon = stock.iter().find(|s| s.material == "Ribbon").unwrap();
    assert_eq!(ribbon.available, Decimal::ZERO);
    assert_eq!(ribbon.lot_count, 0);
}
