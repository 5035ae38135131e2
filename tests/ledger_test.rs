mod common;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use solarqc_api::entities::production_record;
use solarqc_api::errors::ServiceError;
use solarqc_api::services::ledger::ManualSelection;
use solarqc_api::services::production::{CreateRecordInput, UpdateRecordInput};

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

async fn seed_record(
    app: &TestApp,
    company_id: i32,
    day: i32,
    night: i32,
    lot_number: &str,
) -> production_record::Model {
    app.state
        .services
        .production
        .create_record(CreateRecordInput {
            company_id,
            date: date("2026-04-01"),
            lot_number: lot_number.to_string(),
            day_production: day,
            night_production: night,
            pdi: None,
            cell_rejection_percent: None,
            module_rejection_percent: None,
        })
        .await
        .expect("failed to seed record")
}

#[tokio::test]
async fn commit_draws_fifo_across_lots() {
    let app = TestApp::new().await;
    let company = app.seed_company("Acme Solar").await;
    app.seed_full_pool(date("2026-01-01")).await;

    // Replace the bulk Solar Cell lot with two dated lots: 40k then 30k.
    let bulk = app
        .state
        .services
        .lot_pool
        .list_available("Solar Cell")
        .await
        .unwrap();
    for lot in bulk {
        app.state
            .services
            .lot_pool
            .delete_lot(lot.id)
            .await
            .unwrap();
    }
    let older = app
        .seed_lot("Solar Cell", "SC-A", date("2026-01-05"), dec!(40000))
        .await;
    let newer = app
        .seed_lot("Solar Cell", "SC-B", date("2026-01-20"), dec!(30000))
        .await;

    let record = seed_record(&app, company.id, 600, 400, "PROD-1").await;
    app.state.services.ledger.commit(record.id).await.unwrap();

    let allocations = app
        .state
        .services
        .ledger
        .allocations(record.id)
        .await
        .unwrap();
    let solar: Vec<_> = allocations
        .iter()
        .filter(|a| a.material_name == "Solar Cell")
        .collect();
    assert_eq!(solar.len(), 2);
    assert_eq!(solar[0].lot_id, older.id);
    assert_eq!(solar[0].quantity, dec!(40000));
    assert_eq!(solar[1].lot_id, newer.id);
    assert_eq!(solar[1].quantity, dec!(26000));

    let updated = app
        .state
        .services
        .production
        .get_record(record.id)
        .await
        .unwrap();
    assert_eq!(updated.allocation_status, "fully_allocated");

    let newer_now = app
        .state
        .services
        .lot_pool
        .get_lot(newer.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(newer_now.available_quantity(), dec!(4000));
}

#[tokio::test]
async fn commit_with_shortage_marks_partial_and_drains_pool() {
    let app = TestApp::new().await;
    let company = app.seed_company("Acme Solar").await;
    app.seed_full_pool(date("2026-01-01")).await;

    let bulk = app
        .state
        .services
        .lot_pool
        .list_available("Solar Cell")
        .await
        .unwrap();
    for lot in bulk {
        app.state
            .services
            .lot_pool
            .delete_lot(lot.id)
            .await
            .unwrap();
    }
    let short = app
        .seed_lot("Solar Cell", "SC-SHORT", date("2026-01-05"), dec!(20000))
        .await;

    let record = seed_record(&app, company.id, 1000, 0, "PROD-2").await;
    app.state.services.ledger.commit(record.id).await.unwrap();

    let updated = app
        .state
        .services
        .production
        .get_record(record.id)
        .await
        .unwrap();
    assert_eq!(updated.allocation_status, "partially_allocated");

    let lot = app
        .state
        .services
        .lot_pool
        .get_lot(short.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lot.available_quantity(), Decimal::ZERO);
}

#[tokio::test]
async fn amend_after_update_releases_old_draws_exactly() {
    let app = TestApp::new().await;
    let company = app.seed_company("Acme Solar").await;
    app.seed_full_pool(date("2026-01-01")).await;

    let record = seed_record(&app, company.id, 100, 0, "PROD-3").await;
    let ledger = &app.state.services.ledger;
    ledger.commit(record.id).await.unwrap();

    let ribbon_before: Decimal = app
        .state
        .services
        .lot_pool
        .list_available("Ribbon")
        .await
        .unwrap()
        .iter()
        .map(|l| l.consumed_quantity)
        .sum();

    // Double the production and recommit, then restore and recommit
    // again: consumption must land back exactly where it started.
    app.state
        .services
        .production
        .update_record(
            record.id,
            UpdateRecordInput {
                day_production: Some(200),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    ledger.commit(record.id).await.unwrap();

    app.state
        .services
        .production
        .update_record(
            record.id,
            UpdateRecordInput {
                day_production: Some(100),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    ledger.commit(record.id).await.unwrap();

    let ribbon_after: Decimal = app
        .state
        .services
        .lot_pool
        .list_available("Ribbon")
        .await
        .unwrap()
        .iter()
        .map(|l| l.consumed_quantity)
        .sum();
    assert_eq!(ribbon_before, ribbon_after);
}

#[tokio::test]
async fn remove_restores_every_lot() {
    let app = TestApp::new().await;
    let company = app.seed_company("Acme Solar").await;
    app.seed_full_pool(date("2026-01-01")).await;

    let record = seed_record(&app, company.id, 250, 250, "PROD-4").await;
    app.state.services.ledger.commit(record.id).await.unwrap();

    let removed = app.state.services.ledger.remove(record.id).await.unwrap();
    assert!(removed > 0);

    let stock = app
        .state
        .services
        .lot_pool
        .material_stock(None)
        .await
        .unwrap();
    for entry in stock {
        assert_eq!(
            entry.total_consumed,
            Decimal::ZERO,
            "material {} still has consumption",
            entry.material
        );
    }

    let updated = app
        .state
        .services
        .production
        .get_record(record.id)
        .await
        .unwrap();
    assert_eq!(updated.allocation_status, "unallocated");
    assert!(app
        .state
        .services
        .ledger
        .allocations(record.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn closed_record_freezes_ledger_and_edits() {
    let app = TestApp::new().await;
    let company = app.seed_company("Acme Solar").await;
    app.seed_full_pool(date("2026-01-01")).await;

    let record = seed_record(&app, company.id, 100, 0, "PROD-5").await;
    app.state.services.ledger.commit(record.id).await.unwrap();
    app.state
        .services
        .production
        .close_record(record.id)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .ledger
        .commit(record.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::RecordClosed(_));

    let err = app
        .state
        .services
        .ledger
        .remove(record.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::RecordClosed(_));

    let err = app
        .state
        .services
        .production
        .update_record(
            record.id,
            UpdateRecordInput {
                day_production: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::RecordClosed(_));

    // Reopening unfreezes.
    app.state
        .services
        .production
        .reopen_record(record.id)
        .await
        .unwrap();
    app.state.services.ledger.commit(record.id).await.unwrap();
}

#[tokio::test]
async fn delete_record_returns_material_to_pool() {
    let app = TestApp::new().await;
    let company = app.seed_company("Acme Solar").await;
    app.seed_full_pool(date("2026-01-01")).await;

    let record = seed_record(&app, company.id, 100, 0, "PROD-6").await;
    app.state.services.ledger.commit(record.id).await.unwrap();

    app.state
        .services
        .production
        .delete_record(record.id)
        .await
        .unwrap();

    let stock = app
        .state
        .services
        .lot_pool
        .material_stock(None)
        .await
        .unwrap();
    for entry in stock {
        assert_eq!(entry.total_consumed, Decimal::ZERO);
    }
    let err = app
        .state
        .services
        .production
        .get_record(record.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn manual_commit_requires_single_covering_lot() {
    let app = TestApp::new().await;
    let company = app.seed_company("Acme Solar").await;
    app.seed_full_pool(date("2026-01-01")).await;

    // Two small Solar Cell lots that only cover the need together.
    let bulk = app
        .state
        .services
        .lot_pool
        .list_available("Solar Cell")
        .await
        .unwrap();
    for lot in bulk {
        app.state
            .services
            .lot_pool
            .delete_lot(lot.id)
            .await
            .unwrap();
    }
    let small = app
        .seed_lot("Solar Cell", "SC-SMALL", date("2026-01-05"), dec!(5000))
        .await;
    app.seed_lot("Solar Cell", "SC-SMALL2", date("2026-01-06"), dec!(5000))
        .await;

    // 100 modules need 6600 cells; no single lot covers that.
    let record = seed_record(&app, company.id, 100, 0, "PROD-7").await;
    let err = app
        .state
        .services
        .ledger
        .commit_manual(
            record.id,
            vec![ManualSelection {
                material: "Solar Cell".to_string(),
                lot_id: small.id,
            }],
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientQuantity(_));

    // The failed transaction must not leave partial consumption behind.
    let lot = app
        .state
        .services
        .lot_pool
        .get_lot(small.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lot.consumed_quantity, Decimal::ZERO);
    assert!(app
        .state
        .services
        .ledger
        .allocations(record.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn manual_commit_rolls_back_earlier_reserves_on_shortfall() {
    let app = TestApp::new().await;
    let company = app.seed_company("Acme Solar").await;

    // Solar Cell is covered; Ribbon falls short of the pooled requirement.
    let cells = app
        .seed_lot("Solar Cell", "SC-FULL", date("2026-01-05"), dec!(10000))
        .await;
    let ribbon = app
        .seed_lot("Ribbon", "RB-SHORT", date("2026-01-05"), dec!(10))
        .await;

    let record = seed_record(&app, company.id, 100, 0, "PROD-9").await;
    let err = app
        .state
        .services
        .ledger
        .commit_manual(
            record.id,
            vec![
                ManualSelection {
                    material: "Solar Cell".to_string(),
                    lot_id: cells.id,
                },
                ManualSelection {
                    material: "Ribbon".to_string(),
                    lot_id: ribbon.id,
                },
            ],
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientQuantity(_));

    // The Solar Cell reserve that succeeded mid-transaction is undone too.
    for id in [cells.id, ribbon.id] {
        let lot = app
            .state
            .services
            .lot_pool
            .get_lot(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lot.consumed_quantity, Decimal::ZERO);
    }
    assert!(app
        .state
        .services
        .ledger
        .allocations(record.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn manual_commit_with_covering_lot_succeeds() {
    let app = TestApp::new().await;
    let company = app.seed_company_with_cells("Compact Modules", 60).await;
    app.seed_full_pool(date("2026-01-01")).await;

    let big = app
        .seed_lot("Solar Cell", "SC-BIG", date("2026-02-01"), dec!(100000))
        .await;

    let record = seed_record(&app, company.id, 100, 0, "PROD-8").await;
    let allocations = app
        .state
        .services
        .ledger
        .commit_manual(
            record.id,
            vec![ManualSelection {
                material: "Solar Cell".to_string(),
                lot_id: big.id,
            }],
        )
        .await
        .unwrap();

    // 100 modules at the company's 60 cells each.
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].lot_id, big.id);
    assert_eq!(allocations[0].quantity, dec!(6000));

    let updated = app
        .state
        .services
        .production
        .get_record(record.id)
        .await
        .unwrap();
    assert_eq!(updated.allocation_status, "partially_allocated");
}
