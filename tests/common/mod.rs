use std::sync::Arc;

use axum::Router;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tempfile::TempDir;
use tokio::sync::mpsc;

use solarqc_api::{
    config::AppConfig,
    db,
    entities::{coc_lot, company},
    events::{self, EventSender},
    handlers::AppServices,
    services::production::CreateCompanyInput,
    AppState,
};

/// Helper harness spinning up an application state backed by a fresh
/// file-based SQLite database.
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_dir = TempDir::new().expect("failed to create temp dir");
        let db_file = db_dir.path().join("solarqc_test.db");

        let cfg = AppConfig {
            database_url: format!("sqlite://{}?mode=rwc", db_file.display()),
            host: "127.0.0.1".to_string(),
            port: 18_080,
            environment: "test".to_string(),
            log_level: "warn".to_string(),
            log_json: false,
            auto_migrate: true,
            coc_feed_url: None,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: 1,
            db_min_connections: 1,
            db_connect_timeout_secs: 5,
            db_idle_timeout_secs: 60,
        };

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), Arc::new(event_sender.clone()), None);
        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", solarqc_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            state,
            router,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    /// Seed a company with the standard 66-cell module layout.
    pub async fn seed_company(&self, name: &str) -> company::Model {
        self.seed_company_with_cells(name, 66).await
    }

    pub async fn seed_company_with_cells(&self, name: &str, cells: i32) -> company::Model {
        self.state
            .services
            .production
            .create_company(CreateCompanyInput {
                company_name: name.to_string(),
                module_wattage: 550,
                module_type: "Mono PERC".to_string(),
                cells_per_module: cells,
                cells_received_qty: None,
                cells_received_mw: None,
            })
            .await
            .expect("failed to seed company")
    }

    /// Seed a lot directly, bypassing the service-level duplicate check.
    pub async fn seed_lot(
        &self,
        material: &str,
        lot_batch: &str,
        invoice_date: NaiveDate,
        received: Decimal,
    ) -> coc_lot::Model {
        let model = coc_lot::ActiveModel {
            id: Default::default(),
            external_id: Set(None),
            company_name: Set("Upstream Store".to_string()),
            material_type: Set(material.to_string()),
            brand: Set(Some("TestBrand".to_string())),
            product_type: Set(None),
            lot_batch_number: Set(lot_batch.to_string()),
            invoice_number: Set(format!("INV-{}", lot_batch)),
            invoice_date: Set(invoice_date),
            received_quantity: Set(received),
            invoice_quantity: Set(received),
            consumed_quantity: Set(Decimal::ZERO),
            coc_document_url: Set(None),
            iqc_document_url: Set(None),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            last_synced_at: Set(None),
        };
        model
            .insert(self.state.db.as_ref())
            .await
            .expect("failed to seed lot")
    }

    /// Seed one generously sized lot for every standard material pool, so
    /// allocations never run short unless a test arranges it.
    pub async fn seed_full_pool(&self, invoice_date: NaiveDate) {
        for &material in solarqc_api::services::requirements::STANDARD_MATERIAL_TYPES {
            self.seed_lot(
                material,
                &format!("BULK-{}", material.replace(' ', "-")),
                invoice_date,
                Decimal::from(1_000_000),
            )
            .await;
        }
    }
}
