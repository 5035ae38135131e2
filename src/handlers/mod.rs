pub mod common;
pub mod companies;
pub mod lots;
pub mod production;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::events::EventSender;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub lot_pool: Arc<crate::services::lot_pool::LotPoolService>,
    pub allocation: Arc<crate::services::allocation::AllocationService>,
    pub ledger: Arc<crate::services::ledger::ConsumptionLedgerService>,
    pub production: Arc<crate::services::production::ProductionService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        coc_feed_url: Option<String>,
    ) -> Self {
        Self {
            lot_pool: Arc::new(crate::services::lot_pool::LotPoolService::new(
                db_pool.clone(),
                event_sender.clone(),
                coc_feed_url,
            )),
            allocation: Arc::new(crate::services::allocation::AllocationService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            ledger: Arc::new(crate::services::ledger::ConsumptionLedgerService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            production: Arc::new(crate::services::production::ProductionService::new(
                db_pool,
                event_sender,
            )),
        }
    }
}
