use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is
    /// closed. Event delivery is best-effort and never blocks a commit.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Domain events emitted after state changes commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Company / production record lifecycle
    CompanyCreated(i32),
    CompanyUpdated(i32),
    CompanyDeleted(i32),
    ProductionRecordCreated {
        record_id: i32,
        company_id: i32,
        date: NaiveDate,
        lot_number: String,
    },
    ProductionRecordUpdated(i32),
    ProductionRecordDeleted(i32),
    ProductionRecordClosed(i32),
    ProductionRecordReopened(i32),

    // Lot pool events
    LotAdded {
        lot_id: i64,
        material_type: String,
        received_quantity: Decimal,
    },
    LotDeleted(i64),
    LotsSynced {
        added: u64,
        updated: u64,
        errors: u64,
    },

    // Consumption ledger events
    AllocationCommitted {
        record_id: i32,
        materials: usize,
        fully_allocated: bool,
    },
    AllocationAmended {
        record_id: i32,
    },
    AllocationReleased {
        record_id: i32,
    },
    InsufficientMaterialWarning {
        material_type: String,
        required: Decimal,
        available: Decimal,
    },
}

/// Drains the event channel, logging each event. Runs for the lifetime of
/// the server as a background task.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::AllocationCommitted {
                record_id,
                materials,
                fully_allocated,
            } => {
                info!(
                    record_id,
                    materials, fully_allocated, "Allocation committed"
                );
            }
            Event::InsufficientMaterialWarning {
                material_type,
                required,
                available,
            } => {
                warn!(
                    %material_type,
                    %required,
                    %available,
                    "Insufficient material for production"
                );
            }
            Event::LotsSynced {
                added,
                updated,
                errors,
            } => {
                if *errors > 0 {
                    error!(added, updated, errors, "COC sync finished with errors");
                } else {
                    info!(added, updated, "COC sync finished");
                }
            }
            other => {
                info!("Event: {:?}", other);
            }
        }
    }

    info!("Event channel closed; processor exiting");
}
