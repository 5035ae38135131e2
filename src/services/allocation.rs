//! Allocation Engine
//!
//! Turns a production quantity into per-material lot draws. Planning is a
//! pure function over a FIFO-ordered lot snapshot; the ledger replays the
//! plan inside a transaction where the reserve guards re-check every lot.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;

use crate::entities::coc_lot;
use crate::entities::company::{self, Entity as CompanyEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::lot_pool::available_lots_on;
use crate::services::requirements::{compute_requirements, group_by_coc_material};

/// One draw against a lot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotDraw {
    pub lot_id: i64,
    pub lot_batch_number: String,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub quantity: Decimal,
}

/// Availability check for one material pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialCheck {
    pub material: String,
    pub required: Decimal,
    pub available: Decimal,
    pub sufficient: bool,
    /// Pool quantity left once this requirement is drawn; zero when short.
    pub remaining_after: Decimal,
    pub shortage: Decimal,
    pub coc_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    NoCoc,
    Insufficient,
}

/// Warning surfaced to the dashboard when a material cannot be covered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationWarning {
    #[serde(rename = "type")]
    pub code: WarningCode,
    pub material: String,
    pub message: String,
    pub required: Decimal,
    pub available: Decimal,
    pub shortage: Decimal,
}

/// Outcome of a validation dry run. Nothing is reserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationResult {
    pub valid: bool,
    pub production_quantity: i64,
    pub warnings: Vec<AllocationWarning>,
    pub materials: Vec<MaterialCheck>,
}

/// FIFO draws for one material pool.
#[derive(Debug, Clone)]
pub struct MaterialPlan {
    pub material: String,
    pub required: Decimal,
    pub draws: Vec<LotDraw>,
    pub check: MaterialCheck,
}

/// Full allocation plan for a production record.
#[derive(Debug, Clone)]
pub struct AllocationPlan {
    pub production_quantity: i64,
    pub materials: Vec<MaterialPlan>,
    pub fully_planned: bool,
}

/// Draws `required` from `lots` oldest-first. Lots are expected in FIFO
/// order (invoice date, then id); each draw takes the lesser of the lot's
/// available quantity and what remains.
pub fn plan_fifo(required: Decimal, lots: &[coc_lot::Model]) -> (Vec<LotDraw>, Decimal) {
    let mut remaining = required;
    let mut draws = Vec::new();

    for lot in lots {
        if remaining <= Decimal::ZERO {
            break;
        }
        let available = lot.available_quantity();
        if available <= Decimal::ZERO {
            continue;
        }
        let quantity = available.min(remaining);
        draws.push(LotDraw {
            lot_id: lot.id,
            lot_batch_number: lot.lot_batch_number.clone(),
            invoice_number: lot.invoice_number.clone(),
            invoice_date: lot.invoice_date,
            quantity,
        });
        remaining -= quantity;
    }

    (draws, remaining)
}

/// Per-pool requirements for a production quantity. Solar Cell scales by
/// the company's cell count when it differs from the standard module.
pub fn pooled_requirements(
    production_quantity: i64,
    cells_per_module: Option<i32>,
) -> Result<BTreeMap<String, Decimal>, ServiceError> {
    let lines = compute_requirements(production_quantity)?;
    let mut pooled = group_by_coc_material(&lines);

    if let Some(cells) = cells_per_module {
        if cells <= 0 {
            return Err(ServiceError::InvalidInput(format!(
                "cells per module must be positive, got {}",
                cells
            )));
        }
        pooled.insert(
            "Solar Cell".to_string(),
            Decimal::from(production_quantity) * Decimal::from(cells),
        );
    }

    Ok(pooled)
}

/// Builds a FIFO plan against the current pool, on the caller's
/// connection. Used both for the dry run and, inside a transaction, for
/// the ledger commit.
pub(crate) async fn build_plan_on<C: ConnectionTrait>(
    conn: &C,
    production_quantity: i64,
    cells_per_module: Option<i32>,
) -> Result<AllocationPlan, ServiceError> {
    let pooled = pooled_requirements(production_quantity, cells_per_module)?;

    let mut materials = Vec::with_capacity(pooled.len());
    let mut fully_planned = true;

    for (material, required) in pooled {
        let lots = available_lots_on(conn, &material).await?;
        let available: Decimal = lots.iter().map(|l| l.available_quantity()).sum();
        let (draws, remaining) = plan_fifo(required, &lots);
        let sufficient = remaining <= Decimal::ZERO;
        if !sufficient {
            fully_planned = false;
        }
        materials.push(MaterialPlan {
            check: MaterialCheck {
                material: material.clone(),
                required,
                available,
                sufficient,
                remaining_after: if sufficient {
                    available - required
                } else {
                    Decimal::ZERO
                },
                shortage: if sufficient { Decimal::ZERO } else { remaining },
                coc_count: lots.len(),
            },
            material,
            required,
            draws,
        });
    }

    Ok(AllocationPlan {
        production_quantity,
        materials,
        fully_planned,
    })
}

impl AllocationPlan {
    /// Collapses the plan into the dry-run shape served to the dashboard.
    pub fn into_result(self) -> AllocationResult {
        let warnings: Vec<AllocationWarning> = self
            .materials
            .iter()
            .filter(|m| !m.check.sufficient)
            .map(|m| {
                let (code, message) = if m.check.coc_count == 0 {
                    (
                        WarningCode::NoCoc,
                        format!("No COC available for {}. Please add COC first!", m.material),
                    )
                } else {
                    (
                        WarningCode::Insufficient,
                        format!(
                            "Insufficient {}: Need {}, Only {} available (Shortage: {})",
                            m.material, m.check.required, m.check.available, m.check.shortage
                        ),
                    )
                };
                AllocationWarning {
                    code,
                    material: m.material.clone(),
                    message,
                    required: m.check.required,
                    available: m.check.available,
                    shortage: m.check.shortage,
                }
            })
            .collect();

        AllocationResult {
            valid: warnings.is_empty(),
            production_quantity: self.production_quantity,
            warnings,
            materials: self.materials.into_iter().map(|m| m.check).collect(),
        }
    }
}

/// Read-only validation against the live pool.
#[derive(Clone)]
pub struct AllocationService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl AllocationService {
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    fn connection(&self) -> &DatabaseConnection {
        self.db_pool.as_ref()
    }

    async fn cells_per_module(&self, company_id: i32) -> Result<Option<i32>, ServiceError> {
        let company: Option<company::Model> = CompanyEntity::find_by_id(company_id)
            .one(self.connection())
            .await
            .map_err(ServiceError::db_error)?;
        match company {
            Some(c) => Ok(Some(c.cells_per_module)),
            None => Err(ServiceError::NotFound(format!(
                "Company {} not found",
                company_id
            ))),
        }
    }

    /// Dry-run check for a proposed day's production. Reserves nothing;
    /// emits a warning event per uncovered material.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        company_id: i32,
        day_production: i32,
        night_production: i32,
    ) -> Result<AllocationResult, ServiceError> {
        if day_production < 0 || night_production < 0 {
            return Err(ServiceError::InvalidInput(
                "production counts must be non-negative".to_string(),
            ));
        }

        let cells = self.cells_per_module(company_id).await?;
        let quantity = i64::from(day_production) + i64::from(night_production);
        let plan = build_plan_on(self.connection(), quantity, cells).await?;
        let result = plan.into_result();

        for warning in &result.warnings {
            self.event_sender
                .send_or_log(Event::InsufficientMaterialWarning {
                    material_type: warning.material.clone(),
                    required: warning.required,
                    available: warning.available,
                })
                .await;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn lot(id: i64, invoice_date: &str, received: Decimal, consumed: Decimal) -> coc_lot::Model {
        coc_lot::Model {
            id,
            external_id: None,
            company_name: "Acme Solar".to_string(),
            material_type: "Solar Cell".to_string(),
            brand: None,
            product_type: None,
            lot_batch_number: format!("LOT-{}", id),
            invoice_number: format!("INV-{}", id),
            invoice_date: invoice_date.parse().unwrap(),
            received_quantity: received,
            invoice_quantity: received,
            consumed_quantity: consumed,
            coc_document_url: None,
            iqc_document_url: None,
            is_active: true,
            created_at: Utc::now(),
            last_synced_at: None,
        }
    }

    #[test]
    fn fifo_spans_lots_oldest_first() {
        // 1000 modules at 66 cells each against a 40k lot and a 30k lot.
        let lots = vec![
            lot(1, "2026-01-05", dec!(40000), dec!(0)),
            lot(2, "2026-01-20", dec!(30000), dec!(0)),
        ];
        let (draws, remaining) = plan_fifo(dec!(66000), &lots);

        assert_eq!(remaining, Decimal::ZERO);
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].lot_id, 1);
        assert_eq!(draws[0].quantity, dec!(40000));
        assert_eq!(draws[1].lot_id, 2);
        assert_eq!(draws[1].quantity, dec!(26000));
    }

    #[test]
    fn fifo_reports_shortage() {
        let lots = vec![lot(1, "2026-01-05", dec!(20000), dec!(0))];
        let (draws, remaining) = plan_fifo(dec!(66000), &lots);

        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].quantity, dec!(20000));
        assert_eq!(remaining, dec!(46000));
    }

    #[test]
    fn fifo_breaks_date_ties_by_id() {
        let lots = vec![
            lot(3, "2026-01-05", dec!(100), dec!(0)),
            lot(7, "2026-01-05", dec!(100), dec!(0)),
        ];
        let (draws, _) = plan_fifo(dec!(150), &lots);
        assert_eq!(draws[0].lot_id, 3);
        assert_eq!(draws[1].lot_id, 7);
    }

    #[test]
    fn fifo_skips_exhausted_lots() {
        let lots = vec![
            lot(1, "2026-01-05", dec!(500), dec!(500)),
            lot(2, "2026-01-06", dec!(500), dec!(200)),
        ];
        let (draws, remaining) = plan_fifo(dec!(100), &lots);
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].lot_id, 2);
        assert_eq!(draws[0].quantity, dec!(100));
        assert_eq!(remaining, Decimal::ZERO);
    }

    #[test]
    fn pooled_requirements_scale_solar_cells_by_company() {
        let pooled = pooled_requirements(100, Some(72)).unwrap();
        assert_eq!(pooled["Solar Cell"], dec!(7200));
        // Other pools keep the standard per-module quantities.
        assert_eq!(pooled["Glass"], dec!(200));
    }

    #[test]
    fn pooled_requirements_default_cell_count() {
        let pooled = pooled_requirements(100, None).unwrap();
        assert_eq!(pooled["Solar Cell"], dec!(6600));
    }
}
