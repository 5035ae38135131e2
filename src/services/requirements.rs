//! Requirement Calculator
//!
//! Pure derivation of per-material quantities from a production quantity,
//! driven by the compiled-in bill of materials for one solar module.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// Unit of measure used by material requirements and COC lots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Unit {
    Pcs,
    Kg,
    Sqm,
    Ltr,
    Sets,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Pcs => "PCS",
            Unit::Kg => "KG",
            Unit::Sqm => "SQM",
            Unit::Ltr => "LTR",
            Unit::Sets => "SETS",
        }
    }
}

/// Static reference data: what one module consumes of a named material,
/// and which COC material pool that requirement draws from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialRequirement {
    pub material_name: &'static str,
    pub quantity_per_unit: Decimal,
    pub unit: Unit,
    /// Grouping key into the lot pool. Several named materials may draw
    /// from one pool (both busbars consume Ribbon stock).
    pub coc_material_type: &'static str,
    pub description: &'static str,
}

/// Bill of materials for one module, in display order.
pub static MATERIAL_REQUIREMENTS: Lazy<Vec<MaterialRequirement>> = Lazy::new(|| {
    vec![
        MaterialRequirement {
            material_name: "Solar Cell",
            quantity_per_unit: dec!(66),
            unit: Unit::Pcs,
            coc_material_type: "Solar Cell",
            description: "25.3-25.8",
        },
        MaterialRequirement {
            material_name: "Front Glass",
            quantity_per_unit: dec!(1),
            unit: Unit::Pcs,
            coc_material_type: "Glass",
            description: "2376",
        },
        MaterialRequirement {
            material_name: "Back Glass",
            quantity_per_unit: dec!(1),
            unit: Unit::Pcs,
            coc_material_type: "Glass",
            description: "2376 with 3 hole",
        },
        MaterialRequirement {
            material_name: "Ribbon",
            quantity_per_unit: dec!(0.212),
            unit: Unit::Kg,
            coc_material_type: "Ribbon",
            description: "0.26mm",
        },
        MaterialRequirement {
            material_name: "Flux",
            quantity_per_unit: dec!(0.02),
            unit: Unit::Ltr,
            coc_material_type: "Flux",
            description: "",
        },
        MaterialRequirement {
            material_name: "Busbar 4mm",
            quantity_per_unit: dec!(0.038),
            unit: Unit::Kg,
            coc_material_type: "Ribbon",
            description: "4.0X0.4 mm",
        },
        MaterialRequirement {
            material_name: "Busbar 6mm",
            quantity_per_unit: dec!(0.018),
            unit: Unit::Kg,
            coc_material_type: "Ribbon",
            description: "6.0X0.4 mm",
        },
        MaterialRequirement {
            material_name: "EPE Front",
            quantity_per_unit: dec!(5.2),
            unit: Unit::Sqm,
            coc_material_type: "EPE",
            description: "Front",
        },
        MaterialRequirement {
            material_name: "Aluminium Frame",
            quantity_per_unit: dec!(1),
            unit: Unit::Sets,
            coc_material_type: "Aluminium Frame",
            description: "2382*1134",
        },
        MaterialRequirement {
            material_name: "Sealant",
            quantity_per_unit: dec!(0.35),
            unit: Unit::Kg,
            coc_material_type: "Sealant",
            description: "270KG",
        },
        MaterialRequirement {
            material_name: "JB Potting",
            quantity_per_unit: dec!(0.021),
            unit: Unit::Kg,
            coc_material_type: "Potting Material",
            description: "A and B",
        },
        MaterialRequirement {
            material_name: "Junction Box",
            quantity_per_unit: dec!(1),
            unit: Unit::Sets,
            coc_material_type: "Junction Box",
            description: "1200mm",
        },
    ]
});

/// Material pools the stock dashboard always lists, even at zero.
pub const STANDARD_MATERIAL_TYPES: &[&str] = &[
    "Solar Cell",
    "Glass",
    "Ribbon",
    "Flux",
    "EPE",
    "Aluminium Frame",
    "Sealant",
    "Potting Material",
    "Junction Box",
];

/// One computed requirement line for a given production quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementLine {
    pub material_name: String,
    pub coc_material_type: String,
    pub unit: Unit,
    pub quantity_per_unit: Decimal,
    /// `quantity_per_unit * production_quantity`, at 3-decimal precision.
    pub required_quantity: Decimal,
}

/// Computes per-material required quantities for `production_quantity`
/// modules. Deterministic and side-effect free; quantities are fixed-point
/// decimals rescaled to 3 places so repeated runs cannot drift.
pub fn compute_requirements(
    production_quantity: i64,
) -> Result<BTreeMap<String, RequirementLine>, ServiceError> {
    if production_quantity < 0 {
        return Err(ServiceError::InvalidInput(format!(
            "production quantity must be non-negative, got {}",
            production_quantity
        )));
    }

    let qty = Decimal::from(production_quantity);
    let mut lines = BTreeMap::new();
    for req in MATERIAL_REQUIREMENTS.iter() {
        let required = (req.quantity_per_unit * qty).round_dp(3);
        lines.insert(
            req.material_name.to_string(),
            RequirementLine {
                material_name: req.material_name.to_string(),
                coc_material_type: req.coc_material_type.to_string(),
                unit: req.unit,
                quantity_per_unit: req.quantity_per_unit,
                required_quantity: required,
            },
        );
    }
    Ok(lines)
}

/// Sums computed requirement lines per COC material pool. Allocation and
/// validation work against pools, not named materials.
pub fn group_by_coc_material(
    lines: &BTreeMap<String, RequirementLine>,
) -> BTreeMap<String, Decimal> {
    let mut grouped: BTreeMap<String, Decimal> = BTreeMap::new();
    for line in lines.values() {
        *grouped
            .entry(line.coc_material_type.clone())
            .or_insert(Decimal::ZERO) += line.required_quantity;
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_unique_material_names() {
        let mut names: Vec<_> = MATERIAL_REQUIREMENTS
            .iter()
            .map(|r| r.material_name)
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), MATERIAL_REQUIREMENTS.len());
    }

    #[test]
    fn solar_cell_requirement_for_thousand_modules() {
        let lines = compute_requirements(1000).unwrap();
        assert_eq!(
            lines["Solar Cell"].required_quantity,
            dec!(66000).round_dp(3)
        );
        assert_eq!(lines["Ribbon"].required_quantity, dec!(212.000));
    }

    #[test]
    fn zero_production_yields_zero_requirements() {
        let lines = compute_requirements(0).unwrap();
        assert!(lines.values().all(|l| l.required_quantity.is_zero()));
    }

    #[test]
    fn negative_production_is_rejected() {
        assert!(matches!(
            compute_requirements(-1),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn requirements_are_linear() {
        let once = compute_requirements(37).unwrap();
        let twice = compute_requirements(74).unwrap();
        for (name, line) in &once {
            assert_eq!(
                twice[name].required_quantity,
                line.required_quantity * dec!(2)
            );
        }
    }

    #[test]
    fn busbars_pool_into_ribbon() {
        let lines = compute_requirements(100).unwrap();
        let grouped = group_by_coc_material(&lines);
        // Ribbon pool = Ribbon + Busbar 4mm + Busbar 6mm
        assert_eq!(grouped["Ribbon"], dec!(21.200) + dec!(3.800) + dec!(1.800));
        // Glass pool = front + back
        assert_eq!(grouped["Glass"], dec!(200));
    }

    #[test]
    fn standard_material_list_covers_every_pool() {
        let lines = compute_requirements(1).unwrap();
        for pool in group_by_coc_material(&lines).keys() {
            assert!(
                STANDARD_MATERIAL_TYPES.contains(&pool.as_str()),
                "pool {} missing from the standard material list",
                pool
            );
        }
    }
}
