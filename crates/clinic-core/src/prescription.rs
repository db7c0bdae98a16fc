//! # Prescription Stock Planning
//!
//! Turns prescription lines into stock adjustments.
//!
//! ## Deduction Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Prescription → Stock Deduction                          │
//! │                                                                         │
//! │  line: 2 × Twice daily × 5 days                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  total_units = dosage_count × daily_multiplier × duration_days         │
//! │              = 2 × 2 × 5 = 20                                          │
//! │       │                                                                 │
//! │       ├── 0? ──► skipped (no deduction, no error)                      │
//! │       ▼                                                                 │
//! │  PlannedAdjustment { medicine_id, delta: -20 }                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ledger::apply_delta per line, independently                           │
//! │       ├── Ok  ──► report.applied                                       │
//! │       └── Err ──► report.failures (other lines still run)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Editing a saved prescription uses [`plan_revision`], which nets the new
//! lines against what the prescription actually deducted so far
//! ([`DeductedUnits`]), so stock is neither taken twice nor returned when
//! it was never taken.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::dosage::{build_pattern, daily_multiplier};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::ledger::{apply_delta, StockMovement};
use crate::types::{DeductedUnits, InventoryRecord, PrescriptionLine};

// =============================================================================
// Planning
// =============================================================================

/// Units consumed over the whole course of a line.
///
/// ## Returns
/// * `Err(Validation(OutOfRange))` - the product does not fit in an `i64`
pub fn total_units(line: &PrescriptionLine) -> CoreResult<i64> {
    i64::from(line.dosage_count)
        .checked_mul(i64::from(daily_multiplier(&line.frequency)))
        .and_then(|units| units.checked_mul(i64::from(line.duration_days)))
        .ok_or_else(|| {
            ValidationError::OutOfRange {
                field: format!("total units of {}", line.name),
                min: 0,
                max: i64::MAX,
            }
            .into()
        })
}

/// Recomputes the display pattern of every line.
pub fn refresh_patterns(lines: &mut [PrescriptionLine]) {
    for line in lines.iter_mut() {
        line.pattern = build_pattern(line.dosage_count, &line.frequency);
    }
}

/// A stock change the applier should attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlannedAdjustment {
    /// Index of the originating line (`None` for netted revisions).
    pub line_index: Option<usize>,
    pub medicine_id: String,
    pub name: String,
    /// Negative deducts, positive returns stock.
    pub delta: i64,
}

/// Adjustments to attempt plus the lines that need none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeductionPlan {
    pub adjustments: Vec<PlannedAdjustment>,
    pub skipped_lines: Vec<usize>,
}

/// One deduction per line with a non-zero total.
pub fn plan_deductions(lines: &[PrescriptionLine]) -> CoreResult<DeductionPlan> {
    let mut plan = DeductionPlan::default();

    for (index, line) in lines.iter().enumerate() {
        let units = total_units(line)?;
        if units == 0 {
            plan.skipped_lines.push(index);
            continue;
        }
        plan.adjustments.push(PlannedAdjustment {
            line_index: Some(index),
            medicine_id: line.medicine_id.clone(),
            name: line.name.clone(),
            delta: -units,
        });
    }

    Ok(plan)
}

/// Net per-medicine change when a prescription holding `deducted` is
/// rewritten with `new` lines.
///
/// Medicines keep the order they first appear in (new lines first).
/// Medicines whose totals already match what was deducted produce no
/// adjustment.
pub fn plan_revision(deducted: &[DeductedUnits], new: &[PrescriptionLine]) -> CoreResult<DeductionPlan> {
    let mut net: Vec<PlannedAdjustment> = Vec::new();

    let mut add = |medicine_id: &str, name: &str, delta: i64| {
        match net.iter_mut().find(|a| a.medicine_id == medicine_id) {
            Some(existing) => existing.delta += delta,
            None => net.push(PlannedAdjustment {
                line_index: None,
                medicine_id: medicine_id.to_string(),
                name: name.to_string(),
                delta,
            }),
        }
    };

    for line in new {
        add(&line.medicine_id, &line.name, -total_units(line)?);
    }
    for held in deducted {
        add(&held.medicine_id, &held.name, held.units);
    }

    Ok(DeductionPlan {
        adjustments: net.into_iter().filter(|a| a.delta != 0).collect(),
        skipped_lines: Vec::new(),
    })
}

/// What a prescription holds after `report` was applied on top of
/// `previous`. Failed adjustments leave their medicine's entry untouched.
pub fn settle_deductions(
    previous: &[DeductedUnits],
    report: &PrescriptionStockReport,
) -> Vec<DeductedUnits> {
    let mut held = previous.to_vec();

    for applied in &report.applied {
        match held.iter_mut().find(|d| d.medicine_id == applied.medicine_id) {
            Some(entry) => entry.units -= applied.movement.change,
            None => held.push(DeductedUnits {
                medicine_id: applied.medicine_id.clone(),
                name: applied.name.clone(),
                units: -applied.movement.change,
            }),
        }
    }

    held.retain(|d| d.units != 0);
    held
}

// =============================================================================
// Reports
// =============================================================================

/// Why one adjustment could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeductionFailureKind {
    /// Would drive stock below zero.
    InsufficientStock { current: i64, requested: i64 },
    /// No active inventory record for the medicine.
    InventoryMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeductionFailure {
    pub line_index: Option<usize>,
    pub medicine_id: String,
    pub name: String,
    pub failure: DeductionFailureKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppliedAdjustment {
    pub line_index: Option<usize>,
    pub medicine_id: String,
    pub inventory_id: String,
    pub name: String,
    pub movement: StockMovement,
}

/// Outcome of applying a prescription to stock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PrescriptionStockReport {
    pub applied: Vec<AppliedAdjustment>,
    pub skipped_lines: Vec<usize>,
    pub failures: Vec<DeductionFailure>,
}

impl PrescriptionStockReport {
    /// Starts a report carrying the plan's skipped lines.
    pub fn for_plan(plan: &DeductionPlan) -> Self {
        PrescriptionStockReport {
            skipped_lines: plan.skipped_lines.clone(),
            ..Default::default()
        }
    }

    /// True when every planned adjustment went through.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Records the result of one attempted adjustment.
    pub fn record(
        &mut self,
        adjustment: &PlannedAdjustment,
        inventory_id: Option<&str>,
        result: Result<StockMovement, CoreError>,
    ) {
        let failure = match (inventory_id, result) {
            (Some(inventory_id), Ok(movement)) => {
                self.applied.push(AppliedAdjustment {
                    line_index: adjustment.line_index,
                    medicine_id: adjustment.medicine_id.clone(),
                    inventory_id: inventory_id.to_string(),
                    name: adjustment.name.clone(),
                    movement,
                });
                return;
            }
            (_, Err(CoreError::InvalidAdjustment { current, delta, .. })) => {
                DeductionFailureKind::InsufficientStock {
                    current,
                    requested: -delta,
                }
            }
            _ => DeductionFailureKind::InventoryMissing,
        };

        self.failures.push(DeductionFailure {
            line_index: adjustment.line_index,
            medicine_id: adjustment.medicine_id.clone(),
            name: adjustment.name.clone(),
            failure,
        });
    }
}

/// Applies a plan to in-memory inventory, one adjustment at a time.
///
/// A failing adjustment is recorded and the rest still run. Deleted records
/// are treated as missing.
pub fn apply_plan(plan: &DeductionPlan, inventory: &mut [InventoryRecord]) -> PrescriptionStockReport {
    let mut report = PrescriptionStockReport::for_plan(plan);

    for adjustment in &plan.adjustments {
        let record = inventory
            .iter_mut()
            .find(|r| !r.is_deleted && r.medicine_id == adjustment.medicine_id);

        match record {
            Some(record) => {
                let result = apply_delta(record, adjustment.delta);
                let id = record.id.clone();
                report.record(adjustment, Some(&id), result);
            }
            None => report.record(
                adjustment,
                None,
                Err(CoreError::InventoryNotFound(adjustment.medicine_id.clone())),
            ),
        }
    }

    report
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dosage::Frequency;
    use chrono::Utc;

    fn line(medicine_id: &str, dose: u32, frequency: Frequency, days: u32) -> PrescriptionLine {
        PrescriptionLine {
            medicine_id: medicine_id.to_string(),
            name: medicine_id.to_uppercase(),
            strength: "500mg".to_string(),
            dosage_count: dose,
            dosage_form: "Tablet".to_string(),
            frequency,
            duration_days: days,
            pattern: String::new(),
            instructions: String::new(),
        }
    }

    fn inventory(medicine_id: &str, stock: i64) -> InventoryRecord {
        let now = Utc::now();
        InventoryRecord {
            id: format!("inv-{medicine_id}"),
            medicine_id: medicine_id.to_string(),
            name: medicine_id.to_uppercase(),
            strength: "500mg".to_string(),
            form: "Tablet".to_string(),
            category: "Other".to_string(),
            opening_stock: stock,
            current_stock: stock,
            next_expiry_date: None,
            version: 0,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_total_units() {
        assert_eq!(total_units(&line("m1", 2, Frequency::TwiceDaily, 5)).unwrap(), 20);
        assert_eq!(total_units(&line("m1", 1, Frequency::Bedtime, 10)).unwrap(), 10);
        assert_eq!(total_units(&line("m1", 1, Frequency::ThriceDaily, 0)).unwrap(), 0);
        assert_eq!(total_units(&line("m1", 1, Frequency::parse("SOS"), 5)).unwrap(), 0);
    }

    #[test]
    fn test_total_units_overflow_is_invalid() {
        let huge = line("m1", u32::MAX, Frequency::SixTimesDaily, u32::MAX);
        assert!(matches!(
            total_units(&huge),
            Err(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));
        assert!(plan_deductions(&[huge]).is_err());
    }

    #[test]
    fn test_refresh_patterns() {
        let mut lines = vec![line("m1", 2, Frequency::TwiceDaily, 5)];
        refresh_patterns(&mut lines);
        assert_eq!(lines[0].pattern, "2--x--2");
    }

    #[test]
    fn test_plan_skips_zero_lines() {
        let lines = vec![
            line("m1", 2, Frequency::TwiceDaily, 5),
            line("m2", 1, Frequency::OnceDaily, 0),
            line("m3", 1, Frequency::ThriceDaily, 3),
        ];
        let plan = plan_deductions(&lines).unwrap();

        assert_eq!(plan.skipped_lines, vec![1]);
        assert_eq!(plan.adjustments.len(), 2);
        assert_eq!(plan.adjustments[0].delta, -20);
        assert_eq!(plan.adjustments[1].line_index, Some(2));
        assert_eq!(plan.adjustments[1].delta, -9);
    }

    #[test]
    fn test_insufficient_stock_leaves_stock_unchanged() {
        let plan = plan_deductions(&[line("m1", 2, Frequency::TwiceDaily, 5)]).unwrap();
        let mut stock = vec![inventory("m1", 10)];

        let report = apply_plan(&plan, &mut stock);

        assert!(report.applied.is_empty());
        assert_eq!(
            report.failures[0].failure,
            DeductionFailureKind::InsufficientStock {
                current: 10,
                requested: 20
            }
        );
        assert_eq!(stock[0].current_stock, 10);
    }

    #[test]
    fn test_sufficient_stock_is_deducted() {
        let plan = plan_deductions(&[line("m1", 2, Frequency::TwiceDaily, 5)]).unwrap();
        let mut stock = vec![inventory("m1", 30)];

        let report = apply_plan(&plan, &mut stock);

        assert!(report.is_complete());
        assert_eq!(
            report.applied[0].movement,
            StockMovement {
                old_stock: 30,
                new_stock: 10,
                change: -20
            }
        );
        assert_eq!(stock[0].current_stock, 10);
    }

    #[test]
    fn test_failure_does_not_block_other_lines() {
        let plan = plan_deductions(&[
            line("m1", 1, Frequency::OnceDaily, 50),
            line("missing", 1, Frequency::OnceDaily, 1),
            line("m2", 1, Frequency::TwiceDaily, 3),
        ])
        .unwrap();
        let mut stock = vec![inventory("m1", 10), inventory("m2", 10)];

        let report = apply_plan(&plan, &mut stock);

        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[1].failure, DeductionFailureKind::InventoryMissing);
        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.applied[0].medicine_id, "m2");
        assert_eq!(stock[0].current_stock, 10);
        assert_eq!(stock[1].current_stock, 4);
    }

    fn held(medicine_id: &str, units: i64) -> DeductedUnits {
        DeductedUnits {
            medicine_id: medicine_id.to_string(),
            name: medicine_id.to_uppercase(),
            units,
        }
    }

    #[test]
    fn test_plan_revision_nets_per_medicine() {
        let deducted = vec![held("m1", 10), held("m2", 3)];
        let new = vec![
            line("m1", 1, Frequency::ThriceDaily, 5),
            line("m3", 1, Frequency::OnceDaily, 2),
        ];

        let plan = plan_revision(&deducted, &new).unwrap();
        let deltas: Vec<(&str, i64)> = plan
            .adjustments
            .iter()
            .map(|a| (a.medicine_id.as_str(), a.delta))
            .collect();

        assert_eq!(deltas, vec![("m1", -5), ("m3", -2), ("m2", 3)]);
        assert_eq!(plan.adjustments[2].name, "M2");
    }

    #[test]
    fn test_plan_revision_unchanged_is_empty() {
        let lines = vec![line("m1", 1, Frequency::TwiceDaily, 5)];
        assert!(plan_revision(&[held("m1", 10)], &lines).unwrap().adjustments.is_empty());
    }

    #[test]
    fn test_plan_revision_never_returns_undeducted_stock() {
        // Line failed at creation, so nothing is held
        let lowered = vec![line("m1", 1, Frequency::TwiceDaily, 5)];
        let plan = plan_revision(&[], &lowered).unwrap();
        assert_eq!(plan.adjustments[0].delta, -10);

        assert!(plan_revision(&[], &[]).unwrap().adjustments.is_empty());
    }

    #[test]
    fn test_settle_deductions_counts_applied_only() {
        let plan = plan_deductions(&[
            line("m1", 1, Frequency::TwiceDaily, 5),
            line("m2", 1, Frequency::OnceDaily, 50),
            line("m1", 1, Frequency::OnceDaily, 2),
        ])
        .unwrap();
        let mut stock = vec![inventory("m1", 30), inventory("m2", 10)];
        let report = apply_plan(&plan, &mut stock);

        let holding = settle_deductions(&[], &report);
        assert_eq!(holding, vec![held("m1", 12)]);

        // Returning the whole amount clears the entry
        let revision = plan_revision(&holding, &[]).unwrap();
        let report = apply_plan(&revision, &mut stock);
        assert!(settle_deductions(&holding, &report).is_empty());
        assert_eq!(stock[0].current_stock, 30);
    }
}
