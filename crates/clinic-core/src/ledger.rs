//! # Stock Ledger
//!
//! Pure stock arithmetic for an [`InventoryRecord`].
//!
//! ## Mutation Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Stock Ledger Rules                                 │
//! │                                                                         │
//! │  apply_delta(record, delta)                                            │
//! │    current + delta < 0 ? ──► InvalidAdjustment (record untouched)      │
//! │    otherwise            ──► current += delta                            │
//! │                                                                         │
//! │  record_purchase(record, request)                                      │
//! │    validate (qty > 0, batch, expiry) ──► ValidationError               │
//! │    current += qty                                                       │
//! │    next_expiry = min(next_expiry, expiry)   (None = no floor)          │
//! │                                                                         │
//! │  Derived, never stored:                                                │
//! │    OutOfStock  current <= 0                                            │
//! │    Low         0 < current <= low_stock_threshold                      │
//! │    NearExpiry  0 <= days_until(next_expiry) <= near_expiry_days        │
//! │    Expired     days_until(next_expiry) < 0                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Persistence (version checks, audit log) lives in
//! `clinic_db::InventoryRepository`, which calls into this module.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::policy::StockPolicy;
use crate::types::{InventoryRecord, PurchaseRequest};
use crate::validation::validate_purchase;

// =============================================================================
// Movements
// =============================================================================

/// Before/after values of one stock mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockMovement {
    pub old_stock: i64,
    pub new_stock: i64,
    pub change: i64,
}

/// Applies `delta` to the record's stock.
///
/// ## Example
/// ```rust,ignore
/// let movement = apply_delta(&mut record, -20)?;
/// assert_eq!(movement.new_stock, record.current_stock);
/// ```
pub fn apply_delta(record: &mut InventoryRecord, delta: i64) -> CoreResult<StockMovement> {
    let old_stock = record.current_stock;
    let new_stock = old_stock
        .checked_add(delta)
        .filter(|stock| *stock >= 0)
        .ok_or_else(|| CoreError::InvalidAdjustment {
            inventory_id: record.id.clone(),
            current: old_stock,
            delta,
        })?;

    record.current_stock = new_stock;

    Ok(StockMovement {
        old_stock,
        new_stock,
        change: delta,
    })
}

/// Records a stock-in event on the record.
///
/// Validation happens first; on error the record is unchanged.
pub fn record_purchase(
    record: &mut InventoryRecord,
    request: &PurchaseRequest,
) -> CoreResult<StockMovement> {
    let expiry = validate_purchase(request)?;
    let movement = apply_delta(record, request.quantity)?;
    record.next_expiry_date = Some(earliest_expiry(record.next_expiry_date, expiry));
    Ok(movement)
}

/// The earlier of an existing expiry and a new batch's expiry.
pub fn earliest_expiry(existing: Option<NaiveDate>, candidate: NaiveDate) -> NaiveDate {
    match existing {
        Some(current) if current <= candidate => current,
        _ => candidate,
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Stock badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    Low,
    InStock,
}

/// Expiry badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryStatus {
    /// No purchase batch recorded yet.
    Unknown,
    Expired,
    NearExpiry,
    Ok,
}

/// Whole days from `today` to `date` (negative once past).
pub fn days_until(date: NaiveDate, today: NaiveDate) -> i64 {
    (date - today).num_days()
}

/// Classifies a stock level.
pub fn classify_stock(current_stock: i64, policy: &StockPolicy) -> StockStatus {
    if current_stock <= 0 {
        StockStatus::OutOfStock
    } else if current_stock <= policy.low_stock_threshold {
        StockStatus::Low
    } else {
        StockStatus::InStock
    }
}

/// Classifies the nearest expiry date.
pub fn classify_expiry(
    next_expiry: Option<NaiveDate>,
    today: NaiveDate,
    policy: &StockPolicy,
) -> ExpiryStatus {
    let Some(date) = next_expiry else {
        return ExpiryStatus::Unknown;
    };

    let days = days_until(date, today);
    if days < 0 {
        ExpiryStatus::Expired
    } else if days <= policy.near_expiry_days {
        ExpiryStatus::NearExpiry
    } else {
        ExpiryStatus::Ok
    }
}

/// Dashboard counts across a set of inventory records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventorySummary {
    pub total_items: usize,
    pub low_stock: usize,
    pub out_of_stock: usize,
    pub near_expiry: usize,
    pub expired: usize,
}

/// Counts badges across active records.
pub fn summarize<'a>(
    records: impl IntoIterator<Item = &'a InventoryRecord>,
    today: NaiveDate,
    policy: &StockPolicy,
) -> InventorySummary {
    let mut summary = InventorySummary::default();

    for record in records.into_iter().filter(|r| !r.is_deleted) {
        summary.total_items += 1;

        match classify_stock(record.current_stock, policy) {
            StockStatus::OutOfStock => summary.out_of_stock += 1,
            StockStatus::Low => summary.low_stock += 1,
            StockStatus::InStock => {}
        }

        match classify_expiry(record.next_expiry_date, today, policy) {
            ExpiryStatus::NearExpiry => summary.near_expiry += 1,
            ExpiryStatus::Expired => summary.expired += 1,
            ExpiryStatus::Unknown | ExpiryStatus::Ok => {}
        }
    }

    summary
}

// =============================================================================
// Unit Tests
// =============================================================================
