//! # clinic-core: Pure Business Logic for the Clinic Stock Ledger
//!
//! This crate holds the stock, dosage and reconciliation rules of the clinic
//! as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Clinic Stock Ledger Architecture                    │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Front desk / pharmacy screens                   │   │
//! │  │   Medicines ──► Inventory ──► Patients ──► Prescriptions        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ clinic-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────────┐ ┌────────────┐    │   │
//! │  │   │  dosage  │ │  ledger  │ │ prescription │ │ reconcile  │    │   │
//! │  │   │ patterns │ │  stock   │ │  deduction   │ │ drift and  │    │   │
//! │  │   │ 1--x--1  │ │  >= 0    │ │    plans     │ │ duplicates │    │   │
//! │  │   └──────────┘ └──────────┘ └──────────────┘ └────────────┘    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 clinic-db (Database Layer)                      │   │
//! │  │     SQLite, migrations, repositories, change feed, config       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (medicines, inventory, patients, workorders)
//! - [`dosage`] - Frequency labels and dosage display patterns
//! - [`ledger`] - Stock mutations and stock/expiry classification
//! - [`prescription`] - Turning prescription lines into stock deductions
//! - [`reconcile`] - Catalog vs inventory drift, duplicate merging
//! - [`policy`] - Configurable stock thresholds
//! - [`error`] - Domain error and warning types
//! - [`validation`] - Input validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input, same output
//! 2. **No I/O**: persistence lives in `clinic-db`
//! 3. **Stock never negative**: every mutation goes through [`ledger::apply_delta`]
//! 4. **Explicit Errors**: typed errors, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use clinic_core::dosage::{build_pattern, daily_multiplier, Frequency};
//!
//! let frequency = Frequency::parse("Twice Daily");
//! assert_eq!(build_pattern(2, &frequency), "2--x--2");
//!
//! // 2 tablets, twice a day, for 5 days
//! assert_eq!(2 * daily_multiplier(&frequency) * 5, 20);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod dosage;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod prescription;
pub mod reconcile;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use dosage::Frequency;
pub use error::{CoreError, CoreResult, LedgerWarning, ReferentialIntegrityWarning, ValidationError};
pub use ledger::{ExpiryStatus, InventorySummary, StockMovement, StockStatus};
pub use policy::StockPolicy;
pub use prescription::{DeductionPlan, PlannedAdjustment, PrescriptionStockReport};
pub use reconcile::{MergePlan, ReconciliationReport};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Stock at or below this count shows as "low".
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;

/// Expiry within this many days shows as "near expiry".
pub const DEFAULT_NEAR_EXPIRY_DAYS: i64 = 30;

/// First order id handed out by the workorder counter.
pub const FIRST_ORDER_ID: i64 = 1000;

/// Largest dose per slot accepted on a prescription line.
pub const MAX_DOSAGE_COUNT: u32 = 9;

/// Longest course accepted on a prescription line.
pub const MAX_DURATION_DAYS: u32 = 365;

/// Oldest age accepted on a patient record.
pub const MAX_PATIENT_AGE: u32 = 150;
