//! # Error Types
//!
//! Domain-specific error types for clinic-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  clinic-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  clinic-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures (wraps CoreError)  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Errors vs Warnings
//! Reconciliation findings (`ReferentialIntegrityWarning`) and audit-log
//! failures (`LedgerWarning`) are not errors. They travel inside reports and
//! outcomes so the successful part of an operation is never hidden.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A stock mutation would drive `current_stock` below zero.
    ///
    /// ## User Workflow
    /// ```text
    /// Prescribe 2 × Twice daily × 5 days = 20 units
    ///      │
    ///      ▼
    /// Inventory current_stock = 10
    ///      │
    ///      ▼
    /// InvalidAdjustment { current: 10, delta: -20 }  (stock stays 10)
    /// ```
    #[error("Invalid adjustment for inventory {inventory_id}: stock {current} cannot change by {delta}")]
    InvalidAdjustment {
        inventory_id: String,
        current: i64,
        delta: i64,
    },

    /// Catalog entry cannot be found.
    #[error("Medicine not found: {0}")]
    MedicineNotFound(String),

    /// No inventory record exists for the id or medicine.
    #[error("Inventory record not found: {0}")]
    InventoryNotFound(String),

    /// An active medicine with the same lowercase name already exists.
    #[error("Medicine '{0}' already exists")]
    DuplicateMedicine(String),

    /// Deleting requires the stock to be used up first.
    #[error("Cannot delete {name}: {current} units still in stock")]
    StockNotZero { name: String, current: i64 },

    /// A log entry was expected to be a metadata update.
    #[error("Log entry {0} is not a metadata update")]
    NotAMetadataUpdate(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., malformed email).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., a medicine name already in the catalog).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    pub(crate) fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }
}

// =============================================================================
// Warnings
// =============================================================================

/// Inventory and catalog disagree about which medicines exist.
///
/// Reported by the reconciler, never auto-resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferentialIntegrityWarning {
    #[error("Inventory {inventory_id} references missing medicine {medicine_id}")]
    MissingCatalogRef {
        inventory_id: String,
        medicine_id: String,
    },

    #[error("Medicine {medicine_id} ({name}) has no inventory record")]
    MissingInventoryRef { medicine_id: String, name: String },
}

/// Non-fatal problems attached to a successful ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerWarning {
    /// The stock change committed but its audit entry could not be written.
    #[error("Audit log write failed for inventory {inventory_id}: {message}")]
    LogWriteFailure {
        inventory_id: String,
        message: String,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidAdjustment {
            inventory_id: "inv-1".to_string(),
            current: 10,
            delta: -20,
        };
        assert_eq!(
            err.to_string(),
            "Invalid adjustment for inventory inv-1: stock 10 cannot change by -20"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::required("batch number");
        assert_eq!(err.to_string(), "batch number is required");

        let err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        assert_eq!(err.to_string(), "quantity must be positive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("name").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
