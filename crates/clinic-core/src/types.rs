//! # Domain Types
//!
//! Core domain types used throughout the clinic ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Medicine     │   │ InventoryRecord │   │  PurchaseBatch  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  medicine_id    │◄──│  inventory_id   │       │
//! │  │  name_lower     │   │  current_stock  │   │  batch_number   │       │
//! │  │  strength/form  │   │  next_expiry    │   │  expiry_date    │       │
//! │  └─────────────────┘   └────────┬────────┘   └─────────────────┘       │
//! │                                 │                                       │
//! │                        ┌────────▼────────┐   ┌─────────────────┐       │
//! │                        │ StockAdjustment │   │    Workorder    │       │
//! │                        │    LogEntry     │   │  ─────────────  │       │
//! │                        │  (append-only)  │   │  order_id       │       │
//! │                        └─────────────────┘   │  snapshots      │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! A workorder embeds copies of the patient, doctor and medicine fields as
//! they were when it was written. Editing a patient or medicine later never
//! rewrites history.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::dosage::Frequency;

// =============================================================================
// Acting User
// =============================================================================

/// The authenticated staff member performing an operation.
///
/// Identity comes from the external auth service; the ledger only records it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub id: Option<String>,
    pub name: String,
    pub email: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Actor {
            id: Some(id.into()),
            name: name.into(),
            email: email.into(),
        }
    }

    /// An actor for automated jobs (seeding, maintenance scripts).
    pub fn system() -> Self {
        Actor {
            id: None,
            name: "system".to_string(),
            email: String::new(),
        }
    }
}

// =============================================================================
// Medicine Catalog
// =============================================================================

/// The four metadata fields shared by a catalog entry and its inventory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MedicineMetadata {
    pub name: String,
    pub strength: String,
    pub dosage_form: String,
    pub category: String,
}

/// A medicine in the clinic's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MedicineCatalogEntry {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name, first letter capitalised.
    pub name: String,

    /// Lowercase name used for uniqueness checks.
    pub name_lower: String,

    pub strength: String,
    pub dosage_form: String,
    pub category: String,

    /// Logical delete flag. Only set once the linked stock reached zero.
    pub is_deleted: bool,

    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl MedicineCatalogEntry {
    /// Returns the metadata fields compared during reconciliation.
    pub fn metadata(&self) -> MedicineMetadata {
        MedicineMetadata {
            name: self.name.clone(),
            strength: self.strength.clone(),
            dosage_form: self.dosage_form.clone(),
            category: self.category.clone(),
        }
    }
}

// =============================================================================
// Inventory
// =============================================================================

/// Stock-on-hand for one medicine.
///
/// `current_stock` is the single source of truth for on-hand quantity.
/// It is never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryRecord {
    pub id: String,

    /// Catalog entry this record tracks.
    pub medicine_id: String,

    /// Copy of the catalog metadata (may drift; see `reconcile`).
    pub name: String,
    pub strength: String,
    pub form: String,
    pub category: String,

    /// Stock level when the medicine was first added. Never changes.
    pub opening_stock: i64,

    /// Running total after every adjustment.
    pub current_stock: i64,

    /// Earliest expiry across recorded purchase batches.
    #[ts(as = "Option<String>")]
    pub next_expiry_date: Option<NaiveDate>,

    /// Optimistic-concurrency counter, bumped on every stock write.
    pub version: i64,

    pub is_deleted: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// Creates a fresh inventory record for a catalog entry.
    pub fn for_medicine(
        id: impl Into<String>,
        medicine: &MedicineCatalogEntry,
        opening_stock: i64,
        now: DateTime<Utc>,
    ) -> Self {
        InventoryRecord {
            id: id.into(),
            medicine_id: medicine.id.clone(),
            name: medicine.name.clone(),
            strength: medicine.strength.clone(),
            form: medicine.dosage_form.clone(),
            category: medicine.category.clone(),
            opening_stock,
            current_stock: opening_stock,
            next_expiry_date: None,
            version: 0,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the inventory's copy of the catalog metadata.
    pub fn metadata(&self) -> MedicineMetadata {
        MedicineMetadata {
            name: self.name.clone(),
            strength: self.strength.clone(),
            dosage_form: self.form.clone(),
            category: self.category.clone(),
        }
    }

    /// Overwrites the metadata copy.
    pub fn set_metadata(&mut self, metadata: &MedicineMetadata) {
        self.name = metadata.name.clone();
        self.strength = metadata.strength.clone();
        self.form = metadata.dosage_form.clone();
        self.category = metadata.category.clone();
    }
}

/// Input for a stock-in event.
///
/// `expiry_date` is optional here so that a missing value can be rejected
/// with a validation error rather than at deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseRequest {
    pub quantity: i64,
    pub batch_number: String,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    pub supplier_name: String,
    pub invoice_number: String,
}

/// One recorded stock-in event. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseBatch {
    pub id: String,
    pub inventory_id: String,
    pub medicine_id: String,
    pub quantity: i64,
    pub batch_number: String,
    #[ts(as = "String")]
    pub expiry_date: NaiveDate,
    pub supplier_name: String,
    pub invoice_number: String,
    pub created_by_id: Option<String>,
    pub created_by_name: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Stock Adjustment Log
// =============================================================================

/// Why a stock or metadata mutation happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// Staff pressed +/- on the inventory screen.
    ManualAdjust,
    /// A purchase batch was recorded.
    Purchase,
    /// A prescription was created or revised.
    Prescription,
    /// Reconciler copied catalog metadata onto inventory.
    MetadataUpdate,
    /// A previous metadata update was reverted.
    MetadataUndo,
    /// Inventory record was logically deleted.
    InventorySoftDelete,
    /// Duplicate inventory records were folded into one.
    DuplicateMerge,
}

impl AdjustmentReason {
    /// Returns the stored tag.
    pub const fn as_str(&self) -> &'static str {
        match self {
            AdjustmentReason::ManualAdjust => "manual_adjust",
            AdjustmentReason::Purchase => "purchase",
            AdjustmentReason::Prescription => "prescription",
            AdjustmentReason::MetadataUpdate => "metadata_update",
            AdjustmentReason::MetadataUndo => "metadata_undo",
            AdjustmentReason::InventorySoftDelete => "inventory_soft_delete",
            AdjustmentReason::DuplicateMerge => "duplicate_merge",
        }
    }
}

impl std::fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record of a stock or metadata mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockAdjustmentLogEntry {
    pub id: String,
    pub inventory_id: String,
    pub medicine_id: Option<String>,
    pub name: String,
    pub change: i64,
    pub old_stock: i64,
    pub new_stock: i64,
    pub reason: AdjustmentReason,
    pub user_id: Option<String>,
    pub user_name: String,
    /// Purchase batch that caused this entry (reason `purchase`).
    pub purchase_id: Option<String>,
    /// Free-form JSON, e.g. the previous metadata for `metadata_update`.
    pub details: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Patients
// =============================================================================

/// A registered patient. Soft-deleted, never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Patient {
    pub id: String,
    pub name: String,
    pub age: Option<u32>,
    pub sex: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub blood_group: String,
    pub allergies: String,
    pub medical_history: String,
    #[ts(as = "Option<String>")]
    pub date_of_birth: Option<NaiveDate>,
    pub created_by: Option<String>,
    pub is_deleted: bool,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Freezes the fields a prescription embeds.
    pub fn snapshot(&self) -> PatientSnapshot {
        PatientSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            age: self.age,
            sex: self.sex.clone(),
            address: self.address.clone(),
            phone: self.phone.clone(),
        }
    }
}

/// Editable patient fields (create and update).
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PatientDetails {
    pub name: String,
    pub age: Option<u32>,
    pub sex: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub blood_group: String,
    pub allergies: String,
    pub medical_history: String,
    #[ts(as = "Option<String>")]
    pub date_of_birth: Option<NaiveDate>,
}

// =============================================================================
// Prescriptions (Workorders)
// =============================================================================

/// Patient fields frozen into a prescription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PatientSnapshot {
    pub id: String,
    pub name: String,
    pub age: Option<u32>,
    pub sex: String,
    pub address: String,
    pub phone: String,
}

/// Doctor identity frozen into a prescription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DoctorSnapshot {
    pub id: Option<String>,
    pub name: String,
    pub email: String,
}

impl From<&Actor> for DoctorSnapshot {
    fn from(actor: &Actor) -> Self {
        DoctorSnapshot {
            id: actor.id.clone(),
            name: actor.name.clone(),
            email: actor.email.clone(),
        }
    }
}

/// One medicine on a prescription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PrescriptionLine {
    /// Catalog id (snapshot; the catalog entry may change later).
    pub medicine_id: String,
    pub name: String,
    pub strength: String,
    pub dosage_count: u32,
    pub dosage_form: String,
    #[ts(as = "String")]
    pub frequency: Frequency,
    pub duration_days: u32,
    /// Derived from `dosage_count` and `frequency`, e.g. `2--x--2`.
    pub pattern: String,
    pub instructions: String,
}

/// Input for creating or updating a prescription.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WorkorderDraft {
    pub patient: PatientSnapshot,
    pub medicines: Vec<PrescriptionLine>,
    pub diagnosis: String,
}

/// Units a saved prescription has taken from stock for one medicine.
///
/// Only committed deductions count: a line that failed for lack of stock
/// contributes nothing here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeductedUnits {
    pub medicine_id: String,
    pub name: String,
    pub units: i64,
}

/// A saved prescription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Workorder {
    pub id: String,
    /// Human-readable sequential number, starting at 1000.
    pub order_id: i64,
    pub patient: PatientSnapshot,
    pub medicines: Vec<PrescriptionLine>,
    pub diagnosis: String,
    pub doctor: DoctorSnapshot,
    /// Stock currently held by this prescription, per medicine.
    #[serde(default)]
    pub deductions: Vec<DeductedUnits>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub updated_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn medicine() -> MedicineCatalogEntry {
        let now = Utc::now();
        MedicineCatalogEntry {
            id: "med-1".to_string(),
            name: "Paracetamol".to_string(),
            name_lower: "paracetamol".to_string(),
            strength: "500mg".to_string(),
            dosage_form: "Tablet".to_string(),
            category: "Analgesic / Pain Relief".to_string(),
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_inventory_for_medicine_copies_metadata() {
        let med = medicine();
        let inv = InventoryRecord::for_medicine("inv-1", &med, 40, Utc::now());

        assert_eq!(inv.medicine_id, "med-1");
        assert_eq!(inv.opening_stock, 40);
        assert_eq!(inv.current_stock, 40);
        assert_eq!(inv.metadata(), med.metadata());
        assert!(inv.next_expiry_date.is_none());
    }

    #[test]
    fn test_adjustment_reason_tags() {
        assert_eq!(AdjustmentReason::ManualAdjust.as_str(), "manual_adjust");
        assert_eq!(
            AdjustmentReason::InventorySoftDelete.to_string(),
            "inventory_soft_delete"
        );

        let json = serde_json::to_string(&AdjustmentReason::MetadataUndo).unwrap();
        assert_eq!(json, "\"metadata_undo\"");
    }

    #[test]
    fn test_doctor_snapshot_from_actor() {
        let actor = Actor::new("uid-7", "Dr. Rao", "rao@clinic.test");
        let doctor = DoctorSnapshot::from(&actor);
        assert_eq!(doctor.id.as_deref(), Some("uid-7"));
        assert_eq!(doctor.name, "Dr. Rao");
    }
}
