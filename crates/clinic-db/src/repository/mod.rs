//! # Repository Module
//!
//! Database repository implementations for the clinic ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  UI command                                                             │
//! │       │                                                                 │
//! │       │  db.inventory().apply_delta(&id, -2, ManualAdjust, &actor)     │
//! │       ▼                                                                 │
//! │  InventoryRepository                                                   │
//! │  ├── validate (clinic-core)                                            │
//! │  ├── versioned_update (stock.rs) ← rule from clinic_core::ledger       │
//! │  ├── COMMIT                                                            │
//! │  ├── audit log (best effort)                                           │
//! │  └── ChangeFeed::notify                                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`MedicineRepository`](medicine::MedicineRepository) - Catalog CRUD
//! - [`InventoryRepository`](inventory::InventoryRepository) - Stock ledger
//! - [`PatientRepository`](patient::PatientRepository) - Patient records
//! - [`WorkorderRepository`](workorder::WorkorderRepository) - Prescriptions
//! - [`ReconciliationRepository`](reconciliation::ReconciliationRepository) - Drift repair

pub mod inventory;
pub mod medicine;
pub mod patient;
pub mod reconciliation;
pub(crate) mod stock;
pub mod workorder;
