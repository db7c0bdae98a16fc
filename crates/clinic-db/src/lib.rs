//! # clinic-db: Database Layer for the Clinic Stock Ledger
//!
//! SQLite persistence for the catalog, stock ledger, patients and
//! prescriptions, built on sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Clinic Ledger Data Flow                           │
//! │                                                                         │
//! │  UI layer (external)                                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    clinic-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ Medicine      │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ Inventory     │    │ 001_initial  │  │   │
//! │  │   │ ChangeFeed    │    │ Patient       │    │   _schema    │  │   │
//! │  │   │               │    │ Workorder     │    │              │  │   │
//! │  │   │               │    │ Reconciliation│    │              │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │ rules                          │   │
//! │  └────────────────────────────────┼────────────────────────────────┘   │
//! │                                   ▼                                     │
//! │                       clinic-core (pure logic)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - TOML + environment configuration
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`events`] - Change feed for committed writes
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use clinic_db::{ClinicConfig, Database};
//!
//! let config = ClinicConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//!
//! let created = db.medicines().create(&metadata, 40, &actor).await?;
//! let outcome = db.workorders().create(draft, &doctor).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod events;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::ClinicConfig;
pub use error::{DbError, DbResult};
pub use events::{ChangeEvent, ChangeFeed, ChangeKind, Collection, Subscription};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::inventory::{InventoryRepository, PurchaseOutcome, StockChange};
pub use repository::medicine::{CreatedMedicine, MedicineRepository};
pub use repository::patient::PatientRepository;
pub use repository::reconciliation::{MergeOutcome, MetadataRepair, ReconciliationRepository};
pub use repository::workorder::{WorkorderOutcome, WorkorderRepository};
