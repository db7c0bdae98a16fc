//! # Inventory Repository
//!
//! The persistent stock ledger.
//!
//! ## Key Operations
//! - Stock adjustments (manual +/-) with audit log
//! - Purchases: new batch + stock increase in one transaction
//! - Lookups, search, purchase history, audit history
//! - Soft delete once stock is used up
//!
//! ## Purchase Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    record_purchase(inv, request)                        │
//! │                                                                         │
//! │  validate_purchase(request)  ── fails ──► ValidationError, no writes   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │  ├── versioned_update: stock += qty, next_expiry = min(old, expiry)    │
//! │  └── INSERT inventory_purchases                                        │
//! │  COMMIT                                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT inventory_logs (reason = purchase)   best effort               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ChangeFeed: inventory updated, purchase created                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use clinic_core::ledger::{self, InventorySummary, StockMovement};
use clinic_core::validation::{validate_purchase, validate_stock_change};
use clinic_core::{
    Actor, AdjustmentReason, CoreError, InventoryRecord, LedgerWarning, PurchaseBatch,
    PurchaseRequest, StockAdjustmentLogEntry, StockPolicy,
};

use crate::error::DbResult;
use crate::events::{ChangeFeed, ChangeKind, Collection};
use crate::repository::stock::{
    self, append_logs, begin_write, log_entry, no_movement, versioned_update, INVENTORY_COLUMNS,
    LOG_COLUMNS,
};

pub(crate) const PURCHASE_COLUMNS: &str = "id, inventory_id, medicine_id, quantity, batch_number, expiry_date, \
     supplier_name, invoice_number, created_by_id, created_by_name, created_at";

/// Result of a committed stock mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockChange {
    /// The record as stored after the mutation.
    pub record: InventoryRecord,
    pub movement: StockMovement,
    /// Audit entry written (or attempted) for this change.
    pub log_id: String,
    /// Non-fatal problems, e.g. the audit entry could not be written.
    pub warnings: Vec<LedgerWarning>,
}

/// Result of a committed purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOutcome {
    pub purchase: PurchaseBatch,
    pub change: StockChange,
}

/// Repository for inventory and stock ledger operations.
///
/// ## Usage
/// ```rust,ignore
/// let inventory = db.inventory();
///
/// let change = inventory
///     .apply_delta(&inv_id, -3, AdjustmentReason::ManualAdjust, &actor)
///     .await?;
/// assert!(change.record.current_stock >= 0);
/// ```
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
    feed: ChangeFeed,
    max_retries: u32,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool, feed: ChangeFeed, max_retries: u32) -> Self {
        InventoryRepository {
            pool,
            feed,
            max_retries: max_retries.max(1),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets an inventory record by ID (deleted records included).
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<InventoryRecord>> {
        let mut conn = self.pool.acquire().await?;
        stock::fetch_inventory(&mut conn, id).await
    }

    /// Gets the active inventory record for a medicine.
    ///
    /// With duplicates present this is the oldest one (the merge target).
    pub async fn find_by_medicine(&self, medicine_id: &str) -> DbResult<Option<InventoryRecord>> {
        let mut conn = self.pool.acquire().await?;
        stock::fetch_active_for_medicine(&mut conn, medicine_id).await
    }

    /// Lists active inventory records sorted by name.
    pub async fn list_active(&self) -> DbResult<Vec<InventoryRecord>> {
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE is_deleted = 0 ORDER BY name COLLATE NOCASE, id"
        );
        let records = sqlx::query_as::<_, InventoryRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    /// Lists every inventory record, deleted ones included.
    pub async fn list_all(&self) -> DbResult<Vec<InventoryRecord>> {
        let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventory ORDER BY created_at, id");
        let records = sqlx::query_as::<_, InventoryRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    /// Case-insensitive substring search on the medicine name.
    ///
    /// An empty term lists all active records.
    pub async fn search(&self, term: &str) -> DbResult<Vec<InventoryRecord>> {
        let term = term.trim();
        debug!(term = %term, "Searching inventory");

        if term.is_empty() {
            return self.list_active().await;
        }

        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory \
             WHERE is_deleted = 0 AND name LIKE ?1 ESCAPE '\\' \
             ORDER BY name COLLATE NOCASE, id"
        );
        let records = sqlx::query_as::<_, InventoryRecord>(&sql)
            .bind(like_pattern(term))
            .fetch_all(&self.pool)
            .await?;

        debug!(count = records.len(), "Inventory search returned records");
        Ok(records)
    }

    /// Purchase batches of a record, oldest first.
    pub async fn purchases_for(&self, inventory_id: &str) -> DbResult<Vec<PurchaseBatch>> {
        let sql = format!(
            "SELECT {PURCHASE_COLUMNS} FROM inventory_purchases \
             WHERE inventory_id = ?1 ORDER BY created_at, id"
        );
        let purchases = sqlx::query_as::<_, PurchaseBatch>(&sql)
            .bind(inventory_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(purchases)
    }

    /// Audit entries of a record, oldest first.
    pub async fn logs_for(&self, inventory_id: &str) -> DbResult<Vec<StockAdjustmentLogEntry>> {
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM inventory_logs \
             WHERE inventory_id = ?1 ORDER BY created_at, rowid"
        );
        let logs = sqlx::query_as::<_, StockAdjustmentLogEntry>(&sql)
            .bind(inventory_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(logs)
    }

    /// Dashboard counts for the active inventory.
    pub async fn summary(&self, today: NaiveDate, policy: &StockPolicy) -> DbResult<InventorySummary> {
        let records = self.list_active().await?;
        Ok(ledger::summarize(&records, today, policy))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Adds `delta` to the stock of a record.
    ///
    /// ## Returns
    /// * `Ok(StockChange)` - committed; check `warnings` for audit problems
    /// * `Err(DbError::Core(InvalidAdjustment))` - would go negative, nothing written
    /// * `Err(DbError::Core(InventoryNotFound))` - unknown or deleted record
    /// * `Err(DbError::ConcurrentModification)` - retries exhausted
    pub async fn apply_delta(
        &self,
        inventory_id: &str,
        delta: i64,
        reason: AdjustmentReason,
        actor: &Actor,
    ) -> DbResult<StockChange> {
        validate_stock_change(delta)?;
        debug!(inventory_id = %inventory_id, delta, reason = %reason, "Applying stock delta");

        let mut tx = begin_write(&self.pool).await?;
        let (record, movement) = versioned_update(&mut tx, inventory_id, self.max_retries, |rec| {
            ledger::apply_delta(rec, delta)
        })
        .await?;
        tx.commit().await?;

        info!(
            inventory_id = %inventory_id,
            old_stock = movement.old_stock,
            new_stock = movement.new_stock,
            reason = %reason,
            "Stock adjusted"
        );

        let entry = log_entry(&record, &movement, reason, actor);
        let warnings = append_logs(&self.pool, std::slice::from_ref(&entry)).await;

        self.feed.notify(Collection::Inventory, &record.id, ChangeKind::Updated);
        self.feed.notify(Collection::InventoryLogs, &entry.id, ChangeKind::Created);

        Ok(StockChange {
            record,
            movement,
            log_id: entry.id,
            warnings,
        })
    }

    /// Records a purchase batch and adds its quantity to stock.
    pub async fn record_purchase(
        &self,
        inventory_id: &str,
        request: &PurchaseRequest,
        actor: &Actor,
    ) -> DbResult<PurchaseOutcome> {
        let expiry_date = validate_purchase(request)?;
        debug!(
            inventory_id = %inventory_id,
            quantity = request.quantity,
            batch = %request.batch_number,
            "Recording purchase"
        );

        let mut tx = begin_write(&self.pool).await?;

        let (record, movement) = versioned_update(&mut tx, inventory_id, self.max_retries, |rec| {
            ledger::record_purchase(rec, request)
        })
        .await?;

        let purchase = PurchaseBatch {
            id: Uuid::new_v4().to_string(),
            inventory_id: record.id.clone(),
            medicine_id: record.medicine_id.clone(),
            quantity: request.quantity,
            batch_number: request.batch_number.trim().to_string(),
            expiry_date,
            supplier_name: request.supplier_name.trim().to_string(),
            invoice_number: request.invoice_number.trim().to_string(),
            created_by_id: actor.id.clone(),
            created_by_name: actor.name.clone(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO inventory_purchases (
                id, inventory_id, medicine_id, quantity, batch_number, expiry_date,
                supplier_name, invoice_number, created_by_id, created_by_name, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&purchase.id)
        .bind(&purchase.inventory_id)
        .bind(&purchase.medicine_id)
        .bind(purchase.quantity)
        .bind(&purchase.batch_number)
        .bind(purchase.expiry_date)
        .bind(&purchase.supplier_name)
        .bind(&purchase.invoice_number)
        .bind(&purchase.created_by_id)
        .bind(&purchase.created_by_name)
        .bind(purchase.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            inventory_id = %inventory_id,
            purchase_id = %purchase.id,
            new_stock = movement.new_stock,
            next_expiry = ?record.next_expiry_date,
            "Purchase recorded"
        );

        let entry = StockAdjustmentLogEntry {
            purchase_id: Some(purchase.id.clone()),
            ..log_entry(&record, &movement, AdjustmentReason::Purchase, actor)
        };
        let warnings = append_logs(&self.pool, std::slice::from_ref(&entry)).await;

        self.feed.notify(Collection::Inventory, &record.id, ChangeKind::Updated);
        self.feed.notify(Collection::InventoryPurchases, &purchase.id, ChangeKind::Created);
        self.feed.notify(Collection::InventoryLogs, &entry.id, ChangeKind::Created);

        Ok(PurchaseOutcome {
            purchase,
            change: StockChange {
                record,
                movement,
                log_id: entry.id,
                warnings,
            },
        })
    }

    /// Logically deletes a record whose stock is zero.
    ///
    /// ## Returns
    /// * `Err(DbError::Core(StockNotZero))` - stock remains, nothing written
    pub async fn soft_delete(&self, inventory_id: &str, actor: &Actor) -> DbResult<StockChange> {
        debug!(inventory_id = %inventory_id, "Soft-deleting inventory record");

        let mut tx = begin_write(&self.pool).await?;
        let (record, movement) = versioned_update(&mut tx, inventory_id, self.max_retries, |rec| {
            if rec.current_stock != 0 {
                return Err(CoreError::StockNotZero {
                    name: rec.name.clone(),
                    current: rec.current_stock,
                });
            }
            rec.is_deleted = true;
            Ok(no_movement(rec))
        })
        .await?;
        tx.commit().await?;

        info!(inventory_id = %inventory_id, "Inventory record deleted");

        let entry = log_entry(&record, &movement, AdjustmentReason::InventorySoftDelete, actor);
        let warnings = append_logs(&self.pool, std::slice::from_ref(&entry)).await;

        self.feed.notify(Collection::Inventory, &record.id, ChangeKind::Deleted);

        Ok(StockChange {
            record,
            movement,
            log_id: entry.id,
            warnings,
        })
    }

    /// Counts active inventory records (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inventory WHERE is_deleted = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// `%term%` with LIKE wildcards in the term escaped.
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

// =============================================================================
// Unit Tests
// =============================================================================
