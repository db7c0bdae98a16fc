//! # Versioned Stock Writes
//!
//! Helpers shared by every repository that touches an inventory row.
//!
//! ## Guarded Read-Modify-Write
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   versioned_update(inventory_id, f)                     │
//! │                                                                         │
//! │  BEGIN IMMEDIATE  (write lock taken before the read)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  attempt 1..=max_retries                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SELECT ... FROM inventory WHERE id = ?        (version = v)           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  f(&mut record)   ← pure clinic-core rule, may reject                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE inventory SET ..., version = v + 1                             │
//! │  WHERE id = ? AND version = v                                          │
//! │       │                                                                 │
//! │       ├── 1 row  ──► done                                              │
//! │       └── 0 rows ──► someone else wrote first, re-read and retry       │
//! │                                                                         │
//! │  Out of attempts ──► DbError::ConcurrentModification                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock-writing transactions start with [`begin_write`]. A deferred
//! transaction that reads and then writes cannot be upgraded once another
//! connection has committed, and SQLite reports that as `database is
//! locked` without consulting the busy timeout. `BEGIN IMMEDIATE` waits for
//! the lock instead, so concurrent writers queue up. The version check
//! still guards writers that bypass this helper.
//!
//! Audit entries are written after the stock write commits. A failed
//! append becomes a `LedgerWarning` on the outcome instead of an error.

use chrono::Utc;
use sqlx::{Sqlite, SqliteConnection, SqliteExecutor, SqlitePool, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use clinic_core::ledger::StockMovement;
use clinic_core::{
    Actor, AdjustmentReason, CoreError, CoreResult, InventoryRecord, LedgerWarning,
    StockAdjustmentLogEntry,
};

use crate::error::{DbError, DbResult};

pub(crate) const INVENTORY_COLUMNS: &str = "id, medicine_id, name, strength, form, category, \
     opening_stock, current_stock, next_expiry_date, version, is_deleted, created_at, updated_at";

pub(crate) const LOG_COLUMNS: &str = "id, inventory_id, medicine_id, name, change, old_stock, \
     new_stock, reason, user_id, user_name, purchase_id, details, created_at";

// =============================================================================
// Reads
// =============================================================================

pub(crate) async fn fetch_inventory(
    conn: &mut SqliteConnection,
    inventory_id: &str,
) -> DbResult<Option<InventoryRecord>> {
    let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventory WHERE id = ?1");
    let record = sqlx::query_as::<_, InventoryRecord>(&sql)
        .bind(inventory_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(record)
}

/// Oldest active inventory record for a medicine.
pub(crate) async fn fetch_active_for_medicine(
    conn: &mut SqliteConnection,
    medicine_id: &str,
) -> DbResult<Option<InventoryRecord>> {
    let sql = format!(
        "SELECT {INVENTORY_COLUMNS} FROM inventory \
         WHERE medicine_id = ?1 AND is_deleted = 0 \
         ORDER BY created_at, id LIMIT 1"
    );
    let record = sqlx::query_as::<_, InventoryRecord>(&sql)
        .bind(medicine_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(record)
}

// =============================================================================
// Versioned Writes
// =============================================================================

/// Opens a transaction holding the write lock from its first statement.
pub(crate) async fn begin_write(pool: &SqlitePool) -> DbResult<Transaction<'static, Sqlite>> {
    let tx = pool.begin_with("BEGIN IMMEDIATE").await?;
    Ok(tx)
}

/// Writes every mutable column of `record` if the stored version still
/// equals `expected_version`. Returns false on a version conflict.
async fn store_versioned(
    conn: &mut SqliteConnection,
    record: &InventoryRecord,
    expected_version: i64,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE inventory SET
            name = ?1,
            strength = ?2,
            form = ?3,
            category = ?4,
            opening_stock = ?5,
            current_stock = ?6,
            next_expiry_date = ?7,
            is_deleted = ?8,
            updated_at = ?9,
            version = version + 1
        WHERE id = ?10 AND version = ?11
        "#,
    )
    .bind(&record.name)
    .bind(&record.strength)
    .bind(&record.form)
    .bind(&record.category)
    .bind(record.opening_stock)
    .bind(record.current_stock)
    .bind(record.next_expiry_date)
    .bind(record.is_deleted)
    .bind(record.updated_at)
    .bind(&record.id)
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Applies `mutate` to an active inventory record under the version check.
///
/// Returns the stored record (with its new version) and whatever `mutate`
/// produced. A rule violation from `mutate` aborts without writing.
pub(crate) async fn versioned_update<T, F>(
    conn: &mut SqliteConnection,
    inventory_id: &str,
    max_retries: u32,
    mut mutate: F,
) -> DbResult<(InventoryRecord, T)>
where
    F: FnMut(&mut InventoryRecord) -> CoreResult<T>,
{
    for attempt in 1..=max_retries {
        let current = fetch_inventory(conn, inventory_id)
            .await?
            .filter(|r| !r.is_deleted)
            .ok_or_else(|| CoreError::InventoryNotFound(inventory_id.to_string()))?;

        let mut updated = current.clone();
        let output = mutate(&mut updated)?;
        updated.updated_at = Utc::now();

        if store_versioned(conn, &updated, current.version).await? {
            updated.version = current.version + 1;
            return Ok((updated, output));
        }

        debug!(inventory_id = %inventory_id, attempt, "Inventory version conflict, retrying");
    }

    Err(DbError::ConcurrentModification {
        entity: "Inventory".to_string(),
        id: inventory_id.to_string(),
        attempts: max_retries,
    })
}

// =============================================================================
// Audit Log
// =============================================================================

/// Builds the audit entry for a committed movement.
pub(crate) fn log_entry(
    record: &InventoryRecord,
    movement: &StockMovement,
    reason: AdjustmentReason,
    actor: &Actor,
) -> StockAdjustmentLogEntry {
    StockAdjustmentLogEntry {
        id: Uuid::new_v4().to_string(),
        inventory_id: record.id.clone(),
        medicine_id: Some(record.medicine_id.clone()),
        name: record.name.clone(),
        change: movement.change,
        old_stock: movement.old_stock,
        new_stock: movement.new_stock,
        reason,
        user_id: actor.id.clone(),
        user_name: actor.name.clone(),
        purchase_id: None,
        details: None,
        created_at: Utc::now(),
    }
}

/// Movement that leaves stock where it is (metadata and lifecycle entries).
pub(crate) fn no_movement(record: &InventoryRecord) -> StockMovement {
    StockMovement {
        old_stock: record.current_stock,
        new_stock: record.current_stock,
        change: 0,
    }
}

pub(crate) async fn insert_log<'e, E>(executor: E, entry: &StockAdjustmentLogEntry) -> DbResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO inventory_logs (
            id, inventory_id, medicine_id, name, change, old_stock, new_stock,
            reason, user_id, user_name, purchase_id, details, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.inventory_id)
    .bind(&entry.medicine_id)
    .bind(&entry.name)
    .bind(entry.change)
    .bind(entry.old_stock)
    .bind(entry.new_stock)
    .bind(entry.reason.as_str())
    .bind(&entry.user_id)
    .bind(&entry.user_name)
    .bind(&entry.purchase_id)
    .bind(&entry.details)
    .bind(entry.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Appends entries after commit. Failures are returned, never raised.
pub(crate) async fn append_logs(
    pool: &SqlitePool,
    entries: &[StockAdjustmentLogEntry],
) -> Vec<LedgerWarning> {
    let mut warnings = Vec::new();

    for entry in entries {
        if let Err(e) = insert_log(pool, entry).await {
            warn!(
                inventory_id = %entry.inventory_id,
                reason = %entry.reason,
                error = %e,
                "Audit log write failed"
            );
            warnings.push(LedgerWarning::LogWriteFailure {
                inventory_id: entry.inventory_id.clone(),
                message: e.to_string(),
            });
        }
    }

    warnings
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use clinic_core::{ledger, MedicineMetadata};

    async fn setup(config: DbConfig) -> (Database, InventoryRecord) {
        let db = Database::new(config).await.unwrap();
        let created = db
            .medicines()
            .create(
                &MedicineMetadata {
                    name: "Cetirizine".to_string(),
                    strength: "10mg".to_string(),
                    dosage_form: "Tablet".to_string(),
                    category: "Antihistamine".to_string(),
                },
                10,
                &Actor::system(),
            )
            .await
            .unwrap();
        (db, created.inventory)
    }

    /// The next `count` inventory updates match no row, as if another
    /// writer had bumped the version in between.
    async fn stale_writes(db: &Database, count: i64) {
        sqlx::query("CREATE TABLE stale_writes (remaining INTEGER NOT NULL)")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO stale_writes (remaining) VALUES (?1)")
            .bind(count)
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query(
            r#"
            CREATE TRIGGER stale_inventory_version BEFORE UPDATE ON inventory
            WHEN (SELECT remaining FROM stale_writes) > 0
            BEGIN
                UPDATE stale_writes SET remaining = remaining - 1;
                SELECT RAISE(IGNORE);
            END
            "#,
        )
        .execute(db.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_version_conflict_is_retried() {
        let (db, inv) = setup(DbConfig::in_memory()).await;
        stale_writes(&db, 2).await;

        let mut tx = begin_write(db.pool()).await.unwrap();
        let (record, movement) = versioned_update(&mut tx, &inv.id, 3, |rec| {
            ledger::apply_delta(rec, -4)
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(movement.new_stock, 6);
        assert_eq!(record.version, inv.version + 1);

        let stored = db.inventory().get_by_id(&inv.id).await.unwrap().unwrap();
        assert_eq!(stored.current_stock, 6);
        assert_eq!(stored.version, inv.version + 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_write_nothing() {
        let (db, inv) = setup(DbConfig::in_memory().max_retries(3)).await;
        stale_writes(&db, 10).await;

        let err = db
            .inventory()
            .apply_delta(&inv.id, -4, AdjustmentReason::ManualAdjust, &Actor::system())
            .await
            .unwrap_err();

        match err {
            DbError::ConcurrentModification { entity, id, attempts } => {
                assert_eq!(entity, "Inventory");
                assert_eq!(id, inv.id);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected ConcurrentModification, got {other:?}"),
        }

        let remaining: i64 = sqlx::query_scalar("SELECT remaining FROM stale_writes")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(remaining, 10, "the failed transaction is rolled back");

        let stored = db.inventory().get_by_id(&inv.id).await.unwrap().unwrap();
        assert_eq!(stored.current_stock, 10);
        assert!(db.inventory().logs_for(&inv.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_record_is_not_found() {
        let (db, inv) = setup(DbConfig::in_memory()).await;
        sqlx::query("UPDATE inventory SET is_deleted = 1 WHERE id = ?1")
            .bind(&inv.id)
            .execute(db.pool())
            .await
            .unwrap();

        let mut tx = begin_write(db.pool()).await.unwrap();
        let err = versioned_update(&mut tx, &inv.id, 3, |rec| ledger::apply_delta(rec, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InventoryNotFound(_))));
    }
}
