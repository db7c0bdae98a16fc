//! # Reconciliation Repository
//!
//! Finds and repairs drift between the medicine catalog and inventory.
//!
//! ## Repairs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           report()                                      │
//! │       │                                                                 │
//! │       ├── missing_catalog_ref    ──► reported only                     │
//! │       ├── missing_inventory_ref  ──► reported only                     │
//! │       │                                                                 │
//! │       ├── metadata_mismatch ──► reconcile_metadata()                   │
//! │       │     copy catalog fields onto inventory                          │
//! │       │     log metadata_update { details: previous metadata }         │
//! │       │           │                                                     │
//! │       │           └──► undo_metadata(log_id) ──► log metadata_undo     │
//! │       │                                                                 │
//! │       └── duplicates ──► merge_duplicates()                            │
//! │             oldest record keeps the summed stock                        │
//! │             duplicates soft-deleted with stock zeroed                   │
//! │             log duplicate_merge on every record of the group           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Merging never rewrites purchases or log entries: history keeps pointing
//! at the record each movement actually hit.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use clinic_core::ledger::StockMovement;
use clinic_core::reconcile::{self, plan_merge, sync_metadata};
use clinic_core::{
    Actor, AdjustmentReason, CoreError, InventoryRecord, LedgerWarning, MedicineCatalogEntry,
    MedicineMetadata, MergePlan, PurchaseBatch, ReconciliationReport, StockAdjustmentLogEntry,
};

use crate::error::{DbError, DbResult};
use crate::events::{ChangeFeed, ChangeKind, Collection};
use crate::repository::inventory::{StockChange, PURCHASE_COLUMNS};
use crate::repository::medicine::MEDICINE_COLUMNS;
use crate::repository::stock::{
    append_logs, begin_write, fetch_inventory, log_entry, no_movement, versioned_update,
    INVENTORY_COLUMNS, LOG_COLUMNS,
};

/// Result of a metadata repair run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRepair {
    /// Inventory records rewritten. Zero when nothing had drifted.
    pub applied: usize,
    /// `metadata_update` entries, one per repaired record.
    pub log_ids: Vec<String>,
    pub warnings: Vec<LedgerWarning>,
}

/// Result of a duplicate merge run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub merged: Vec<MergePlan>,
    pub warnings: Vec<LedgerWarning>,
}

/// Repository for catalog/inventory reconciliation.
#[derive(Debug, Clone)]
pub struct ReconciliationRepository {
    pool: SqlitePool,
    feed: ChangeFeed,
    max_retries: u32,
}

impl ReconciliationRepository {
    /// Creates a new ReconciliationRepository.
    pub fn new(pool: SqlitePool, feed: ChangeFeed, max_retries: u32) -> Self {
        ReconciliationRepository {
            pool,
            feed,
            max_retries: max_retries.max(1),
        }
    }

    async fn load(&self) -> DbResult<(Vec<MedicineCatalogEntry>, Vec<InventoryRecord>)> {
        let sql = format!("SELECT {MEDICINE_COLUMNS} FROM medicines ORDER BY created_at, id");
        let catalog = sqlx::query_as::<_, MedicineCatalogEntry>(&sql)
            .fetch_all(&self.pool)
            .await?;

        let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventory ORDER BY created_at, id");
        let inventory = sqlx::query_as::<_, InventoryRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok((catalog, inventory))
    }

    /// Compares the catalog against inventory. Read-only.
    pub async fn report(&self) -> DbResult<ReconciliationReport> {
        let (catalog, inventory) = self.load().await?;
        let report = reconcile::diff(&catalog, &inventory);

        debug!(
            medicines = report.medicine_count,
            inventory = report.inventory_count,
            mismatches = report.metadata_mismatch.len(),
            duplicates = report.duplicates.len(),
            "Reconciliation report built"
        );
        for warning in report.warnings() {
            warn!(%warning, "Referential integrity problem");
        }

        Ok(report)
    }

    /// Copies catalog metadata onto every drifted inventory record.
    ///
    /// Each repair is logged as `metadata_update` with the replaced
    /// metadata as JSON details, so it can be undone. Running this twice
    /// writes nothing the second time.
    pub async fn reconcile_metadata(&self, actor: &Actor) -> DbResult<MetadataRepair> {
        let (catalog, inventory) = self.load().await?;
        let report = reconcile::diff(&catalog, &inventory);

        if report.metadata_mismatch.is_empty() {
            debug!("No metadata drift");
            return Ok(MetadataRepair::default());
        }

        let by_id: HashMap<&str, &MedicineCatalogEntry> =
            catalog.iter().map(|m| (m.id.as_str(), m)).collect();

        let mut repaired: Vec<(InventoryRecord, MedicineMetadata)> = Vec::new();
        let mut tx = begin_write(&self.pool).await?;

        for mismatch in &report.metadata_mismatch {
            let Some(medicine) = by_id.get(mismatch.medicine_id.as_str()) else {
                continue;
            };

            let (record, previous) =
                versioned_update(&mut tx, &mismatch.inventory_id, self.max_retries, |rec| {
                    Ok(sync_metadata(medicine, rec))
                })
                .await?;

            if let Some(previous) = previous {
                repaired.push((record, previous));
            }
        }

        tx.commit().await?;

        info!(applied = repaired.len(), "Inventory metadata reconciled");

        let mut entries = Vec::with_capacity(repaired.len());
        for (record, previous) in &repaired {
            entries.push(StockAdjustmentLogEntry {
                details: Some(serde_json::to_string(previous)?),
                ..log_entry(record, &no_movement(record), AdjustmentReason::MetadataUpdate, actor)
            });
        }
        let warnings = append_logs(&self.pool, &entries).await;

        for (record, _) in &repaired {
            self.feed.notify(Collection::Inventory, &record.id, ChangeKind::Updated);
        }

        Ok(MetadataRepair {
            applied: repaired.len(),
            log_ids: entries.into_iter().map(|e| e.id).collect(),
            warnings,
        })
    }

    /// Restores the metadata recorded by a `metadata_update` entry.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - no such log entry
    /// * `Err(DbError::Core(NotAMetadataUpdate))` - wrong kind of entry
    pub async fn undo_metadata(&self, log_id: &str, actor: &Actor) -> DbResult<StockChange> {
        let sql = format!("SELECT {LOG_COLUMNS} FROM inventory_logs WHERE id = ?1");
        let entry = sqlx::query_as::<_, StockAdjustmentLogEntry>(&sql)
            .bind(log_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Log entry", log_id))?;

        let details = match (entry.reason, entry.details.as_deref()) {
            (AdjustmentReason::MetadataUpdate, Some(details)) => details,
            _ => return Err(CoreError::NotAMetadataUpdate(log_id.to_string()).into()),
        };
        let restored: MedicineMetadata = serde_json::from_str(details)?;

        debug!(log_id = %log_id, inventory_id = %entry.inventory_id, "Undoing metadata update");

        let mut tx = begin_write(&self.pool).await?;
        let (record, replaced) =
            versioned_update(&mut tx, &entry.inventory_id, self.max_retries, |rec| {
                let replaced = rec.metadata();
                rec.set_metadata(&restored);
                Ok(replaced)
            })
            .await?;
        tx.commit().await?;

        info!(inventory_id = %record.id, log_id = %log_id, "Metadata update reverted");

        let movement = no_movement(&record);
        let undo = StockAdjustmentLogEntry {
            details: Some(serde_json::to_string(&replaced)?),
            ..log_entry(&record, &movement, AdjustmentReason::MetadataUndo, actor)
        };
        let warnings = append_logs(&self.pool, std::slice::from_ref(&undo)).await;

        self.feed.notify(Collection::Inventory, &record.id, ChangeKind::Updated);

        Ok(StockChange {
            record,
            movement,
            log_id: undo.id,
            warnings,
        })
    }

    /// Folds every duplicate group into its oldest record.
    ///
    /// Each group merges in its own transaction: the canonical record takes
    /// the summed stock and an expiry recomputed from all of the medicine's
    /// purchase batches, the other records are soft-deleted with their stock
    /// zeroed. Every record of the group gets a `duplicate_merge` entry.
    pub async fn merge_duplicates(&self, actor: &Actor, today: NaiveDate) -> DbResult<MergeOutcome> {
        let report = self.report().await?;
        let mut outcome = MergeOutcome::default();

        for group in &report.duplicates {
            let mut tx = begin_write(&self.pool).await?;

            let mut records = Vec::with_capacity(group.inventory_ids.len());
            for id in &group.inventory_ids {
                let record = fetch_inventory(&mut tx, id)
                    .await?
                    .filter(|r| !r.is_deleted)
                    .ok_or_else(|| CoreError::InventoryNotFound(id.clone()))?;
                records.push(record);
            }
            let batches = fetch_batches(&mut tx, &group.medicine_id).await?;

            let Some(plan) = plan_merge(&records, &batches, today) else {
                continue;
            };

            let (canonical, movement) =
                versioned_update(&mut tx, &plan.canonical_id, self.max_retries, |rec| {
                    let movement = StockMovement {
                        old_stock: rec.current_stock,
                        new_stock: plan.current_stock,
                        change: plan.current_stock - rec.current_stock,
                    };
                    rec.current_stock = plan.current_stock;
                    rec.opening_stock = plan.opening_stock;
                    rec.next_expiry_date = plan.next_expiry_date;
                    Ok(movement)
                })
                .await?;

            let mut absorbed = Vec::with_capacity(plan.removed_ids.len());
            for removed in &plan.removed_ids {
                absorbed.push(
                    versioned_update(&mut tx, removed, self.max_retries, |rec| {
                        let movement = StockMovement {
                            old_stock: rec.current_stock,
                            new_stock: 0,
                            change: -rec.current_stock,
                        };
                        rec.current_stock = 0;
                        rec.is_deleted = true;
                        Ok(movement)
                    })
                    .await?,
                );
            }

            tx.commit().await?;

            info!(
                medicine_id = %plan.medicine_id,
                canonical_id = %plan.canonical_id,
                removed = plan.removed_ids.len(),
                new_stock = plan.current_stock,
                "Duplicate inventory records merged"
            );

            let mut entries = vec![StockAdjustmentLogEntry {
                details: Some(serde_json::json!({ "removed_ids": plan.removed_ids }).to_string()),
                ..log_entry(&canonical, &movement, AdjustmentReason::DuplicateMerge, actor)
            }];
            for (record, movement) in &absorbed {
                entries.push(StockAdjustmentLogEntry {
                    details: Some(
                        serde_json::json!({ "merged_into": plan.canonical_id }).to_string(),
                    ),
                    ..log_entry(record, movement, AdjustmentReason::DuplicateMerge, actor)
                });
            }
            outcome.warnings.extend(append_logs(&self.pool, &entries).await);

            self.feed.notify(Collection::Inventory, &plan.canonical_id, ChangeKind::Updated);
            for removed in &plan.removed_ids {
                self.feed.notify(Collection::Inventory, removed, ChangeKind::Deleted);
            }

            outcome.merged.push(plan);
        }

        Ok(outcome)
    }
}

/// Every batch bought for a medicine, whichever record it was booked on.
async fn fetch_batches(conn: &mut SqliteConnection, medicine_id: &str) -> DbResult<Vec<PurchaseBatch>> {
    let sql = format!("SELECT {PURCHASE_COLUMNS} FROM inventory_purchases WHERE medicine_id = ?1");
    let batches = sqlx::query_as::<_, PurchaseBatch>(&sql)
        .bind(medicine_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(batches)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::medicine::insert_inventory;
    use chrono::Duration;
    use clinic_core::{PurchaseRequest, ReferentialIntegrityWarning};

    fn metadata(name: &str) -> MedicineMetadata {
        MedicineMetadata {
            name: name.to_string(),
            strength: "500mg".to_string(),
            dosage_form: "Tablet".to_string(),
            category: "Analgesic / Pain Relief".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_clean_catalog_reports_nothing() {
        let db = db().await;
        db.medicines().create(&metadata("Paracetamol"), 10, &Actor::system()).await.unwrap();

        let report = db.reconciliation().report().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.medicine_count, 1);
        assert_eq!(report.inventory_count, 1);
    }

    #[tokio::test]
    async fn test_missing_references_are_reported() {
        let db = db().await;
        let created = db.medicines().create(&metadata("Paracetamol"), 0, &Actor::system()).await.unwrap();

        let mut orphan = created.inventory.clone();
        orphan.id = "inv-orphan".to_string();
        orphan.medicine_id = "med-ghost".to_string();
        let mut conn = db.pool().acquire().await.unwrap();
        insert_inventory(&mut conn, &orphan).await.unwrap();
        sqlx::query("DELETE FROM inventory WHERE id = ?1")
            .bind(&created.inventory.id)
            .execute(&mut *conn)
            .await
            .unwrap();
        drop(conn);

        let report = db.reconciliation().report().await.unwrap();
        assert_eq!(
            report.missing_catalog_ref,
            vec![ReferentialIntegrityWarning::MissingCatalogRef {
                inventory_id: "inv-orphan".to_string(),
                medicine_id: "med-ghost".to_string(),
            }]
        );
        assert_eq!(
            report.missing_inventory_ref,
            vec![ReferentialIntegrityWarning::MissingInventoryRef {
                medicine_id: created.medicine.id.clone(),
                name: "Paracetamol".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_reconcile_metadata_is_idempotent_and_undoable() {
        let db = db().await;
        let created = db.medicines().create(&metadata("Paracetamol"), 10, &Actor::system()).await.unwrap();
        sqlx::query("UPDATE inventory SET strength = '250mg' WHERE id = ?1")
            .bind(&created.inventory.id)
            .execute(db.pool())
            .await
            .unwrap();

        let repo = db.reconciliation();
        assert_eq!(repo.report().await.unwrap().metadata_mismatch.len(), 1);

        let first = repo.reconcile_metadata(&Actor::system()).await.unwrap();
        assert_eq!(first.applied, 1);
        assert!(repo.report().await.unwrap().metadata_mismatch.is_empty());

        let second = repo.reconcile_metadata(&Actor::system()).await.unwrap();
        assert_eq!(second.applied, 0);

        let inv = db.inventory().get_by_id(&created.inventory.id).await.unwrap().unwrap();
        assert_eq!(inv.strength, "500mg");
        assert_eq!(inv.current_stock, 10);

        let logs = db.inventory().logs_for(&created.inventory.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].reason, AdjustmentReason::MetadataUpdate);
        assert_eq!(logs[0].change, 0);
        assert!(logs[0].details.as_deref().unwrap().contains("250mg"));

        let undone = repo.undo_metadata(&first.log_ids[0], &Actor::system()).await.unwrap();
        assert_eq!(undone.record.strength, "250mg");

        let logs = db.inventory().logs_for(&created.inventory.id).await.unwrap();
        assert_eq!(logs.last().unwrap().reason, AdjustmentReason::MetadataUndo);
    }

    #[tokio::test]
    async fn test_undo_rejects_other_log_entries() {
        let db = db().await;
        let created = db.medicines().create(&metadata("Paracetamol"), 10, &Actor::system()).await.unwrap();
        let change = db
            .inventory()
            .apply_delta(&created.inventory.id, -1, AdjustmentReason::ManualAdjust, &Actor::system())
            .await
            .unwrap();

        let repo = db.reconciliation();
        let err = repo.undo_metadata(&change.log_id, &Actor::system()).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::NotAMetadataUpdate(_))));

        let err = repo.undo_metadata("missing", &Actor::system()).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_merge_duplicates_sums_stock() {
        let db = db().await;
        let created = db.medicines().create(&metadata("Paracetamol"), 5, &Actor::system()).await.unwrap();

        let mut duplicate = created.inventory.clone();
        duplicate.id = "inv-duplicate".to_string();
        duplicate.opening_stock = 0;
        duplicate.current_stock = 0;
        duplicate.created_at = created.inventory.created_at + Duration::seconds(1);
        let mut conn = db.pool().acquire().await.unwrap();
        insert_inventory(&mut conn, &duplicate).await.unwrap();
        drop(conn);

        let purchase = db
            .inventory()
            .record_purchase(
                "inv-duplicate",
                &PurchaseRequest {
                    quantity: 7,
                    batch_number: "B-7".to_string(),
                    expiry_date: Some(date(2031, 1, 1)),
                    supplier_name: "MedSupply".to_string(),
                    invoice_number: "INV-1".to_string(),
                },
                &Actor::system(),
            )
            .await
            .unwrap();

        let repo = db.reconciliation();
        let report = repo.report().await.unwrap();
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].inventory_ids[0], created.inventory.id);

        let outcome = repo.merge_duplicates(&Actor::system(), date(2030, 1, 1)).await.unwrap();
        assert_eq!(outcome.merged.len(), 1);
        assert_eq!(outcome.merged[0].removed_ids, vec!["inv-duplicate".to_string()]);

        let records = db.inventory().list_active().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, created.inventory.id);
        assert_eq!(records[0].current_stock, 12);
        assert_eq!(records[0].next_expiry_date, Some(date(2031, 1, 1)));

        let absorbed = db.inventory().get_by_id("inv-duplicate").await.unwrap().unwrap();
        assert!(absorbed.is_deleted);
        assert_eq!(absorbed.current_stock, 0);

        // Purchases and earlier log entries stay on the record they hit
        let purchases = db.inventory().purchases_for("inv-duplicate").await.unwrap();
        assert_eq!(purchases.len(), 1);
        assert_eq!(purchases[0].id, purchase.purchase.id);

        let logs = db.inventory().logs_for(&created.inventory.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        let merge = &logs[0];
        assert_eq!(merge.reason, AdjustmentReason::DuplicateMerge);
        assert_eq!((merge.old_stock, merge.new_stock, merge.change), (5, 12, 7));
        assert!(merge.details.as_deref().unwrap().contains("inv-duplicate"));

        let logs = db.inventory().logs_for("inv-duplicate").await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].reason, AdjustmentReason::Purchase);
        assert_eq!(logs[0].purchase_id.as_deref(), Some(purchase.purchase.id.as_str()));
        assert_eq!(logs[1].reason, AdjustmentReason::DuplicateMerge);
        assert_eq!((logs[1].old_stock, logs[1].new_stock, logs[1].change), (7, 0, -7));

        assert!(repo.report().await.unwrap().duplicates.is_empty());
    }
}
