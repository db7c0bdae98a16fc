//! # Medicine Repository
//!
//! Database operations for the medicine catalog.
//!
//! ## Add Medicine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                create("paracetamol", 500mg, Tablet, 40)                 │
//! │                                                                         │
//! │  validate_medicine_metadata + validate_opening_stock                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  name → "Paracetamol", name_lower → "paracetamol"                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  active medicine with same name_lower? ──► DuplicateMedicine           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │  ├── INSERT medicines                                                  │
//! │  └── INSERT inventory (opening_stock = current_stock = 40)             │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Editing catalog metadata never touches inventory. Drift between the two
//! is repaired by the reconciliation repository.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use clinic_core::validation::{
    medicine_name_key, normalize_medicine_name, validate_medicine_metadata, validate_opening_stock,
};
use clinic_core::{
    Actor, AdjustmentReason, CoreError, InventoryRecord, LedgerWarning, MedicineCatalogEntry,
    MedicineMetadata,
};

use crate::error::{DbError, DbResult};
use crate::events::{ChangeFeed, ChangeKind, Collection};
use crate::repository::inventory::like_pattern;
use crate::repository::stock::{
    append_logs, begin_write, log_entry, no_movement, INVENTORY_COLUMNS,
};

pub(crate) const MEDICINE_COLUMNS: &str = "id, name, name_lower, strength, dosage_form, category, \
     is_deleted, deleted_at, created_at, updated_at";

/// A new catalog entry together with its inventory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedMedicine {
    pub medicine: MedicineCatalogEntry,
    pub inventory: InventoryRecord,
}

/// Repository for medicine catalog operations.
#[derive(Debug, Clone)]
pub struct MedicineRepository {
    pool: SqlitePool,
    feed: ChangeFeed,
}

impl MedicineRepository {
    /// Creates a new MedicineRepository.
    pub fn new(pool: SqlitePool, feed: ChangeFeed) -> Self {
        MedicineRepository { pool, feed }
    }

    /// Gets a medicine by its ID (deleted entries included).
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<MedicineCatalogEntry>> {
        let sql = format!("SELECT {MEDICINE_COLUMNS} FROM medicines WHERE id = ?1");
        let medicine = sqlx::query_as::<_, MedicineCatalogEntry>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(medicine)
    }

    /// Lists active medicines sorted by name.
    pub async fn list_active(&self) -> DbResult<Vec<MedicineCatalogEntry>> {
        let sql = format!(
            "SELECT {MEDICINE_COLUMNS} FROM medicines WHERE is_deleted = 0 ORDER BY name_lower, id"
        );
        let medicines = sqlx::query_as::<_, MedicineCatalogEntry>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(medicines)
    }

    /// Lists every catalog entry, deleted ones included.
    pub async fn list_all(&self) -> DbResult<Vec<MedicineCatalogEntry>> {
        let sql = format!("SELECT {MEDICINE_COLUMNS} FROM medicines ORDER BY created_at, id");
        let medicines = sqlx::query_as::<_, MedicineCatalogEntry>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(medicines)
    }

    /// Case-insensitive search on name and category.
    pub async fn search(&self, term: &str) -> DbResult<Vec<MedicineCatalogEntry>> {
        let term = term.trim();
        debug!(term = %term, "Searching medicines");

        if term.is_empty() {
            return self.list_active().await;
        }

        let sql = format!(
            "SELECT {MEDICINE_COLUMNS} FROM medicines \
             WHERE is_deleted = 0 \
             AND (name_lower LIKE ?1 ESCAPE '\\' OR category LIKE ?1 ESCAPE '\\') \
             ORDER BY name_lower, id"
        );
        let medicines = sqlx::query_as::<_, MedicineCatalogEntry>(&sql)
            .bind(like_pattern(&term.to_lowercase()))
            .fetch_all(&self.pool)
            .await?;
        Ok(medicines)
    }

    /// Adds a medicine and its inventory record in one transaction.
    ///
    /// ## Returns
    /// * `Err(DbError::Core(Validation))` - missing field or negative opening stock
    /// * `Err(DbError::Core(DuplicateMedicine))` - an active medicine has that name
    pub async fn create(
        &self,
        metadata: &MedicineMetadata,
        opening_stock: i64,
        actor: &Actor,
    ) -> DbResult<CreatedMedicine> {
        validate_medicine_metadata(metadata)?;
        validate_opening_stock(opening_stock)?;

        let name = normalize_medicine_name(&metadata.name);
        let name_lower = medicine_name_key(&name);
        debug!(name = %name, opening_stock, actor = %actor.name, "Creating medicine");

        let now = Utc::now();
        let medicine = MedicineCatalogEntry {
            id: Uuid::new_v4().to_string(),
            name,
            name_lower,
            strength: metadata.strength.trim().to_string(),
            dosage_form: metadata.dosage_form.trim().to_string(),
            category: metadata.category.trim().to_string(),
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        let inventory =
            InventoryRecord::for_medicine(Uuid::new_v4().to_string(), &medicine, opening_stock, now);

        let mut tx = begin_write(&self.pool).await?;

        ensure_name_available(&mut tx, &medicine.name_lower, None).await?;

        sqlx::query(
            r#"
            INSERT INTO medicines (
                id, name, name_lower, strength, dosage_form, category,
                is_deleted, deleted_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&medicine.id)
        .bind(&medicine.name)
        .bind(&medicine.name_lower)
        .bind(&medicine.strength)
        .bind(&medicine.dosage_form)
        .bind(&medicine.category)
        .bind(medicine.is_deleted)
        .bind(medicine.deleted_at)
        .bind(medicine.created_at)
        .bind(medicine.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| duplicate_name(e, &medicine.name))?;

        insert_inventory(&mut tx, &inventory).await?;

        tx.commit().await?;

        info!(medicine_id = %medicine.id, inventory_id = %inventory.id, "Medicine created");

        self.feed.notify(Collection::Medicines, &medicine.id, ChangeKind::Created);
        self.feed.notify(Collection::Inventory, &inventory.id, ChangeKind::Created);

        Ok(CreatedMedicine { medicine, inventory })
    }

    /// Edits catalog metadata. Stock and inventory are untouched.
    pub async fn update(&self, id: &str, metadata: &MedicineMetadata) -> DbResult<MedicineCatalogEntry> {
        validate_medicine_metadata(metadata)?;
        debug!(id = %id, "Updating medicine");

        let mut medicine = self
            .get_by_id(id)
            .await?
            .filter(|m| !m.is_deleted)
            .ok_or_else(|| CoreError::MedicineNotFound(id.to_string()))?;

        medicine.name = normalize_medicine_name(&metadata.name);
        medicine.name_lower = medicine_name_key(&medicine.name);
        medicine.strength = metadata.strength.trim().to_string();
        medicine.dosage_form = metadata.dosage_form.trim().to_string();
        medicine.category = metadata.category.trim().to_string();
        medicine.updated_at = Utc::now();

        let mut tx = begin_write(&self.pool).await?;
        ensure_name_available(&mut tx, &medicine.name_lower, Some(id)).await?;

        let result = sqlx::query(
            r#"
            UPDATE medicines SET
                name = ?2,
                name_lower = ?3,
                strength = ?4,
                dosage_form = ?5,
                category = ?6,
                updated_at = ?7
            WHERE id = ?1 AND is_deleted = 0
            "#,
        )
        .bind(id)
        .bind(&medicine.name)
        .bind(&medicine.name_lower)
        .bind(&medicine.strength)
        .bind(&medicine.dosage_form)
        .bind(&medicine.category)
        .bind(medicine.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| duplicate_name(e, &medicine.name))?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Medicine", id));
        }
        tx.commit().await?;

        self.feed.notify(Collection::Medicines, id, ChangeKind::Updated);
        Ok(medicine)
    }

    /// Logically deletes a medicine and its inventory record(s).
    ///
    /// Allowed only when every linked active inventory record has zero
    /// stock. Returns audit-log warnings, if any.
    pub async fn soft_delete(&self, id: &str, actor: &Actor) -> DbResult<Vec<LedgerWarning>> {
        debug!(id = %id, "Soft-deleting medicine");

        let mut tx = begin_write(&self.pool).await?;

        let sql = format!("SELECT {MEDICINE_COLUMNS} FROM medicines WHERE id = ?1 AND is_deleted = 0");
        let medicine = sqlx::query_as::<_, MedicineCatalogEntry>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::MedicineNotFound(id.to_string()))?;

        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE medicine_id = ?1 AND is_deleted = 0"
        );
        let records = sqlx::query_as::<_, InventoryRecord>(&sql)
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

        if let Some(stocked) = records.iter().find(|r| r.current_stock != 0) {
            return Err(CoreError::StockNotZero {
                name: medicine.name.clone(),
                current: stocked.current_stock,
            }
            .into());
        }

        let now = Utc::now();
        sqlx::query("UPDATE medicines SET is_deleted = 1, deleted_at = ?2, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        // Guarded on stock so a concurrent stock-in aborts the delete
        for record in &records {
            let result = sqlx::query(
                r#"
                UPDATE inventory
                SET is_deleted = 1, updated_at = ?2, version = version + 1
                WHERE id = ?1 AND current_stock = 0
                "#,
            )
            .bind(&record.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DbError::ConcurrentModification {
                    entity: "Inventory".to_string(),
                    id: record.id.clone(),
                    attempts: 1,
                });
            }
        }

        tx.commit().await?;
        info!(medicine_id = %id, inventory_records = records.len(), "Medicine deleted");

        let entries: Vec<_> = records
            .iter()
            .map(|r| log_entry(r, &no_movement(r), AdjustmentReason::InventorySoftDelete, actor))
            .collect();
        let warnings = append_logs(&self.pool, &entries).await;

        self.feed.notify(Collection::Medicines, id, ChangeKind::Deleted);
        for record in &records {
            self.feed.notify(Collection::Inventory, &record.id, ChangeKind::Deleted);
        }

        Ok(warnings)
    }
}

/// Fails with `DuplicateMedicine` if another active entry uses `name_lower`.
async fn ensure_name_available(
    conn: &mut SqliteConnection,
    name_lower: &str,
    except_id: Option<&str>,
) -> DbResult<()> {
    let existing: Option<(String, String)> = sqlx::query_as(
        "SELECT id, name FROM medicines WHERE name_lower = ?1 AND is_deleted = 0 AND id != ?2 LIMIT 1",
    )
    .bind(name_lower)
    .bind(except_id.unwrap_or(""))
    .fetch_optional(&mut *conn)
    .await?;

    match existing {
        Some((_, name)) => Err(CoreError::DuplicateMedicine(name).into()),
        None => Ok(()),
    }
}

/// The partial unique index is the last line of defence against a racing insert.
fn duplicate_name(err: sqlx::Error, name: &str) -> DbError {
    match DbError::from(err) {
        DbError::UniqueViolation { .. } => CoreError::DuplicateMedicine(name.to_string()).into(),
        other => other,
    }
}

pub(crate) async fn insert_inventory(conn: &mut SqliteConnection, record: &InventoryRecord) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory (
            id, medicine_id, name, strength, form, category,
            opening_stock, current_stock, next_expiry_date, version,
            is_deleted, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&record.id)
    .bind(&record.medicine_id)
    .bind(&record.name)
    .bind(&record.strength)
    .bind(&record.form)
    .bind(&record.category)
    .bind(record.opening_stock)
    .bind(record.current_stock)
    .bind(record.next_expiry_date)
    .bind(record.version)
    .bind(record.is_deleted)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn metadata(name: &str) -> MedicineMetadata {
        MedicineMetadata {
            name: name.to_string(),
            strength: "500mg".to_string(),
            dosage_form: "Tablet".to_string(),
            category: "Analgesic / Pain Relief".to_string(),
        }
    }

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_normalizes_and_creates_inventory() {
        let db = db().await;
        let created = db
            .medicines()
            .create(&metadata("  paracetamol "), 40, &Actor::system())
            .await
            .unwrap();

        assert_eq!(created.medicine.name, "Paracetamol");
        assert_eq!(created.medicine.name_lower, "paracetamol");
        assert_eq!(created.inventory.medicine_id, created.medicine.id);
        assert_eq!(created.inventory.opening_stock, 40);
        assert_eq!(created.inventory.current_stock, 40);

        let stored = db.inventory().find_by_medicine(&created.medicine.id).await.unwrap().unwrap();
        assert_eq!(stored.id, created.inventory.id);
        assert_eq!(stored.name, "Paracetamol");
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let db = db().await;
        let repo = db.medicines();
        repo.create(&metadata("Paracetamol"), 10, &Actor::system()).await.unwrap();

        let err = repo
            .create(&metadata("PARACETAMOL"), 5, &Actor::system())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::DuplicateMedicine(_))));
        assert_eq!(db.inventory().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_validates_before_writing() {
        let db = db().await;
        let repo = db.medicines();

        let mut bad = metadata("Ibuprofen");
        bad.category = String::new();
        assert!(repo.create(&bad, 10, &Actor::system()).await.is_err());
        assert!(repo.create(&metadata("Ibuprofen"), -1, &Actor::system()).await.is_err());
        assert!(repo.list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_changes_catalog_only() {
        let db = db().await;
        let repo = db.medicines();
        let created = repo.create(&metadata("Cetirizine"), 10, &Actor::system()).await.unwrap();

        let mut edited = metadata("cetirizine");
        edited.strength = "10mg".to_string();
        let updated = repo.update(&created.medicine.id, &edited).await.unwrap();
        assert_eq!(updated.strength, "10mg");

        let inv = db.inventory().get_by_id(&created.inventory.id).await.unwrap().unwrap();
        assert_eq!(inv.strength, "500mg");
        assert_eq!(inv.current_stock, 10);
    }

    #[tokio::test]
    async fn test_update_rejects_taken_name() {
        let db = db().await;
        let repo = db.medicines();
        repo.create(&metadata("Cetirizine"), 1, &Actor::system()).await.unwrap();
        let other = repo.create(&metadata("Loratadine"), 1, &Actor::system()).await.unwrap();

        let err = repo.update(&other.medicine.id, &metadata("cetirizine")).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::DuplicateMedicine(_))));
    }

    #[tokio::test]
    async fn test_soft_delete_requires_zero_stock() {
        let db = db().await;
        let repo = db.medicines();
        let created = repo.create(&metadata("Cetirizine"), 3, &Actor::system()).await.unwrap();

        let err = repo.soft_delete(&created.medicine.id, &Actor::system()).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::StockNotZero { current: 3, .. })));

        db.inventory()
            .apply_delta(&created.inventory.id, -3, AdjustmentReason::ManualAdjust, &Actor::system())
            .await
            .unwrap();
        let warnings = repo.soft_delete(&created.medicine.id, &Actor::system()).await.unwrap();
        assert!(warnings.is_empty());

        let medicine = repo.get_by_id(&created.medicine.id).await.unwrap().unwrap();
        assert!(medicine.is_deleted);
        assert!(medicine.deleted_at.is_some());
        assert!(db.inventory().list_active().await.unwrap().is_empty());

        // The name is free again
        repo.create(&metadata("Cetirizine"), 0, &Actor::system()).await.unwrap();
    }

    #[tokio::test]
    async fn test_search() {
        let db = db().await;
        let repo = db.medicines();
        repo.create(&metadata("Cetirizine"), 1, &Actor::system()).await.unwrap();
        repo.create(&metadata("Paracetamol"), 1, &Actor::system()).await.unwrap();

        let found = repo.search("CETI").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Cetirizine");
        assert_eq!(repo.search("analgesic").await.unwrap().len(), 2);
        assert_eq!(repo.search("").await.unwrap().len(), 2);
    }
}
