//! # Workorder Repository
//!
//! Prescriptions and the stock they consume.
//!
//! ## Create Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       create(draft, doctor)                             │
//! │                                                                         │
//! │  validate_workorder_draft ── fails ──► ValidationError, no writes      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  refresh_patterns (e.g. "2--x--2")                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN IMMEDIATE                                                        │
//! │  ├── counters.workorders += 1          → order_id (first: 1000)        │
//! │  ├── per line: versioned_update(stock -= units)                        │
//! │  │     ├── Ok                   ──► report.applied                     │
//! │  │     └── InvalidAdjustment /  ──► report.failures, line skipped      │
//! │  │         no inventory record                                          │
//! │  └── INSERT workorders (JSON snapshots + units actually deducted)      │
//! │  COMMIT                                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT inventory_logs (reason = prescription)   best effort           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Editing a workorder applies only the net per-medicine difference
//! between the units it actually deducted and the new lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use clinic_core::ledger::{self, StockMovement};
use clinic_core::prescription::{
    plan_deductions, plan_revision, refresh_patterns, settle_deductions,
};
use clinic_core::validation::validate_workorder_draft;
use clinic_core::{
    Actor, AdjustmentReason, CoreError, DeductionPlan, DoctorSnapshot, InventoryRecord,
    LedgerWarning, PrescriptionStockReport, StockAdjustmentLogEntry, Workorder, WorkorderDraft,
    FIRST_ORDER_ID,
};

use crate::error::{DbError, DbResult};
use crate::events::{ChangeFeed, ChangeKind, Collection};
use crate::repository::stock::{
    append_logs, begin_write, fetch_active_for_medicine, log_entry, versioned_update,
};

const WORKORDER_COLUMNS: &str = "id, order_id, patient_json, medicines_json, diagnosis, \
     doctor_json, deductions_json, created_at, updated_at";

const ORDER_COUNTER: &str = "workorders";

/// Result of creating or editing a workorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkorderOutcome {
    pub workorder: Workorder,
    /// Per-line stock results. Failed lines did not change stock.
    pub stock: PrescriptionStockReport,
    /// Audit log problems for the applied deductions.
    pub warnings: Vec<LedgerWarning>,
}

/// Stored shape of a workorder: snapshots are JSON text columns.
#[derive(Debug, sqlx::FromRow)]
struct WorkorderRow {
    id: String,
    order_id: i64,
    patient_json: String,
    medicines_json: String,
    diagnosis: String,
    doctor_json: String,
    deductions_json: String,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<WorkorderRow> for Workorder {
    type Error = DbError;

    fn try_from(row: WorkorderRow) -> Result<Self, Self::Error> {
        Ok(Workorder {
            id: row.id,
            order_id: row.order_id,
            patient: serde_json::from_str(&row.patient_json)?,
            medicines: serde_json::from_str(&row.medicines_json)?,
            diagnosis: row.diagnosis,
            doctor: serde_json::from_str(&row.doctor_json)?,
            deductions: serde_json::from_str(&row.deductions_json)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for prescription operations.
///
/// ## Usage
/// ```rust,ignore
/// let outcome = db.workorders().create(draft, &doctor).await?;
/// for failure in &outcome.stock.failures {
///     // show "not enough stock" next to the line
/// }
/// ```
#[derive(Debug, Clone)]
pub struct WorkorderRepository {
    pool: SqlitePool,
    feed: ChangeFeed,
    max_retries: u32,
}

impl WorkorderRepository {
    /// Creates a new WorkorderRepository.
    pub fn new(pool: SqlitePool, feed: ChangeFeed, max_retries: u32) -> Self {
        WorkorderRepository {
            pool,
            feed,
            max_retries: max_retries.max(1),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Workorder>> {
        let sql = format!("SELECT {WORKORDER_COLUMNS} FROM workorders WHERE id = ?1");
        let row = sqlx::query_as::<_, WorkorderRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Workorder::try_from).transpose()
    }

    /// Looks a workorder up by its human-readable number.
    pub async fn get_by_order_id(&self, order_id: i64) -> DbResult<Option<Workorder>> {
        let sql = format!("SELECT {WORKORDER_COLUMNS} FROM workorders WHERE order_id = ?1");
        let row = sqlx::query_as::<_, WorkorderRow>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Workorder::try_from).transpose()
    }

    /// Newest workorders first.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<Workorder>> {
        let sql = format!(
            "SELECT {WORKORDER_COLUMNS} FROM workorders ORDER BY order_id DESC LIMIT ?1"
        );
        let rows = sqlx::query_as::<_, WorkorderRow>(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Workorder::try_from).collect()
    }

    /// A patient's prescription history, newest first.
    pub async fn list_for_patient(&self, patient_id: &str) -> DbResult<Vec<Workorder>> {
        let sql = format!(
            "SELECT {WORKORDER_COLUMNS} FROM workorders WHERE patient_id = ?1 ORDER BY order_id DESC"
        );
        let rows = sqlx::query_as::<_, WorkorderRow>(&sql)
            .bind(patient_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Workorder::try_from).collect()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Saves a prescription and deducts its stock.
    ///
    /// ## Returns
    /// * `Ok(outcome)` - saved; lines that could not be deducted are in
    ///   `outcome.stock.failures` and left stock unchanged
    /// * `Err(DbError::Core(Validation))` - bad draft, nothing written
    pub async fn create(&self, draft: WorkorderDraft, doctor: &Actor) -> DbResult<WorkorderOutcome> {
        validate_workorder_draft(&draft)?;

        let WorkorderDraft {
            patient,
            mut medicines,
            diagnosis,
        } = draft;
        refresh_patterns(&mut medicines);
        let plan = plan_deductions(&medicines)?;

        debug!(
            patient_id = %patient.id,
            lines = medicines.len(),
            deductions = plan.adjustments.len(),
            "Creating workorder"
        );

        let mut tx = begin_write(&self.pool).await?;

        let order_id = next_order_id(&mut tx).await?;
        let (stock, applied) = apply_deductions(&mut tx, &plan, self.max_retries).await?;

        let workorder = Workorder {
            id: Uuid::new_v4().to_string(),
            order_id,
            patient,
            medicines,
            diagnosis: diagnosis.trim().to_string(),
            doctor: DoctorSnapshot::from(doctor),
            deductions: settle_deductions(&[], &stock),
            created_at: Utc::now(),
            updated_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO workorders (
                id, order_id, patient_id, patient_json, medicines_json,
                diagnosis, doctor_json, deductions_json, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&workorder.id)
        .bind(workorder.order_id)
        .bind(&workorder.patient.id)
        .bind(serde_json::to_string(&workorder.patient)?)
        .bind(serde_json::to_string(&workorder.medicines)?)
        .bind(&workorder.diagnosis)
        .bind(serde_json::to_string(&workorder.doctor)?)
        .bind(serde_json::to_string(&workorder.deductions)?)
        .bind(workorder.created_at)
        .bind(workorder.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            workorder_id = %workorder.id,
            order_id,
            applied = stock.applied.len(),
            failed = stock.failures.len(),
            "Workorder created"
        );

        let warnings = self.log_deductions(&applied, order_id, doctor).await;

        self.feed.notify(Collection::Workorders, &workorder.id, ChangeKind::Created);
        self.notify_stock(&applied);

        Ok(WorkorderOutcome {
            workorder,
            stock,
            warnings,
        })
    }

    /// Replaces a prescription's lines and diagnosis.
    ///
    /// Stock moves by the net difference per medicine between what the
    /// workorder holds and the new lines: raising a dose deducts the extra
    /// units, dropping a line returns what it deducted. A line that never
    /// got its stock is attempted again in full.
    pub async fn update(
        &self,
        id: &str,
        draft: WorkorderDraft,
        actor: &Actor,
    ) -> DbResult<WorkorderOutcome> {
        validate_workorder_draft(&draft)?;

        let WorkorderDraft {
            patient,
            mut medicines,
            diagnosis,
        } = draft;
        refresh_patterns(&mut medicines);

        let mut tx = begin_write(&self.pool).await?;

        let sql = format!("SELECT {WORKORDER_COLUMNS} FROM workorders WHERE id = ?1");
        let existing: Workorder = sqlx::query_as::<_, WorkorderRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("Workorder", id))?
            .try_into()?;

        let plan = plan_revision(&existing.deductions, &medicines)?;
        debug!(
            workorder_id = %id,
            adjustments = plan.adjustments.len(),
            "Updating workorder"
        );

        let (stock, applied) = apply_deductions(&mut tx, &plan, self.max_retries).await?;

        let workorder = Workorder {
            patient,
            medicines,
            diagnosis: diagnosis.trim().to_string(),
            deductions: settle_deductions(&existing.deductions, &stock),
            updated_at: Some(Utc::now()),
            ..existing
        };

        sqlx::query(
            r#"
            UPDATE workorders SET
                patient_id = ?2,
                patient_json = ?3,
                medicines_json = ?4,
                diagnosis = ?5,
                deductions_json = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&workorder.patient.id)
        .bind(serde_json::to_string(&workorder.patient)?)
        .bind(serde_json::to_string(&workorder.medicines)?)
        .bind(&workorder.diagnosis)
        .bind(serde_json::to_string(&workorder.deductions)?)
        .bind(workorder.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            workorder_id = %id,
            order_id = workorder.order_id,
            applied = stock.applied.len(),
            failed = stock.failures.len(),
            "Workorder updated"
        );

        let warnings = self.log_deductions(&applied, workorder.order_id, actor).await;

        self.feed.notify(Collection::Workorders, id, ChangeKind::Updated);
        self.notify_stock(&applied);

        Ok(WorkorderOutcome {
            workorder,
            stock,
            warnings,
        })
    }

    /// Removes a workorder. Stock already deducted stays deducted.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM workorders WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Workorder", id));
        }

        info!(workorder_id = %id, "Workorder deleted");
        self.feed.notify(Collection::Workorders, id, ChangeKind::Deleted);
        Ok(())
    }

    async fn log_deductions(
        &self,
        applied: &[(InventoryRecord, StockMovement)],
        order_id: i64,
        actor: &Actor,
    ) -> Vec<LedgerWarning> {
        let details = serde_json::json!({ "order_id": order_id }).to_string();
        let entries: Vec<StockAdjustmentLogEntry> = applied
            .iter()
            .map(|(record, movement)| StockAdjustmentLogEntry {
                details: Some(details.clone()),
                ..log_entry(record, movement, AdjustmentReason::Prescription, actor)
            })
            .collect();

        let warnings = append_logs(&self.pool, &entries).await;
        for entry in &entries {
            self.feed.notify(Collection::InventoryLogs, &entry.id, ChangeKind::Created);
        }
        warnings
    }

    fn notify_stock(&self, applied: &[(InventoryRecord, StockMovement)]) {
        for (record, _) in applied {
            self.feed.notify(Collection::Inventory, &record.id, ChangeKind::Updated);
        }
    }
}

/// Bumps the order counter inside the caller's transaction.
async fn next_order_id(conn: &mut SqliteConnection) -> DbResult<i64> {
    let order_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO counters (name, current) VALUES (?1, ?2)
        ON CONFLICT(name) DO UPDATE SET current = current + 1
        RETURNING current
        "#,
    )
    .bind(ORDER_COUNTER)
    .bind(FIRST_ORDER_ID)
    .fetch_one(&mut *conn)
    .await?;

    Ok(order_id)
}

/// Attempts every planned adjustment independently.
///
/// Rule violations and missing records become report failures; anything
/// else (I/O, retries exhausted) aborts the caller's transaction.
async fn apply_deductions(
    conn: &mut SqliteConnection,
    plan: &DeductionPlan,
    max_retries: u32,
) -> DbResult<(PrescriptionStockReport, Vec<(InventoryRecord, StockMovement)>)> {
    let mut report = PrescriptionStockReport::for_plan(plan);
    let mut applied = Vec::new();

    for adjustment in &plan.adjustments {
        let Some(record) = fetch_active_for_medicine(conn, &adjustment.medicine_id).await? else {
            warn!(medicine_id = %adjustment.medicine_id, "No inventory record for prescribed medicine");
            report.record(
                adjustment,
                None,
                Err(CoreError::InventoryNotFound(adjustment.medicine_id.clone())),
            );
            continue;
        };

        let result = versioned_update(conn, &record.id, max_retries, |rec| {
            ledger::apply_delta(rec, adjustment.delta)
        })
        .await;

        match result {
            Ok((stored, movement)) => {
                report.record(adjustment, Some(&stored.id), Ok(movement));
                applied.push((stored, movement));
            }
            Err(DbError::Core(err)) => {
                warn!(
                    inventory_id = %record.id,
                    delta = adjustment.delta,
                    error = %err,
                    "Prescription line not applied"
                );
                report.record(adjustment, Some(&record.id), Err(err));
            }
            Err(e) => return Err(e),
        }
    }

    Ok((report, applied))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use clinic_core::prescription::DeductionFailureKind;
    use clinic_core::{Frequency, MedicineMetadata, PatientSnapshot, PrescriptionLine};

    struct Fixture {
        db: Database,
        medicine_id: String,
        inventory_id: String,
    }

    async fn setup(stock: i64) -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let created = db
            .medicines()
            .create(
                &MedicineMetadata {
                    name: "Amoxicillin".to_string(),
                    strength: "500mg".to_string(),
                    dosage_form: "Capsule".to_string(),
                    category: "Antibiotic".to_string(),
                },
                stock,
                &Actor::system(),
            )
            .await
            .unwrap();

        Fixture {
            db,
            medicine_id: created.medicine.id,
            inventory_id: created.inventory.id,
        }
    }

    fn line(medicine_id: &str, dosage_count: u32, duration_days: u32) -> PrescriptionLine {
        PrescriptionLine {
            medicine_id: medicine_id.to_string(),
            name: "Amoxicillin".to_string(),
            strength: "500mg".to_string(),
            dosage_count,
            dosage_form: "Capsule".to_string(),
            frequency: Frequency::TwiceDaily,
            duration_days,
            pattern: String::new(),
            instructions: "After food".to_string(),
        }
    }

    fn draft(lines: Vec<PrescriptionLine>) -> WorkorderDraft {
        WorkorderDraft {
            patient: PatientSnapshot {
                id: "patient-1".to_string(),
                name: "Asha Menon".to_string(),
                age: Some(42),
                sex: "F".to_string(),
                address: "12 Lake Road".to_string(),
                phone: String::new(),
            },
            medicines: lines,
            diagnosis: "Tonsillitis".to_string(),
        }
    }

    fn doctor() -> Actor {
        Actor::new("uid-7", "Dr. Rao", "rao@clinic.test")
    }

    #[tokio::test]
    async fn test_insufficient_stock_is_reported_and_unchanged() {
        let fx = setup(10).await;

        let outcome = fx
            .db
            .workorders()
            .create(draft(vec![line(&fx.medicine_id, 2, 5)]), &doctor())
            .await
            .unwrap();

        assert!(!outcome.stock.is_complete());
        assert_eq!(
            outcome.stock.failures[0].failure,
            DeductionFailureKind::InsufficientStock {
                current: 10,
                requested: 20
            }
        );

        let inv = fx.db.inventory().get_by_id(&fx.inventory_id).await.unwrap().unwrap();
        assert_eq!(inv.current_stock, 10);
        assert!(fx.db.inventory().logs_for(&fx.inventory_id).await.unwrap().is_empty());

        // The workorder itself is still saved
        assert!(fx.db.workorders().get_by_id(&outcome.workorder.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_deduction_and_audit_entry() {
        let fx = setup(30).await;

        let outcome = fx
            .db
            .workorders()
            .create(draft(vec![line(&fx.medicine_id, 2, 5)]), &doctor())
            .await
            .unwrap();

        assert!(outcome.stock.is_complete());
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.workorder.medicines[0].pattern, "2--x--2");

        let inv = fx.db.inventory().get_by_id(&fx.inventory_id).await.unwrap().unwrap();
        assert_eq!(inv.current_stock, 10);

        let logs = fx.db.inventory().logs_for(&fx.inventory_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].change, -20);
        assert_eq!(logs[0].old_stock, 30);
        assert_eq!(logs[0].new_stock, 10);
        assert_eq!(logs[0].reason, AdjustmentReason::Prescription);
        assert_eq!(logs[0].user_name, "Dr. Rao");
        assert!(logs[0].details.as_deref().unwrap().contains("1000"));
    }

    #[tokio::test]
    async fn test_order_ids_are_sequential() {
        let fx = setup(100).await;
        let repo = fx.db.workorders();

        let first = repo.create(draft(vec![line(&fx.medicine_id, 1, 1)]), &doctor()).await.unwrap();
        let second = repo.create(draft(vec![line(&fx.medicine_id, 1, 1)]), &doctor()).await.unwrap();

        assert_eq!(first.workorder.order_id, FIRST_ORDER_ID);
        assert_eq!(second.workorder.order_id, FIRST_ORDER_ID + 1);

        let found = repo.get_by_order_id(FIRST_ORDER_ID + 1).await.unwrap().unwrap();
        assert_eq!(found.id, second.workorder.id);

        let recent = repo.list_recent(10).await.unwrap();
        assert_eq!(recent[0].order_id, FIRST_ORDER_ID + 1);
        assert_eq!(repo.list_for_patient("patient-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_lines_fail_independently() {
        let fx = setup(30).await;

        let outcome = fx
            .db
            .workorders()
            .create(
                draft(vec![line("unknown-medicine", 1, 1), line(&fx.medicine_id, 1, 5)]),
                &doctor(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.stock.failures.len(), 1);
        assert_eq!(outcome.stock.failures[0].failure, DeductionFailureKind::InventoryMissing);
        assert_eq!(outcome.stock.applied.len(), 1);
        assert_eq!(outcome.stock.applied[0].movement.new_stock, 20);
    }

    #[tokio::test]
    async fn test_zero_duration_line_is_skipped() {
        let fx = setup(30).await;

        let outcome = fx
            .db
            .workorders()
            .create(draft(vec![line(&fx.medicine_id, 1, 0)]), &doctor())
            .await
            .unwrap();

        assert_eq!(outcome.stock.skipped_lines, vec![0]);
        assert!(outcome.stock.applied.is_empty());
        let inv = fx.db.inventory().get_by_id(&fx.inventory_id).await.unwrap().unwrap();
        assert_eq!(inv.current_stock, 30);
    }

    #[tokio::test]
    async fn test_invalid_draft_writes_nothing() {
        let fx = setup(30).await;

        let err = fx.db.workorders().create(draft(vec![]), &doctor()).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::Validation(_))));
        assert!(fx.db.workorders().list_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_applies_net_difference() {
        let fx = setup(30).await;
        let repo = fx.db.workorders();

        // 1 × twice daily × 5 = 10
        let created = repo.create(draft(vec![line(&fx.medicine_id, 1, 5)]), &doctor()).await.unwrap();
        assert_eq!(created.stock.applied[0].movement.new_stock, 20);

        // 2 × twice daily × 5 = 20, so 10 more
        let updated = repo
            .update(&created.workorder.id, draft(vec![line(&fx.medicine_id, 2, 5)]), &doctor())
            .await
            .unwrap();
        assert_eq!(updated.workorder.order_id, created.workorder.order_id);
        assert!(updated.workorder.updated_at.is_some());
        assert_eq!(updated.stock.applied[0].movement.change, -10);

        let inv = fx.db.inventory().get_by_id(&fx.inventory_id).await.unwrap().unwrap();
        assert_eq!(inv.current_stock, 10);

        // Same lines again: nothing to apply
        let unchanged = repo
            .update(&created.workorder.id, draft(vec![line(&fx.medicine_id, 2, 5)]), &doctor())
            .await
            .unwrap();
        assert!(unchanged.stock.applied.is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let fx = setup(30).await;
        let repo = fx.db.workorders();
        let created = repo.create(draft(vec![line(&fx.medicine_id, 1, 1)]), &doctor()).await.unwrap();

        repo.delete(&created.workorder.id).await.unwrap();
        assert!(repo.get_by_id(&created.workorder.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete(&created.workorder.id).await.unwrap_err(),
            DbError::NotFound { .. }
        ));

        // Deleting does not give stock back
        let inv = fx.db.inventory().get_by_id(&fx.inventory_id).await.unwrap().unwrap();
        assert_eq!(inv.current_stock, 28);
    }

    #[tokio::test]
    async fn test_failed_line_edited_down_deducts_only_new_amount() {
        let fx = setup(10).await;
        let repo = fx.db.workorders();

        // 2 × twice daily × 5 = 20 against stock 10: fails, nothing held
        let created = repo.create(draft(vec![line(&fx.medicine_id, 2, 5)]), &doctor()).await.unwrap();
        assert_eq!(created.stock.failures.len(), 1);
        assert!(created.workorder.deductions.is_empty());

        // 1 × twice daily × 5 = 10: deducted in full, nothing handed back
        let updated = repo
            .update(&created.workorder.id, draft(vec![line(&fx.medicine_id, 1, 5)]), &doctor())
            .await
            .unwrap();
        assert_eq!(
            updated.stock.applied[0].movement,
            StockMovement {
                old_stock: 10,
                new_stock: 0,
                change: -10
            }
        );
        assert_eq!(updated.workorder.deductions[0].units, 10);

        let inv = fx.db.inventory().get_by_id(&fx.inventory_id).await.unwrap().unwrap();
        assert_eq!(inv.current_stock, 0);

        let stored = repo.get_by_id(&created.workorder.id).await.unwrap().unwrap();
        assert_eq!(stored.deductions, updated.workorder.deductions);
    }

    #[tokio::test]
    async fn test_removing_failed_line_returns_nothing() {
        let fx = setup(10).await;
        let repo = fx.db.workorders();

        let created = repo.create(draft(vec![line(&fx.medicine_id, 2, 5)]), &doctor()).await.unwrap();
        assert!(!created.stock.is_complete());

        let other = line("unknown-medicine", 1, 0);
        let updated = repo
            .update(&created.workorder.id, draft(vec![other]), &doctor())
            .await
            .unwrap();
        assert!(updated.stock.applied.is_empty());

        let inv = fx.db.inventory().get_by_id(&fx.inventory_id).await.unwrap().unwrap();
        assert_eq!(inv.current_stock, 10);
    }

    #[tokio::test]
    async fn test_dropping_line_returns_what_it_deducted() {
        let fx = setup(30).await;
        let repo = fx.db.workorders();

        let created = repo.create(draft(vec![line(&fx.medicine_id, 1, 5)]), &doctor()).await.unwrap();
        assert_eq!(created.workorder.deductions[0].units, 10);

        let updated = repo
            .update(&created.workorder.id, draft(vec![line("unknown-medicine", 1, 0)]), &doctor())
            .await
            .unwrap();
        assert_eq!(updated.stock.applied[0].movement.change, 10);
        assert!(updated.workorder.deductions.is_empty());

        let inv = fx.db.inventory().get_by_id(&fx.inventory_id).await.unwrap().unwrap();
        assert_eq!(inv.current_stock, 30);
    }
}
