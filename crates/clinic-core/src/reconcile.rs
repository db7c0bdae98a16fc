//! # Inventory Reconciliation
//!
//! Finds and repairs drift between the medicine catalog and inventory.
//!
//! ## What Can Drift
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Catalog ↔ Inventory                                │
//! │                                                                         │
//! │  medicines                         inventory                            │
//! │  ┌──────────────────┐              ┌──────────────────┐                │
//! │  │ id: M1           │◄─────────────│ medicine_id: M1  │  ok            │
//! │  │ name: Cetirizine │   mismatch   │ name: Cetrizine  │  ◄─ repairable │
//! │  └──────────────────┘              └──────────────────┘                │
//! │                                    ┌──────────────────┐                │
//! │                      ◄─────────────│ medicine_id: M1  │  duplicate     │
//! │                                    └──────────────────┘  ◄─ mergeable  │
//! │  ┌──────────────────┐                                                   │
//! │  │ id: M2           │   (no inventory)       missing inventory ref     │
//! │  └──────────────────┘                                                   │
//! │                                    ┌──────────────────┐                │
//! │                 (no catalog) ◄─────│ medicine_id: M9  │  missing       │
//! │                                    └──────────────────┘  catalog ref   │
//! │                                                                         │
//! │  Missing refs are warnings only. Nothing here guesses a fix for them.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Deleted records on either side are ignored.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ReferentialIntegrityWarning;
use crate::types::{InventoryRecord, MedicineCatalogEntry, MedicineMetadata, PurchaseBatch};

// =============================================================================
// Report Types
// =============================================================================

/// A metadata field compared between catalog and inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    Name,
    Strength,
    DosageForm,
    Category,
}

/// An inventory record whose metadata copy differs from its catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MetadataMismatch {
    pub medicine_id: String,
    pub inventory_id: String,
    pub catalog: MedicineMetadata,
    pub inventory: MedicineMetadata,
    pub fields: Vec<MetadataField>,
}

/// Several active inventory records pointing at one medicine.
///
/// `inventory_ids` is oldest first; the first id is the merge target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DuplicateGroup {
    pub medicine_id: String,
    pub inventory_ids: Vec<String>,
}

/// Everything `diff` found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReconciliationReport {
    pub medicine_count: usize,
    pub inventory_count: usize,
    pub missing_catalog_ref: Vec<ReferentialIntegrityWarning>,
    pub missing_inventory_ref: Vec<ReferentialIntegrityWarning>,
    pub metadata_mismatch: Vec<MetadataMismatch>,
    pub duplicates: Vec<DuplicateGroup>,
}

impl ReconciliationReport {
    /// All referential findings in one list.
    pub fn warnings(&self) -> Vec<ReferentialIntegrityWarning> {
        self.missing_catalog_ref
            .iter()
            .chain(self.missing_inventory_ref.iter())
            .cloned()
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.missing_catalog_ref.is_empty()
            && self.missing_inventory_ref.is_empty()
            && self.metadata_mismatch.is_empty()
            && self.duplicates.is_empty()
    }
}

// =============================================================================
// Diff
// =============================================================================

/// Fields that differ between two metadata sets.
pub fn mismatched_fields(catalog: &MedicineMetadata, inventory: &MedicineMetadata) -> Vec<MetadataField> {
    let mut fields = Vec::new();
    if catalog.name != inventory.name {
        fields.push(MetadataField::Name);
    }
    if catalog.strength != inventory.strength {
        fields.push(MetadataField::Strength);
    }
    if catalog.dosage_form != inventory.dosage_form {
        fields.push(MetadataField::DosageForm);
    }
    if catalog.category != inventory.category {
        fields.push(MetadataField::Category);
    }
    fields
}

/// Orders inventory records oldest first, ties broken by id.
fn oldest_first(a: &&InventoryRecord, b: &&InventoryRecord) -> std::cmp::Ordering {
    a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
}

/// Compares the catalog against inventory.
///
/// Report lists follow the order of the input slices.
pub fn diff(catalog: &[MedicineCatalogEntry], inventory: &[InventoryRecord]) -> ReconciliationReport {
    let medicines: Vec<&MedicineCatalogEntry> = catalog.iter().filter(|m| !m.is_deleted).collect();
    let records: Vec<&InventoryRecord> = inventory.iter().filter(|r| !r.is_deleted).collect();

    let by_id: HashMap<&str, &MedicineCatalogEntry> =
        medicines.iter().copied().map(|m| (m.id.as_str(), m)).collect();

    let mut by_medicine: HashMap<&str, Vec<&InventoryRecord>> = HashMap::new();
    let mut medicine_order: Vec<&str> = Vec::new();
    for record in records.iter().copied() {
        let group = by_medicine.entry(record.medicine_id.as_str()).or_default();
        if group.is_empty() {
            medicine_order.push(record.medicine_id.as_str());
        }
        group.push(record);
    }

    let mut report = ReconciliationReport {
        medicine_count: medicines.len(),
        inventory_count: records.len(),
        ..Default::default()
    };

    for record in records.iter().copied() {
        match by_id.get(record.medicine_id.as_str()) {
            None => report
                .missing_catalog_ref
                .push(ReferentialIntegrityWarning::MissingCatalogRef {
                    inventory_id: record.id.clone(),
                    medicine_id: record.medicine_id.clone(),
                }),
            Some(medicine) => {
                let catalog_meta = medicine.metadata();
                let inventory_meta = record.metadata();
                let fields = mismatched_fields(&catalog_meta, &inventory_meta);
                if !fields.is_empty() {
                    report.metadata_mismatch.push(MetadataMismatch {
                        medicine_id: medicine.id.clone(),
                        inventory_id: record.id.clone(),
                        catalog: catalog_meta,
                        inventory: inventory_meta,
                        fields,
                    });
                }
            }
        }
    }

    for medicine in medicines.iter().copied() {
        if !by_medicine.contains_key(medicine.id.as_str()) {
            report
                .missing_inventory_ref
                .push(ReferentialIntegrityWarning::MissingInventoryRef {
                    medicine_id: medicine.id.clone(),
                    name: medicine.name.clone(),
                });
        }
    }

    for medicine_id in medicine_order {
        let Some(group) = by_medicine.get(medicine_id) else {
            continue;
        };
        if group.len() < 2 {
            continue;
        }
        let mut sorted = group.clone();
        sorted.sort_by(oldest_first);
        report.duplicates.push(DuplicateGroup {
            medicine_id: medicine_id.to_string(),
            inventory_ids: sorted.iter().map(|r| r.id.clone()).collect(),
        });
    }

    report
}

// =============================================================================
// Metadata Repair
// =============================================================================

/// Copies catalog metadata onto an inventory record.
///
/// Returns the previous metadata when something changed, `None` when the
/// record already matched.
pub fn sync_metadata(catalog: &MedicineCatalogEntry, record: &mut InventoryRecord) -> Option<MedicineMetadata> {
    let wanted = catalog.metadata();
    let previous = record.metadata();
    if wanted == previous {
        return None;
    }
    record.set_metadata(&wanted);
    Some(previous)
}

/// Repairs every mismatched inventory record in place.
///
/// Returns how many records were written. A second run returns zero.
pub fn reconcile_metadata(catalog: &[MedicineCatalogEntry], inventory: &mut [InventoryRecord]) -> usize {
    let by_id: HashMap<&str, &MedicineCatalogEntry> = catalog
        .iter()
        .filter(|m| !m.is_deleted)
        .map(|m| (m.id.as_str(), m))
        .collect();

    inventory
        .iter_mut()
        .filter(|r| !r.is_deleted)
        .filter_map(|record| {
            let medicine = by_id.get(record.medicine_id.as_str())?;
            sync_metadata(medicine, record)
        })
        .count()
}

// =============================================================================
// Duplicate Merge
// =============================================================================

/// How a duplicate group collapses into one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MergePlan {
    pub medicine_id: String,
    pub canonical_id: String,
    pub removed_ids: Vec<String>,
    /// Stock of the canonical record before the merge.
    pub canonical_stock: i64,
    pub current_stock: i64,
    pub opening_stock: i64,
    #[ts(as = "Option<String>")]
    pub next_expiry_date: Option<NaiveDate>,
}

impl MergePlan {
    /// Units the canonical record gains.
    pub fn absorbed_stock(&self) -> i64 {
        self.current_stock - self.canonical_stock
    }
}

/// Plans the merge of a duplicate group.
///
/// The oldest record survives and takes the summed stock. Its next expiry
/// becomes the earliest date on or after `today` among every purchase batch
/// of the medicine, whichever record it was booked against. The records'
/// stored expiry dates are not consulted. Returns `None` for fewer than two
/// records.
pub fn plan_merge(group: &[InventoryRecord], batches: &[PurchaseBatch], today: NaiveDate) -> Option<MergePlan> {
    if group.len() < 2 {
        return None;
    }

    let mut sorted: Vec<&InventoryRecord> = group.iter().collect();
    sorted.sort_by(oldest_first);
    let canonical = sorted[0];

    let next_expiry_date = batches
        .iter()
        .filter(|b| b.medicine_id == canonical.medicine_id)
        .map(|b| b.expiry_date)
        .filter(|date| *date >= today)
        .min();

    Some(MergePlan {
        medicine_id: canonical.medicine_id.clone(),
        canonical_id: canonical.id.clone(),
        removed_ids: sorted[1..].iter().map(|r| r.id.clone()).collect(),
        canonical_stock: canonical.current_stock,
        current_stock: sorted.iter().map(|r| r.current_stock).sum(),
        opening_stock: sorted.iter().map(|r| r.opening_stock).sum(),
        next_expiry_date,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
