//! # Validation Module
//!
//! Input validation for catalog, inventory, patient and prescription writes.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI forms (external)                                          │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── Business rule validation, fails closed before any write           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (current_stock >= 0)                                        │
//! │  ├── UNIQUE name_lower among active medicines                          │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::types::{MedicineMetadata, PatientDetails, PrescriptionLine, PurchaseRequest, WorkorderDraft};
use crate::{MAX_DOSAGE_COUNT, MAX_DURATION_DAYS, MAX_PATIENT_AGE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Helpers
// =============================================================================

/// Fails with `Required` when `value` is empty after trimming.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

/// Trims a medicine name and capitalises its first letter.
///
/// ## Example
/// ```rust
/// use clinic_core::validation::normalize_medicine_name;
///
/// assert_eq!(normalize_medicine_name("  paracetamol "), "Paracetamol");
/// ```
pub fn normalize_medicine_name(name: &str) -> String {
    let trimmed = name.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercased name used to detect duplicate catalog entries.
pub fn medicine_name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

// =============================================================================
// Catalog & Inventory
// =============================================================================

/// Validates the editable medicine fields.
///
/// ## Rules
/// - name, strength, dosage form, category are all required
/// - name at most 200 characters
pub fn validate_medicine_metadata(metadata: &MedicineMetadata) -> ValidationResult<()> {
    validate_required("name", &metadata.name)?;
    validate_required("strength", &metadata.strength)?;
    validate_required("dosage form", &metadata.dosage_form)?;
    validate_required("category", &metadata.category)?;

    if metadata.name.trim().chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Opening stock may be zero but never negative.
pub fn validate_opening_stock(opening_stock: i64) -> ValidationResult<()> {
    if opening_stock < 0 {
        return Err(ValidationError::OutOfRange {
            field: "opening stock".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// A manual adjustment must actually change something.
pub fn validate_stock_change(delta: i64) -> ValidationResult<()> {
    if delta == 0 {
        return Err(ValidationError::required("stock change"));
    }
    Ok(())
}

/// Validates a purchase and returns its expiry date.
///
/// ## Rules
/// ```text
/// quantity <= 0         → MustBePositive("quantity")
/// batch number blank    → Required("batch number")
/// expiry date missing   → Required("expiry date")
/// ```
pub fn validate_purchase(request: &PurchaseRequest) -> ValidationResult<NaiveDate> {
    if request.quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    validate_required("batch number", &request.batch_number)?;

    request
        .expiry_date
        .ok_or_else(|| ValidationError::required("expiry date"))
}

// =============================================================================
// Patients
// =============================================================================

/// Validates patient details for create and update.
pub fn validate_patient(details: &PatientDetails) -> ValidationResult<()> {
    validate_required("name", &details.name)?;
    validate_required("sex", &details.sex)?;
    validate_required("address", &details.address)?;

    if let Some(age) = details.age {
        if age > MAX_PATIENT_AGE {
            return Err(ValidationError::OutOfRange {
                field: "age".to_string(),
                min: 0,
                max: MAX_PATIENT_AGE as i64,
            });
        }
    }

    if !details.email.trim().is_empty() {
        validate_email(&details.email)?;
    }
    if !details.phone.trim().is_empty() {
        validate_phone(&details.phone)?;
    }

    Ok(())
}

/// Accepts `local@domain.tld` with no whitespace.
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let email = email.trim();
    let invalid = || ValidationError::InvalidFormat {
        field: "email".to_string(),
        reason: "must look like name@example.com".to_string(),
    };

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    match domain.rsplit_once('.') {
        Some((host, tld)) if !host.is_empty() && !tld.is_empty() => Ok(()),
        _ => Err(invalid()),
    }
}

/// Accepts 7 to 20 characters of digits, spaces and `+ - ( )`.
pub fn validate_phone(phone: &str) -> ValidationResult<()> {
    let phone = phone.trim();
    let len = phone.chars().count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' '));

    if !(7..=20).contains(&len) || !allowed {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "must be 7-20 digits, spaces or + - ( )".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Prescriptions
// =============================================================================

/// Validates one prescription line.
pub fn validate_prescription_line(line: &PrescriptionLine) -> ValidationResult<()> {
    validate_required("medicine", &line.medicine_id)?;

    if line.dosage_count == 0 {
        return Err(ValidationError::MustBePositive {
            field: "dosage count".to_string(),
        });
    }
    if line.dosage_count > MAX_DOSAGE_COUNT {
        return Err(ValidationError::OutOfRange {
            field: "dosage count".to_string(),
            min: 1,
            max: MAX_DOSAGE_COUNT as i64,
        });
    }
    if line.duration_days > MAX_DURATION_DAYS {
        return Err(ValidationError::OutOfRange {
            field: "duration days".to_string(),
            min: 0,
            max: MAX_DURATION_DAYS as i64,
        });
    }

    Ok(())
}

/// A prescription needs a patient and at least one medicine.
pub fn validate_workorder_draft(draft: &WorkorderDraft) -> ValidationResult<()> {
    validate_required("patient", &draft.patient.id)?;

    if draft.medicines.is_empty() {
        return Err(ValidationError::required("medicines"));
    }

    draft
        .medicines
        .iter()
        .try_for_each(validate_prescription_line)
}

// =============================================================================
// Unit Tests
// =============================================================================
