//! # Patient Repository
//!
//! Patient registration and lookup. Patients are soft-deleted so that
//! prescriptions written for them keep resolving.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use clinic_core::validation::validate_patient;
use clinic_core::{Actor, Patient, PatientDetails};

use crate::error::{DbError, DbResult};
use crate::events::{ChangeFeed, ChangeKind, Collection};
use crate::repository::inventory::like_pattern;

const PATIENT_COLUMNS: &str = "id, name, age, sex, address, phone, email, blood_group, allergies, \
     medical_history, date_of_birth, created_by, is_deleted, deleted_at, created_at, updated_at";

/// Repository for patient operations.
#[derive(Debug, Clone)]
pub struct PatientRepository {
    pool: SqlitePool,
    feed: ChangeFeed,
}

impl PatientRepository {
    /// Creates a new PatientRepository.
    pub fn new(pool: SqlitePool, feed: ChangeFeed) -> Self {
        PatientRepository { pool, feed }
    }

    /// Gets a patient by ID (deleted patients included).
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Patient>> {
        let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1");
        let patient = sqlx::query_as::<_, Patient>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(patient)
    }

    /// Lists active patients, most recently registered first.
    pub async fn list_active(&self) -> DbResult<Vec<Patient>> {
        let sql = format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE is_deleted = 0 ORDER BY created_at DESC, id"
        );
        let patients = sqlx::query_as::<_, Patient>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(patients)
    }

    /// Case-insensitive search on name and phone.
    pub async fn search(&self, term: &str) -> DbResult<Vec<Patient>> {
        let term = term.trim();
        if term.is_empty() {
            return self.list_active().await;
        }

        let sql = format!(
            "SELECT {PATIENT_COLUMNS} FROM patients \
             WHERE is_deleted = 0 \
             AND (LOWER(name) LIKE ?1 ESCAPE '\\' OR phone LIKE ?1 ESCAPE '\\') \
             ORDER BY name COLLATE NOCASE, id"
        );
        let patients = sqlx::query_as::<_, Patient>(&sql)
            .bind(like_pattern(&term.to_lowercase()))
            .fetch_all(&self.pool)
            .await?;
        Ok(patients)
    }

    /// Registers a patient.
    pub async fn create(&self, details: &PatientDetails, actor: &Actor) -> DbResult<Patient> {
        validate_patient(details)?;

        let now = Utc::now();
        let mut patient = Patient {
            id: Uuid::new_v4().to_string(),
            name: String::new(),
            age: None,
            sex: String::new(),
            address: String::new(),
            phone: String::new(),
            email: String::new(),
            blood_group: String::new(),
            allergies: String::new(),
            medical_history: String::new(),
            date_of_birth: None,
            created_by: actor.id.clone(),
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        apply_details(&mut patient, details);

        debug!(id = %patient.id, "Creating patient");

        sqlx::query(
            r#"
            INSERT INTO patients (
                id, name, age, sex, address, phone, email, blood_group,
                allergies, medical_history, date_of_birth, created_by,
                is_deleted, deleted_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&patient.id)
        .bind(&patient.name)
        .bind(patient.age)
        .bind(&patient.sex)
        .bind(&patient.address)
        .bind(&patient.phone)
        .bind(&patient.email)
        .bind(&patient.blood_group)
        .bind(&patient.allergies)
        .bind(&patient.medical_history)
        .bind(patient.date_of_birth)
        .bind(&patient.created_by)
        .bind(patient.is_deleted)
        .bind(patient.deleted_at)
        .bind(patient.created_at)
        .bind(patient.updated_at)
        .execute(&self.pool)
        .await?;

        info!(id = %patient.id, "Patient created");
        self.feed.notify(Collection::Patients, &patient.id, ChangeKind::Created);

        Ok(patient)
    }

    /// Replaces a patient's editable fields.
    ///
    /// Existing prescriptions keep their own snapshot.
    pub async fn update(&self, id: &str, details: &PatientDetails) -> DbResult<Patient> {
        validate_patient(details)?;

        let mut patient = self
            .get_by_id(id)
            .await?
            .filter(|p| !p.is_deleted)
            .ok_or_else(|| DbError::not_found("Patient", id))?;

        apply_details(&mut patient, details);
        patient.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE patients SET
                name = ?2, age = ?3, sex = ?4, address = ?5, phone = ?6,
                email = ?7, blood_group = ?8, allergies = ?9,
                medical_history = ?10, date_of_birth = ?11, updated_at = ?12
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&patient.name)
        .bind(patient.age)
        .bind(&patient.sex)
        .bind(&patient.address)
        .bind(&patient.phone)
        .bind(&patient.email)
        .bind(&patient.blood_group)
        .bind(&patient.allergies)
        .bind(&patient.medical_history)
        .bind(patient.date_of_birth)
        .bind(patient.updated_at)
        .execute(&self.pool)
        .await?;

        self.feed.notify(Collection::Patients, id, ChangeKind::Updated);
        Ok(patient)
    }

    /// Marks a patient deleted.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE patients SET is_deleted = 1, deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND is_deleted = 0",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Patient", id));
        }

        info!(id = %id, "Patient deleted");
        self.feed.notify(Collection::Patients, id, ChangeKind::Deleted);
        Ok(())
    }
}

fn apply_details(patient: &mut Patient, details: &PatientDetails) {
    patient.name = details.name.trim().to_string();
    patient.age = details.age;
    patient.sex = details.sex.trim().to_string();
    patient.address = details.address.trim().to_string();
    patient.phone = details.phone.trim().to_string();
    patient.email = details.email.trim().to_string();
    patient.blood_group = details.blood_group.trim().to_string();
    patient.allergies = details.allergies.trim().to_string();
    patient.medical_history = details.medical_history.trim().to_string();
    patient.date_of_birth = details.date_of_birth;
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn details(name: &str, phone: &str) -> PatientDetails {
        PatientDetails {
            name: name.to_string(),
            age: Some(42),
            sex: "F".to_string(),
            address: "12 Lake Road".to_string(),
            phone: phone.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let actor = Actor::new("uid-1", "Dr. Rao", "rao@clinic.test");

        let patient = db
            .patients()
            .create(&details(" Asha Menon ", "98450 12345"), &actor)
            .await
            .unwrap();
        assert_eq!(patient.name, "Asha Menon");
        assert_eq!(patient.created_by.as_deref(), Some("uid-1"));

        let loaded = db.patients().get_by_id(&patient.id).await.unwrap().unwrap();
        assert_eq!(loaded, patient);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_details() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut bad = details("Asha", "");
        bad.address = String::new();

        assert!(db.patients().create(&bad, &Actor::system()).await.is_err());
        assert!(db.patients().list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_search() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.patients();
        let asha = repo.create(&details("Asha Menon", "98450 12345"), &Actor::system()).await.unwrap();
        repo.create(&details("Ravi Kumar", "90000 11111"), &Actor::system()).await.unwrap();

        let mut edited = details("Asha Menon", "98450 12345");
        edited.allergies = "Penicillin".to_string();
        let updated = repo.update(&asha.id, &edited).await.unwrap();
        assert_eq!(updated.allergies, "Penicillin");

        assert_eq!(repo.search("asha").await.unwrap().len(), 1);
        assert_eq!(repo.search("90000").await.unwrap()[0].name, "Ravi Kumar");
    }

    #[tokio::test]
    async fn test_soft_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.patients();
        let patient = repo.create(&details("Asha", ""), &Actor::system()).await.unwrap();

        repo.soft_delete(&patient.id).await.unwrap();
        assert!(repo.list_active().await.unwrap().is_empty());
        assert!(repo.get_by_id(&patient.id).await.unwrap().unwrap().is_deleted);

        let err = repo.soft_delete(&patient.id).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
