//! # Seed Data Generator
//!
//! Populates the database with a development medicine catalog.
//!
//! ## Usage
//! ```bash
//! # Seed every known medicine (default)
//! cargo run -p clinic-db --bin seed
//!
//! # Seed the first 10 only
//! cargo run -p clinic-db --bin seed -- --count 10
//!
//! # Specify database path
//! cargo run -p clinic-db --bin seed -- --db ./data/clinic.db
//! ```
//!
//! Each medicine gets an inventory record with an opening stock and one
//! purchase batch, so the inventory screen shows expiry data right away.
//! Without `--db` the path comes from `clinic.toml` / `CLINIC_DB_PATH`.

use std::env;
use std::path::PathBuf;

use chrono::{Duration, Utc};
use clinic_core::{Actor, MedicineMetadata, PurchaseRequest};
use clinic_db::{ClinicConfig, Database};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// (name, strength, form, category)
const MEDICINES: &[(&str, &str, &str, &str)] = &[
    ("Paracetamol", "500mg", "Tablet", "Analgesic / Pain Relief"),
    ("Ibuprofen", "400mg", "Tablet", "Analgesic / Pain Relief"),
    ("Diclofenac", "50mg", "Tablet", "Analgesic / Pain Relief"),
    ("Amoxicillin", "500mg", "Capsule", "Antibiotic"),
    ("Azithromycin", "500mg", "Tablet", "Antibiotic"),
    ("Ciprofloxacin", "500mg", "Tablet", "Antibiotic"),
    ("Doxycycline", "100mg", "Capsule", "Antibiotic"),
    ("Cetirizine", "10mg", "Tablet", "Antihistamine"),
    ("Loratadine", "10mg", "Tablet", "Antihistamine"),
    ("Chlorpheniramine", "4mg", "Tablet", "Antihistamine"),
    ("Omeprazole", "20mg", "Capsule", "Gastrointestinal"),
    ("Pantoprazole", "40mg", "Tablet", "Gastrointestinal"),
    ("Ondansetron", "4mg", "Tablet", "Gastrointestinal"),
    ("Metformin", "500mg", "Tablet", "Antidiabetic"),
    ("Glimepiride", "2mg", "Tablet", "Antidiabetic"),
    ("Amlodipine", "5mg", "Tablet", "Cardiovascular"),
    ("Atorvastatin", "10mg", "Tablet", "Cardiovascular"),
    ("Losartan", "50mg", "Tablet", "Cardiovascular"),
    ("Salbutamol", "100mcg", "Inhaler", "Respiratory"),
    ("Ambroxol", "30mg/5ml", "Syrup", "Respiratory"),
    ("Oral Rehydration Salts", "20.5g", "Sachet", "Electrolyte"),
    ("Vitamin D3", "60000IU", "Capsule", "Supplement"),
    ("Folic Acid", "5mg", "Tablet", "Supplement"),
    ("Clotrimazole", "1%", "Cream", "Antifungal"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = MEDICINES.len();
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(MEDICINES.len());
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Clinic Ledger Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of medicines to add (default: {})", MEDICINES.len());
                println!("  -d, --db <PATH>    Database file path (default: from clinic.toml)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = ClinicConfig::load_or_default(None);
    if let Some(path) = db_path {
        config.database.path = path;
    }

    info!(path = %config.database.path.display(), count, "Seeding clinic database");

    let db = Database::new(config.db_config()).await?;

    let existing = db.inventory().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has inventory, skipping seed");
        return Ok(());
    }

    let actor = Actor::system();
    let today = Utc::now().date_naive();
    let start = std::time::Instant::now();
    let mut seeded = 0;

    for (index, (name, strength, form, category)) in MEDICINES.iter().take(count).enumerate() {
        let metadata = MedicineMetadata {
            name: name.to_string(),
            strength: strength.to_string(),
            dosage_form: form.to_string(),
            category: category.to_string(),
        };

        // Every fifth medicine starts empty so low-stock views have data
        let opening_stock = if index % 5 == 4 { 0 } else { 20 + (index as i64 * 7) % 60 };

        let created = match db.medicines().create(&metadata, opening_stock, &actor).await {
            Ok(created) => created,
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to add medicine");
                continue;
            }
        };

        let purchase = PurchaseRequest {
            quantity: 50 + (index as i64 * 13) % 100,
            batch_number: format!("B{:04}", 1000 + index),
            expiry_date: Some(today + Duration::days(15 + (index as i64 * 45) % 720)),
            supplier_name: "Central Medical Stores".to_string(),
            invoice_number: format!("INV-{:05}", index + 1),
        };
        if let Err(e) = db
            .inventory()
            .record_purchase(&created.inventory.id, &purchase, &actor)
            .await
        {
            warn!(name = %name, error = %e, "Failed to record purchase");
        }

        seeded += 1;
    }

    let summary = db.inventory().summary(today, &config.stock).await?;
    info!(
        seeded,
        elapsed = ?start.elapsed(),
        low_stock = summary.low_stock,
        near_expiry = summary.near_expiry,
        "Seed complete"
    );

    Ok(())
}
