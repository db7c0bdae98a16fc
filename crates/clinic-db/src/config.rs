//! # Clinic Configuration
//!
//! Configuration management for the database layer and stock policy.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CLINIC_DB_PATH=/data/clinic.db                                     │
//! │     CLINIC_LOW_STOCK_THRESHOLD=10                                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/clinic-ledger/clinic.toml (Linux)                        │
//! │     ~/Library/Application Support/com.clinic.ledger/clinic.toml        │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "clinic.db"
//! max_connections = 5
//! connect_timeout_secs = 30
//!
//! [stock]
//! low_stock_threshold = 5
//! near_expiry_days = 30
//!
//! [ledger]
//! max_retries = 5
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clinic_core::StockPolicy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("clinic.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

// =============================================================================
// Ledger Settings
// =============================================================================

/// Stock write behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Attempts at the version-checked stock update before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    5
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            max_retries: default_max_retries(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete clinic configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinicConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Low-stock and near-expiry thresholds.
    #[serde(default)]
    pub stock: StockPolicy,

    #[serde(default)]
    pub ledger: LedgerSettings,
}

impl ClinicConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (clinic.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading clinic config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| DbError::Config(format!("{}: {}", path.display(), e)))?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load clinic config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document. Missing sections keep their defaults.
    pub fn from_toml(contents: &str) -> DbResult<Self> {
        toml::from_str(contents).map_err(|e| DbError::Config(e.to_string()))
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.database.max_connections == 0 {
            return Err(DbError::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.ledger.max_retries == 0 {
            return Err(DbError::Config("max_retries must be greater than 0".into()));
        }
        if self.stock.low_stock_threshold < 0 || self.stock.near_expiry_days < 0 {
            return Err(DbError::Config("stock thresholds must not be negative".into()));
        }
        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CLINIC_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("CLINIC_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(m) => self.database.max_connections = m,
                Err(_) => warn!(value = %max, "Ignoring invalid CLINIC_DB_MAX_CONNECTIONS"),
            }
        }

        if let Ok(threshold) = std::env::var("CLINIC_LOW_STOCK_THRESHOLD") {
            match threshold.parse::<i64>() {
                Ok(t) => self.stock.low_stock_threshold = t,
                Err(_) => warn!(value = %threshold, "Ignoring invalid CLINIC_LOW_STOCK_THRESHOLD"),
            }
        }

        if let Ok(days) = std::env::var("CLINIC_NEAR_EXPIRY_DAYS") {
            match days.parse::<i64>() {
                Ok(d) => self.stock.near_expiry_days = d,
                Err(_) => warn!(value = %days, "Ignoring invalid CLINIC_NEAR_EXPIRY_DAYS"),
            }
        }

        if let Ok(retries) = std::env::var("CLINIC_LEDGER_MAX_RETRIES") {
            match retries.parse::<u32>() {
                Ok(r) => self.ledger.max_retries = r,
                Err(_) => warn!(value = %retries, "Ignoring invalid CLINIC_LEDGER_MAX_RETRIES"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "clinic", "ledger")
            .map(|dirs| dirs.config_dir().join("clinic.toml"))
    }

    /// Builds the pool configuration these settings describe.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .max_retries(self.ledger.max_retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClinicConfig::default();
        assert_eq!(config.database.path, PathBuf::from("clinic.db"));
        assert_eq!(config.stock.low_stock_threshold, 5);
        assert_eq!(config.stock.near_expiry_days, 30);
        assert_eq!(config.ledger.max_retries, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ClinicConfig::from_toml(
            r#"
            [stock]
            low_stock_threshold = 10

            [ledger]
            max_retries = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.stock.low_stock_threshold, 10);
        assert_eq!(config.stock.near_expiry_days, 30);
        assert_eq!(config.ledger.max_retries, 3);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ClinicConfig::from_toml("[database\npath = 1").unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }

    #[test]
    fn test_validation() {
        let mut config = ClinicConfig::default();
        config.ledger.max_retries = 0;
        assert!(config.validate().is_err());

        config.ledger.max_retries = 1;
        config.stock.near_expiry_days = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_db_config_from_settings() {
        let mut config = ClinicConfig::default();
        config.database.max_connections = 8;
        config.ledger.max_retries = 2;

        let db = config.db_config();
        assert_eq!(db.max_connections, 8);
        assert_eq!(db.max_retries, 2);
        assert_eq!(db.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&ClinicConfig::default()).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[stock]"));
        assert!(toml_str.contains("[ledger]"));
    }
}
