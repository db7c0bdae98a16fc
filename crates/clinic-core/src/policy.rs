//! # Stock Policy
//!
//! Thresholds that turn raw stock numbers into the badges staff see.
//! These are clinic policy, not physical limits, so they are configurable
//! (see `clinic_db::config`).

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{DEFAULT_LOW_STOCK_THRESHOLD, DEFAULT_NEAR_EXPIRY_DAYS};

/// Classification thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockPolicy {
    /// Stock at or below this (and above zero) is "low".
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i64,

    /// Expiry within this many days (inclusive) is "near expiry".
    #[serde(default = "default_near_expiry_days")]
    pub near_expiry_days: i64,
}

fn default_low_stock_threshold() -> i64 {
    DEFAULT_LOW_STOCK_THRESHOLD
}

fn default_near_expiry_days() -> i64 {
    DEFAULT_NEAR_EXPIRY_DAYS
}

impl Default for StockPolicy {
    fn default() -> Self {
        StockPolicy {
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            near_expiry_days: DEFAULT_NEAR_EXPIRY_DAYS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = StockPolicy::default();
        assert_eq!(policy.low_stock_threshold, 5);
        assert_eq!(policy.near_expiry_days, 30);
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let policy: StockPolicy = serde_json::from_str(r#"{"near_expiry_days": 60}"#).unwrap();
        assert_eq!(policy.low_stock_threshold, 5);
        assert_eq!(policy.near_expiry_days, 60);
    }
}
