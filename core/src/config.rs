//! Configuration types for AGORANET

use crate::types::{Address, Rate};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Instance name for logging
    pub name: String,

    /// Data directory for the persistent store
    pub data_dir: PathBuf,

    /// Initial admin address (hex encoded)
    pub admin: String,

    /// Payment configuration
    pub payment: PaymentConfig,

    /// Eligibility scan configuration
    pub eligibility: EligibilityConfig,

    /// Logging level
    pub log_level: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            name: "agoranet-ledger".to_string(),
            data_dir: PathBuf::from("./data"),
            admin: Address::ZERO.to_hex(),
            payment: PaymentConfig::default(),
            eligibility: EligibilityConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Parse the configured admin address
    pub fn admin_address(&self) -> Result<Address, hex::FromHexError> {
        Address::from_hex(&self.admin)
    }
}

/// Payment gate configuration
///
/// The accepted denomination and the oracle feed address are initialization
/// inputs; the gate itself never changes them at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Accepted payment denomination symbol
    pub denomination: String,

    /// Rate feed identifier (hex encoded address of the oracle feed)
    pub rate_feed: String,

    /// Minimum charge in reference-currency units, scaled by `Rate::SCALE`.
    /// The comparison is inclusive: a converted value exactly equal to this
    /// passes.
    pub min_charge_ref: u128,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            denomination: "AGR".to_string(),
            rate_feed: Address::ZERO.to_hex(),
            min_charge_ref: 5 * Rate::SCALE, // 5 reference units
        }
    }
}

/// Eligibility scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityConfig {
    /// A user is flagged eligible when their post count exceeds this
    pub min_posts: u64,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self { min_posts: 10 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold_is_five_ref_units() {
        let config = PaymentConfig::default();
        assert_eq!(config.min_charge_ref, 500_000_000);
    }

    #[test]
    fn test_admin_address_parses() {
        let config = LedgerConfig::default();
        assert_eq!(config.admin_address().unwrap(), Address::ZERO);
    }
}
