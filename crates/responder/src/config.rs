//! Auto-responder configuration

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thresholds and timeouts of the reactive behaviours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponderConfig {
    // === Failed-login auto-block ===
    /// Failed attempts for one email that trigger a block
    #[serde(default = "default_failed_login_threshold")]
    pub failed_login_threshold: u32,

    /// Trailing window the failures are counted in
    #[serde(default = "default_failed_login_window_minutes")]
    pub failed_login_window_minutes: i64,

    #[serde(default = "default_block_duration_minutes")]
    pub block_duration_minutes: i64,

    /// Reputation points removed from an existing IP when it is blocked
    #[serde(default = "default_reputation_penalty")]
    pub reputation_penalty: u8,

    #[serde(default = "default_block_reason")]
    pub block_reason: String,

    // === Transactions ===
    /// Amount strictly above this raises `high_amount_transaction`
    #[serde(default = "default_high_amount_threshold")]
    pub high_amount_threshold: Decimal,

    // === External collaborators ===
    #[serde(default = "default_geo_timeout_ms")]
    pub geo_timeout_ms: u64,

    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,
}

fn default_failed_login_threshold() -> u32 {
    5
}

fn default_failed_login_window_minutes() -> i64 {
    15
}

fn default_block_duration_minutes() -> i64 {
    60
}

fn default_reputation_penalty() -> u8 {
    20
}

fn default_block_reason() -> String {
    "Multiple failed login attempts".to_string()
}

fn default_high_amount_threshold() -> Decimal {
    Decimal::new(5_000, 0)
}

fn default_geo_timeout_ms() -> u64 {
    500
}

fn default_notify_timeout_ms() -> u64 {
    1_000
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            failed_login_threshold: default_failed_login_threshold(),
            failed_login_window_minutes: default_failed_login_window_minutes(),
            block_duration_minutes: default_block_duration_minutes(),
            reputation_penalty: default_reputation_penalty(),
            block_reason: default_block_reason(),
            high_amount_threshold: default_high_amount_threshold(),
            geo_timeout_ms: default_geo_timeout_ms(),
            notify_timeout_ms: default_notify_timeout_ms(),
        }
    }
}

impl ResponderConfig {
    pub fn failed_login_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.failed_login_window_minutes)
    }

    pub fn block_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.block_duration_minutes)
    }

    pub fn geo_timeout(&self) -> Duration {
        Duration::from_millis(self.geo_timeout_ms)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}
