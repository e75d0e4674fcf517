//! Engine configuration
//!
//! One JSON document configures every component; missing sections and
//! fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use riskwatch_responder::ResponderConfig;
use riskwatch_rules::{validate_rules, RuleSetConfig};
use riskwatch_store::RetryPolicy;

use crate::error::EngineResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub responder: ResponderConfig,

    #[serde(default)]
    pub rules: RuleSetConfig,

    /// Backoff for concurrency conflicts on upserts
    #[serde(default)]
    pub retry: RetryPolicy,

    // === Dispatch ===
    /// Events admitted but not yet finished, across all partitions, before
    /// `submit` waits
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    // === Metrics ===
    /// Users with a score strictly above this count as high-risk
    #[serde(default = "default_high_risk_user_score")]
    pub high_risk_user_score: u8,

    /// Optional JSONL audit ledger next to the store's audit table
    #[serde(default)]
    pub audit_ledger: Option<PathBuf>,
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_high_risk_user_score() -> u8 {
    70
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            responder: ResponderConfig::default(),
            rules: RuleSetConfig::default(),
            retry: RetryPolicy::default(),
            queue_capacity: default_queue_capacity(),
            high_risk_user_score: default_high_risk_user_score(),
            audit_ledger: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        validate_rules(&config.rules.rules)?;
        Ok(config)
    }
}
