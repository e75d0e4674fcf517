//! Rule set configuration
//!
//! Rules, the risk-score alert threshold and the high-risk country list are
//! all loaded from JSON; every field falls back to the built-in defaults.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{RuleError, RuleResult};
use crate::rule::{default_rules, FraudRule};

/// Configuration for the Rule Engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetConfig {
    #[serde(default = "default_rules")]
    pub rules: Vec<FraudRule>,

    /// Composite score strictly above this raises a critical event
    #[serde(default = "default_high_risk_score_threshold")]
    pub high_risk_score_threshold: u8,

    /// ISO 3166-1 alpha-2 codes treated as high-risk by location rules
    #[serde(default = "default_high_risk_countries")]
    pub high_risk_countries: Vec<String>,
}

fn default_high_risk_score_threshold() -> u8 {
    80
}

fn default_high_risk_countries() -> Vec<String> {
    ["CN", "RU", "KP", "IR", "SY", "AF"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

impl Default for RuleSetConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            high_risk_score_threshold: default_high_risk_score_threshold(),
            high_risk_countries: default_high_risk_countries(),
        }
    }
}

impl RuleSetConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: &Path) -> RuleResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        validate_rules(&config.rules)?;
        Ok(config)
    }

    pub fn is_high_risk_country(&self, country: &str) -> bool {
        self.high_risk_countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(country))
    }
}

/// Every rule valid, names unique
pub fn validate_rules(rules: &[FraudRule]) -> RuleResult<()> {
    let mut seen = HashSet::new();
    for rule in rules {
        rule.validate()?;
        if !seen.insert(rule.name.as_str()) {
            return Err(RuleError::DuplicateRule(rule.name.clone()));
        }
    }
    Ok(())
}

/// SHA-256 over the JSON encoding of a rule set, hex encoded
pub fn rule_set_hash(rules: &[FraudRule]) -> RuleResult<String> {
    let bytes = serde_json::to_vec(rules)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleAction, RuleType};
    use riskwatch_core::Severity;
    use rust_decimal::Decimal;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = RuleSetConfig::default();
        assert_eq!(config.rules.len(), 5);
        assert_eq!(config.high_risk_score_threshold, 80);
        assert!(config.is_high_risk_country("kp"));
        assert!(!config.is_high_risk_country("US"));
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"high_risk_score_threshold": 70}}"#).unwrap();

        let config = RuleSetConfig::from_file(file.path()).unwrap();
        assert_eq!(config.high_risk_score_threshold, 70);
        assert_eq!(config.rules, default_rules());
    }

    #[test]
    fn test_from_file_rejects_duplicates() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"rules": [
                {{"name": "A", "rule_type": "amount", "threshold": "1", "action": "flag"}},
                {{"name": "A", "rule_type": "frequency", "threshold": "2", "action": "alert"}}
            ]}}"#
        )
        .unwrap();

        assert!(matches!(
            RuleSetConfig::from_file(file.path()),
            Err(RuleError::DuplicateRule(name)) if name == "A"
        ));
    }

    #[test]
    fn test_hash_tracks_content() {
        let rules = default_rules();
        let h1 = rule_set_hash(&rules).unwrap();
        assert_eq!(h1.len(), 64);
        assert_eq!(h1, rule_set_hash(&default_rules()).unwrap());

        let mut changed = rules.clone();
        changed.push(FraudRule::new(
            "Extra",
            RuleType::Pattern,
            Decimal::from(3),
            RuleAction::Alert,
            Severity::Medium,
        ));
        assert_ne!(h1, rule_set_hash(&changed).unwrap());
    }
}
