//! Fraud rule definitions

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use riskwatch_core::Severity;

use crate::error::{RuleError, RuleResult};

/// What a rule measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RuleType {
    /// Transaction amount
    Amount,
    /// Transactions (or failed logins) in the rule window
    Frequency,
    /// 1 when the event geolocates to a high-risk country
    Location,
    /// 1 when the transaction comes from an unknown or untrusted device
    Device,
    /// Distinct source IPs across the user's logins in the rule window
    Pattern,
    /// Live velocity counter for the window covering the rule window
    Velocity,
}

/// What to do when a rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
pub enum RuleAction {
    #[serde(rename = "block")]
    #[strum(serialize = "block")]
    Block,

    #[serde(rename = "flag")]
    #[strum(serialize = "flag")]
    Flag,

    #[serde(rename = "review")]
    #[strum(serialize = "review")]
    Review,

    #[serde(rename = "alert")]
    #[strum(serialize = "alert")]
    Alert,

    #[serde(rename = "require_2fa")]
    #[strum(serialize = "require_2fa")]
    Require2fa,
}

fn default_time_window_seconds() -> u64 {
    3600
}

fn default_active() -> bool {
    true
}

/// A configurable threshold-action pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudRule {
    /// Unique rule name
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub rule_type: RuleType,

    /// Matches when the metric is strictly greater than this
    pub threshold: Decimal,

    #[serde(default = "default_time_window_seconds")]
    pub time_window_seconds: u64,

    pub action: RuleAction,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl FraudRule {
    pub fn new(
        name: impl Into<String>,
        rule_type: RuleType,
        threshold: Decimal,
        action: RuleAction,
        severity: Severity,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            rule_type,
            threshold,
            time_window_seconds: default_time_window_seconds(),
            action,
            severity,
            is_active: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_window(mut self, seconds: u64) -> Self {
        self.time_window_seconds = seconds;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Reject nameless rules, negative thresholds and empty windows
    pub fn validate(&self) -> RuleResult<()> {
        let invalid = |reason: &str| RuleError::InvalidRule {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.threshold < Decimal::ZERO {
            return Err(invalid("threshold is negative"));
        }
        if self.time_window_seconds == 0 {
            return Err(invalid("time window is zero"));
        }
        Ok(())
    }

    /// `metric > threshold`
    pub fn matches(&self, metric: Decimal) -> bool {
        metric > self.threshold
    }
}

/// The rule set a fresh deployment starts with
pub fn default_rules() -> Vec<FraudRule> {
    vec![
        FraudRule::new(
            "High Amount Transaction",
            RuleType::Amount,
            Decimal::from(5000),
            RuleAction::Review,
            Severity::High,
        )
        .with_description("Transaction amount exceeds $5000"),
        FraudRule::new(
            "Rapid Transactions",
            RuleType::Frequency,
            Decimal::from(10),
            RuleAction::Block,
            Severity::Critical,
        )
        .with_description("More than 10 transactions in 1 hour"),
        FraudRule::new(
            "Foreign Country Risk",
            RuleType::Location,
            Decimal::ZERO,
            RuleAction::Flag,
            Severity::Medium,
        )
        .with_description("Activity from a high-risk country"),
        FraudRule::new(
            "New Device Transaction",
            RuleType::Device,
            Decimal::ZERO,
            RuleAction::Require2fa,
            Severity::Medium,
        )
        .with_description("Transaction from an unrecognized device"),
        FraudRule::new(
            "Velocity Spike",
            RuleType::Velocity,
            Decimal::from(20),
            RuleAction::Review,
            Severity::High,
        )
        .with_description("Unusual transaction velocity"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn test_action_string_forms() {
        assert_eq!(RuleAction::Require2fa.to_string(), "require_2fa");
        assert_eq!(RuleAction::from_str("block").unwrap(), RuleAction::Block);
        assert_eq!(
            serde_json::to_string(&RuleAction::Require2fa).unwrap(),
            "\"require_2fa\""
        );
        assert_eq!(RuleType::Velocity.to_string(), "velocity");
    }

    #[test]
    fn test_match_is_strict() {
        let rule = FraudRule::new("r", RuleType::Amount, dec!(5000), RuleAction::Review, Severity::High);
        assert!(!rule.matches(dec!(5000)));
        assert!(rule.matches(dec!(5000.01)));
    }

    #[test]
    fn test_validate() {
        let ok = FraudRule::new("r", RuleType::Amount, dec!(1), RuleAction::Flag, Severity::Low);
        assert!(ok.validate().is_ok());

        let negative = FraudRule::new("r", RuleType::Amount, dec!(-1), RuleAction::Flag, Severity::Low);
        assert!(matches!(negative.validate(), Err(RuleError::InvalidRule { .. })));

        let no_window = ok.clone().with_window(0);
        assert!(no_window.validate().is_err());
    }

    #[test]
    fn test_default_rules() {
        let rules = default_rules();
        assert_eq!(rules.len(), 5);
        assert!(rules.iter().all(|r| r.is_active && r.time_window_seconds == 3600));
        assert!(rules.iter().all(|r| r.validate().is_ok()));
    }

    #[test]
    fn test_rule_json_defaults() {
        let json = r#"{"name":"Big","rule_type":"amount","threshold":"100","action":"alert"}"#;
        let rule: FraudRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.time_window_seconds, 3600);
        assert!(rule.is_active);
        assert_eq!(rule.severity, Severity::Low);
    }
}
