//! Rule evaluation context and match results

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use riskwatch_core::{LoginAttempt, Severity, Transaction};

use crate::rule::{FraudRule, RuleAction, RuleType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    LoginAttempt,
    Transaction,
}

/// The event a rule set is evaluated against
#[derive(Debug, Clone, PartialEq)]
pub struct RuleContext {
    pub kind: EventKind,
    /// Login attempt or transaction ID
    pub event_id: String,
    pub user_id: Option<String>,
    /// Login email (logins only)
    pub email: Option<String>,
    pub ip_address: Option<String>,
    pub device_id: Option<String>,
    /// Transaction amount (transactions only)
    pub amount: Option<Decimal>,
    /// Geolocated country code, when resolved
    pub country: Option<String>,
    /// Evaluation time (the event's time)
    pub at: DateTime<Utc>,
}

impl RuleContext {
    pub fn from_login(attempt: &LoginAttempt, country: Option<String>) -> Self {
        Self {
            kind: EventKind::LoginAttempt,
            event_id: attempt.id.clone(),
            user_id: attempt.user_id.clone(),
            email: Some(attempt.email.clone()),
            ip_address: Some(attempt.ip_address.clone()),
            device_id: attempt.device_id.clone(),
            amount: None,
            country,
            at: attempt.created_at,
        }
    }

    pub fn from_transaction(tx: &Transaction, country: Option<String>) -> Self {
        Self {
            kind: EventKind::Transaction,
            event_id: tx.id.clone(),
            user_id: Some(tx.user_id.clone()),
            email: None,
            ip_address: tx.ip_address.clone(),
            device_id: tx.device_id.clone(),
            amount: Some(tx.amount),
            country,
            at: tx.occurred_at,
        }
    }
}

/// A rule that fired for an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub rule_name: String,
    /// `None` for the built-in risk score rule
    pub rule_type: Option<RuleType>,
    pub action: RuleAction,
    pub severity: Severity,
    pub metric: Decimal,
    pub threshold: Decimal,
    /// `event_type` of the security event this match raises
    pub event_type: String,
    pub description: String,
}

impl RuleMatch {
    pub fn from_rule(rule: &FraudRule, metric: Decimal) -> Self {
        let description = if rule.description.is_empty() {
            format!("Rule '{}' matched: {} > {}", rule.name, metric, rule.threshold)
        } else {
            format!("{} ({} > {})", rule.description, metric, rule.threshold)
        };
        Self {
            rule_name: rule.name.clone(),
            rule_type: Some(rule.rule_type),
            action: rule.action,
            severity: rule.severity,
            metric,
            threshold: rule.threshold,
            event_type: format!(
                "{}{}",
                riskwatch_core::event_types::FRAUD_RULE_PREFIX,
                rule.action
            ),
            description,
        }
    }
}
