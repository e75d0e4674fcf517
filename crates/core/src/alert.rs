//! Security events and user notifications
//!
//! Both streams are append-only. A notification is only ever derived from a
//! critical event (see [`SecurityNotification::for_critical`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::severity::Severity;

/// Well-known `event_type` values
pub mod event_types {
    pub const HIGH_AMOUNT_TRANSACTION: &str = "high_amount_transaction";
    pub const IP_BLOCKED: &str = "ip_blocked";
    pub const HIGH_RISK_SCORE: &str = "high_risk_score";
    /// Prefix of events raised by configurable fraud rules (`fraud_rule_<action>`)
    pub const FRAUD_RULE_PREFIX: &str = "fraud_rule_";
}

/// A security-relevant occurrence for audit dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: String,
    pub user_id: Option<String>,
    pub event_type: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub user_agent: String,
    /// Best-effort geolocation of `ip_address`
    pub location: Option<String>,
    /// Free-form context (transaction id, amount, rule name, ...)
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(
        event_type: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            event_type: event_type.into(),
            severity,
            description: description.into(),
            ip_address: String::new(),
            user_agent: String::new(),
            location: None,
            metadata: serde_json::Value::Null,
            created_at,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = ip_address.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Raised by a configurable fraud rule
    pub fn is_fraud_rule(&self) -> bool {
        self.event_type.starts_with(event_types::FRAUD_RULE_PREFIX)
    }
}

/// Category of a user-facing notification
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationType {
    Login,
    Transaction,
    Device,
    Security,
    Fraud,
}

/// A user-facing alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityNotification {
    pub id: String,
    pub user_id: String,
    /// Event this notification was derived from
    pub event_id: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl SecurityNotification {
    /// Notification for a critical event addressed to its user.
    ///
    /// `None` when the event is not critical or has no user to address.
    pub fn for_critical(event: &SecurityEvent) -> Option<Self> {
        if !event.severity.is_critical() {
            return None;
        }
        let user_id = event.user_id.clone()?;
        Some(Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            event_id: event.id.clone(),
            notification_type: NotificationType::Security,
            title: "Critical security alert".to_string(),
            message: event.description.clone(),
            severity: Severity::Critical,
            is_read: false,
            created_at: event.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_event_yields_notification() {
        let event = SecurityEvent::new(
            event_types::HIGH_RISK_SCORE,
            Severity::Critical,
            "Risk score 91",
            Utc::now(),
        )
        .with_user("U1");

        let n = SecurityNotification::for_critical(&event).unwrap();
        assert_eq!(n.user_id, "U1");
        assert_eq!(n.event_id, event.id);
        assert_eq!(n.notification_type, NotificationType::Security);
        assert_eq!(n.severity, Severity::Critical);
        assert!(!n.is_read);
    }

    #[test]
    fn test_non_critical_or_anonymous_yields_none() {
        let now = Utc::now();
        let medium = SecurityEvent::new("x", Severity::High, "d", now).with_user("U1");
        assert!(SecurityNotification::for_critical(&medium).is_none());

        let anonymous = SecurityEvent::new("x", Severity::Critical, "d", now);
        assert!(SecurityNotification::for_critical(&anonymous).is_none());
    }

    #[test]
    fn test_fraud_rule_prefix() {
        let e = SecurityEvent::new("fraud_rule_review", Severity::High, "d", Utc::now());
        assert!(e.is_fraud_rule());
        let e = SecurityEvent::new(event_types::IP_BLOCKED, Severity::High, "d", Utc::now());
        assert!(!e.is_fraud_rule());
    }

    #[test]
    fn test_notification_type_strings() {
        assert_eq!(NotificationType::Security.to_string(), "security");
        assert_eq!(
            serde_json::to_string(&NotificationType::Fraud).unwrap(),
            "\"fraud\""
        );
    }
}
