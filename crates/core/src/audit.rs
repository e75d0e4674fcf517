//! Audit trail entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One append-only audit entry describing a mutation or decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub user_id: Option<String>,
    /// e.g. `record_velocity`, `block_ip`, `upsert_risk_score`
    pub action: String,
    /// e.g. `ip_reputation`, `risk_score`, `transaction_velocity`
    pub resource_type: String,
    pub resource_id: String,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            old_values: None,
            new_values: None,
            success: true,
            error: None,
            created_at,
        }
    }

    pub fn with_user(mut self, user_id: Option<impl Into<String>>) -> Self {
        self.user_id = user_id.map(Into::into);
        self
    }

    /// Attach before/after snapshots; serialization failures drop the snapshot
    pub fn with_change<O: Serialize, N: Serialize>(mut self, old: Option<&O>, new: Option<&N>) -> Self {
        self.old_values = old.and_then(|v| serde_json::to_value(v).ok());
        self.new_values = new.and_then(|v| serde_json::to_value(v).ok());
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}
