//! Ingress events consumed from the application layer
//!
//! Both events are immutable once accepted and are appended to history
//! exactly as received (plus the best-effort `location` for logins).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single authentication attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginAttempt {
    /// Unique attempt ID
    pub id: String,

    /// Verified user, when the identity provider resolved one
    pub user_id: Option<String>,

    /// Email the attempt was made for
    pub email: String,

    /// Source IP address
    pub ip_address: String,

    /// Whether the credentials were accepted
    pub success: bool,

    /// Client user agent
    #[serde(default)]
    pub user_agent: String,

    /// Resolved location (`city, country`), filled in by the responder
    #[serde(default)]
    pub location: Option<String>,

    /// Why the attempt failed, if it did
    #[serde(default)]
    pub failure_reason: Option<String>,

    /// Client device identifier, if the client sent one
    #[serde(default)]
    pub device_id: Option<String>,

    /// When the attempt happened
    pub created_at: DateTime<Utc>,
}

impl LoginAttempt {
    /// Create a new login attempt
    pub fn new(
        email: impl Into<String>,
        ip_address: impl Into<String>,
        success: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            email: email.into(),
            ip_address: ip_address.into(),
            success,
            user_agent: String::new(),
            location: None,
            failure_reason: None,
            device_id: None,
            created_at,
        }
    }

    /// Create a failed attempt with a reason
    pub fn failed(
        email: impl Into<String>,
        ip_address: impl Into<String>,
        reason: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::new(email, ip_address, false, created_at).with_failure_reason(reason)
    }

    /// Set the verified user
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the failure reason
    pub fn with_failure_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    /// Set the device identifier
    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

/// A committed marketplace transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID
    pub id: String,

    /// Transacting user
    pub user_id: String,

    /// Transaction amount (must be positive)
    pub amount: Decimal,

    /// When the transaction happened
    pub occurred_at: DateTime<Utc>,

    /// Source IP address, when the caller knows it
    #[serde(default)]
    pub ip_address: Option<String>,

    /// Client user agent, when the caller knows it
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Client device identifier, when the caller knows it
    #[serde(default)]
    pub device_id: Option<String>,
}

impl Transaction {
    /// Create a new transaction with a fresh ID
    pub fn new(user_id: impl Into<String>, amount: Decimal, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            amount,
            occurred_at,
            ip_address: None,
            user_agent: None,
            device_id: None,
        }
    }

    /// Use a caller-supplied transaction ID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the source IP
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the device identifier
    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

/// Tagged union of everything the engine ingests (one per JSONL line)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngressEvent {
    LoginAttempt(LoginAttempt),
    Transaction(Transaction),
}

impl IngressEvent {
    /// Keys whose events must be processed in arrival order.
    ///
    /// A login attempt is ordered by its (case-folded) email, so anonymous
    /// and authenticated failures for one address never race the
    /// failed-login count, and also by its user when known. A transaction is
    /// ordered by its user.
    pub fn partition_keys(&self) -> Vec<String> {
        match self {
            IngressEvent::LoginAttempt(attempt) => {
                let mut keys = vec![format!("email:{}", attempt.email.trim().to_lowercase())];
                if let Some(user_id) = &attempt.user_id {
                    keys.push(format!("user:{}", user_id));
                }
                keys
            }
            IngressEvent::Transaction(tx) => vec![format!("user:{}", tx.user_id)],
        }
    }
}
