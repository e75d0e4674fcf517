//! Repository traits - narrow access interfaces over the signal stores
//!
//! Every mutating method that touches shared state (`apply_block`,
//! `upsert_risk_score`, `record_velocity`) is a single indivisible operation
//! in each backend. Callers never read-modify-write across two calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use riskwatch_core::{
    AuditRecord, DeviceFingerprint, IpBlock, IpReputation, LoginAttempt, RiskScore,
    SecurityEvent, SecurityNotification, TimeWindow, Transaction, TransactionVelocity,
    VelocityUpdate,
};

use crate::error::StoreResult;

/// Append-only login attempt history
#[async_trait]
pub trait LoginAttemptRepository: Send + Sync {
    async fn insert_login_attempt(&self, attempt: &LoginAttempt) -> StoreResult<()>;

    /// Failed attempts for `email` (case-insensitive) with `since <= created_at <= until`
    async fn count_failed_logins(
        &self,
        email: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<u32>;

    /// Failed attempts attributed to `user_id` in `[since, until]`
    async fn count_failed_logins_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<u32>;

    /// Failed attempts across all users in `[since, until]`
    async fn count_all_failed_logins(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<u32>;

    /// Attempts attributed to `user_id` in `[since, until]`, oldest first
    async fn logins_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<LoginAttempt>>;
}

/// Append-only transaction history
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<()>;

    /// Transactions by `user_id` in `[since, until]`
    async fn count_transactions(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<u32>;
}

#[async_trait]
pub trait DeviceRepository: Send + Sync {
    async fn get_device(&self, user_id: &str, device_id: &str)
        -> StoreResult<Option<DeviceFingerprint>>;

    /// Record a sighting; creates an untrusted row on first contact and
    /// never changes the trust flag
    async fn touch_device(
        &self,
        user_id: &str,
        device_id: &str,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<DeviceFingerprint>;

    /// Set the trust flag (verification flow entry point)
    async fn set_device_trust(
        &self,
        user_id: &str,
        device_id: &str,
        trusted: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<DeviceFingerprint>;

    async fn has_trusted_device(&self, user_id: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait IpReputationRepository: Send + Sync {
    async fn get_ip(&self, ip_address: &str) -> StoreResult<Option<IpReputation>>;

    /// Atomically block an IP, creating the row if needed.
    ///
    /// Returns the new row, or `None` when the IP was already actively
    /// blocked at `block.at` (no change made).
    async fn apply_block(&self, ip_address: &str, block: &IpBlock)
        -> StoreResult<Option<IpReputation>>;

    /// IPs whose block is still active at `now`
    async fn count_blocked_ips(&self, now: DateTime<Utc>) -> StoreResult<u32>;
}

#[async_trait]
pub trait RiskScoreRepository: Send + Sync {
    async fn get_risk_score(&self, user_id: &str) -> StoreResult<Option<RiskScore>>;

    /// Insert-or-replace the single row for `score.user_id`
    async fn upsert_risk_score(&self, score: &RiskScore) -> StoreResult<()>;

    async fn list_risk_scores(&self) -> StoreResult<Vec<RiskScore>>;
}

#[async_trait]
pub trait VelocityRepository: Send + Sync {
    async fn get_velocity(
        &self,
        user_id: &str,
        window: TimeWindow,
    ) -> StoreResult<Option<TransactionVelocity>>;

    /// Apply [`TransactionVelocity::apply`] to the `(user_id, window)` row of
    /// every window in `windows` as one unit.
    ///
    /// Either every window is updated or none is. Each `before` comes from
    /// the same read the update was compared against. May fail with a
    /// retryable `Conflict` when a concurrent writer won.
    async fn record_velocity(
        &self,
        user_id: &str,
        windows: &[TimeWindow],
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<VelocityUpdate>>;
}

#[async_trait]
pub trait SecurityEventRepository: Send + Sync {
    async fn insert_security_event(&self, event: &SecurityEvent) -> StoreResult<()>;

    /// Newest first, optionally for one user
    async fn security_events(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<SecurityEvent>>;

    /// Events created in `[since, until]`, oldest first
    async fn security_events_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<SecurityEvent>>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert_notification(&self, notification: &SecurityNotification) -> StoreResult<()>;

    /// Newest first
    async fn notifications(&self, user_id: &str) -> StoreResult<Vec<SecurityNotification>>;

    /// Returns false if no such notification exists
    async fn mark_notification_read(&self, id: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn insert_audit(&self, record: &AuditRecord) -> StoreResult<()>;

    /// Newest first
    async fn audit_records(&self, limit: usize) -> StoreResult<Vec<AuditRecord>>;
}

/// Everything the engine needs from a backend
pub trait SignalStore:
    LoginAttemptRepository
    + TransactionRepository
    + DeviceRepository
    + IpReputationRepository
    + RiskScoreRepository
    + VelocityRepository
    + SecurityEventRepository
    + NotificationRepository
    + AuditRepository
{
}

impl<T> SignalStore for T where
    T: LoginAttemptRepository
        + TransactionRepository
        + DeviceRepository
        + IpReputationRepository
        + RiskScoreRepository
        + VelocityRepository
        + SecurityEventRepository
        + NotificationRepository
        + AuditRepository
{
}
