//! In-memory backend
//!
//! All state sits behind one mutex, so each repository call is trivially
//! atomic. Used by tests and embedded deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use riskwatch_core::{
    AuditRecord, DeviceFingerprint, IpBlock, IpReputation, LoginAttempt, RiskScore,
    SecurityEvent, SecurityNotification, TimeWindow, Transaction, TransactionVelocity,
    VelocityUpdate,
};

use crate::error::StoreResult;
use crate::traits::*;

#[derive(Default)]
struct MemoryState {
    logins: Vec<LoginAttempt>,
    transactions: Vec<Transaction>,
    devices: HashMap<(String, String), DeviceFingerprint>,
    ips: HashMap<String, IpReputation>,
    scores: HashMap<String, RiskScore>,
    velocity: HashMap<(String, TimeWindow), TransactionVelocity>,
    events: Vec<SecurityEvent>,
    notifications: Vec<SecurityNotification>,
    audit: Vec<AuditRecord>,
}

/// Mutex-guarded in-memory signal store
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

fn in_range(at: DateTime<Utc>, since: DateTime<Utc>, until: DateTime<Utc>) -> bool {
    since <= at && at <= until
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // Every mutation is a single insert, so a poisoned lock still guards consistent state
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an IP row directly (reputation feeds, tests)
    pub fn put_ip(&self, reputation: IpReputation) {
        self.state()
            .ips
            .insert(reputation.ip_address.clone(), reputation);
    }
}

#[async_trait]
impl LoginAttemptRepository for MemoryStore {
    async fn insert_login_attempt(&self, attempt: &LoginAttempt) -> StoreResult<()> {
        self.state().logins.push(attempt.clone());
        Ok(())
    }

    async fn count_failed_logins(
        &self,
        email: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<u32> {
        let count = self
            .state()
            .logins
            .iter()
            .filter(|a| {
                !a.success
                    && a.email.eq_ignore_ascii_case(email)
                    && in_range(a.created_at, since, until)
            })
            .count();
        Ok(count as u32)
    }

    async fn count_failed_logins_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<u32> {
        let count = self
            .state()
            .logins
            .iter()
            .filter(|a| {
                !a.success
                    && a.user_id.as_deref() == Some(user_id)
                    && in_range(a.created_at, since, until)
            })
            .count();
        Ok(count as u32)
    }

    async fn count_all_failed_logins(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<u32> {
        let count = self
            .state()
            .logins
            .iter()
            .filter(|a| !a.success && in_range(a.created_at, since, until))
            .count();
        Ok(count as u32)
    }

    async fn logins_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<LoginAttempt>> {
        let mut logins: Vec<LoginAttempt> = self
            .state()
            .logins
            .iter()
            .filter(|a| a.user_id.as_deref() == Some(user_id) && in_range(a.created_at, since, until))
            .cloned()
            .collect();
        logins.sort_by_key(|a| a.created_at);
        Ok(logins)
    }
}

#[async_trait]
impl TransactionRepository for MemoryStore {
    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<()> {
        self.state().transactions.push(tx.clone());
        Ok(())
    }

    async fn count_transactions(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<u32> {
        let count = self
            .state()
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id && in_range(t.occurred_at, since, until))
            .count();
        Ok(count as u32)
    }
}

#[async_trait]
impl DeviceRepository for MemoryStore {
    async fn get_device(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> StoreResult<Option<DeviceFingerprint>> {
        Ok(self
            .state()
            .devices
            .get(&(user_id.to_string(), device_id.to_string()))
            .cloned())
    }

    async fn touch_device(
        &self,
        user_id: &str,
        device_id: &str,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<DeviceFingerprint> {
        let mut state = self.state();
        let device = state
            .devices
            .entry((user_id.to_string(), device_id.to_string()))
            .or_insert_with(|| DeviceFingerprint::new(user_id, device_id, seen_at));
        device.last_seen = device.last_seen.max(seen_at);
        Ok(device.clone())
    }

    async fn set_device_trust(
        &self,
        user_id: &str,
        device_id: &str,
        trusted: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<DeviceFingerprint> {
        let mut state = self.state();
        let device = state
            .devices
            .entry((user_id.to_string(), device_id.to_string()))
            .or_insert_with(|| DeviceFingerprint::new(user_id, device_id, at));
        device.is_trusted = trusted;
        device.last_seen = device.last_seen.max(at);
        Ok(device.clone())
    }

    async fn has_trusted_device(&self, user_id: &str) -> StoreResult<bool> {
        Ok(self
            .state()
            .devices
            .values()
            .any(|d| d.user_id == user_id && d.is_trusted))
    }
}

#[async_trait]
impl IpReputationRepository for MemoryStore {
    async fn get_ip(&self, ip_address: &str) -> StoreResult<Option<IpReputation>> {
        Ok(self.state().ips.get(ip_address).cloned())
    }

    async fn apply_block(
        &self,
        ip_address: &str,
        block: &IpBlock,
    ) -> StoreResult<Option<IpReputation>> {
        let mut state = self.state();
        let updated = IpReputation::apply_block(state.ips.get(ip_address), ip_address, block);
        if let Some(rep) = &updated {
            state.ips.insert(ip_address.to_string(), rep.clone());
        }
        Ok(updated)
    }

    async fn count_blocked_ips(&self, now: DateTime<Utc>) -> StoreResult<u32> {
        let count = self
            .state()
            .ips
            .values()
            .filter(|r| r.is_blocked_at(now))
            .count();
        Ok(count as u32)
    }
}

#[async_trait]
impl RiskScoreRepository for MemoryStore {
    async fn get_risk_score(&self, user_id: &str) -> StoreResult<Option<RiskScore>> {
        Ok(self.state().scores.get(user_id).cloned())
    }

    async fn upsert_risk_score(&self, score: &RiskScore) -> StoreResult<()> {
        self.state()
            .scores
            .insert(score.user_id.clone(), score.clone());
        Ok(())
    }

    async fn list_risk_scores(&self) -> StoreResult<Vec<RiskScore>> {
        let mut scores: Vec<RiskScore> = self.state().scores.values().cloned().collect();
        scores.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(scores)
    }
}

#[async_trait]
impl VelocityRepository for MemoryStore {
    async fn get_velocity(
        &self,
        user_id: &str,
        window: TimeWindow,
    ) -> StoreResult<Option<TransactionVelocity>> {
        Ok(self
            .state()
            .velocity
            .get(&(user_id.to_string(), window))
            .cloned())
    }

    async fn record_velocity(
        &self,
        user_id: &str,
        windows: &[TimeWindow],
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<VelocityUpdate>> {
        let mut state = self.state();
        let mut updates = Vec::with_capacity(windows.len());
        for &window in windows {
            let key = (user_id.to_string(), window);
            let before = state.velocity.get(&key).cloned();
            let after = TransactionVelocity::apply(before.as_ref(), user_id, window, amount, at);
            state.velocity.insert(key, after.clone());
            updates.push(VelocityUpdate { before, after });
        }
        Ok(updates)
    }
}

#[async_trait]
impl SecurityEventRepository for MemoryStore {
    async fn insert_security_event(&self, event: &SecurityEvent) -> StoreResult<()> {
        self.state().events.push(event.clone());
        Ok(())
    }

    async fn security_events(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<SecurityEvent>> {
        Ok(self
            .state()
            .events
            .iter()
            .rev()
            .filter(|e| user_id.map_or(true, |u| e.user_id.as_deref() == Some(u)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn security_events_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<SecurityEvent>> {
        Ok(self
            .state()
            .events
            .iter()
            .filter(|e| in_range(e.created_at, since, until))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn insert_notification(&self, notification: &SecurityNotification) -> StoreResult<()> {
        self.state().notifications.push(notification.clone());
        Ok(())
    }

    async fn notifications(&self, user_id: &str) -> StoreResult<Vec<SecurityNotification>> {
        Ok(self
            .state()
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&self, id: &str) -> StoreResult<bool> {
        let mut state = self.state();
        match state.notifications.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl AuditRepository for MemoryStore {
    async fn insert_audit(&self, record: &AuditRecord) -> StoreResult<()> {
        self.state().audit.push(record.clone());
        Ok(())
    }

    async fn audit_records(&self, limit: usize) -> StoreResult<Vec<AuditRecord>> {
        Ok(self.state().audit.iter().rev().take(limit).cloned().collect())
    }
}
