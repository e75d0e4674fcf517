//! Auto-Responder - reactive behaviours on ingress events and rule matches
//!
//! - failed-login bursts block the source IP
//! - high-amount transactions raise an event
//! - every raised event is geolocated, stored and, when critical, fanned
//!   out to a notification for its user
//! - rule matches are executed (event per match, `block` also blocks the IP)

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;

use riskwatch_audit::AuditLogger;
use riskwatch_core::{
    event_types, IpBlock, IpReputation, LoginAttempt, SecurityEvent, SecurityNotification,
    Severity, Transaction,
};
use riskwatch_rules::{RuleAction, RuleContext, RuleMatch};
use riskwatch_store::{with_retry, RetryPolicy, SignalStore, StoreResult};

use crate::config::ResponderConfig;
use crate::error::ResponderResult;
use crate::geo::{self, GeoLocation, GeoResolver, StaticGeoResolver};
use crate::notify::{self, LogNotifier, Notifier};

/// Outcome of the failed-login check
#[derive(Debug, Clone, PartialEq)]
pub struct LoginResponse {
    /// Failures for the email inside the trailing window, this one included
    pub failed_count: u32,
    /// New reputation row when this attempt triggered a block
    pub blocked: Option<IpReputation>,
}

pub struct AutoResponder {
    store: Arc<dyn SignalStore>,
    audit: AuditLogger,
    geo: Arc<dyn GeoResolver>,
    notifier: Arc<dyn Notifier>,
    config: ResponderConfig,
    retry: RetryPolicy,
}

impl AutoResponder {
    pub fn new(store: Arc<dyn SignalStore>, audit: AuditLogger, config: ResponderConfig) -> Self {
        Self {
            store,
            audit,
            geo: Arc::new(StaticGeoResolver::new()),
            notifier: Arc::new(LogNotifier),
            config,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_geo(mut self, geo: Arc<dyn GeoResolver>) -> Self {
        self.geo = geo;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    /// Best-effort geolocation of an IP
    pub async fn locate(&self, ip_address: &str) -> Option<GeoLocation> {
        geo::locate(self.geo.as_ref(), ip_address, self.config.geo_timeout()).await
    }

    /// Failed-login check for a stored attempt.
    ///
    /// Counts failures for the attempt's email in `[at - window, at]` and
    /// blocks the attempt's IP once the threshold is reached.
    pub async fn on_login(&self, attempt: &LoginAttempt) -> ResponderResult<LoginResponse> {
        let at = attempt.created_at;
        let since = at - self.config.failed_login_window();
        let failed_count = self
            .store
            .count_failed_logins(&attempt.email, since, at)
            .await?;

        let blocked = if failed_count >= self.config.failed_login_threshold {
            tracing::info!(
                email = %attempt.email,
                ip = %attempt.ip_address,
                failed_count,
                threshold = self.config.failed_login_threshold,
                "Failed-login threshold reached"
            );
            self.block_ip(
                &attempt.ip_address,
                &self.config.block_reason,
                attempt.user_id.as_deref(),
                at,
            )
            .await?
        } else {
            None
        };

        Ok(LoginResponse {
            failed_count,
            blocked,
        })
    }

    /// Block an IP for the configured duration.
    ///
    /// Returns `None` when the IP was already actively blocked; the block,
    /// its audit record and the `ip_blocked` event happen at most once per
    /// block period.
    pub async fn block_ip(
        &self,
        ip_address: &str,
        reason: &str,
        user_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> ResponderResult<Option<IpReputation>> {
        let block = IpBlock::new(
            reason,
            at,
            self.config.block_duration(),
            self.config.reputation_penalty,
        );
        let applied = self.apply_block(ip_address, &block).await;
        let (before, applied) = self
            .audit
            .on_failure(applied, user_id, "block_ip", "ip_reputation", ip_address, at)
            .await?;

        let Some(after) = applied else {
            tracing::debug!(ip = %ip_address, "IP already blocked, skipping");
            return Ok(None);
        };

        tracing::warn!(
            ip = %ip_address,
            reason = %reason,
            reputation = after.reputation_score,
            blocked_until = %block.until,
            "IP blocked"
        );
        self.audit
            .mutation(
                user_id,
                "block_ip",
                "ip_reputation",
                ip_address,
                before.as_ref(),
                Some(&after),
                at,
            )
            .await;

        let mut event = SecurityEvent::new(
            event_types::IP_BLOCKED,
            Severity::High,
            format!("IP {} blocked: {}", ip_address, reason),
            at,
        )
        .with_ip(ip_address)
        .with_metadata(json!({
            "reason": reason,
            "blocked_until": block.until,
            "reputation_score": after.reputation_score,
        }));
        if let Some(user_id) = user_id {
            event = event.with_user(user_id);
        }
        self.raise_event(event).await?;

        Ok(Some(after))
    }

    /// Current row plus the result of the atomic block
    async fn apply_block(
        &self,
        ip_address: &str,
        block: &IpBlock,
    ) -> StoreResult<(Option<IpReputation>, Option<IpReputation>)> {
        let before = self.store.get_ip(ip_address).await?;
        let store = &self.store;
        let applied = with_retry(&self.retry, "apply_block", move || async move {
            store.apply_block(ip_address, block).await
        })
        .await?;
        Ok((before, applied))
    }

    /// High-amount check for a stored transaction
    pub async fn on_transaction(&self, tx: &Transaction) -> ResponderResult<Option<SecurityEvent>> {
        if tx.amount <= self.config.high_amount_threshold {
            return Ok(None);
        }

        let mut event = SecurityEvent::new(
            event_types::HIGH_AMOUNT_TRANSACTION,
            Severity::Medium,
            format!("High amount transaction: {}", tx.amount),
            tx.occurred_at,
        )
        .with_user(tx.user_id.clone())
        .with_metadata(json!({
            "transaction_id": tx.id,
            "amount": tx.amount,
        }));
        if let Some(ip) = &tx.ip_address {
            event = event.with_ip(ip.clone());
        }
        if let Some(ua) = &tx.user_agent {
            event = event.with_user_agent(ua.clone());
        }

        self.raise_event(event).await.map(Some)
    }

    /// Geolocate, store and fan out a security event
    pub async fn raise_event(&self, mut event: SecurityEvent) -> ResponderResult<SecurityEvent> {
        if event.location.is_none() {
            event.location = self.locate(&event.ip_address).await.map(|l| l.to_string());
        }

        let stored = self.store.insert_security_event(&event).await;
        self.audit
            .on_failure(
                stored,
                event.user_id.as_deref(),
                "create_security_event",
                "security_event",
                &event.id,
                event.created_at,
            )
            .await?;
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            severity = %event.severity,
            user_id = ?event.user_id,
            "Security event raised"
        );
        self.audit
            .mutation(
                event.user_id.as_deref(),
                "create_security_event",
                "security_event",
                &event.id,
                None::<&SecurityEvent>,
                Some(&event),
                event.created_at,
            )
            .await;

        if event.severity.is_critical() {
            match SecurityNotification::for_critical(&event) {
                Some(notification) => self.notify(&notification).await,
                None => tracing::warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "Critical event has no user, no notification created"
                ),
            }
        }

        Ok(event)
    }

    /// Store and deliver a notification. Failures are logged and audited,
    /// never returned.
    async fn notify(&self, notification: &SecurityNotification) {
        if let Err(e) = self.store.insert_notification(notification).await {
            tracing::warn!(
                notification_id = %notification.id,
                user_id = %notification.user_id,
                event_id = %notification.event_id,
                error = %e,
                "Notification could not be stored"
            );
            self.audit
                .failure(
                    Some(notification.user_id.as_str()),
                    "create_notification",
                    "security_notification",
                    &notification.id,
                    &e.to_string(),
                    notification.created_at,
                )
                .await;
            return;
        }
        self.audit
            .mutation(
                Some(notification.user_id.as_str()),
                "create_notification",
                "security_notification",
                &notification.id,
                None::<&SecurityNotification>,
                Some(notification),
                notification.created_at,
            )
            .await;
        notify::deliver(
            self.notifier.as_ref(),
            notification,
            self.config.notify_timeout(),
        )
        .await;
    }

    /// Execute rule matches for an event: one security event per match,
    /// and an IP block for `block` actions when the event carries an IP
    pub async fn execute_matches(
        &self,
        ctx: &RuleContext,
        matches: &[RuleMatch],
        location: Option<&GeoLocation>,
    ) -> ResponderResult<Vec<SecurityEvent>> {
        let mut raised = Vec::with_capacity(matches.len());

        for m in matches {
            if m.action == RuleAction::Block {
                if let Some(ip) = &ctx.ip_address {
                    let reason = format!("Fraud rule: {}", m.rule_name);
                    self.block_ip(ip, &reason, ctx.user_id.as_deref(), ctx.at)
                        .await?;
                }
            }

            let mut event = SecurityEvent::new(
                m.event_type.clone(),
                m.severity,
                m.description.clone(),
                ctx.at,
            )
            .with_metadata(json!({
                "rule": m.rule_name,
                "rule_type": m.rule_type,
                "action": m.action,
                "metric": m.metric,
                "threshold": m.threshold,
                "source_event_id": ctx.event_id,
            }));
            if let Some(user_id) = &ctx.user_id {
                event = event.with_user(user_id.clone());
            }
            if let Some(ip) = &ctx.ip_address {
                event = event.with_ip(ip.clone());
            }
            event.location = location.map(|l| l.to_string());

            raised.push(self.raise_event(event).await?);
        }

        Ok(raised)
    }
}
