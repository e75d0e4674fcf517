//! Fraud Engine - the facade the application layer talks to
//!
//! Wires the store, audit logger, velocity tracker, scorer, rule engine and
//! auto-responder into one processor, runs it behind the partitioned
//! dispatcher, and answers the read-side queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::oneshot;

use riskwatch_audit::{AuditLedger, AuditLogger, AuditSink, StoreSink};
use riskwatch_core::{
    AuditRecord, DeviceFingerprint, IngressEvent, IpReputation, LoginAttempt, RiskScore, SecurityEvent,
    SecurityNotification, Transaction,
};
use riskwatch_responder::{AutoResponder, GeoResolver, Notifier};
use riskwatch_risk::{RiskScorer, VelocityTracker};
use riskwatch_rules::{FraudRule, RuleEngine, RuleSetChange};
use riskwatch_store::{SignalStore, StoreError};

use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::error::EngineResult;
use crate::metrics::SecurityMetrics;
use crate::processor::{EventProcessor, ProcessOutcome};

/// Block state of an IP as seen by the authentication layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpStatus {
    pub ip_address: String,
    pub reputation_score: u8,
    /// Block active at the query time; an expired block reads as unblocked
    pub is_blocked: bool,
    pub blocked_until: Option<DateTime<Utc>>,
    pub block_reason: Option<String>,
    /// No reputation row exists yet
    pub first_contact: bool,
}

impl IpStatus {
    fn from_row(row: Option<IpReputation>, ip_address: &str, now: DateTime<Utc>) -> Self {
        let first_contact = row.is_none();
        let rep = row.unwrap_or_else(|| IpReputation::first_contact(ip_address, now));
        let is_blocked = rep.is_blocked_at(now);
        Self {
            ip_address: rep.ip_address,
            reputation_score: rep.reputation_score,
            is_blocked,
            blocked_until: if is_blocked { rep.blocked_until } else { None },
            block_reason: if is_blocked { rep.block_reason } else { None },
            first_contact,
        }
    }
}

pub struct EngineBuilder {
    store: Arc<dyn SignalStore>,
    config: EngineConfig,
    geo: Option<Arc<dyn GeoResolver>>,
    notifier: Option<Arc<dyn Notifier>>,
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl EngineBuilder {
    pub fn geo(mut self, geo: Arc<dyn GeoResolver>) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Extra audit sink next to the store's audit table
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Assemble the engine (events run on the ambient tokio runtime)
    pub fn build(self) -> EngineResult<FraudEngine> {
        let EngineBuilder {
            store,
            config,
            geo,
            notifier,
            sinks,
        } = self;

        let mut audit = AuditLogger::new().with_sink(Arc::new(StoreSink::new(store.clone())));
        if let Some(path) = &config.audit_ledger {
            audit = audit.with_sink(Arc::new(AuditLedger::open(path)?));
        }
        for sink in sinks {
            audit = audit.with_sink(sink);
        }

        let rules = Arc::new(RuleEngine::new(store.clone(), config.rules.clone())?);

        let mut responder =
            AutoResponder::new(store.clone(), audit.clone(), config.responder.clone())
                .with_retry(config.retry.clone());
        if let Some(geo) = geo {
            responder = responder.with_geo(geo);
        }
        if let Some(notifier) = notifier {
            responder = responder.with_notifier(notifier);
        }

        let processor = Arc::new(EventProcessor::new(
            store.clone(),
            audit.clone(),
            VelocityTracker::new(store.clone(), config.retry.clone()),
            RiskScorer::new(store.clone(), config.retry.clone()),
            rules.clone(),
            responder,
        ));
        let dispatcher = Dispatcher::new(processor, config.queue_capacity);

        tracing::info!(
            queue_capacity = dispatcher.capacity(),
            rules = rules.rules().len(),
            rule_set_hash = %rules.hash(),
            audit_sinks = audit.sink_count(),
            "Fraud engine started"
        );

        Ok(FraudEngine {
            store,
            audit,
            rules,
            dispatcher,
            config,
        })
    }
}

pub struct FraudEngine {
    store: Arc<dyn SignalStore>,
    audit: AuditLogger,
    rules: Arc<RuleEngine>,
    dispatcher: Dispatcher,
    config: EngineConfig,
}

impl FraudEngine {
    pub fn builder(store: Arc<dyn SignalStore>, config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            store,
            config,
            geo: None,
            notifier: None,
            sinks: Vec::new(),
        }
    }

    /// Engine with the default collaborators
    pub fn new(store: Arc<dyn SignalStore>, config: EngineConfig) -> EngineResult<Self> {
        Self::builder(store, config).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // === Ingestion ===

    /// Process an event in order with earlier events of its partition
    pub async fn submit(&self, event: IngressEvent) -> EngineResult<ProcessOutcome> {
        self.dispatcher.submit(event).await
    }

    /// Queue an event and return the receiver for its outcome
    pub async fn enqueue(
        &self,
        event: IngressEvent,
    ) -> EngineResult<oneshot::Receiver<EngineResult<ProcessOutcome>>> {
        self.dispatcher.enqueue(event).await
    }

    pub async fn login_attempt(&self, attempt: LoginAttempt) -> EngineResult<ProcessOutcome> {
        self.submit(IngressEvent::LoginAttempt(attempt)).await
    }

    pub async fn transaction(&self, tx: Transaction) -> EngineResult<ProcessOutcome> {
        self.submit(IngressEvent::Transaction(tx)).await
    }

    /// Stop admitting events and wait for the admitted ones to finish
    pub async fn shutdown(self) {
        tracing::info!(
            active_partitions = self.dispatcher.active_partitions(),
            "Draining dispatcher"
        );
        self.dispatcher.shutdown().await;
    }

    // === Queries ===

    pub async fn risk_score(&self, user_id: &str) -> EngineResult<Option<RiskScore>> {
        Ok(self.store.get_risk_score(user_id).await?)
    }

    /// Block state at `now`; expiry is evaluated lazily here
    pub async fn ip_status(&self, ip_address: &str, now: DateTime<Utc>) -> EngineResult<IpStatus> {
        let row = self.store.get_ip(ip_address).await?;
        Ok(IpStatus::from_row(row, ip_address, now))
    }

    pub async fn security_events(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> EngineResult<Vec<SecurityEvent>> {
        Ok(self.store.security_events(user_id, limit).await?)
    }

    pub async fn notifications(&self, user_id: &str) -> EngineResult<Vec<SecurityNotification>> {
        Ok(self.store.notifications(user_id).await?)
    }

    /// Newest audit records first, failures included
    pub async fn audit_records(&self, limit: usize) -> EngineResult<Vec<AuditRecord>> {
        Ok(self.store.audit_records(limit).await?)
    }

    pub async fn metrics(&self, now: DateTime<Utc>) -> EngineResult<SecurityMetrics> {
        SecurityMetrics::collect(self.store.as_ref(), now, self.config.high_risk_user_score).await
    }

    // === Mutations outside the event stream ===

    /// Returns `false` when no such notification exists
    pub async fn mark_notification_read(&self, id: &str, at: DateTime<Utc>) -> EngineResult<bool> {
        let marked = self.store.mark_notification_read(id).await;
        let updated = self
            .audit
            .on_failure(marked, None, "mark_notification_read", "security_notification", id, at)
            .await?;
        if updated {
            self.audit
                .mutation(
                    None,
                    "mark_notification_read",
                    "security_notification",
                    id,
                    Some(&json!({"is_read": false})),
                    Some(&json!({"is_read": true})),
                    at,
                )
                .await;
        }
        Ok(updated)
    }

    /// Device verification entry point: set a device's trust flag
    pub async fn register_device(
        &self,
        user_id: &str,
        device_id: &str,
        trusted: bool,
        at: DateTime<Utc>,
    ) -> EngineResult<DeviceFingerprint> {
        let resource_id = format!("{}:{}", user_id, device_id);
        let updated = async {
            let before = self.store.get_device(user_id, device_id).await?;
            let after = self
                .store
                .set_device_trust(user_id, device_id, trusted, at)
                .await?;
            Ok::<_, StoreError>((before, after))
        }
        .await;
        let (before, after) = self
            .audit
            .on_failure(
                updated,
                Some(user_id),
                "set_device_trust",
                "device_fingerprint",
                &resource_id,
                at,
            )
            .await?;
        tracing::info!(user_id, device_id, trusted, "Device trust updated");
        self.audit
            .mutation(
                Some(user_id),
                "set_device_trust",
                "device_fingerprint",
                &resource_id,
                before.as_ref(),
                Some(&after),
                at,
            )
            .await;
        Ok(after)
    }

    // === Rules ===

    pub fn rules(&self) -> Vec<FraudRule> {
        self.rules.rules()
    }

    pub fn rule_set_hash(&self) -> String {
        self.rules.hash()
    }

    /// Swap the active rule set; the change is audited with both hashes
    pub async fn replace_rules(
        &self,
        rules: Vec<FraudRule>,
        at: DateTime<Utc>,
    ) -> EngineResult<RuleSetChange> {
        let change = match self.rules.replace_rules(rules.clone()) {
            Ok(change) => change,
            Err(e) => {
                self.audit
                    .failure(None, "replace_rules", "fraud_rule_set", &self.rules.hash(), &e.to_string(), at)
                    .await;
                return Err(e.into());
            }
        };
        self.audit
            .mutation(
                None,
                "replace_rules",
                "fraud_rule_set",
                &change.hash,
                Some(&json!({"hash": change.previous_hash})),
                Some(&json!({
                    "hash": change.hash,
                    "rule_count": change.rule_count,
                    "rules": rules,
                })),
                at,
            )
            .await;
        Ok(change)
    }
}
