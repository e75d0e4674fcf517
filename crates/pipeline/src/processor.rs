//! Event processor - the ordered pipeline for one event
//!
//! Stages, in order:
//! 1. validate (rejections are audited and never touch signal state)
//! 2. append the event to history, record device sightings
//! 3. reactive behaviours: failed-login block, or velocity + high-amount check
//! 4. recompute the user's risk score
//! 5. evaluate fraud rules and execute the matches
//!
//! The processor holds no per-user state; ordering within a user comes from
//! the dispatcher. Every store mutation is audited, failed ones included.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use riskwatch_audit::AuditLogger;
use riskwatch_core::{
    validate_login_attempt, validate_transaction, IngressEvent, IpReputation, LoginAttempt,
    RiskScore, SecurityEvent, Transaction,
};
use riskwatch_responder::{AutoResponder, GeoLocation};
use riskwatch_risk::{RiskScorer, VelocityTracker, VelocityUpdate};
use riskwatch_rules::{RuleContext, RuleEngine, RuleMatch};
use riskwatch_store::{SignalStore, StoreError};

use crate::error::{EngineError, EngineResult};

/// What processing one event did
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessOutcome {
    pub event_id: String,
    pub user_id: Option<String>,
    /// Failed logins for the email in the block window (logins only)
    pub failed_logins: Option<u32>,
    /// Reputation row written when this event blocked an IP
    pub blocked_ip: Option<IpReputation>,
    #[serde(skip)]
    pub velocity: Vec<VelocityUpdate>,
    pub risk_score: Option<RiskScore>,
    pub matches: Vec<RuleMatch>,
    /// Events raised by the high-amount check and by rule matches
    pub events: Vec<SecurityEvent>,
}

pub struct EventProcessor {
    store: Arc<dyn SignalStore>,
    audit: AuditLogger,
    velocity: VelocityTracker,
    scorer: RiskScorer,
    rules: Arc<RuleEngine>,
    responder: AutoResponder,
}

impl EventProcessor {
    pub fn new(
        store: Arc<dyn SignalStore>,
        audit: AuditLogger,
        velocity: VelocityTracker,
        scorer: RiskScorer,
        rules: Arc<RuleEngine>,
        responder: AutoResponder,
    ) -> Self {
        Self {
            store,
            audit,
            velocity,
            scorer,
            rules,
            responder,
        }
    }

    pub fn responder(&self) -> &AutoResponder {
        &self.responder
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    pub async fn process(&self, event: IngressEvent) -> EngineResult<ProcessOutcome> {
        match event {
            IngressEvent::LoginAttempt(attempt) => self.process_login(attempt).await,
            IngressEvent::Transaction(tx) => self.process_transaction(tx).await,
        }
    }

    async fn process_login(&self, mut attempt: LoginAttempt) -> EngineResult<ProcessOutcome> {
        let at = attempt.created_at;
        if let Err(e) = validate_login_attempt(&attempt) {
            tracing::warn!(event_id = %attempt.id, email = %attempt.email, error = %e, "Login attempt rejected");
            self.audit
                .failure(
                    attempt.user_id.as_deref(),
                    "validate_login_attempt",
                    "login_attempt",
                    &attempt.id,
                    &e.to_string(),
                    at,
                )
                .await;
            return Err(e.into());
        }

        let location = self.responder.locate(&attempt.ip_address).await;
        if attempt.location.is_none() {
            attempt.location = location.as_ref().map(|l| l.to_string());
        }

        let stored = self.store.insert_login_attempt(&attempt).await;
        self.audit
            .on_failure(
                stored,
                attempt.user_id.as_deref(),
                "insert_login_attempt",
                "login_attempt",
                &attempt.id,
                at,
            )
            .await?;
        self.audit
            .mutation(
                attempt.user_id.as_deref(),
                "insert_login_attempt",
                "login_attempt",
                &attempt.id,
                None::<&LoginAttempt>,
                Some(&attempt),
                at,
            )
            .await;
        tracing::debug!(
            event_id = %attempt.id,
            email = %attempt.email,
            ip = %attempt.ip_address,
            success = attempt.success,
            "Login attempt stored"
        );

        if let (Some(user_id), Some(device_id)) = (&attempt.user_id, &attempt.device_id) {
            self.touch_device(user_id, device_id, at).await?;
        }

        let login = self.responder.on_login(&attempt).await?;

        let mut outcome = ProcessOutcome {
            event_id: attempt.id.clone(),
            user_id: attempt.user_id.clone(),
            failed_logins: Some(login.failed_count),
            blocked_ip: login.blocked,
            ..ProcessOutcome::default()
        };

        if let Some(user_id) = &attempt.user_id {
            outcome.risk_score = Some(self.recompute(user_id, at).await?);
        }

        let ctx = RuleContext::from_login(&attempt, location.as_ref().map(|l| l.country.clone()));
        self.apply_rules(&ctx, location.as_ref(), &mut outcome).await?;
        Ok(outcome)
    }

    async fn process_transaction(&self, tx: Transaction) -> EngineResult<ProcessOutcome> {
        let at = tx.occurred_at;
        if let Err(e) = validate_transaction(&tx) {
            tracing::warn!(event_id = %tx.id, user_id = %tx.user_id, error = %e, "Transaction rejected");
            let user_id = Some(tx.user_id.as_str()).filter(|u| !u.trim().is_empty());
            self.audit
                .failure(
                    user_id,
                    "validate_transaction",
                    "transaction",
                    &tx.id,
                    &e.to_string(),
                    at,
                )
                .await;
            return Err(e.into());
        }

        let stored = self.store.insert_transaction(&tx).await;
        self.audit
            .on_failure(
                stored,
                Some(tx.user_id.as_str()),
                "insert_transaction",
                "transaction",
                &tx.id,
                at,
            )
            .await?;
        self.audit
            .mutation(
                Some(tx.user_id.as_str()),
                "insert_transaction",
                "transaction",
                &tx.id,
                None::<&Transaction>,
                Some(&tx),
                at,
            )
            .await;
        tracing::debug!(event_id = %tx.id, user_id = %tx.user_id, amount = %tx.amount, "Transaction stored");

        if let Some(device_id) = &tx.device_id {
            self.touch_device(&tx.user_id, device_id, at).await?;
        }

        let recorded = self.velocity.record(&tx.user_id, tx.amount, at).await;
        let velocity = self
            .audit
            .on_failure(
                recorded,
                Some(tx.user_id.as_str()),
                "record_velocity",
                "transaction_velocity",
                &tx.user_id,
                at,
            )
            .await?;
        for update in &velocity {
            self.audit
                .mutation(
                    Some(tx.user_id.as_str()),
                    "record_velocity",
                    "transaction_velocity",
                    &format!("{}:{}", tx.user_id, update.window()),
                    update.before.as_ref(),
                    Some(&update.after),
                    at,
                )
                .await;
        }

        let high_amount = self.responder.on_transaction(&tx).await?;

        let mut outcome = ProcessOutcome {
            event_id: tx.id.clone(),
            user_id: Some(tx.user_id.clone()),
            velocity,
            events: high_amount.into_iter().collect(),
            ..ProcessOutcome::default()
        };
        outcome.risk_score = Some(self.recompute(&tx.user_id, at).await?);

        let location = match &tx.ip_address {
            Some(ip) => self.responder.locate(ip).await,
            None => None,
        };
        let ctx = RuleContext::from_transaction(&tx, location.as_ref().map(|l| l.country.clone()));
        self.apply_rules(&ctx, location.as_ref(), &mut outcome).await?;
        Ok(outcome)
    }

    async fn touch_device(
        &self,
        user_id: &str,
        device_id: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let resource_id = format!("{}:{}", user_id, device_id);
        let touched = async {
            let before = self.store.get_device(user_id, device_id).await?;
            let after = self.store.touch_device(user_id, device_id, at).await?;
            Ok::<_, StoreError>((before, after))
        }
        .await;
        let (before, after) = self
            .audit
            .on_failure(
                touched,
                Some(user_id),
                "touch_device",
                "device_fingerprint",
                &resource_id,
                at,
            )
            .await?;
        self.audit
            .mutation(
                Some(user_id),
                "touch_device",
                "device_fingerprint",
                &resource_id,
                before.as_ref(),
                Some(&after),
                at,
            )
            .await;
        Ok(())
    }

    async fn recompute(&self, user_id: &str, at: DateTime<Utc>) -> EngineResult<RiskScore> {
        let recomputed = async {
            let before = self.store.get_risk_score(user_id).await?;
            let score = self.scorer.recompute(user_id, at).await?;
            Ok::<_, EngineError>((before, score))
        }
        .await;
        let (before, score) = self
            .audit
            .on_failure(
                recomputed,
                Some(user_id),
                "upsert_risk_score",
                "risk_score",
                user_id,
                at,
            )
            .await?;
        self.audit
            .mutation(
                Some(user_id),
                "upsert_risk_score",
                "risk_score",
                user_id,
                before.as_ref(),
                Some(&score),
                at,
            )
            .await;
        Ok(score)
    }

    async fn apply_rules(
        &self,
        ctx: &RuleContext,
        location: Option<&GeoLocation>,
        outcome: &mut ProcessOutcome,
    ) -> EngineResult<()> {
        let matches = self.rules.evaluate(ctx, outcome.risk_score.as_ref()).await?;
        if matches.is_empty() {
            return Ok(());
        }

        self.audit
            .mutation(
                ctx.user_id.as_deref(),
                "evaluate_rules",
                "rule_match",
                &ctx.event_id,
                None::<&Vec<RuleMatch>>,
                Some(&matches),
                ctx.at,
            )
            .await;

        let raised = self
            .responder
            .execute_matches(ctx, &matches, location)
            .await?;
        outcome.events.extend(raised);
        outcome.matches = matches;
        Ok(())
    }
}
