//! Rule Engine - evaluates the active rule set against an event
//!
//! All active rules are checked and every match is returned; nothing
//! short-circuits. The built-in risk score rule runs last.

use chrono::Duration;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use riskwatch_core::{event_types, RiskScore, Severity, TimeWindow};
use riskwatch_store::SignalStore;

use crate::config::{rule_set_hash, validate_rules, RuleSetConfig};
use crate::context::{EventKind, RuleContext, RuleMatch};
use crate::error::RuleResult;
use crate::rule::{FraudRule, RuleAction, RuleType};

/// Longest rule window honoured (ten years)
const MAX_WINDOW_SECONDS: u64 = 10 * 365 * 24 * 3600;

/// Outcome of replacing the active rule set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSetChange {
    pub previous_hash: String,
    pub hash: String,
    pub rule_count: usize,
}

struct ActiveRules {
    config: RuleSetConfig,
    hash: String,
}

pub struct RuleEngine {
    store: Arc<dyn SignalStore>,
    active: RwLock<ActiveRules>,
}

impl RuleEngine {
    pub fn new(store: Arc<dyn SignalStore>, config: RuleSetConfig) -> RuleResult<Self> {
        validate_rules(&config.rules)?;
        let hash = rule_set_hash(&config.rules)?;
        Ok(Self {
            store,
            active: RwLock::new(ActiveRules { config, hash }),
        })
    }

    /// Snapshot of the active configuration
    pub fn config(&self) -> RuleSetConfig {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .config
            .clone()
    }

    pub fn rules(&self) -> Vec<FraudRule> {
        self.config().rules
    }

    /// SHA-256 of the active rule set
    pub fn hash(&self) -> String {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .hash
            .clone()
    }

    /// Swap in a new rule set; the thresholds and country list are kept
    pub fn replace_rules(&self, rules: Vec<FraudRule>) -> RuleResult<RuleSetChange> {
        validate_rules(&rules)?;
        let hash = rule_set_hash(&rules)?;
        let rule_count = rules.len();

        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        let previous_hash = std::mem::replace(&mut active.hash, hash.clone());
        active.config.rules = rules;
        drop(active);

        tracing::info!(
            previous_hash = %previous_hash,
            hash = %hash,
            rule_count,
            "Fraud rule set replaced"
        );
        Ok(RuleSetChange {
            previous_hash,
            hash,
            rule_count,
        })
    }

    /// Evaluate every active rule plus the built-in score rule
    pub async fn evaluate(
        &self,
        ctx: &RuleContext,
        score: Option<&RiskScore>,
    ) -> RuleResult<Vec<RuleMatch>> {
        let config = self.config();
        let mut matches = Vec::new();

        for rule in config.rules.iter().filter(|r| r.is_active) {
            let Some(metric) = self.metric(rule, ctx, &config).await? else {
                continue;
            };
            if rule.matches(metric) {
                tracing::info!(
                    rule = %rule.name,
                    rule_type = %rule.rule_type,
                    action = %rule.action,
                    metric = %metric,
                    threshold = %rule.threshold,
                    event_id = %ctx.event_id,
                    "Fraud rule matched"
                );
                matches.push(RuleMatch::from_rule(rule, metric));
            }
        }

        if let Some(score) = score {
            if score.current_score > config.high_risk_score_threshold {
                tracing::warn!(
                    user_id = %score.user_id,
                    score = score.current_score,
                    threshold = config.high_risk_score_threshold,
                    "Risk score above threshold"
                );
                matches.push(RuleMatch {
                    rule_name: "High Risk Score".to_string(),
                    rule_type: None,
                    action: RuleAction::Alert,
                    severity: Severity::Critical,
                    metric: Decimal::from(score.current_score),
                    threshold: Decimal::from(config.high_risk_score_threshold),
                    event_type: event_types::HIGH_RISK_SCORE.to_string(),
                    description: format!(
                        "Risk score {} exceeds {}",
                        score.current_score, config.high_risk_score_threshold
                    ),
                });
            }
        }

        Ok(matches)
    }

    /// The value a rule compares against its threshold, `None` when the rule
    /// does not apply to this event
    async fn metric(
        &self,
        rule: &FraudRule,
        ctx: &RuleContext,
        config: &RuleSetConfig,
    ) -> RuleResult<Option<Decimal>> {
        let seconds = rule.time_window_seconds.min(MAX_WINDOW_SECONDS);
        let since = ctx.at - Duration::seconds(seconds as i64);

        let metric = match (rule.rule_type, ctx.kind) {
            (RuleType::Amount, EventKind::Transaction) => ctx.amount,

            (RuleType::Frequency, EventKind::Transaction) => match &ctx.user_id {
                Some(user_id) => Some(Decimal::from(
                    self.store.count_transactions(user_id, since, ctx.at).await?,
                )),
                None => None,
            },

            (RuleType::Frequency, EventKind::LoginAttempt) => match &ctx.email {
                Some(email) => Some(Decimal::from(
                    self.store.count_failed_logins(email, since, ctx.at).await?,
                )),
                None => None,
            },

            (RuleType::Velocity, EventKind::Transaction) => match &ctx.user_id {
                Some(user_id) => {
                    let window = TimeWindow::covering(seconds as i64);
                    let count = self
                        .store
                        .get_velocity(user_id, window)
                        .await?
                        .filter(|v| !v.is_expired_at(ctx.at))
                        .map_or(0, |v| v.transaction_count);
                    Some(Decimal::from(count))
                }
                None => None,
            },

            (RuleType::Location, _) => Some(flag(
                ctx.country
                    .as_deref()
                    .map_or(false, |c| config.is_high_risk_country(c)),
            )),

            (RuleType::Device, EventKind::Transaction) => match (&ctx.user_id, &ctx.device_id) {
                (Some(user_id), Some(device_id)) => {
                    let trusted = self
                        .store
                        .get_device(user_id, device_id)
                        .await?
                        .map_or(false, |d| d.is_trusted);
                    Some(flag(!trusted))
                }
                (Some(_), None) => Some(flag(true)),
                (None, _) => None,
            },

            (RuleType::Pattern, _) => match &ctx.user_id {
                Some(user_id) => {
                    let logins = self.store.logins_for_user(user_id, since, ctx.at).await?;
                    let mut ips: HashSet<&str> =
                        logins.iter().map(|l| l.ip_address.as_str()).collect();
                    if let Some(ip) = ctx.ip_address.as_deref() {
                        ips.insert(ip);
                    }
                    Some(Decimal::from(ips.len() as u64))
                }
                None => None,
            },

            (RuleType::Amount, _) | (RuleType::Velocity, _) | (RuleType::Device, _) => None,
        };
        Ok(metric)
    }
}

fn flag(on: bool) -> Decimal {
    if on {
        Decimal::ONE
    } else {
        Decimal::ZERO
    }
}
