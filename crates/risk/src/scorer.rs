//! Risk Scorer - five weighted sub-scores and a clamped composite
//!
//! Scoring is split in two:
//! - [`RiskInputs::gather`] reads the signal stores
//! - [`SubScores::compute`] is a pure function of those inputs
//!
//! [`RiskScorer::recompute`] glues them together and upserts the single
//! `RiskScore` row. Recompute with identical inputs yields an identical row.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use riskwatch_core::{RiskScore, TimeWindow, TransactionVelocity, DEFAULT_REPUTATION};
use riskwatch_store::{with_retry, RetryPolicy, SignalStore};

use crate::error::RiskResult;

/// Composite weights in percent; they sum to 100
pub const LOCATION_WEIGHT: u32 = 20;
pub const DEVICE_WEIGHT: u32 = 30;
pub const BEHAVIOR_WEIGHT: u32 = 20;
pub const TRANSACTION_WEIGHT: u32 = 20;
pub const VELOCITY_WEIGHT: u32 = 10;

/// Location risk when the user has no recent logins
pub const DEFAULT_LOCATION_RISK: u8 = 50;

/// Everything the scoring formulas look at
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RiskInputs {
    /// Risk value of each login's IP over the last 24h (blocked = 100)
    pub login_ip_values: Vec<u8>,
    pub has_trusted_device: bool,
    pub failed_logins_1h: u32,
    pub transactions_1h: u32,
    /// Live 1h velocity counter (zero when absent or expired)
    pub velocity_1h_count: u32,
    pub velocity_1h_total: Decimal,
}

impl RiskInputs {
    pub fn with_velocity(mut self, velocity: Option<&TransactionVelocity>) -> Self {
        if let Some(v) = velocity {
            self.velocity_1h_count = v.transaction_count;
            self.velocity_1h_total = v.total_amount;
        }
        self
    }

    /// Read the inputs for `user_id` as of `now`
    pub async fn gather(
        store: &dyn SignalStore,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> RiskResult<Self> {
        let day_ago = now - Duration::hours(24);
        let hour_ago = now - Duration::hours(1);

        let logins = store.logins_for_user(user_id, day_ago, now).await?;
        let mut by_ip: HashMap<&str, u8> = HashMap::new();
        let mut login_ip_values = Vec::with_capacity(logins.len());
        for login in &logins {
            let value = match by_ip.get(login.ip_address.as_str()) {
                Some(v) => *v,
                None => {
                    let v = store
                        .get_ip(&login.ip_address)
                        .await?
                        .map_or(DEFAULT_REPUTATION, |rep| rep.risk_value(now));
                    by_ip.insert(login.ip_address.as_str(), v);
                    v
                }
            };
            login_ip_values.push(value);
        }

        let velocity = store
            .get_velocity(user_id, TimeWindow::OneHour)
            .await?
            .filter(|v| !v.is_expired_at(now));

        Ok(Self {
            login_ip_values,
            has_trusted_device: store.has_trusted_device(user_id).await?,
            failed_logins_1h: store
                .count_failed_logins_for_user(user_id, hour_ago, now)
                .await?,
            transactions_1h: store.count_transactions(user_id, hour_ago, now).await?,
            ..Self::default()
        }
        .with_velocity(velocity.as_ref()))
    }
}

/// The five sub-scores, each 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubScores {
    pub location: u8,
    pub device: u8,
    pub behavior: u8,
    pub transaction: u8,
    pub velocity: u8,
}

impl SubScores {
    pub fn compute(inputs: &RiskInputs) -> Self {
        Self {
            location: location_risk(&inputs.login_ip_values),
            device: device_risk(inputs.has_trusted_device),
            behavior: behavior_risk(inputs.failed_logins_1h),
            transaction: transaction_risk(inputs.transactions_1h),
            velocity: velocity_risk(inputs.velocity_1h_count, inputs.velocity_1h_total),
        }
    }

    /// Weighted sum rounded half-up, clamped to 100
    pub fn composite(&self) -> u8 {
        let weighted = self.location as u32 * LOCATION_WEIGHT
            + self.device as u32 * DEVICE_WEIGHT
            + self.behavior as u32 * BEHAVIOR_WEIGHT
            + self.transaction as u32 * TRANSACTION_WEIGHT
            + self.velocity as u32 * VELOCITY_WEIGHT;
        ((weighted + 50) / 100).min(100) as u8
    }

    pub fn into_score(self, user_id: impl Into<String>, now: DateTime<Utc>) -> RiskScore {
        RiskScore {
            user_id: user_id.into(),
            current_score: self.composite(),
            location_risk: self.location,
            device_risk: self.device,
            behavior_risk: self.behavior,
            transaction_risk: self.transaction,
            velocity_risk: self.velocity,
            last_calculated: now,
        }
    }
}

pub fn location_risk(ip_values: &[u8]) -> u8 {
    if ip_values.is_empty() {
        return DEFAULT_LOCATION_RISK;
    }
    let n = ip_values.len() as u64;
    let sum: u64 = ip_values.iter().map(|v| (*v).min(100) as u64).sum();
    ((sum + n / 2) / n) as u8
}

pub fn device_risk(has_trusted_device: bool) -> u8 {
    if has_trusted_device {
        20
    } else {
        80
    }
}

pub fn behavior_risk(failed_logins_1h: u32) -> u8 {
    failed_logins_1h.saturating_mul(10).min(100) as u8
}

pub fn transaction_risk(transactions_1h: u32) -> u8 {
    match transactions_1h {
        n if n > 10 => 80,
        n if n > 5 => 50,
        _ => 20,
    }
}

pub fn velocity_risk(count_1h: u32, total_1h: Decimal) -> u8 {
    if total_1h > Decimal::from(10_000) {
        90
    } else if total_1h > Decimal::from(5_000) {
        60
    } else if count_1h > 20 {
        70
    } else {
        10
    }
}

/// Recomputes and persists risk scores
pub struct RiskScorer {
    store: Arc<dyn SignalStore>,
    retry: RetryPolicy,
}

impl RiskScorer {
    pub fn new(store: Arc<dyn SignalStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Score `user_id` as of `now` without writing anything
    pub async fn evaluate(&self, user_id: &str, now: DateTime<Utc>) -> RiskResult<RiskScore> {
        let inputs = RiskInputs::gather(self.store.as_ref(), user_id, now).await?;
        Ok(SubScores::compute(&inputs).into_score(user_id, now))
    }

    /// Score `user_id` and upsert its row
    pub async fn recompute(&self, user_id: &str, now: DateTime<Utc>) -> RiskResult<RiskScore> {
        let score = self.evaluate(user_id, now).await?;
        with_retry(&self.retry, "upsert_risk_score", || {
            self.store.upsert_risk_score(&score)
        })
        .await?;

        tracing::debug!(
            user_id,
            score = score.current_score,
            location = score.location_risk,
            device = score.device_risk,
            behavior = score.behavior_risk,
            transaction = score.transaction_risk,
            velocity = score.velocity_risk,
            "Risk score recomputed"
        );
        Ok(score)
    }
}
