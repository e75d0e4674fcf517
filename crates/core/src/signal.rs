//! Signal rows - the mutable trust state derived from ingress events
//!
//! The state transitions live here as pure functions so that every storage
//! backend applies exactly the same rules:
//! - [`IpReputation::apply_block`] for the failed-login auto-block
//! - [`TransactionVelocity::advance`] for the velocity reset law

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::window::TimeWindow;

/// Reputation assumed for an IP the system has never seen
pub const DEFAULT_REPUTATION: u8 = 50;

/// Trust score and block state of a source IP address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpReputation {
    pub ip_address: String,

    /// 0..=100
    pub reputation_score: u8,

    pub is_blocked: bool,

    pub block_reason: Option<String>,

    /// `None` while blocked means blocked indefinitely
    pub blocked_until: Option<DateTime<Utc>>,

    #[serde(default)]
    pub is_vpn: bool,

    #[serde(default)]
    pub is_tor: bool,

    #[serde(default)]
    pub is_proxy: bool,

    pub updated_at: DateTime<Utc>,
}

/// Parameters of a single block attempt on an IP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpBlock {
    pub reason: String,
    /// When the block was decided (the triggering event's time)
    pub at: DateTime<Utc>,
    pub until: DateTime<Utc>,
    /// Reputation points removed from an existing row
    pub penalty: u8,
}

impl IpBlock {
    pub fn new(reason: impl Into<String>, at: DateTime<Utc>, duration: Duration, penalty: u8) -> Self {
        Self {
            reason: reason.into(),
            at,
            until: at + duration,
            penalty,
        }
    }
}

impl IpReputation {
    /// Conservative default for an IP seen for the first time
    pub fn first_contact(ip_address: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            ip_address: ip_address.into(),
            reputation_score: DEFAULT_REPUTATION,
            is_blocked: false,
            block_reason: None,
            blocked_until: None,
            is_vpn: false,
            is_tor: false,
            is_proxy: false,
            updated_at: now,
        }
    }

    /// Block state evaluated lazily against `now`; there is no expiry sweep
    pub fn is_blocked_at(&self, now: DateTime<Utc>) -> bool {
        self.is_blocked && self.blocked_until.map_or(true, |until| until > now)
    }

    /// Value this IP contributes to a user's location risk
    pub fn risk_value(&self, now: DateTime<Utc>) -> u8 {
        if self.is_blocked_at(now) {
            100
        } else {
            self.reputation_score.min(100)
        }
    }

    /// Apply a block to an optional existing row.
    ///
    /// Returns `None` when the IP is still actively blocked at `block.at`:
    /// a burst of failures blocks once, not once per failure.
    /// A new IP starts at reputation 0; an existing one loses `penalty`
    /// points, floored at 0.
    pub fn apply_block(
        existing: Option<&IpReputation>,
        ip_address: &str,
        block: &IpBlock,
    ) -> Option<IpReputation> {
        match existing {
            Some(current) if current.is_blocked_at(block.at) => None,
            Some(current) => Some(IpReputation {
                reputation_score: current.reputation_score.saturating_sub(block.penalty),
                is_blocked: true,
                block_reason: Some(block.reason.clone()),
                blocked_until: Some(block.until),
                updated_at: block.at,
                ..current.clone()
            }),
            None => Some(IpReputation {
                reputation_score: 0,
                is_blocked: true,
                block_reason: Some(block.reason.clone()),
                blocked_until: Some(block.until),
                ..IpReputation::first_contact(ip_address, block.at)
            }),
        }
    }
}

/// A device a user has been seen on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    pub user_id: String,
    pub device_id: String,
    /// Only changed by the out-of-band verification flow
    pub is_trusted: bool,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl DeviceFingerprint {
    pub fn new(user_id: impl Into<String>, device_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            is_trusted: false,
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn trusted(mut self) -> Self {
        self.is_trusted = true;
        self
    }
}

/// Composite risk score of a user plus its five sub-scores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskScore {
    pub user_id: String,
    pub current_score: u8,
    pub location_risk: u8,
    pub device_risk: u8,
    pub behavior_risk: u8,
    pub transaction_risk: u8,
    pub velocity_risk: u8,
    pub last_calculated: DateTime<Utc>,
}

/// Rolling transaction counter for one `(user, window)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionVelocity {
    pub user_id: String,
    pub time_window: TimeWindow,
    pub transaction_count: u32,
    pub total_amount: Decimal,
    pub last_reset: DateTime<Utc>,
}

impl TransactionVelocity {
    /// Fresh window opened by a single transaction
    pub fn start(
        user_id: impl Into<String>,
        time_window: TimeWindow,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            time_window,
            transaction_count: 1,
            total_amount: amount,
            last_reset: at,
        }
    }

    /// `at - last_reset >= D(w)`
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        at - self.last_reset >= self.time_window.duration()
    }

    /// Count one more transaction, resetting first if the window expired
    pub fn advance(&self, amount: Decimal, at: DateTime<Utc>) -> Self {
        if self.is_expired_at(at) {
            Self::start(self.user_id.clone(), self.time_window, amount, at)
        } else {
            Self {
                transaction_count: self.transaction_count.saturating_add(1),
                total_amount: self.total_amount + amount,
                ..self.clone()
            }
        }
    }

    /// Update rule for an optional existing row
    pub fn apply(
        existing: Option<&TransactionVelocity>,
        user_id: &str,
        time_window: TimeWindow,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Self {
        match existing {
            Some(current) => current.advance(amount, at),
            None => Self::start(user_id, time_window, amount, at),
        }
    }
}

/// One window's row before and after a recorded transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityUpdate {
    pub before: Option<TransactionVelocity>,
    pub after: TransactionVelocity,
}

impl VelocityUpdate {
    pub fn window(&self) -> TimeWindow {
        self.after.time_window
    }

    /// The window had expired and was restarted by this transaction
    pub fn was_reset(&self) -> bool {
        self.before
            .as_ref()
            .map_or(false, |before| before.last_reset != self.after.last_reset)
    }
}
