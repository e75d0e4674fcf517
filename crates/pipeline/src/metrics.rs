//! Security dashboard metrics

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString, IntoEnumIterator};

use riskwatch_core::{RiskScore, SecurityEvent, Severity};
use riskwatch_risk::RiskLevel;
use riskwatch_store::SignalStore;

use crate::error::EngineResult;

/// Overall health grade derived from the threat counters
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SystemHealth {
    #[default]
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl SystemHealth {
    /// Grade a 0-100 health score
    pub fn from_score(score: i32) -> Self {
        match score {
            s if s >= 90 => SystemHealth::Excellent,
            s if s >= 75 => SystemHealth::Good,
            s if s >= 60 => SystemHealth::Fair,
            s if s >= 40 => SystemHealth::Poor,
            _ => SystemHealth::Critical,
        }
    }
}

/// Deduct `major` above `high`, `minor` above `low`
fn penalty(value: u32, low: u32, high: u32, minor: i32, major: i32) -> i32 {
    if value > high {
        major
    } else if value > low {
        minor
    } else {
        0
    }
}

/// Country code of a stored event location (`"City, CC"` or `"CC"`)
fn country_of(location: &str) -> Option<&str> {
    location
        .rsplit(", ")
        .next()
        .map(str::trim)
        .filter(|c| !c.is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityMetrics {
    pub failed_logins_24h: u32,
    /// IPs whose block is active at the metrics time
    pub blocked_ips: u32,
    pub high_risk_users: u32,
    pub critical_events_24h: u32,
    pub fraud_events_24h: u32,
    /// Users per risk level; every level is present
    pub risk_distribution: BTreeMap<RiskLevel, u32>,
    /// High and critical events of the last 24h per country code
    pub geographic_threats: BTreeMap<String, u32>,
    pub system_health: SystemHealth,
}

impl SecurityMetrics {
    /// Collect metrics as of `now`
    pub async fn collect(
        store: &dyn SignalStore,
        now: DateTime<Utc>,
        high_risk_user_score: u8,
    ) -> EngineResult<Self> {
        let since = now - Duration::hours(24);
        let failed_logins_24h = store.count_all_failed_logins(since, now).await?;
        let blocked_ips = store.count_blocked_ips(now).await?;
        let scores = store.list_risk_scores().await?;
        let events = store.security_events_between(since, now).await?;

        let mut metrics = Self::from_rows(&scores, &events, high_risk_user_score);
        metrics.failed_logins_24h = failed_logins_24h;
        metrics.blocked_ips = blocked_ips;
        metrics.system_health = metrics.assess();
        Ok(metrics)
    }

    /// Score and event aggregates; the store counters are left at zero
    pub fn from_rows(
        scores: &[RiskScore],
        events_24h: &[SecurityEvent],
        high_risk_user_score: u8,
    ) -> Self {
        let mut risk_distribution: BTreeMap<RiskLevel, u32> =
            RiskLevel::iter().map(|level| (level, 0)).collect();
        for score in scores {
            *risk_distribution
                .entry(RiskLevel::from_score(score.current_score))
                .or_default() += 1;
        }

        let mut geographic_threats = BTreeMap::new();
        for event in events_24h.iter().filter(|e| e.severity >= Severity::High) {
            if let Some(country) = event.location.as_deref().and_then(country_of) {
                *geographic_threats.entry(country.to_string()).or_default() += 1;
            }
        }

        let mut metrics = Self {
            failed_logins_24h: 0,
            blocked_ips: 0,
            high_risk_users: scores
                .iter()
                .filter(|s| s.current_score > high_risk_user_score)
                .count() as u32,
            critical_events_24h: events_24h
                .iter()
                .filter(|e| e.severity.is_critical())
                .count() as u32,
            fraud_events_24h: events_24h.iter().filter(|e| e.is_fraud_rule()).count() as u32,
            risk_distribution,
            geographic_threats,
            system_health: SystemHealth::default(),
        };
        metrics.system_health = metrics.assess();
        metrics
    }

    /// Health grade from the counters: start at 100 and deduct per threat
    pub fn assess(&self) -> SystemHealth {
        let score = 100
            - penalty(self.failed_logins_24h, 50, 100, 10, 20)
            - penalty(self.blocked_ips, 10, 20, 8, 15)
            - penalty(self.high_risk_users, 20, 50, 12, 25)
            - penalty(self.critical_events_24h, 5, 10, 15, 30)
            - penalty(self.fraud_events_24h, 10, 20, 10, 20);
        SystemHealth::from_score(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(user: &str, current: u8) -> RiskScore {
        RiskScore {
            user_id: user.to_string(),
            current_score: current,
            location_risk: 50,
            device_risk: 80,
            behavior_risk: 0,
            transaction_risk: 20,
            velocity_risk: 10,
            last_calculated: Utc::now(),
        }
    }

    #[test]
    fn test_from_rows() {
        let now = Utc::now();
        let scores = vec![score("A", 10), score("B", 45), score("C", 71), score("D", 70)];
        let events = vec![
            SecurityEvent::new("high_risk_score", Severity::Critical, "x", now),
            SecurityEvent::new("fraud_rule_review", Severity::High, "y", now),
            SecurityEvent::new("fraud_rule_block", Severity::Critical, "z", now),
            SecurityEvent::new("ip_blocked", Severity::High, "w", now),
        ];

        let m = SecurityMetrics::from_rows(&scores, &events, 70);
        assert_eq!(m.high_risk_users, 1);
        assert_eq!(m.critical_events_24h, 2);
        assert_eq!(m.fraud_events_24h, 2);
        assert_eq!(m.risk_distribution[&RiskLevel::Low], 1);
        assert_eq!(m.risk_distribution[&RiskLevel::Medium], 1);
        assert_eq!(m.risk_distribution[&RiskLevel::High], 2);
        assert_eq!(m.risk_distribution[&RiskLevel::Critical], 0);
    }

    #[test]
    fn test_system_health_grades() {
        let mut m = SecurityMetrics::default();
        assert_eq!(m.assess(), SystemHealth::Excellent);

        // 100 - 10 - 8 = 82
        m.failed_logins_24h = 51;
        m.blocked_ips = 11;
        assert_eq!(m.assess(), SystemHealth::Good);

        // 100 - 20 - 15 - 15 = 50
        m.failed_logins_24h = 101;
        m.blocked_ips = 21;
        m.critical_events_24h = 6;
        assert_eq!(m.assess(), SystemHealth::Poor);

        // 100 - 20 - 15 - 25 - 30 - 20 = -10
        m.high_risk_users = 51;
        m.critical_events_24h = 11;
        m.fraud_events_24h = 21;
        assert_eq!(m.assess(), SystemHealth::Critical);

        assert_eq!(SystemHealth::from_score(60), SystemHealth::Fair);
        assert_eq!(SystemHealth::Poor.to_string(), "poor");
    }

    #[test]
    fn test_geographic_threats_count_high_and_critical() {
        let now = Utc::now();
        let located = |severity, location: &str| {
            let mut e = SecurityEvent::new("ip_blocked", severity, "x", now);
            e.location = Some(location.to_string());
            e
        };
        let events = vec![
            located(Severity::High, "Pyongyang, KP"),
            located(Severity::Critical, "KP"),
            located(Severity::High, "Austin, US"),
            located(Severity::Medium, "Austin, US"),
            SecurityEvent::new("ip_blocked", Severity::Critical, "no location", now),
        ];

        let m = SecurityMetrics::from_rows(&[], &events, 70);
        assert_eq!(m.geographic_threats.len(), 2);
        assert_eq!(m.geographic_threats["KP"], 2);
        assert_eq!(m.geographic_threats["US"], 1);
        assert_eq!(m.system_health, SystemHealth::Excellent);
    }
}
