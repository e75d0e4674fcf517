//! End-to-end scenarios through the fraud engine

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tempfile::tempdir;

use riskwatch_core::{
    event_types, IngressEvent, IpReputation, LoginAttempt, Severity, TimeWindow, Transaction,
};
use riskwatch_pipeline::{EngineConfig, FraudEngine};
use riskwatch_responder::{GeoLocation, GeoResolver, ResponderResult, StaticGeoResolver};
use riskwatch_store::{
    AuditRepository, NotificationRepository, RiskScoreRepository, SecurityEventRepository,
    MemoryStore, SignalStore, SqliteStore, TransactionRepository, VelocityRepository,
};

fn now_ms() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap()
}

fn engine(store: Arc<MemoryStore>) -> FraudEngine {
    FraudEngine::new(store, EngineConfig::default()).unwrap()
}

fn failed_login(at: DateTime<Utc>) -> LoginAttempt {
    LoginAttempt::failed("a@x.com", "1.2.3.4", "Invalid password", at)
}

async fn events_of_type(store: &dyn SignalStore, event_type: &str) -> usize {
    store
        .security_events(None, 10_000)
        .await
        .unwrap()
        .iter()
        .filter(|e| e.event_type == event_type)
        .count()
}

// === Scenario A: five failures in ten minutes block the IP ===

#[tokio::test]
async fn test_scenario_a_burst_blocks_ip() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());
    let t0 = now_ms();

    let mut last = None;
    for i in 0..5 {
        last = Some(engine.login_attempt(failed_login(t0 + Duration::minutes(i * 2))).await.unwrap());
    }
    let fifth_at = t0 + Duration::minutes(8);

    let outcome = last.unwrap();
    assert_eq!(outcome.failed_logins, Some(5));
    assert!(outcome.blocked_ip.is_some());

    let status = engine.ip_status("1.2.3.4", fifth_at).await.unwrap();
    assert!(status.is_blocked);
    assert_eq!(status.blocked_until, Some(fifth_at + Duration::hours(1)));
    assert_eq!(status.reputation_score, 0);
    assert_eq!(status.block_reason.as_deref(), Some("Multiple failed login attempts"));

    // the block expires lazily
    let later = engine
        .ip_status("1.2.3.4", fifth_at + Duration::hours(1))
        .await
        .unwrap();
    assert!(!later.is_blocked);
}

#[tokio::test]
async fn test_scenario_a_existing_ip_loses_twenty() {
    let store = Arc::new(MemoryStore::new());
    let t0 = now_ms();
    let mut rep = IpReputation::first_contact("1.2.3.4", t0 - Duration::days(1));
    rep.reputation_score = 65;
    store.put_ip(rep);
    let engine = engine(store.clone());

    for i in 0..5 {
        engine.login_attempt(failed_login(t0 + Duration::minutes(i))).await.unwrap();
    }

    let status = engine.ip_status("1.2.3.4", t0 + Duration::minutes(5)).await.unwrap();
    assert!(status.is_blocked);
    assert_eq!(status.reputation_score, 45);
}

// === Scenario B: high amount transaction ===

#[tokio::test]
async fn test_scenario_b_high_amount_event() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());

    let tx = Transaction::new("U", dec!(6000), now_ms()).with_ip("8.8.8.8");
    let tx_id = tx.id.clone();
    let outcome = engine.transaction(tx).await.unwrap();

    let high: Vec<_> = engine
        .security_events(Some("U"), 100)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == event_types::HIGH_AMOUNT_TRANSACTION)
        .collect();
    assert_eq!(high.len(), 1);
    assert_eq!(high[0].severity, Severity::Medium);
    assert_eq!(high[0].metadata["transaction_id"], tx_id.as_str());
    assert_eq!(high[0].metadata["amount"], "6000");
    assert_eq!(high[0].ip_address, "8.8.8.8");

    // the configurable amount rule fires as well
    assert!(outcome
        .matches
        .iter()
        .any(|m| m.rule_name == "High Amount Transaction"));
    assert!(outcome.events.iter().any(|e| e.event_type == "fraud_rule_review"));
}

#[tokio::test]
async fn test_amount_at_threshold_raises_nothing() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());

    engine
        .transaction(Transaction::new("U", dec!(5000), now_ms()))
        .await
        .unwrap();
    assert_eq!(
        events_of_type(store.as_ref(), event_types::HIGH_AMOUNT_TRANSACTION).await,
        0
    );
}

// === Scenario C: every critical event has exactly one notification ===

#[tokio::test]
async fn test_scenario_c_critical_events_notify_once() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());
    let t0 = now_ms();

    // "Rapid Transactions": more than 10 in an hour, critical block
    for i in 0..12 {
        engine
            .transaction(
                Transaction::new("U", dec!(100), t0 + Duration::seconds(i)).with_ip("5.5.5.5"),
            )
            .await
            .unwrap();
    }

    let events = engine.security_events(Some("U"), 1000).await.unwrap();
    let critical: Vec<_> = events
        .iter()
        .filter(|e| e.severity == Severity::Critical)
        .collect();
    assert_eq!(critical.len(), 2);

    let notifications = engine.notifications("U").await.unwrap();
    assert_eq!(notifications.len(), critical.len());
    for event in critical {
        let linked: Vec<_> = notifications
            .iter()
            .filter(|n| n.event_id == event.id)
            .collect();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].severity, Severity::Critical);
    }

    // the block action also blocked the transaction IP, once
    assert!(engine.ip_status("5.5.5.5", t0 + Duration::seconds(12)).await.unwrap().is_blocked);
    assert_eq!(events_of_type(store.as_ref(), event_types::IP_BLOCKED).await, 1);

    let first = &notifications[0];
    assert!(engine.mark_notification_read(&first.id, t0).await.unwrap());
    let reread = store.notifications("U").await.unwrap();
    assert!(reread.iter().find(|n| n.id == first.id).unwrap().is_read);
}

#[tokio::test]
async fn test_high_risk_score_raises_critical() {
    let store = Arc::new(MemoryStore::new());
    let mut config = EngineConfig::default();
    config.rules.high_risk_score_threshold = 38;
    let engine = FraudEngine::new(store.clone(), config).unwrap();

    // device 80, location 50, transaction 20, velocity 10, behaviour 0 -> 39
    let outcome = engine
        .transaction(Transaction::new("U", dec!(10), now_ms()))
        .await
        .unwrap();
    assert_eq!(outcome.risk_score.as_ref().unwrap().current_score, 39);
    assert!(outcome
        .events
        .iter()
        .any(|e| e.event_type == event_types::HIGH_RISK_SCORE && e.severity == Severity::Critical));
    assert_eq!(engine.notifications("U").await.unwrap().len(), 1);
}

// === Scenario D: the block triggers exactly once ===

#[tokio::test]
async fn test_scenario_d_block_once() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());
    let t0 = now_ms();

    for i in 0..4 {
        let outcome = engine
            .login_attempt(failed_login(t0 + Duration::minutes(i * 3)))
            .await
            .unwrap();
        assert!(outcome.blocked_ip.is_none());
    }
    assert!(!engine.ip_status("1.2.3.4", t0 + Duration::minutes(10)).await.unwrap().is_blocked);

    let fifth = engine
        .login_attempt(failed_login(t0 + Duration::minutes(12)))
        .await
        .unwrap();
    assert!(fifth.blocked_ip.is_some());

    for i in 0..3 {
        let later = engine
            .login_attempt(failed_login(t0 + Duration::minutes(13 + i)))
            .await
            .unwrap();
        assert!(later.blocked_ip.is_none());
    }

    assert_eq!(events_of_type(store.as_ref(), event_types::IP_BLOCKED).await, 1);
    let audits = store.audit_records(10_000).await.unwrap();
    assert_eq!(audits.iter().filter(|a| a.action == "block_ip").count(), 1);
}

// === Properties ===

#[tokio::test]
async fn test_score_bounds_and_single_row() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());
    let t0 = now_ms();

    for i in 0..30 {
        let amount = Decimal::from(500 * (i + 1));
        let outcome = engine
            .transaction(Transaction::new("U", amount, t0 + Duration::seconds(i)))
            .await
            .unwrap();
        let score = outcome.risk_score.unwrap().current_score;
        assert!(score <= 100);
    }
    for i in 0..10 {
        engine
            .login_attempt(
                LoginAttempt::failed("u@x.com", "9.9.9.9", "Invalid password", t0 + Duration::seconds(i))
                    .with_user("U"),
            )
            .await
            .unwrap();
    }

    let rows: Vec<_> = store
        .list_risk_scores()
        .await
        .unwrap()
        .into_iter()
        .filter(|s| s.user_id == "U")
        .collect();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].current_score <= 100);
    assert_eq!(rows[0].behavior_risk, 100);
}

#[tokio::test]
async fn test_velocity_reset_law_through_pipeline() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());
    let t0 = now_ms();

    engine.transaction(Transaction::new("U", dec!(100), t0)).await.unwrap();
    engine
        .transaction(Transaction::new("U", dec!(50), t0 + Duration::minutes(30)))
        .await
        .unwrap();
    engine
        .transaction(Transaction::new("U", dec!(7), t0 + Duration::hours(1)))
        .await
        .unwrap();

    let hour = store.get_velocity("U", TimeWindow::OneHour).await.unwrap().unwrap();
    assert_eq!(hour.transaction_count, 1);
    assert_eq!(hour.total_amount, dec!(7));
    assert_eq!(hour.last_reset, t0 + Duration::hours(1));

    let day = store.get_velocity("U", TimeWindow::OneDay).await.unwrap().unwrap();
    assert_eq!(day.transaction_count, 3);
    assert_eq!(day.total_amount, dec!(157));
    assert_eq!(day.last_reset, t0);
}

#[tokio::test]
async fn test_rejected_events_do_not_mutate_state() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());
    let t0 = now_ms();

    let bad_tx = Transaction::new("U", dec!(-5), t0);
    let err = engine.transaction(bad_tx).await.unwrap_err();
    assert!(err.is_validation());

    let bad_login = LoginAttempt::failed("not-an-email", "1.2.3.4", "x", t0);
    assert!(engine.login_attempt(bad_login).await.unwrap_err().is_validation());

    let bad_ip = LoginAttempt::failed("a@x.com", "999.1.1.1", "x", t0);
    assert!(engine.login_attempt(bad_ip).await.unwrap_err().is_validation());

    assert_eq!(
        store
            .count_transactions("U", t0 - Duration::hours(1), t0)
            .await
            .unwrap(),
        0
    );
    assert!(store.get_velocity("U", TimeWindow::OneHour).await.unwrap().is_none());
    assert!(engine.risk_score("U").await.unwrap().is_none());

    let audits = store.audit_records(100).await.unwrap();
    assert_eq!(audits.len(), 3);
    assert!(audits.iter().all(|a| !a.success));
    assert!(audits.iter().any(|a| a.action == "validate_transaction"));
    assert_eq!(
        audits
            .iter()
            .filter(|a| a.action == "validate_login_attempt")
            .count(),
        2
    );
}

#[tokio::test]
async fn test_login_location_and_country_rule() {
    let store = Arc::new(MemoryStore::new());
    let geo = StaticGeoResolver::new()
        .with_entry("1.2.3.4", GeoLocation::new("KP").with_city("Pyongyang"));
    let engine = FraudEngine::builder(store.clone(), EngineConfig::default())
        .geo(Arc::new(geo))
        .build()
        .unwrap();

    let outcome = engine
        .login_attempt(LoginAttempt::new("a@x.com", "1.2.3.4", true, now_ms()).with_user("U"))
        .await
        .unwrap();

    assert!(outcome
        .matches
        .iter()
        .any(|m| m.rule_name == "Foreign Country Risk"));
    let flagged = outcome
        .events
        .iter()
        .find(|e| e.event_type == "fraud_rule_flag")
        .unwrap();
    assert_eq!(flagged.location.as_deref(), Some("Pyongyang, KP"));
}

#[tokio::test]
async fn test_trusted_device_lowers_score() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());
    let t0 = now_ms();

    let before = engine
        .transaction(Transaction::new("U", dec!(10), t0).with_device("D1"))
        .await
        .unwrap();
    assert_eq!(before.risk_score.as_ref().unwrap().device_risk, 80);
    assert!(before.events.iter().any(|e| e.event_type == "fraud_rule_require_2fa"));

    engine.register_device("U", "D1", true, t0).await.unwrap();
    let after = engine
        .transaction(Transaction::new("U", dec!(10), t0 + Duration::seconds(1)).with_device("D1"))
        .await
        .unwrap();
    assert_eq!(after.risk_score.as_ref().unwrap().device_risk, 20);
    assert!(!after.events.iter().any(|e| e.event_type == "fraud_rule_require_2fa"));
}

#[tokio::test]
async fn test_metrics() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());
    let t0 = now_ms();

    for i in 0..5 {
        engine.login_attempt(failed_login(t0 + Duration::seconds(i))).await.unwrap();
    }
    for i in 0..11 {
        engine
            .transaction(Transaction::new("U", dec!(10), t0 + Duration::seconds(i)))
            .await
            .unwrap();
    }

    let m = engine.metrics(t0 + Duration::minutes(1)).await.unwrap();
    assert_eq!(m.failed_logins_24h, 5);
    assert_eq!(m.blocked_ips, 1);
    assert_eq!(m.critical_events_24h, 1);
    assert!(m.fraud_events_24h >= 1);
    assert_eq!(m.risk_distribution.values().sum::<u32>(), 1);

    let m = engine.metrics(t0 + Duration::hours(2)).await.unwrap();
    assert_eq!(m.blocked_ips, 0);
}

// === Ordering and concurrency ===

#[tokio::test]
async fn test_per_user_order_is_submission_order() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());
    let at = now_ms();

    let mut receivers = Vec::new();
    for _ in 0..25 {
        let event = IngressEvent::Transaction(Transaction::new("U", dec!(1), at));
        receivers.push(engine.enqueue(event).await.unwrap());
    }

    for (i, rx) in receivers.into_iter().enumerate() {
        let outcome = rx.await.unwrap().unwrap();
        let month = outcome
            .velocity
            .iter()
            .find(|u| u.window() == TimeWindow::ThirtyDays)
            .unwrap();
        assert_eq!(month.after.transaction_count, (i + 1) as u32);
    }
    engine.shutdown().await;
}

async fn stress(store: Arc<dyn SignalStore>) {
    let engine = Arc::new(FraudEngine::new(store.clone(), EngineConfig::default()).unwrap());
    let at = now_ms();
    let users = ["U1", "U2", "U3", "U4"];

    let mut plan: Vec<(String, Decimal)> = Vec::new();
    {
        let mut rng = rand::thread_rng();
        for _ in 0..120 {
            let user = users[rng.gen_range(0..users.len())].to_string();
            let amount = Decimal::new(rng.gen_range(1..100_000), 2);
            plan.push((user, amount));
        }
    }

    let mut expected: HashMap<String, (u32, Decimal)> = HashMap::new();
    for (user, amount) in &plan {
        let entry = expected.entry(user.clone()).or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 += *amount;
    }

    let mut handles = Vec::new();
    for chunk in plan.chunks(10) {
        let engine = engine.clone();
        let chunk = chunk.to_vec();
        handles.push(tokio::spawn(async move {
            for (user, amount) in chunk {
                engine
                    .transaction(Transaction::new(user, amount, at))
                    .await
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    for (user, (count, total)) in expected {
        for window in TimeWindow::ALL {
            let row = store.get_velocity(&user, window).await.unwrap().unwrap();
            assert_eq!(row.transaction_count, count, "{} {}", user, window);
            assert_eq!(row.total_amount, total, "{} {}", user, window);
        }
        let scores: Vec<_> = store
            .list_risk_scores()
            .await
            .unwrap()
            .into_iter()
            .filter(|s| s.user_id == user)
            .collect();
        assert_eq!(scores.len(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stress_memory() {
    stress(Arc::new(MemoryStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stress_sqlite() {
    let dir = tempdir().unwrap();
    let store = SqliteStore::connect(dir.path().join("stress.db")).await.unwrap();
    stress(Arc::new(store)).await;
}

// === Login ordering by email ===

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_logins_for_one_email_count_in_order() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());
    let t0 = now_ms();

    // Anonymous and authenticated attempts only share the email
    let mut receivers = Vec::new();
    for i in 0..5 {
        let email = if i % 2 == 0 { "Victim@X.com" } else { "victim@x.com" };
        let mut attempt =
            LoginAttempt::failed(email, "9.9.9.9", "Invalid password", t0 + Duration::seconds(i));
        if i % 2 == 1 {
            attempt = attempt.with_user("V");
        }
        receivers.push(engine.enqueue(IngressEvent::LoginAttempt(attempt)).await.unwrap());
    }

    let mut blocked = 0;
    for (i, rx) in receivers.into_iter().enumerate() {
        let outcome = rx.await.unwrap().unwrap();
        assert_eq!(outcome.failed_logins, Some(i as u32 + 1));
        blocked += outcome.blocked_ip.is_some() as usize;
    }
    assert_eq!(blocked, 1);
    assert_eq!(events_of_type(store.as_ref(), event_types::IP_BLOCKED).await, 1);
    engine.shutdown().await;
}

// === Independent users do not wait on each other ===

struct SlowGeo;

#[async_trait]
impl GeoResolver for SlowGeo {
    fn name(&self) -> &str {
        "slow"
    }

    async fn resolve(&self, ip_address: &str) -> ResponderResult<Option<GeoLocation>> {
        if ip_address == "6.6.6.6" {
            tokio::time::sleep(std::time::Duration::from_millis(400)).await;
        }
        Ok(None)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_user_does_not_delay_others() {
    let store = Arc::new(MemoryStore::new());
    let engine = FraudEngine::builder(store.clone(), EngineConfig::default())
        .geo(Arc::new(SlowGeo))
        .build()
        .unwrap();
    let at = now_ms();
    let started = Instant::now();

    let mut slow = Vec::new();
    for _ in 0..3 {
        let tx = Transaction::new("A", dec!(10), at).with_ip("6.6.6.6");
        slow.push(engine.enqueue(IngressEvent::Transaction(tx)).await.unwrap());
    }

    let mut fast = Vec::new();
    for i in 0..16 {
        let tx = Transaction::new(format!("B{}", i), dec!(1), at);
        fast.push(engine.enqueue(IngressEvent::Transaction(tx)).await.unwrap());
    }
    let mut worst = std::time::Duration::ZERO;
    for rx in fast {
        rx.await.unwrap().unwrap();
        worst = worst.max(started.elapsed());
    }

    for rx in slow {
        rx.await.unwrap().unwrap();
    }
    let slow_elapsed = started.elapsed();

    assert!(slow_elapsed >= std::time::Duration::from_millis(1200));
    assert!(
        worst < std::time::Duration::from_millis(400),
        "unrelated users took {:?}",
        worst
    );
    engine.shutdown().await;
}

// === Storage failures ===

async fn failed_audits(store: &SqliteStore, action: &str) -> usize {
    store
        .audit_records(1_000)
        .await
        .unwrap()
        .iter()
        .filter(|r| r.action == action && !r.success && r.error.is_some())
        .count()
}

#[tokio::test]
async fn test_failed_block_is_audited() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    sqlx::query("DROP TABLE ip_reputation")
        .execute(store.pool())
        .await
        .unwrap();
    let engine = FraudEngine::new(store.clone(), EngineConfig::default()).unwrap();
    let t0 = now_ms();

    for i in 0..4 {
        engine
            .login_attempt(failed_login(t0 + Duration::seconds(i)))
            .await
            .unwrap();
    }
    let fifth = engine
        .login_attempt(failed_login(t0 + Duration::seconds(4)))
        .await;
    assert!(fifth.is_err());

    assert_eq!(failed_audits(&store, "block_ip").await, 1);
    assert_eq!(events_of_type(store.as_ref(), event_types::IP_BLOCKED).await, 0);
}

#[tokio::test]
async fn test_failed_velocity_record_is_audited() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    sqlx::query("DROP TABLE transaction_velocity")
        .execute(store.pool())
        .await
        .unwrap();
    let engine = FraudEngine::new(store.clone(), EngineConfig::default()).unwrap();

    let result = engine
        .transaction(Transaction::new("U", dec!(10), now_ms()))
        .await;
    assert!(result.is_err());
    assert_eq!(failed_audits(&store, "record_velocity").await, 1);
    assert_eq!(failed_audits(&store, "insert_transaction").await, 0);
}

#[tokio::test]
async fn test_notification_failure_keeps_the_event() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    sqlx::query("DROP TABLE security_notifications")
        .execute(store.pool())
        .await
        .unwrap();
    let mut config = EngineConfig::default();
    config.rules.high_risk_score_threshold = 38;
    let engine = FraudEngine::new(store.clone(), config).unwrap();

    let outcome = engine
        .transaction(Transaction::new("U", dec!(10), now_ms()))
        .await
        .unwrap();
    assert!(outcome
        .events
        .iter()
        .any(|e| e.event_type == event_types::HIGH_RISK_SCORE && e.severity == Severity::Critical));
    assert_eq!(events_of_type(store.as_ref(), event_types::HIGH_RISK_SCORE).await, 1);
    assert_eq!(failed_audits(&store, "create_notification").await, 1);
}
