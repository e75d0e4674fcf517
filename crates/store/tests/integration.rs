//! Integration tests for the store backends

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tempfile::tempdir;

use riskwatch_core::{IpBlock, TimeWindow, VelocityUpdate};
use riskwatch_store::{
    with_retry, IpReputationRepository, MemoryStore, RetryPolicy, SignalStore, SqliteStore,
    VelocityRepository,
};

fn now_ms() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap()
}

fn patient() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 100,
        base_delay_ms: 1,
        max_delay_ms: 20,
    }
}

async fn hammer_velocity<S: SignalStore + 'static>(store: Arc<S>, tasks: usize, per_task: usize) {
    let at = now_ms();
    let mut handles = Vec::new();
    for t in 0..tasks {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..per_task {
                let amount = Decimal::from((t * per_task + i + 1) as i64);
                let store = store.clone();
                with_retry(&patient(), "record_velocity", move || {
                    let store = store.clone();
                    async move {
                        store
                            .record_velocity("U1", &[TimeWindow::OneDay], amount, at)
                            .await
                    }
                })
                .await
                .unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
}

#[tokio::test]
async fn test_sqlite_concurrent_velocity_matches_serial() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SqliteStore::connect(dir.path().join("velocity.db")).await.unwrap());

    hammer_velocity(store.clone(), 8, 10).await;

    let v = store
        .get_velocity("U1", TimeWindow::OneDay)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(v.transaction_count, 80);
    // 1 + 2 + ... + 80
    assert_eq!(v.total_amount, dec!(3240));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_concurrent_velocity_matches_serial() {
    let store = Arc::new(MemoryStore::new());

    hammer_velocity(store.clone(), 16, 25).await;

    let v = store
        .get_velocity("U1", TimeWindow::OneDay)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(v.transaction_count, 400);
    assert_eq!(v.total_amount, Decimal::from(400 * 401 / 2));
}

/// Open the 1h window at `t0`, then race `tasks` transactions stamped just
/// past its expiry. Returns the updates the racing writers saw.
async fn race_across_reset<S: SignalStore + 'static>(
    store: Arc<S>,
    t0: DateTime<Utc>,
    tasks: usize,
) -> Vec<VelocityUpdate> {
    for _ in 0..3 {
        store
            .record_velocity("U1", &[TimeWindow::OneHour], dec!(1000), t0)
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for i in 0..tasks {
        let store = store.clone();
        let at = t0 + Duration::hours(1) + Duration::seconds(i as i64);
        let amount = Decimal::from((i + 1) as i64);
        handles.push(tokio::spawn(async move {
            with_retry(&patient(), "record_velocity", move || {
                let store = store.clone();
                async move {
                    store
                        .record_velocity("U1", &[TimeWindow::OneHour], amount, at)
                        .await
                }
            })
            .await
            .unwrap()
            .remove(0)
        }));
    }

    let mut updates = Vec::new();
    for h in handles {
        updates.push(h.await.unwrap());
    }
    updates
}

async fn assert_single_reset<S: SignalStore + 'static>(store: Arc<S>, tasks: usize) {
    let t0 = now_ms();
    let updates = race_across_reset(store.clone(), t0, tasks).await;

    assert_eq!(updates.iter().filter(|u| u.was_reset()).count(), 1);

    let v = store
        .get_velocity("U1", TimeWindow::OneHour)
        .await
        .unwrap()
        .unwrap();
    // only the post-expiry contributions survive
    assert_eq!(v.transaction_count as usize, tasks);
    assert_eq!(v.total_amount, Decimal::from((tasks * (tasks + 1) / 2) as i64));
    assert!(v.last_reset >= t0 + Duration::hours(1));
    assert!(v.last_reset < t0 + Duration::hours(1) + Duration::seconds(tasks as i64));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_reset_happens_once_under_contention() {
    assert_single_reset(Arc::new(MemoryStore::new()), 64).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_reset_happens_once_under_contention() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SqliteStore::connect(dir.path().join("reset.db")).await.unwrap());
    assert_single_reset(store, 24).await;
}

#[tokio::test]
async fn test_sqlite_concurrent_blocks_apply_once() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SqliteStore::connect(dir.path().join("ip.db")).await.unwrap());
    let at = now_ms();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let block = IpBlock::new("Multiple failed login attempts", at, Duration::hours(1), 20);
            with_retry(&patient(), "apply_block", || store.apply_block("9.9.9.9", &block))
                .await
                .unwrap()
        }));
    }

    let mut applied = 0;
    for h in handles {
        if h.await.unwrap().is_some() {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);

    let rep = store.get_ip("9.9.9.9").await.unwrap().unwrap();
    assert!(rep.is_blocked_at(at));
    assert_eq!(rep.reputation_score, 0);
}
