//! SQLite backend (sqlx)
//!
//! Timestamps are stored as epoch milliseconds, money as decimal TEXT.
//! Shared rows are mutated with single statements:
//! - IP blocks: conditional `INSERT .. ON CONFLICT DO UPDATE .. WHERE .. RETURNING`
//! - risk scores: `INSERT .. ON CONFLICT DO UPDATE`
//! - velocity: every window in one transaction, each row compare-and-updated;
//!   `Conflict` when a row moved, and nothing is written

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

use riskwatch_core::{
    AuditRecord, DeviceFingerprint, IpBlock, IpReputation, LoginAttempt, NotificationType,
    RiskScore, SecurityEvent, SecurityNotification, Severity, TimeWindow, Transaction,
    TransactionVelocity, VelocityUpdate,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::*;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS login_attempts (
        id TEXT PRIMARY KEY,
        user_id TEXT,
        email TEXT NOT NULL,
        ip_address TEXT NOT NULL,
        success INTEGER NOT NULL,
        user_agent TEXT NOT NULL DEFAULT '',
        location TEXT,
        failure_reason TEXT,
        device_id TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_login_email ON login_attempts(email COLLATE NOCASE, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_login_user ON login_attempts(user_id, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        amount TEXT NOT NULL,
        ip_address TEXT,
        user_agent TEXT,
        device_id TEXT,
        occurred_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tx_user ON transactions(user_id, occurred_at)",
    r#"
    CREATE TABLE IF NOT EXISTS device_fingerprints (
        user_id TEXT NOT NULL,
        device_id TEXT NOT NULL,
        is_trusted INTEGER NOT NULL DEFAULT 0,
        first_seen INTEGER NOT NULL,
        last_seen INTEGER NOT NULL,
        PRIMARY KEY (user_id, device_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ip_reputation (
        ip_address TEXT PRIMARY KEY,
        reputation_score INTEGER NOT NULL DEFAULT 50,
        is_blocked INTEGER NOT NULL DEFAULT 0,
        block_reason TEXT,
        blocked_until INTEGER,
        is_vpn INTEGER NOT NULL DEFAULT 0,
        is_tor INTEGER NOT NULL DEFAULT 0,
        is_proxy INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS risk_scores (
        user_id TEXT PRIMARY KEY,
        current_score INTEGER NOT NULL,
        location_risk INTEGER NOT NULL,
        device_risk INTEGER NOT NULL,
        behavior_risk INTEGER NOT NULL,
        transaction_risk INTEGER NOT NULL,
        velocity_risk INTEGER NOT NULL,
        last_calculated INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transaction_velocity (
        user_id TEXT NOT NULL,
        time_window TEXT NOT NULL,
        transaction_count INTEGER NOT NULL,
        total_amount TEXT NOT NULL,
        last_reset INTEGER NOT NULL,
        PRIMARY KEY (user_id, time_window)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS security_events (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        user_id TEXT,
        event_type TEXT NOT NULL,
        severity TEXT NOT NULL,
        description TEXT NOT NULL,
        ip_address TEXT NOT NULL DEFAULT '',
        user_agent TEXT NOT NULL DEFAULT '',
        location TEXT,
        metadata TEXT NOT NULL DEFAULT 'null',
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_events_created ON security_events(created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS security_notifications (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        user_id TEXT NOT NULL,
        event_id TEXT NOT NULL,
        notification_type TEXT NOT NULL,
        title TEXT NOT NULL,
        message TEXT NOT NULL,
        severity TEXT NOT NULL,
        is_read INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_trail (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        user_id TEXT,
        action TEXT NOT NULL,
        resource_type TEXT NOT NULL,
        resource_id TEXT NOT NULL,
        old_values TEXT,
        new_values TEXT,
        success INTEGER NOT NULL,
        error TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
];

fn ts(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_ts(table: &'static str, millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::corrupt(table, format!("timestamp out of range: {}", millis)))
}

fn parse_decimal(table: &'static str, raw: &str) -> StoreResult<Decimal> {
    Decimal::from_str(raw).map_err(|e| StoreError::corrupt(table, format!("{}: {}", raw, e)))
}

fn parse_enum<T: FromStr>(table: &'static str, raw: &str) -> StoreResult<T> {
    T::from_str(raw).map_err(|_| StoreError::corrupt(table, format!("unknown value {}", raw)))
}

fn score_u8(table: &'static str, raw: i64) -> StoreResult<u8> {
    u8::try_from(raw).map_err(|_| StoreError::corrupt(table, format!("score out of range: {}", raw)))
}

fn parse_json(raw: Option<String>) -> StoreResult<Option<serde_json::Value>> {
    raw.map(|s| serde_json::from_str(&s)).transpose().map_err(Into::into)
}

fn login_from_row(row: &SqliteRow) -> StoreResult<LoginAttempt> {
    Ok(LoginAttempt {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        email: row.try_get("email")?,
        ip_address: row.try_get("ip_address")?,
        success: row.try_get("success")?,
        user_agent: row.try_get("user_agent")?,
        location: row.try_get("location")?,
        failure_reason: row.try_get("failure_reason")?,
        device_id: row.try_get("device_id")?,
        created_at: from_ts("login_attempts", row.try_get("created_at")?)?,
    })
}

fn device_from_row(row: &SqliteRow) -> StoreResult<DeviceFingerprint> {
    Ok(DeviceFingerprint {
        user_id: row.try_get("user_id")?,
        device_id: row.try_get("device_id")?,
        is_trusted: row.try_get("is_trusted")?,
        first_seen: from_ts("device_fingerprints", row.try_get("first_seen")?)?,
        last_seen: from_ts("device_fingerprints", row.try_get("last_seen")?)?,
    })
}

fn ip_from_row(row: &SqliteRow) -> StoreResult<IpReputation> {
    let blocked_until: Option<i64> = row.try_get("blocked_until")?;
    Ok(IpReputation {
        ip_address: row.try_get("ip_address")?,
        reputation_score: score_u8("ip_reputation", row.try_get("reputation_score")?)?,
        is_blocked: row.try_get("is_blocked")?,
        block_reason: row.try_get("block_reason")?,
        blocked_until: blocked_until
            .map(|ms| from_ts("ip_reputation", ms))
            .transpose()?,
        is_vpn: row.try_get("is_vpn")?,
        is_tor: row.try_get("is_tor")?,
        is_proxy: row.try_get("is_proxy")?,
        updated_at: from_ts("ip_reputation", row.try_get("updated_at")?)?,
    })
}

fn score_from_row(row: &SqliteRow) -> StoreResult<RiskScore> {
    const T: &str = "risk_scores";
    Ok(RiskScore {
        user_id: row.try_get("user_id")?,
        current_score: score_u8(T, row.try_get("current_score")?)?,
        location_risk: score_u8(T, row.try_get("location_risk")?)?,
        device_risk: score_u8(T, row.try_get("device_risk")?)?,
        behavior_risk: score_u8(T, row.try_get("behavior_risk")?)?,
        transaction_risk: score_u8(T, row.try_get("transaction_risk")?)?,
        velocity_risk: score_u8(T, row.try_get("velocity_risk")?)?,
        last_calculated: from_ts(T, row.try_get("last_calculated")?)?,
    })
}

fn velocity_from_row(row: &SqliteRow) -> StoreResult<TransactionVelocity> {
    const T: &str = "transaction_velocity";
    let window: String = row.try_get("time_window")?;
    let amount: String = row.try_get("total_amount")?;
    let count: i64 = row.try_get("transaction_count")?;
    Ok(TransactionVelocity {
        user_id: row.try_get("user_id")?,
        time_window: parse_enum(T, &window)?,
        transaction_count: u32::try_from(count)
            .map_err(|_| StoreError::corrupt(T, format!("count out of range: {}", count)))?,
        total_amount: parse_decimal(T, &amount)?,
        last_reset: from_ts(T, row.try_get("last_reset")?)?,
    })
}

fn event_from_row(row: &SqliteRow) -> StoreResult<SecurityEvent> {
    const T: &str = "security_events";
    let severity: String = row.try_get("severity")?;
    let metadata: String = row.try_get("metadata")?;
    Ok(SecurityEvent {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        event_type: row.try_get("event_type")?,
        severity: parse_enum::<Severity>(T, &severity)?,
        description: row.try_get("description")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        location: row.try_get("location")?,
        metadata: serde_json::from_str(&metadata)?,
        created_at: from_ts(T, row.try_get("created_at")?)?,
    })
}

fn notification_from_row(row: &SqliteRow) -> StoreResult<SecurityNotification> {
    const T: &str = "security_notifications";
    let kind: String = row.try_get("notification_type")?;
    let severity: String = row.try_get("severity")?;
    Ok(SecurityNotification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        event_id: row.try_get("event_id")?,
        notification_type: parse_enum::<NotificationType>(T, &kind)?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        severity: parse_enum::<Severity>(T, &severity)?,
        is_read: row.try_get("is_read")?,
        created_at: from_ts(T, row.try_get("created_at")?)?,
    })
}

fn audit_from_row(row: &SqliteRow) -> StoreResult<AuditRecord> {
    Ok(AuditRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        action: row.try_get("action")?,
        resource_type: row.try_get("resource_type")?,
        resource_id: row.try_get("resource_id")?,
        old_values: parse_json(row.try_get("old_values")?)?,
        new_values: parse_json(row.try_get("new_values")?)?,
        success: row.try_get("success")?,
        error: row.try_get("error")?,
        created_at: from_ts("audit_trail", row.try_get("created_at")?)?,
    })
}

/// sqlx-backed signal store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database file and initialize the schema
    pub async fn connect(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePool::connect(&db_url).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Private in-memory database (single connection so every query sees it)
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Wrap an existing pool; the caller must call [`SqliteStore::init`]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the schema
    pub async fn init(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!(tables = SCHEMA.len(), "SQLite schema initialized");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Seed an IP row directly (reputation feeds, tests)
    pub async fn put_ip(&self, rep: &IpReputation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ip_reputation (ip_address, reputation_score, is_blocked, block_reason,
                blocked_until, is_vpn, is_tor, is_proxy, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ip_address) DO UPDATE SET
                reputation_score = excluded.reputation_score,
                is_blocked = excluded.is_blocked,
                block_reason = excluded.block_reason,
                blocked_until = excluded.blocked_until,
                is_vpn = excluded.is_vpn,
                is_tor = excluded.is_tor,
                is_proxy = excluded.is_proxy,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&rep.ip_address)
        .bind(rep.reputation_score as i64)
        .bind(rep.is_blocked)
        .bind(&rep.block_reason)
        .bind(rep.blocked_until.map(ts))
        .bind(rep.is_vpn)
        .bind(rep.is_tor)
        .bind(rep.is_proxy)
        .bind(ts(rep.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count(&self, sql: &str, binds: &[CountBind<'_>]) -> StoreResult<u32> {
        let mut query = sqlx::query(sql);
        for bind in binds {
            query = match bind {
                CountBind::Text(s) => query.bind(*s),
                CountBind::Int(i) => query.bind(*i),
            };
        }
        let row = query.fetch_one(&self.pool).await?;
        let n: i64 = row.try_get(0)?;
        u32::try_from(n).map_err(|_| StoreError::corrupt("count", format!("count out of range: {}", n)))
    }
}

enum CountBind<'a> {
    Text(&'a str),
    Int(i64),
}

#[async_trait]
impl LoginAttemptRepository for SqliteStore {
    async fn insert_login_attempt(&self, attempt: &LoginAttempt) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO login_attempts (id, user_id, email, ip_address, success, user_agent,
                location, failure_reason, device_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&attempt.id)
        .bind(&attempt.user_id)
        .bind(&attempt.email)
        .bind(&attempt.ip_address)
        .bind(attempt.success)
        .bind(&attempt.user_agent)
        .bind(&attempt.location)
        .bind(&attempt.failure_reason)
        .bind(&attempt.device_id)
        .bind(ts(attempt.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_failed_logins(
        &self,
        email: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<u32> {
        self.count(
            r#"
            SELECT COUNT(*) FROM login_attempts
            WHERE email = ? COLLATE NOCASE AND success = 0 AND created_at BETWEEN ? AND ?
            "#,
            &[
                CountBind::Text(email),
                CountBind::Int(ts(since)),
                CountBind::Int(ts(until)),
            ],
        )
        .await
    }

    async fn count_failed_logins_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<u32> {
        self.count(
            r#"
            SELECT COUNT(*) FROM login_attempts
            WHERE user_id = ? AND success = 0 AND created_at BETWEEN ? AND ?
            "#,
            &[
                CountBind::Text(user_id),
                CountBind::Int(ts(since)),
                CountBind::Int(ts(until)),
            ],
        )
        .await
    }

    async fn count_all_failed_logins(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<u32> {
        self.count(
            "SELECT COUNT(*) FROM login_attempts WHERE success = 0 AND created_at BETWEEN ? AND ?",
            &[CountBind::Int(ts(since)), CountBind::Int(ts(until))],
        )
        .await
    }

    async fn logins_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<LoginAttempt>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM login_attempts
            WHERE user_id = ? AND created_at BETWEEN ? AND ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .bind(ts(since))
        .bind(ts(until))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(login_from_row).collect()
    }
}

#[async_trait]
impl TransactionRepository for SqliteStore {
    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, user_id, amount, ip_address, user_agent, device_id, occurred_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.user_id)
        .bind(tx.amount.to_string())
        .bind(&tx.ip_address)
        .bind(&tx.user_agent)
        .bind(&tx.device_id)
        .bind(ts(tx.occurred_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_transactions(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<u32> {
        self.count(
            "SELECT COUNT(*) FROM transactions WHERE user_id = ? AND occurred_at BETWEEN ? AND ?",
            &[
                CountBind::Text(user_id),
                CountBind::Int(ts(since)),
                CountBind::Int(ts(until)),
            ],
        )
        .await
    }
}

#[async_trait]
impl DeviceRepository for SqliteStore {
    async fn get_device(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> StoreResult<Option<DeviceFingerprint>> {
        let row = sqlx::query("SELECT * FROM device_fingerprints WHERE user_id = ? AND device_id = ?")
            .bind(user_id)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn touch_device(
        &self,
        user_id: &str,
        device_id: &str,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<DeviceFingerprint> {
        let row = sqlx::query(
            r#"
            INSERT INTO device_fingerprints (user_id, device_id, is_trusted, first_seen, last_seen)
            VALUES (?, ?, 0, ?, ?)
            ON CONFLICT(user_id, device_id) DO UPDATE SET
                last_seen = MAX(last_seen, excluded.last_seen)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(device_id)
        .bind(ts(seen_at))
        .bind(ts(seen_at))
        .fetch_one(&self.pool)
        .await?;
        device_from_row(&row)
    }

    async fn set_device_trust(
        &self,
        user_id: &str,
        device_id: &str,
        trusted: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<DeviceFingerprint> {
        let row = sqlx::query(
            r#"
            INSERT INTO device_fingerprints (user_id, device_id, is_trusted, first_seen, last_seen)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id, device_id) DO UPDATE SET
                is_trusted = excluded.is_trusted,
                last_seen = MAX(last_seen, excluded.last_seen)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(device_id)
        .bind(trusted)
        .bind(ts(at))
        .bind(ts(at))
        .fetch_one(&self.pool)
        .await?;
        device_from_row(&row)
    }

    async fn has_trusted_device(&self, user_id: &str) -> StoreResult<bool> {
        let n = self
            .count(
                "SELECT COUNT(*) FROM device_fingerprints WHERE user_id = ? AND is_trusted = 1",
                &[CountBind::Text(user_id)],
            )
            .await?;
        Ok(n > 0)
    }
}

#[async_trait]
impl IpReputationRepository for SqliteStore {
    async fn get_ip(&self, ip_address: &str) -> StoreResult<Option<IpReputation>> {
        let row = sqlx::query("SELECT * FROM ip_reputation WHERE ip_address = ?")
            .bind(ip_address)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(ip_from_row).transpose()
    }

    async fn apply_block(
        &self,
        ip_address: &str,
        block: &IpBlock,
    ) -> StoreResult<Option<IpReputation>> {
        // The upsert's WHERE leaves an actively blocked row untouched, in which case
        // RETURNING yields nothing
        let row = sqlx::query(
            r#"
            INSERT INTO ip_reputation (ip_address, reputation_score, is_blocked, block_reason,
                blocked_until, updated_at)
            VALUES (?, 0, 1, ?, ?, ?)
            ON CONFLICT(ip_address) DO UPDATE SET
                reputation_score = MAX(ip_reputation.reputation_score - ?, 0),
                is_blocked = 1,
                block_reason = excluded.block_reason,
                blocked_until = excluded.blocked_until,
                updated_at = excluded.updated_at
            WHERE NOT (
                ip_reputation.is_blocked = 1
                AND (ip_reputation.blocked_until IS NULL OR ip_reputation.blocked_until > ?)
            )
            RETURNING *
            "#,
        )
        .bind(ip_address)
        .bind(&block.reason)
        .bind(ts(block.until))
        .bind(ts(block.at))
        .bind(block.penalty as i64)
        .bind(ts(block.at))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(ip_from_row).transpose()
    }

    async fn count_blocked_ips(&self, now: DateTime<Utc>) -> StoreResult<u32> {
        self.count(
            r#"
            SELECT COUNT(*) FROM ip_reputation
            WHERE is_blocked = 1 AND (blocked_until IS NULL OR blocked_until > ?)
            "#,
            &[CountBind::Int(ts(now))],
        )
        .await
    }
}

#[async_trait]
impl RiskScoreRepository for SqliteStore {
    async fn get_risk_score(&self, user_id: &str) -> StoreResult<Option<RiskScore>> {
        let row = sqlx::query("SELECT * FROM risk_scores WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(score_from_row).transpose()
    }

    async fn upsert_risk_score(&self, score: &RiskScore) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO risk_scores (user_id, current_score, location_risk, device_risk,
                behavior_risk, transaction_risk, velocity_risk, last_calculated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                current_score = excluded.current_score,
                location_risk = excluded.location_risk,
                device_risk = excluded.device_risk,
                behavior_risk = excluded.behavior_risk,
                transaction_risk = excluded.transaction_risk,
                velocity_risk = excluded.velocity_risk,
                last_calculated = excluded.last_calculated
            "#,
        )
        .bind(&score.user_id)
        .bind(score.current_score as i64)
        .bind(score.location_risk as i64)
        .bind(score.device_risk as i64)
        .bind(score.behavior_risk as i64)
        .bind(score.transaction_risk as i64)
        .bind(score.velocity_risk as i64)
        .bind(ts(score.last_calculated))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_risk_scores(&self) -> StoreResult<Vec<RiskScore>> {
        let rows = sqlx::query("SELECT * FROM risk_scores ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(score_from_row).collect()
    }
}

#[async_trait]
impl VelocityRepository for SqliteStore {
    async fn get_velocity(
        &self,
        user_id: &str,
        window: TimeWindow,
    ) -> StoreResult<Option<TransactionVelocity>> {
        let row = sqlx::query(
            "SELECT * FROM transaction_velocity WHERE user_id = ? AND time_window = ?",
        )
        .bind(user_id)
        .bind(window.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(velocity_from_row).transpose()
    }

    async fn record_velocity(
        &self,
        user_id: &str,
        windows: &[TimeWindow],
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<VelocityUpdate>> {
        // Dropping `tx` on any early return rolls back every window
        let mut tx = self.pool.begin().await?;
        let mut updates = Vec::with_capacity(windows.len());

        for &window in windows {
            let row = sqlx::query(
                "SELECT * FROM transaction_velocity WHERE user_id = ? AND time_window = ?",
            )
            .bind(user_id)
            .bind(window.to_string())
            .fetch_optional(&mut *tx)
            .await?;
            let before = row.as_ref().map(velocity_from_row).transpose()?;
            let after = TransactionVelocity::apply(before.as_ref(), user_id, window, amount, at);

            let affected = match &before {
                None => sqlx::query(
                    r#"
                    INSERT INTO transaction_velocity (user_id, time_window, transaction_count,
                        total_amount, last_reset)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT(user_id, time_window) DO NOTHING
                    "#,
                )
                .bind(user_id)
                .bind(window.to_string())
                .bind(after.transaction_count as i64)
                .bind(after.total_amount.to_string())
                .bind(ts(after.last_reset))
                .execute(&mut *tx)
                .await?
                .rows_affected(),
                // Compare-and-update against the exact row we read
                Some(prev) => sqlx::query(
                    r#"
                    UPDATE transaction_velocity
                    SET transaction_count = ?, total_amount = ?, last_reset = ?
                    WHERE user_id = ? AND time_window = ?
                      AND transaction_count = ? AND total_amount = ? AND last_reset = ?
                    "#,
                )
                .bind(after.transaction_count as i64)
                .bind(after.total_amount.to_string())
                .bind(ts(after.last_reset))
                .bind(user_id)
                .bind(window.to_string())
                .bind(prev.transaction_count as i64)
                .bind(prev.total_amount.to_string())
                .bind(ts(prev.last_reset))
                .execute(&mut *tx)
                .await?
                .rows_affected(),
            };

            if affected == 0 {
                return Err(StoreError::Conflict(format!(
                    "transaction_velocity({}, {})",
                    user_id, window
                )));
            }
            updates.push(VelocityUpdate { before, after });
        }

        tx.commit().await?;
        Ok(updates)
    }
}

#[async_trait]
impl SecurityEventRepository for SqliteStore {
    async fn insert_security_event(&self, event: &SecurityEvent) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO security_events (id, user_id, event_type, severity, description,
                ip_address, user_agent, location, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.user_id)
        .bind(&event.event_type)
        .bind(event.severity.to_string())
        .bind(&event.description)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(&event.location)
        .bind(serde_json::to_string(&event.metadata)?)
        .bind(ts(event.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn security_events(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<SecurityEvent>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = match user_id {
            Some(user_id) => {
                sqlx::query("SELECT * FROM security_events WHERE user_id = ? ORDER BY seq DESC LIMIT ?")
                    .bind(user_id)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM security_events ORDER BY seq DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(event_from_row).collect()
    }

    async fn security_events_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<SecurityEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM security_events WHERE created_at BETWEEN ? AND ? ORDER BY seq ASC",
        )
        .bind(ts(since))
        .bind(ts(until))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }
}

#[async_trait]
impl NotificationRepository for SqliteStore {
    async fn insert_notification(&self, n: &SecurityNotification) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO security_notifications (id, user_id, event_id, notification_type, title,
                message, severity, is_read, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&n.id)
        .bind(&n.user_id)
        .bind(&n.event_id)
        .bind(n.notification_type.to_string())
        .bind(&n.title)
        .bind(&n.message)
        .bind(n.severity.to_string())
        .bind(n.is_read)
        .bind(ts(n.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn notifications(&self, user_id: &str) -> StoreResult<Vec<SecurityNotification>> {
        let rows = sqlx::query(
            "SELECT * FROM security_notifications WHERE user_id = ? ORDER BY seq DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_notification_read(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE security_notifications SET is_read = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuditRepository for SqliteStore {
    async fn insert_audit(&self, record: &AuditRecord) -> StoreResult<()> {
        let old_values = record.old_values.as_ref().map(serde_json::to_string).transpose()?;
        let new_values = record.new_values.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO audit_trail (id, user_id, action, resource_type, resource_id,
                old_values, new_values, success, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.action)
        .bind(&record.resource_type)
        .bind(&record.resource_id)
        .bind(old_values)
        .bind(new_values)
        .bind(record.success)
        .bind(&record.error)
        .bind(ts(record.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn audit_records(&self, limit: usize) -> StoreResult<Vec<AuditRecord>> {
        let rows = sqlx::query("SELECT * FROM audit_trail ORDER BY seq DESC LIMIT ?")
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(audit_from_row).collect()
    }
}
