//! Store errors

use thiserror::Error;

/// SQLite primary result codes that signal lock contention
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Optimistic update lost a race; safe to retry
    #[error("Concurrent update conflict on {0}")]
    Conflict(String),

    #[error("Corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn corrupt(table: &'static str, detail: impl Into<String>) -> Self {
        StoreError::Corrupt {
            table,
            detail: detail.into(),
        }
    }

    /// Concurrency conflicts and lock contention may succeed on retry
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Conflict(_) => true,
            StoreError::Database(sqlx::Error::PoolTimedOut) => true,
            StoreError::Database(sqlx::Error::Database(db)) => db
                .code()
                .map(|code| {
                    // Extended codes (e.g. 517 = BUSY_SNAPSHOT) keep the primary code in the low byte
                    code.parse::<i32>()
                        .map(|c| (c & 0xff).to_string())
                        .map_or(false, |primary| primary == SQLITE_BUSY || primary == SQLITE_LOCKED)
                })
                .unwrap_or(false),
            _ => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
