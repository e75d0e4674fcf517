//! RiskWatch Store - Signal stores
//!
//! Narrow repository traits over the trust state, with two backends:
//! - [`MemoryStore`]: mutex-guarded, for tests and embedded use
//! - [`SqliteStore`]: sqlx/SQLite with single-statement atomic upserts
//!
//! [`with_retry`] wraps operations that may lose an optimistic race.

pub mod error;
pub mod memory;
pub mod retry;
pub mod sqlite;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use retry::{with_retry, RetryPolicy};
pub use sqlite::SqliteStore;
pub use traits::{
    AuditRepository, DeviceRepository, IpReputationRepository, LoginAttemptRepository,
    NotificationRepository, RiskScoreRepository, SecurityEventRepository, SignalStore,
    TransactionRepository, VelocityRepository,
};
