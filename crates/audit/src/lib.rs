//! RiskWatch Audit Logger
//!
//! Best-effort audit trail. [`AuditLogger`] writes each [`AuditRecord`] to
//! every registered [`AuditSink`]:
//! - [`StoreSink`]: the signal store's audit table
//! - [`AuditLedger`]: an append-only JSONL file
//!
//! [`AuditRecord`]: riskwatch_core::AuditRecord

pub mod error;
pub mod ledger;
pub mod logger;
pub mod sink;

pub use error::{AuditError, AuditResult};
pub use ledger::AuditLedger;
pub use logger::AuditLogger;
pub use sink::{AuditSink, StoreSink};
