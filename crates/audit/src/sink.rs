//! Audit sinks - where audit records end up

use async_trait::async_trait;
use std::sync::Arc;

use riskwatch_core::AuditRecord;
use riskwatch_store::SignalStore;

use crate::error::AuditResult;

/// Destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Sink name for logging
    fn name(&self) -> &str;

    async fn write(&self, record: &AuditRecord) -> AuditResult<()>;
}

/// Writes into the signal store's audit trail table
pub struct StoreSink {
    store: Arc<dyn SignalStore>,
}

impl StoreSink {
    pub fn new(store: Arc<dyn SignalStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuditSink for StoreSink {
    fn name(&self) -> &str {
        "store"
    }

    async fn write(&self, record: &AuditRecord) -> AuditResult<()> {
        self.store.insert_audit(record).await?;
        Ok(())
    }
}
