//! Audit Logger - fans records out to every sink
//!
//! Recording never fails: a sink error is logged and swallowed so that the
//! triggering operation is never rolled back by telemetry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use riskwatch_core::AuditRecord;

use crate::sink::AuditSink;

#[derive(Clone, Default)]
pub struct AuditLogger {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Write to every sink; returns how many accepted the record
    pub async fn record(&self, record: AuditRecord) -> usize {
        let mut written = 0;
        for sink in &self.sinks {
            match sink.write(&record).await {
                Ok(()) => written += 1,
                Err(e) => {
                    tracing::warn!(
                        sink = sink.name(),
                        action = %record.action,
                        resource_id = %record.resource_id,
                        error = %e,
                        "Audit sink failed, record dropped for this sink"
                    );
                }
            }
        }
        written
    }

    /// Successful mutation with before/after snapshots
    pub async fn mutation<O: Serialize, N: Serialize>(
        &self,
        user_id: Option<&str>,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        old: Option<&O>,
        new: Option<&N>,
        at: DateTime<Utc>,
    ) {
        let record = AuditRecord::new(action, resource_type, resource_id, at)
            .with_user(user_id)
            .with_change(old, new);
        self.record(record).await;
    }

    /// Failed operation
    pub async fn failure(
        &self,
        user_id: Option<&str>,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        error: &str,
        at: DateTime<Utc>,
    ) {
        let record = AuditRecord::new(action, resource_type, resource_id, at)
            .with_user(user_id)
            .failed(error);
        self.record(record).await;
    }

    /// Pass `result` through, recording a failed `action` when it is an error
    pub async fn on_failure<T, E: std::fmt::Display>(
        &self,
        result: Result<T, E>,
        user_id: Option<&str>,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        at: DateTime<Utc>,
    ) -> Result<T, E> {
        let error = result.as_ref().err().map(ToString::to_string);
        if let Some(error) = error {
            self.failure(user_id, action, resource_type, resource_id, &error, at)
                .await;
        }
        result
    }
}
