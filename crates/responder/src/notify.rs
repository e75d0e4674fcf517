//! Out-of-band notification delivery
//!
//! The notification row is the source of truth; delivery through a
//! [`Notifier`] is best-effort and bounded by a timeout.

use async_trait::async_trait;
use std::time::Duration;

use riskwatch_core::SecurityNotification;

use crate::error::ResponderResult;

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, notification: &SecurityNotification) -> ResponderResult<()>;
}

/// Emits notifications as structured log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, notification: &SecurityNotification) -> ResponderResult<()> {
        tracing::warn!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            event_id = %notification.event_id,
            severity = %notification.severity,
            title = %notification.title,
            "Security notification"
        );
        Ok(())
    }
}

/// Deliver with a deadline; returns whether delivery succeeded
pub async fn deliver(
    notifier: &dyn Notifier,
    notification: &SecurityNotification,
    timeout: Duration,
) -> bool {
    match tokio::time::timeout(timeout, notifier.notify(notification)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(
                notifier = notifier.name(),
                notification_id = %notification.id,
                error = %e,
                "Notification delivery failed"
            );
            false
        }
        Err(_) => {
            tracing::warn!(
                notifier = notifier.name(),
                notification_id = %notification.id,
                "Notification delivery timed out"
            );
            false
        }
    }
}
