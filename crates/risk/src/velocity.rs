//! Velocity Tracker - rolling per-user transaction counters
//!
//! Every tracked window is updated on each transaction, all windows in one
//! store call. Lost races are retried.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use riskwatch_core::{TimeWindow, VelocityUpdate};
use riskwatch_store::{with_retry, RetryPolicy, SignalStore};

use crate::error::RiskResult;

pub struct VelocityTracker {
    store: Arc<dyn SignalStore>,
    windows: Vec<TimeWindow>,
    retry: RetryPolicy,
}

impl VelocityTracker {
    /// Track all four windows
    pub fn new(store: Arc<dyn SignalStore>, retry: RetryPolicy) -> Self {
        Self::with_windows(store, TimeWindow::ALL.to_vec(), retry)
    }

    pub fn with_windows(
        store: Arc<dyn SignalStore>,
        windows: Vec<TimeWindow>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            windows,
            retry,
        }
    }

    pub fn windows(&self) -> &[TimeWindow] {
        &self.windows
    }

    /// Record a transaction against every tracked window.
    ///
    /// All windows move together: a failure leaves every counter untouched,
    /// so the event can be retried without double counting.
    pub async fn record(
        &self,
        user_id: &str,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> RiskResult<Vec<VelocityUpdate>> {
        let updates = with_retry(&self.retry, "record_velocity", || {
            self.store.record_velocity(user_id, &self.windows, amount, at)
        })
        .await?;

        for update in updates.iter().filter(|u| u.was_reset()) {
            tracing::debug!(user_id, window = %update.window(), "Velocity window reset");
        }
        tracing::debug!(
            user_id,
            amount = %amount,
            windows = updates.len(),
            "Velocity counters updated"
        );
        Ok(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use riskwatch_store::MemoryStore;
    use rust_decimal_macros::dec;

    fn tracker() -> VelocityTracker {
        VelocityTracker::new(Arc::new(MemoryStore::new()), RetryPolicy::default())
    }

    #[tokio::test]
    async fn test_first_transaction_opens_all_windows() {
        let tracker = tracker();
        let now = Utc::now();
        let updates = tracker.record("U1", dec!(250), now).await.unwrap();

        assert_eq!(updates.len(), 4);
        for update in &updates {
            assert!(update.before.is_none());
            assert_eq!(update.after.transaction_count, 1);
            assert_eq!(update.after.total_amount, dec!(250));
            assert!(!update.was_reset());
        }
    }

    #[tokio::test]
    async fn test_only_expired_windows_reset() {
        let tracker = tracker();
        let t0 = Utc::now();
        tracker.record("U1", dec!(100), t0).await.unwrap();
        let updates = tracker
            .record("U1", dec!(40), t0 + Duration::hours(2))
            .await
            .unwrap();

        let one_hour = updates.iter().find(|u| u.window() == TimeWindow::OneHour).unwrap();
        assert!(one_hour.was_reset());
        assert_eq!(one_hour.after.transaction_count, 1);
        assert_eq!(one_hour.after.total_amount, dec!(40));

        let one_day = updates.iter().find(|u| u.window() == TimeWindow::OneDay).unwrap();
        assert!(!one_day.was_reset());
        assert_eq!(one_day.after.transaction_count, 2);
        assert_eq!(one_day.after.total_amount, dec!(140));
    }
}
