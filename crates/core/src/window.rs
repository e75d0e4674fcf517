//! Velocity windows
//!
//! The four fixed-duration windows a user's transaction counters are kept for.
//! String forms (`1h`, `24h`, `7d`, `30d`) are the storage keys.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// A fixed-duration sliding counter window
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString, Display,
)]
pub enum TimeWindow {
    #[serde(rename = "1h")]
    #[strum(serialize = "1h")]
    OneHour,

    #[serde(rename = "24h")]
    #[strum(serialize = "24h")]
    OneDay,

    #[serde(rename = "7d")]
    #[strum(serialize = "7d")]
    SevenDays,

    #[serde(rename = "30d")]
    #[strum(serialize = "30d")]
    ThirtyDays,
}

impl TimeWindow {
    /// Every tracked window, shortest first
    pub const ALL: [TimeWindow; 4] = [
        TimeWindow::OneHour,
        TimeWindow::OneDay,
        TimeWindow::SevenDays,
        TimeWindow::ThirtyDays,
    ];

    /// Window duration `D(w)`
    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::OneHour => Duration::hours(1),
            TimeWindow::OneDay => Duration::hours(24),
            TimeWindow::SevenDays => Duration::days(7),
            TimeWindow::ThirtyDays => Duration::days(30),
        }
    }

    /// Smallest window whose duration covers `seconds`.
    ///
    /// Anything longer than 30 days maps to the 30-day window.
    pub fn covering(seconds: i64) -> TimeWindow {
        Self::ALL
            .into_iter()
            .find(|w| w.duration().num_seconds() >= seconds)
            .unwrap_or(TimeWindow::ThirtyDays)
    }
}
