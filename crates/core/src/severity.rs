//! Severity levels - ordered from lowest to highest
//!
//! `Low < Medium < High < Critical`. Aggregation over several severities
//! takes the maximum.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Severity of a security event, notification or fraud rule
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Critical events always fan out to a user notification
    pub fn is_critical(&self) -> bool {
        matches!(self, Severity::Critical)
    }
}
