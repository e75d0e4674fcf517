//! RiskWatch Risk Engine
//!
//! - [`VelocityTracker`]: rolling transaction counters per `(user, window)`
//! - [`RiskScorer`]: weighted sub-scores and the composite 0-100 score
//! - [`RiskLevel`]: coarse buckets over a score

pub mod error;
pub mod level;
pub mod scorer;
pub mod velocity;

pub use error::{RiskError, RiskResult};
pub use level::RiskLevel;
pub use scorer::{RiskInputs, RiskScorer, SubScores};
pub use riskwatch_core::VelocityUpdate;
pub use velocity::VelocityTracker;
