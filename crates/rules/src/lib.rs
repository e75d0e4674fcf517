//! RiskWatch Rule Engine
//!
//! Configurable fraud rules (amount, frequency, location, device, pattern,
//! velocity) evaluated against each ingress event. Matches are returned to
//! the caller; executing them is the responder's job.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod rule;

pub use config::{rule_set_hash, validate_rules, RuleSetConfig};
pub use context::{EventKind, RuleContext, RuleMatch};
pub use engine::{RuleEngine, RuleSetChange};
pub use error::{RuleError, RuleResult};
pub use rule::{default_rules, FraudRule, RuleAction, RuleType};
