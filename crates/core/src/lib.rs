//! RiskWatch Core - Domain types
//!
//! This crate contains the fundamental types shared by every RiskWatch crate:
//! - [`LoginAttempt`] / [`Transaction`]: the two ingress events
//! - [`IpReputation`], [`DeviceFingerprint`], [`RiskScore`], [`TransactionVelocity`]: signal rows
//! - [`SecurityEvent`], [`SecurityNotification`], [`AuditRecord`]: append-only outputs
//! - [`TimeWindow`], [`Severity`]: closed vocabularies with stable string forms

pub mod alert;
pub mod audit;
pub mod event;
pub mod severity;
pub mod signal;
pub mod validation;
pub mod window;

pub use alert::{event_types, NotificationType, SecurityEvent, SecurityNotification};
pub use audit::AuditRecord;
pub use event::{IngressEvent, LoginAttempt, Transaction};
pub use severity::Severity;
pub use signal::{
    DeviceFingerprint, IpBlock, IpReputation, RiskScore, TransactionVelocity, VelocityUpdate,
    DEFAULT_REPUTATION,
};
pub use validation::{validate_login_attempt, validate_transaction, ValidationError};
pub use window::TimeWindow;
