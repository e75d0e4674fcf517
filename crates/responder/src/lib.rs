//! RiskWatch Auto-Responder
//!
//! Acts on ingress events and rule matches: blocks IPs after failed-login
//! bursts, raises security events, and turns critical events into user
//! notifications.

pub mod config;
pub mod error;
pub mod geo;
pub mod notify;
pub mod responder;

pub use config::ResponderConfig;
pub use error::{ResponderError, ResponderResult};
pub use geo::{GeoLocation, GeoResolver, StaticGeoResolver};
pub use notify::{LogNotifier, Notifier};
pub use responder::{AutoResponder, LoginResponse};
