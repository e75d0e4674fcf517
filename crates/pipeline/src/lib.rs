//! RiskWatch Pipeline
//!
//! The explicit event pipeline: [`EventProcessor`] runs the ordered stages
//! for one event, [`Dispatcher`] orders events per user (and per login email)
//! while unrelated partitions run concurrently, and [`FraudEngine`] is the
//! facade for ingestion and queries.

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod processor;

pub use config::EngineConfig;
pub use dispatcher::Dispatcher;
pub use engine::{EngineBuilder, FraudEngine, IpStatus};
pub use error::{EngineError, EngineResult};
pub use metrics::{SecurityMetrics, SystemHealth};
pub use processor::{EventProcessor, ProcessOutcome};
