//! Engine errors

use riskwatch_audit::AuditError;
use riskwatch_core::ValidationError;
use riskwatch_responder::ResponderError;
use riskwatch_risk::RiskError;
use riskwatch_rules::RuleError;
use riskwatch_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Rejected event: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Risk error: {0}")]
    Risk(#[from] RiskError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Responder error: {0}")]
    Responder(#[from] ResponderError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Worker for partition '{0}' is unavailable")]
    WorkerUnavailable(String),
}

impl EngineError {
    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
