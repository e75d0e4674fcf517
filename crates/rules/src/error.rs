//! Rule engine errors

use riskwatch_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid rule {name}: {reason}")]
    InvalidRule { name: String, reason: String },

    #[error("Duplicate rule name: {0}")]
    DuplicateRule(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RuleResult<T> = Result<T, RuleError>;
