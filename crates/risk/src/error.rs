//! Risk engine errors

use riskwatch_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type RiskResult<T> = Result<T, RiskError>;
