//! Responder errors

use riskwatch_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResponderError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Geolocation lookup failed: {0}")]
    Geo(String),

    #[error("Notification delivery failed: {0}")]
    Notify(String),
}

pub type ResponderResult<T> = Result<T, ResponderError>;
