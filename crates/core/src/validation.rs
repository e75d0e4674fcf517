//! Ingress validation
//!
//! A rejected event must not reach any signal store.

use std::net::IpAddr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::event::{LoginAttempt, Transaction};

/// Why an ingress event was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Email is empty")]
    EmptyEmail,

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Invalid IP address: {0}")]
    InvalidIp(String),

    #[error("User ID is empty")]
    EmptyUserId,

    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),
}

fn validate_ip(ip: &str) -> Result<(), ValidationError> {
    ip.parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidIp(ip.to_string()))
}

pub fn validate_login_attempt(attempt: &LoginAttempt) -> Result<(), ValidationError> {
    let email = attempt.email.trim();
    if email.is_empty() {
        return Err(ValidationError::EmptyEmail);
    }
    if !email.contains('@') {
        return Err(ValidationError::InvalidEmail(email.to_string()));
    }
    if let Some(user_id) = &attempt.user_id {
        if user_id.trim().is_empty() {
            return Err(ValidationError::EmptyUserId);
        }
    }
    validate_ip(&attempt.ip_address)
}

pub fn validate_transaction(tx: &Transaction) -> Result<(), ValidationError> {
    if tx.user_id.trim().is_empty() {
        return Err(ValidationError::EmptyUserId);
    }
    if tx.amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount(tx.amount));
    }
    if let Some(ip) = &tx.ip_address {
        validate_ip(ip)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_valid_login() {
        let a = LoginAttempt::new("a@x.com", "1.2.3.4", false, Utc::now());
        assert!(validate_login_attempt(&a).is_ok());

        let v6 = LoginAttempt::new("a@x.com", "::1", true, Utc::now());
        assert!(validate_login_attempt(&v6).is_ok());
    }

    #[test]
    fn test_invalid_login() {
        let now = Utc::now();
        assert_eq!(
            validate_login_attempt(&LoginAttempt::new("  ", "1.2.3.4", false, now)),
            Err(ValidationError::EmptyEmail)
        );
        assert!(matches!(
            validate_login_attempt(&LoginAttempt::new("nobody", "1.2.3.4", false, now)),
            Err(ValidationError::InvalidEmail(_))
        ));
        assert!(matches!(
            validate_login_attempt(&LoginAttempt::new("a@x.com", "999.1.1.1", false, now)),
            Err(ValidationError::InvalidIp(_))
        ));
        assert_eq!(
            validate_login_attempt(&LoginAttempt::new("a@x.com", "1.2.3.4", true, now).with_user("")),
            Err(ValidationError::EmptyUserId)
        );
    }

    #[test]
    fn test_transaction_validation() {
        let now = Utc::now();
        assert!(validate_transaction(&Transaction::new("U1", dec!(0.01), now)).is_ok());
        assert_eq!(
            validate_transaction(&Transaction::new("U1", dec!(0), now)),
            Err(ValidationError::NonPositiveAmount(dec!(0)))
        );
        assert!(validate_transaction(&Transaction::new("U1", dec!(-5), now)).is_err());
        assert_eq!(
            validate_transaction(&Transaction::new("", dec!(5), now)),
            Err(ValidationError::EmptyUserId)
        );
        assert!(validate_transaction(&Transaction::new("U1", dec!(5), now).with_ip("bad")).is_err());
    }
}
