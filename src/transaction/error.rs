//! Rejection taxonomy shared by admission, signature collection and block application.
//! Every rejection carries the exact reason text handed back to the client.

use thiserror::Error;

use crate::transaction::schema::SchemaError;
use crate::txpool::pool::TxPoolError;

/// Why a multisignature approval was refused.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SignatureRejection {
    #[error("Transaction not found")]
    TransactionNotFound,
    /// Duplicate signer, or the transaction already holds every required signature.
    #[error("Permission to sign transaction denied")]
    PermissionDenied,
    #[error("Failed to verify signature")]
    VerificationFailed,
    /// Reported with the verification text; a key outside the group cannot produce a valid approval.
    #[error("Failed to verify signature")]
    NotAMember,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransactionError {
    /// Field-level payload violation.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Business rule against current state (funds, already-multisig, ...).
    #[error("{0}")]
    BusinessRule(String),

    #[error(transparent)]
    Signature(#[from] SignatureRejection),

    /// Lost a race for a one-time account transition.
    #[error("{0}")]
    StateConflict(String),

    #[error(transparent)]
    Pool(#[from] TxPoolError),

    #[error("storage error: {0}")]
    Storage(String),
}

impl TransactionError {
    pub fn rule(msg: impl Into<String>) -> Self {
        TransactionError::BusinessRule(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        TransactionError::StateConflict(msg.into())
    }

    /// HTTP status the API layer reports for this rejection.
    pub fn http_status(&self) -> u16 {
        match self {
            TransactionError::Signature(_) | TransactionError::Storage(_) => 500,
            _ => 400,
        }
    }
}

pub const ALREADY_MULTISIG: &str = "Account already has multisignatures enabled";
pub const FAILED_TO_VERIFY_SIGNATURE: &str = "Failed to verify signature";
pub const FAILED_TO_VERIFY_MULTISIG: &str = "Failed to verify multisignature";

/// `balance` is in the smallest unit; the message prints whole coins.
pub fn insufficient_funds(address: &crate::crypto::Address, balance: u64) -> TransactionError {
    TransactionError::rule(format!(
        "Account does not have enough LSK: {} balance: {}",
        address,
        format_coins(balance)
    ))
}

/// Render an amount of the smallest unit as whole coins (10^8), trimming trailing zeros.
pub fn format_coins(amount: u64) -> String {
    const UNIT: u64 = 100_000_000;
    let whole = amount / UNIT;
    let frac = amount % UNIT;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:08}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Address;

    #[test]
    fn test_format_coins() {
        assert_eq!(format_coins(0), "0");
        assert_eq!(format_coins(100_000_000), "1");
        assert_eq!(format_coins(150_000_000), "1.5");
        assert_eq!(format_coins(1), "0.00000001");
    }

    #[test]
    fn test_insufficient_funds_message() {
        let err = insufficient_funds(&Address(99), 0);
        assert_eq!(err.to_string(), "Account does not have enough LSK: 99L balance: 0");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn test_signature_rejection_status() {
        let err = TransactionError::from(SignatureRejection::PermissionDenied);
        assert_eq!(err.to_string(), "Permission to sign transaction denied");
        assert_eq!(err.http_status(), 500);
    }
}
