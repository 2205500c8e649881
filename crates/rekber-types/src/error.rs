//! Platform-wide error taxonomy
//!
//! One shared domain error type keeps the surface layers honest about what
//! can go wrong: the API maps each variant to exactly one HTTP status, and
//! the webhook path maps them to the gateway's retry semantics.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::status::TransactionStatus;

/// Errors surfaced by escrow operations
#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Operation not legal from status {current}")]
    InvalidState { current: TransactionStatus },

    #[error("Not authorized for this action")]
    Unauthorized,

    #[error("Out of stock: {available} available, {requested} requested")]
    OutOfStock { available: u32, requested: u32 },

    #[error("Amount mismatch: expected {expected}, received {received}")]
    AmountMismatch {
        expected: Decimal,
        received: Decimal,
    },

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Validation error: {0}")]
    Validation(String),

    /// Lock or pool acquisition timed out; the caller may retry.
    #[error("Store contention, retry: {0}")]
    Contention(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl EscrowError {
    /// Whether a retry of the same request can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention(_))
    }
}

/// Result type for escrow operations
pub type Result<T> = std::result::Result<T, EscrowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_contention_is_retryable() {
        assert!(EscrowError::Contention("pool timeout".into()).is_retryable());
        assert!(!EscrowError::Unauthorized.is_retryable());
        assert!(!EscrowError::NotFound("x".into()).is_retryable());
    }
}
