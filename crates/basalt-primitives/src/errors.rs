//! The error taxonomy shared across every component (spec §7).
//!
//! Individual crates define their own `thiserror` enums with variants that
//! carry whatever context is specific to that component (e.g.
//! `LedgerError::InsufficientFunds { peer, requested, available }`), and
//! implement `From<LocalError> for CoreError` so callers that don't care
//! about the fine-grained variant can still match on the broad category.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transient error, retry recommended: {0}")]
    Transient(String),

    #[error("consistency event: {0}")]
    Consistency(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl CoreError {
    pub fn category(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation",
            CoreError::NotFound(_) => "not_found",
            CoreError::Conflict(_) => "conflict",
            CoreError::InsufficientFunds(_) => "insufficient_funds",
            CoreError::Unauthorized(_) => "unauthorized",
            CoreError::Transient(_) => "transient",
            CoreError::Consistency(_) => "consistency",
            CoreError::Fatal(_) => "fatal",
        }
    }
}
