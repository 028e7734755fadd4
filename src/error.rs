//! Error types for coinledger

use thiserror::Error;

/// Broad error category callers switch on when translating domain errors
/// into transport-level responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, always caller-fixable.
    Validation,
    /// The request clashes with existing state; retrying unchanged cannot succeed.
    Conflict,
    /// A lookup matched no row.
    NotFound,
    /// Storage I/O failed; not retried automatically.
    Storage,
    /// Storage-transaction begin/commit/rollback failed. Storage may be
    /// inconsistent; never surfaced as a business error.
    Fatal,
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("invalid password")]
    InvalidPassword,
    #[error("invalid email")]
    InvalidEmail,
    #[error("invalid first name")]
    InvalidFirstName,
    #[error("invalid last name")]
    InvalidLastName,
    #[error("invalid currency")]
    InvalidCurrency,
    #[error("invalid address")]
    InvalidAddress,
    #[error("invalid amount")]
    InvalidAmount,
    #[error("user with such email already exists")]
    EmailConflict,
    #[error("wallet currency mismatch")]
    WalletCurrencyMismatch,
    #[error("not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(String),
    #[error("critical storage failure: {0}")]
    Critical(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidPassword
            | LedgerError::InvalidEmail
            | LedgerError::InvalidFirstName
            | LedgerError::InvalidLastName
            | LedgerError::InvalidCurrency
            | LedgerError::InvalidAddress
            | LedgerError::InvalidAmount => ErrorKind::Validation,
            LedgerError::EmailConflict | LedgerError::WalletCurrencyMismatch => {
                ErrorKind::Conflict
            }
            LedgerError::NotFound => ErrorKind::NotFound,
            LedgerError::Database(_) => ErrorKind::Storage,
            LedgerError::Critical(_) | LedgerError::Internal(_) => ErrorKind::Fatal,
        }
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_discriminate_the_taxonomy() {
        assert_eq!(LedgerError::InvalidAmount.kind(), ErrorKind::Validation);
        assert_eq!(LedgerError::EmailConflict.kind(), ErrorKind::Conflict);
        assert_eq!(
            LedgerError::WalletCurrencyMismatch.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(LedgerError::NotFound.kind(), ErrorKind::NotFound);
        assert_eq!(
            LedgerError::Database("boom".to_string()).kind(),
            ErrorKind::Storage
        );
        assert_eq!(
            LedgerError::Critical("boom".to_string()).kind(),
            ErrorKind::Fatal
        );
    }

    #[test]
    fn messages_are_stable() {
        assert_eq!(LedgerError::InvalidPassword.to_string(), "invalid password");
        assert_eq!(
            LedgerError::EmailConflict.to_string(),
            "user with such email already exists"
        );
    }
}
