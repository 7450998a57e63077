use rusqlite::ErrorCode;
use thiserror::Error;

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error type surfaced by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("concurrent update detected: {0}")]
    ConcurrencyConflict(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid ledger state: {0}")]
    InvalidState(String),
}

impl LedgerError {
    /// Whether the failed unit of work may succeed if re-run from a fresh read.
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict(_))
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        match &value {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                Self::ConcurrencyConflict(value.to_string())
            }
            _ => Self::Persistence(value.to_string()),
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(value: std::io::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}
