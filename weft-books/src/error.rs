use thiserror::Error;
use weft_ledger::LedgerError;

/// Result alias for recorder operations.
pub type BooksResult<T> = Result<T, BooksError>;

#[derive(Debug, Error)]
pub enum BooksError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid document state: {0}")]
    InvalidState(String),
}

impl BooksError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, BooksError::Ledger(err) if err.is_conflict())
    }
}

impl From<rusqlite::Error> for BooksError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Ledger(LedgerError::from(value))
    }
}
