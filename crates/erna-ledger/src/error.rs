use erna_core::ValidationError;
use erna_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Passed through unmodified from the storage backend.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Rejected before anything was written.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl LedgerError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::Storage(e) if e.is_fatal())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
