use erna_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatchError {
    /// Passed through unmodified from the storage backend.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl MatchError {
    pub fn is_fatal(&self) -> bool {
        match self {
            MatchError::Storage(e) => e.is_fatal(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MatchError>;
