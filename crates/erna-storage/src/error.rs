use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors surfaced by a storage backend. Never retried inside erna.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store is unreachable or the connection was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// Underlying SQLite / rusqlite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored value could not be decoded back into its domain type.
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

impl StorageError {
    /// Whether the owning service should treat this as a lost connection.
    pub fn is_fatal(&self) -> bool {
        match self {
            StorageError::Connection(_) => true,
            StorageError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::CannotOpen
                    | ErrorCode::NotADatabase
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::DiskFull
                    | ErrorCode::DatabaseCorrupt
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_fatal() {
        assert!(StorageError::Connection("closed".into()).is_fatal());
        assert!(!StorageError::Corrupt("bad".into()).is_fatal());
        assert!(!StorageError::Database(rusqlite::Error::QueryReturnedNoRows).is_fatal());
    }

    #[test]
    fn cannot_open_is_fatal() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
            None,
        );
        assert!(StorageError::from(err).is_fatal());
    }
}
