//! `erna-storage`: the persistence contract every erna component talks to.
//!
//! Components hold an `Arc<dyn Storage>` and never see a concrete client.
//! Two backends ship with the crate:
//!
//! | Backend          | Use                                              |
//! |------------------|--------------------------------------------------|
//! | `SqliteStorage`  | Persistent single-file store (rusqlite)          |
//! | `MemoryStorage`  | Process-local maps; tests and throwaway runs     |
//!
//! Pick one from configuration with [`open`].

pub mod adapter;
pub mod db;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod types;

use std::sync::Arc;

use erna_core::config::{DatabaseConfig, StorageBackend};
use tracing::info;

pub use adapter::Storage;
pub use error::{Result, StorageError};
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
pub use types::{ScheduleEntry, ScheduleRecord, SkipRecord};

/// Build and initialise the backend named in `config`.
pub fn open(config: &DatabaseConfig) -> Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.backend {
        StorageBackend::Sqlite => {
            info!(path = %config.path, "opening SQLite storage");
            Arc::new(SqliteStorage::open(&config.path)?)
        }
        StorageBackend::Memory => {
            info!("using in-memory storage; state is lost on exit");
            Arc::new(MemoryStorage::new())
        }
    };
    storage.init()?;
    Ok(storage)
}
