use std::sync::Arc;

use erna_core::{Timestamp, UserId};
use erna_storage::{SkipRecord, Storage};
use tracing::{debug, info, instrument};

use crate::error::Result;

/// Global set of skip dates plus their write-once history.
pub struct SkipLedger {
    storage: Arc<dyn Storage>,
}

impl SkipLedger {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Record a skip at `datetime`. Idempotent on `datetime` alone.
    #[instrument(skip(self), fields(datetime = %datetime, user = %user))]
    pub fn create_skip(&self, user: &UserId, datetime: &Timestamp) -> Result<SkipRecord> {
        if let Some(existing) = self.storage.find_skip_history(datetime)? {
            debug!(id = %existing.id, "skip already recorded");
            return Ok(existing);
        }
        self.storage.insert_skip(datetime)?;
        let record = self.storage.insert_skip_history(datetime, user)?;
        info!(id = %record.id, "skip recorded");
        Ok(record)
    }

    pub fn list_skips(&self) -> Result<Vec<Timestamp>> {
        Ok(self.storage.list_skips()?)
    }

    /// Whether a recorded skip falls on the same UTC calendar day as `at`.
    pub fn is_skipped(&self, at: &Timestamp) -> Result<bool> {
        Ok(self
            .storage
            .list_skips()?
            .iter()
            .any(|skip| skip.date() == at.date()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erna_storage::{MemoryStorage, SqliteStorage};

    fn user(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn backends() -> Vec<Arc<dyn Storage>> {
        let sqlite = SqliteStorage::open_in_memory().unwrap();
        sqlite.init().unwrap();
        vec![Arc::new(MemoryStorage::new()), Arc::new(sqlite)]
    }

    #[test]
    fn create_skip_is_idempotent() {
        for storage in backends() {
            let ledger = SkipLedger::new(storage);
            let first = ledger.create_skip(&user("alice"), &ts("2030-12-24")).unwrap();
            let second = ledger
                .create_skip(&user("bob"), &ts("2030-12-24T00:00:00Z"))
                .unwrap();
            assert_eq!(first, second);
            assert_eq!(ledger.list_skips().unwrap(), vec![ts("2030-12-24")]);
        }
    }

    #[test]
    fn skips_are_listed_in_order() {
        for storage in backends() {
            let ledger = SkipLedger::new(storage);
            ledger.create_skip(&user("alice"), &ts("2030-12-31")).unwrap();
            ledger.create_skip(&user("alice"), &ts("2030-12-24")).unwrap();
            assert_eq!(
                ledger.list_skips().unwrap(),
                vec![ts("2030-12-24"), ts("2030-12-31")]
            );
        }
    }

    #[test]
    fn skip_suppresses_the_whole_day() {
        for storage in backends() {
            let ledger = SkipLedger::new(storage);
            ledger.create_skip(&user("alice"), &ts("2030-12-24")).unwrap();
            assert!(ledger.is_skipped(&ts("2030-12-24T11:30")).unwrap());
            assert!(ledger.is_skipped(&ts("2030-12-24T23:59")).unwrap());
            assert!(!ledger.is_skipped(&ts("2030-12-25T11:30")).unwrap());
        }
    }
}
