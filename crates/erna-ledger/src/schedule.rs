use std::collections::BTreeMap;
use std::sync::Arc;

use erna_core::{Location, Timestamp, UserId, ValidationError};
use erna_storage::{ScheduleRecord, Storage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;

/// Longest accepted event title, in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// The earliest pending event of a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextEvent {
    /// `None` only if the history record has gone missing.
    pub title: Option<String>,
    pub time: Timestamp,
}

/// Per-location pending event timestamps plus their write-once history.
pub struct ScheduleLedger {
    storage: Arc<dyn Storage>,
}

impl ScheduleLedger {
    /// Open the ledger, discarding pending events that are already in the past.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        Self::open_at(storage, &Timestamp::now())
    }

    /// Like [`ScheduleLedger::open`] with an explicit notion of "now".
    ///
    /// Pending timestamps strictly before `now` are removed from every
    /// location; history records are left alone.
    pub fn open_at(storage: Arc<dyn Storage>, now: &Timestamp) -> Result<Self> {
        let pruned = storage.prune_expired_events(now)?;
        if pruned > 0 {
            warn!(count = pruned, %now, "stale scheduled events discarded on startup");
        }
        Ok(Self { storage })
    }

    /// Schedule an event for `location` at `datetime`.
    ///
    /// Idempotent on `(location, datetime)`: a repeat returns the first
    /// record unchanged, whatever `user` and `title` it carries.
    #[instrument(skip(self, title), fields(location = %location, datetime = %datetime, user = %user))]
    pub fn create_event(
        &self,
        user: &UserId,
        location: &Location,
        datetime: &Timestamp,
        title: &str,
    ) -> Result<ScheduleRecord> {
        validate_title(title)?;

        if let Some(existing) = self.storage.find_schedule_history(location, datetime)? {
            debug!(id = %existing.id, "event already scheduled");
            return Ok(existing);
        }

        if *datetime < Timestamp::now() {
            warn!("event scheduled in the past; it will never fire");
        }

        self.storage.append_schedule_event(location, datetime)?;
        let record = self
            .storage
            .insert_schedule_history(location, datetime, user, title)?;
        info!(id = %record.id, "event scheduled");
        Ok(record)
    }

    /// Fire `datetime`: return every location with that exact pending
    /// timestamp and remove it from all of them.
    ///
    /// A given `(location, datetime)` is returned by at most one call.
    #[instrument(skip(self), fields(datetime = %datetime))]
    pub fn consume_due(&self, datetime: &Timestamp) -> Result<Vec<Location>> {
        let due = self.storage.take_due_locations(datetime)?;
        if !due.is_empty() {
            info!(count = due.len(), "scheduled events consumed");
        }
        Ok(due)
    }

    /// Earliest pending event for `location`, with its title.
    pub fn next_due(&self, location: &Location) -> Result<Option<NextEvent>> {
        let Some(entry) = self.storage.find_schedule(location)? else {
            return Ok(None);
        };
        let Some(time) = entry.events.into_iter().min() else {
            return Ok(None);
        };
        let title = self
            .storage
            .find_schedule_history(location, &time)?
            .map(|record| record.title);
        Ok(Some(NextEvent { title, time }))
    }

    /// Every pending event, grouped by location.
    pub fn list_all(&self) -> Result<BTreeMap<Location, Vec<Timestamp>>> {
        Ok(self
            .storage
            .list_schedules()?
            .into_iter()
            .map(|entry| (entry.location, entry.events))
            .collect())
    }

    /// The permanent record for `(location, datetime)`, consumed or not.
    pub fn history(
        &self,
        location: &Location,
        datetime: &Timestamp,
    ) -> Result<Option<ScheduleRecord>> {
        Ok(self.storage.find_schedule_history(location, datetime)?)
    }
}

fn validate_title(title: &str) -> std::result::Result<(), ValidationError> {
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::Title {
            reason: format!("longer than {MAX_TITLE_LEN} characters"),
        });
    }
    if title.chars().any(char::is_control) {
        return Err(ValidationError::Title {
            reason: "must not contain control characters".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use erna_storage::{MemoryStorage, SqliteStorage};

    fn loc(s: &str) -> Location {
        Location::parse(s).unwrap()
    }

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

    fn ledger(storage: Arc<dyn Storage>) -> ScheduleLedger {
        ScheduleLedger::open_at(storage, &ts("2026-10-16T12:00")).unwrap()
    }

    #[test]
    fn concurrent_create_event_keeps_one_record() {
        for storage in backends() {
            let ledger = ledger(storage);
            let t = ts("2030-01-06T11:30");

            let records: Vec<ScheduleRecord> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..8)
                    .map(|i| {
                        let ledger = &ledger;
                        let t = &t;
                        scope.spawn(move || {
                            ledger
                                .create_event(&user(&format!("user{i}")), &loc("hq"), t, &format!("event {i}"))
                                .unwrap()
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let winner = &records[0];
            assert!(records.iter().all(|r| r == winner));
            let i = winner.user.as_str().trim_start_matches("user");
            assert_eq!(winner.title, format!("event {i}"));
            assert_eq!(ledger.list_all().unwrap()[&loc("hq")], vec![t.clone()]);
            assert_eq!(ledger.history(&loc("hq"), &t).unwrap().as_ref(), Some(winner));
        }
    }

    #[test]
    fn create_event_is_idempotent() {
        for storage in backends() {
            let ledger = ledger(storage);
            let t = ts("2030-01-06T11:30");
            let first = ledger.create_event(&user("alice"), &loc("hq"), &t, "x").unwrap();
            let second = ledger
                .create_event(&user("bob"), &loc("hq"), &t, "something else")
                .unwrap();

            assert_eq!(first, second);
            assert_eq!(second.user, user("alice"));
            assert_eq!(second.title, "x");
            assert_eq!(ledger.list_all().unwrap()[&loc("hq")], vec![t]);
        }
    }

    #[test]
    fn same_time_in_two_locations_is_two_events() {
        for storage in backends() {
            let ledger = ledger(storage);
            let t = ts("2030-01-06T11:30");
            let a = ledger.create_event(&user("alice"), &loc("hq"), &t, "a").unwrap();
            let b = ledger.create_event(&user("alice"), &loc("berlin"), &t, "b").unwrap();
            assert_ne!(a.id, b.id);
            assert_eq!(ledger.list_all().unwrap().len(), 2);
        }
    }

    #[test]
    fn consume_due_fires_exactly_once() {
        for storage in backends() {
            let ledger = ledger(storage);
            let t = ts("2030-01-06T11:30");
            ledger.create_event(&user("alice"), &loc("hq"), &t, "a").unwrap();
            ledger.create_event(&user("bob"), &loc("berlin"), &t, "b").unwrap();
            ledger
                .create_event(&user("bob"), &loc("berlin"), &ts("2030-01-13T11:30"), "c")
                .unwrap();

            let mut due = ledger.consume_due(&t).unwrap();
            due.sort();
            assert_eq!(due, vec![loc("berlin"), loc("hq")]);
            assert!(ledger.consume_due(&t).unwrap().is_empty());

            // Other events of the same location are untouched.
            assert_eq!(
                ledger.next_due(&loc("berlin")).unwrap().unwrap().time,
                ts("2030-01-13T11:30")
            );
            // Recreating after consumption is still a no-op: history remembers.
            ledger.create_event(&user("carol"), &loc("hq"), &t, "again").unwrap();
            assert!(ledger.consume_due(&t).unwrap().is_empty());
        }
    }

    #[test]
    fn consume_due_only_matches_exact_time() {
        for storage in backends() {
            let ledger = ledger(storage);
            ledger
                .create_event(&user("alice"), &loc("hq"), &ts("2030-01-06T11:30"), "a")
                .unwrap();
            assert!(ledger.consume_due(&ts("2030-01-06T11:31")).unwrap().is_empty());
            assert_eq!(ledger.consume_due(&ts("2030-01-06T11:30")).unwrap().len(), 1);
        }
    }

    #[test]
    fn next_due_returns_earliest_with_title() {
        for storage in backends() {
            let ledger = ledger(storage);
            assert_eq!(ledger.next_due(&loc("hq")).unwrap(), None);

            ledger
                .create_event(&user("alice"), &loc("hq"), &ts("2030-03-01T11:30"), "later")
                .unwrap();
            ledger
                .create_event(&user("alice"), &loc("hq"), &ts("2030-02-01T11:30"), "sooner")
                .unwrap();
            assert_eq!(
                ledger.next_due(&loc("hq")).unwrap(),
                Some(NextEvent {
                    title: Some("sooner".to_string()),
                    time: ts("2030-02-01T11:30"),
                })
            );
        }
    }

    #[test]
    fn startup_prunes_past_events_but_keeps_history() {
        for storage in backends() {
            let early = ScheduleLedger::open_at(Arc::clone(&storage), &ts("2020-01-01T00:00"))
                .unwrap();
            early
                .create_event(&user("alice"), &loc("hq"), &ts("2025-01-06T11:30"), "past 1")
                .unwrap();
            early
                .create_event(&user("alice"), &loc("hq"), &ts("2026-10-16T11:59"), "past 2")
                .unwrap();
            early
                .create_event(&user("alice"), &loc("hq"), &ts("2026-10-16T12:00"), "now")
                .unwrap();
            early
                .create_event(&user("alice"), &loc("hq"), &ts("2030-01-06T11:30"), "future")
                .unwrap();

            let ledger = ScheduleLedger::open_at(storage, &ts("2026-10-16T12:00")).unwrap();
            assert_eq!(
                ledger.list_all().unwrap()[&loc("hq")],
                vec![ts("2026-10-16T12:00"), ts("2030-01-06T11:30")]
            );
            let old = ledger
                .history(&loc("hq"), &ts("2025-01-06T11:30"))
                .unwrap()
                .unwrap();
            assert_eq!(old.title, "past 1");
        }
    }

    #[test]
    fn bad_title_is_rejected_before_writing() {
        for storage in backends() {
            let ledger = ledger(storage);
            let err = ledger
                .create_event(&user("alice"), &loc("hq"), &ts("2030-01-06T11:30"), "a\nb")
                .unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)));
            let long = "x".repeat(MAX_TITLE_LEN + 1);
            assert!(ledger
                .create_event(&user("alice"), &loc("hq"), &ts("2030-01-06T11:30"), &long)
                .is_err());
            assert!(ledger.list_all().unwrap().is_empty());
        }
    }
}
