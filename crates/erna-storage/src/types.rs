use erna_core::{Location, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Permanent, write-once record of a scheduled event.
///
/// Its presence for `(location, datetime)` is what makes event creation
/// idempotent. Never pruned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    /// UUIDv7 string, time-sortable primary key.
    pub id: String,
    pub location: Location,
    pub datetime: Timestamp,
    /// Who asked for the event.
    pub user: UserId,
    pub title: String,
    /// RFC3339 time the record was written.
    pub created_at: String,
}

/// Permanent, write-once record of a skip date. Keyed by `datetime` alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub id: String,
    pub datetime: Timestamp,
    pub user: UserId,
    pub created_at: String,
}

/// Pending (not yet consumed) event timestamps for one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub location: Location,
    /// Ascending.
    pub events: Vec<Timestamp>,
}
