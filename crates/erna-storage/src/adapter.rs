use std::collections::HashMap;

use erna_core::{Location, Timestamp, UserId};

use crate::error::Result;
use crate::types::{ScheduleEntry, ScheduleRecord, SkipRecord};

/// Persistence contract for the registry, the match engine and both ledgers.
///
/// Implementations must give a single caller read-after-write consistency.
/// No operation here is atomic with any other; callers compose them.
/// Implementations must be `Send + Sync` so one store can be shared by every
/// component behind an `Arc`.
pub trait Storage: Send + Sync {
    /// Prepare the backing store (schema, collections). Idempotent.
    fn init(&self) -> Result<()>;

    // --- waiting lists ------------------------------------------------------

    /// True iff `user` has at least one recorded join.
    fn has_user(&self, user: &UserId) -> Result<bool>;

    /// The location whose waiting list currently holds `user`.
    fn location_of_user(&self, user: &UserId) -> Result<Option<Location>>;

    /// Append `user` to `location`'s waiting list and bump their join count.
    ///
    /// Returns `false` without touching anything if `user` is already
    /// waiting in any location.
    fn add_user_to_location(&self, location: &Location, user: &UserId) -> Result<bool>;

    /// Remove `user` from whichever waiting list holds them. No-op otherwise.
    fn remove_user_from_location(&self, user: &UserId) -> Result<()>;

    /// Waiting lists (in join order) for every requested location that exists.
    fn find_users_by_locations(
        &self,
        locations: &[Location],
    ) -> Result<HashMap<Location, Vec<UserId>>>;

    /// Drop the waiting-list entries themselves, not just their members.
    fn delete_locations(&self, locations: &[Location]) -> Result<()>;

    // --- schedule ledger ----------------------------------------------------

    fn find_schedule_history(
        &self,
        location: &Location,
        datetime: &Timestamp,
    ) -> Result<Option<ScheduleRecord>>;

    fn append_schedule_event(&self, location: &Location, datetime: &Timestamp) -> Result<()>;

    /// Write the history record for `(location, datetime)`.
    ///
    /// If a record already exists for the key it is left untouched and
    /// returned; otherwise the newly written record is returned.
    fn insert_schedule_history(
        &self,
        location: &Location,
        datetime: &Timestamp,
        user: &UserId,
        title: &str,
    ) -> Result<ScheduleRecord>;

    /// Every location whose pending set contains exactly `datetime`.
    fn find_schedules_containing(&self, datetime: &Timestamp) -> Result<Vec<ScheduleEntry>>;

    fn remove_event_from_all_schedules(&self, datetime: &Timestamp) -> Result<()>;

    /// Locations holding `datetime`, removing it from all of them.
    ///
    /// The default composes the two calls above and is therefore not atomic;
    /// backends that can do both under one lock or transaction override it.
    fn take_due_locations(&self, datetime: &Timestamp) -> Result<Vec<Location>> {
        let due: Vec<Location> = self
            .find_schedules_containing(datetime)?
            .into_iter()
            .map(|entry| entry.location)
            .collect();
        if !due.is_empty() {
            self.remove_event_from_all_schedules(datetime)?;
        }
        Ok(due)
    }

    fn find_schedule(&self, location: &Location) -> Result<Option<ScheduleEntry>>;

    fn list_schedules(&self) -> Result<Vec<ScheduleEntry>>;

    /// Drop pending timestamps strictly before `now`. History is kept.
    ///
    /// Returns how many pending timestamps were removed.
    fn prune_expired_events(&self, now: &Timestamp) -> Result<usize>;

    // --- skip ledger --------------------------------------------------------

    fn find_skip_history(&self, datetime: &Timestamp) -> Result<Option<SkipRecord>>;

    fn insert_skip(&self, datetime: &Timestamp) -> Result<()>;

    /// Same first-writer-wins contract as [`Storage::insert_schedule_history`].
    fn insert_skip_history(&self, datetime: &Timestamp, user: &UserId) -> Result<SkipRecord>;

    /// All pending skip dates, ascending.
    fn list_skips(&self) -> Result<Vec<Timestamp>>;
}
