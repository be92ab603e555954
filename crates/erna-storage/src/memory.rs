use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use erna_core::{Location, Timestamp, UserId};
use uuid::Uuid;

use crate::adapter::Storage;
use crate::error::{Result, StorageError};
use crate::types::{ScheduleEntry, ScheduleRecord, SkipRecord};

#[derive(Default)]
struct State {
    /// Waiting lists in join order. A key outlives its last member until deleted.
    locations: HashMap<Location, Vec<UserId>>,
    join_counts: HashMap<UserId, u64>,
    /// Pending events; a location with no pending events has no key.
    schedules: BTreeMap<Location, BTreeSet<Timestamp>>,
    schedule_history: HashMap<(Location, Timestamp), ScheduleRecord>,
    skips: BTreeSet<Timestamp>,
    skip_history: HashMap<Timestamp, SkipRecord>,
}

impl State {
    fn location_of(&self, user: &UserId) -> Option<&Location> {
        self.locations
            .iter()
            .find(|(_, users)| users.contains(user))
            .map(|(location, _)| location)
    }
}

/// Process-local [`Storage`]. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StorageError::Connection("memory store mutex poisoned".to_string()))
    }
}

impl Storage for MemoryStorage {
    fn init(&self) -> Result<()> {
        self.state().map(|_| ())
    }

    fn has_user(&self, user: &UserId) -> Result<bool> {
        Ok(self.state()?.join_counts.get(user).is_some_and(|c| *c > 0))
    }

    fn location_of_user(&self, user: &UserId) -> Result<Option<Location>> {
        Ok(self.state()?.location_of(user).cloned())
    }

    fn add_user_to_location(&self, location: &Location, user: &UserId) -> Result<bool> {
        let mut state = self.state()?;
        if state.location_of(user).is_some() {
            return Ok(false);
        }
        state
            .locations
            .entry(location.clone())
            .or_default()
            .push(user.clone());
        *state.join_counts.entry(user.clone()).or_default() += 1;
        Ok(true)
    }

    fn remove_user_from_location(&self, user: &UserId) -> Result<()> {
        let mut state = self.state()?;
        for users in state.locations.values_mut() {
            users.retain(|u| u != user);
        }
        Ok(())
    }

    fn find_users_by_locations(
        &self,
        locations: &[Location],
    ) -> Result<HashMap<Location, Vec<UserId>>> {
        let state = self.state()?;
        Ok(locations
            .iter()
            .filter_map(|l| state.locations.get(l).map(|users| (l.clone(), users.clone())))
            .collect())
    }

    fn delete_locations(&self, locations: &[Location]) -> Result<()> {
        let mut state = self.state()?;
        for location in locations {
            state.locations.remove(location);
        }
        Ok(())
    }

    fn find_schedule_history(
        &self,
        location: &Location,
        datetime: &Timestamp,
    ) -> Result<Option<ScheduleRecord>> {
        Ok(self
            .state()?
            .schedule_history
            .get(&(location.clone(), datetime.clone()))
            .cloned())
    }

    fn append_schedule_event(&self, location: &Location, datetime: &Timestamp) -> Result<()> {
        self.state()?
            .schedules
            .entry(location.clone())
            .or_default()
            .insert(datetime.clone());
        Ok(())
    }

    fn insert_schedule_history(
        &self,
        location: &Location,
        datetime: &Timestamp,
        user: &UserId,
        title: &str,
    ) -> Result<ScheduleRecord> {
        let mut state = self.state()?;
        let record = state
            .schedule_history
            .entry((location.clone(), datetime.clone()))
            .or_insert_with(|| ScheduleRecord {
                id: Uuid::now_v7().to_string(),
                location: location.clone(),
                datetime: datetime.clone(),
                user: user.clone(),
                title: title.to_string(),
                created_at: Utc::now().to_rfc3339(),
            });
        Ok(record.clone())
    }

    fn find_schedules_containing(&self, datetime: &Timestamp) -> Result<Vec<ScheduleEntry>> {
        let state = self.state()?;
        Ok(state
            .schedules
            .iter()
            .filter(|(_, events)| events.contains(datetime))
            .map(|(location, events)| entry(location, events))
            .collect())
    }

    fn remove_event_from_all_schedules(&self, datetime: &Timestamp) -> Result<()> {
        let mut state = self.state()?;
        for events in state.schedules.values_mut() {
            events.remove(datetime);
        }
        state.schedules.retain(|_, events| !events.is_empty());
        Ok(())
    }

    fn take_due_locations(&self, datetime: &Timestamp) -> Result<Vec<Location>> {
        let mut state = self.state()?;
        let due: Vec<Location> = state
            .schedules
            .iter_mut()
            .filter_map(|(location, events)| events.remove(datetime).then(|| location.clone()))
            .collect();
        state.schedules.retain(|_, events| !events.is_empty());
        Ok(due)
    }

    fn find_schedule(&self, location: &Location) -> Result<Option<ScheduleEntry>> {
        Ok(self
            .state()?
            .schedules
            .get(location)
            .map(|events| entry(location, events)))
    }

    fn list_schedules(&self) -> Result<Vec<ScheduleEntry>> {
        Ok(self
            .state()?
            .schedules
            .iter()
            .map(|(location, events)| entry(location, events))
            .collect())
    }

    fn prune_expired_events(&self, now: &Timestamp) -> Result<usize> {
        let mut state = self.state()?;
        let mut removed = 0;
        for events in state.schedules.values_mut() {
            let before = events.len();
            events.retain(|t| t >= now);
            removed += before - events.len();
        }
        state.schedules.retain(|_, events| !events.is_empty());
        Ok(removed)
    }

    fn find_skip_history(&self, datetime: &Timestamp) -> Result<Option<SkipRecord>> {
        Ok(self.state()?.skip_history.get(datetime).cloned())
    }

    fn insert_skip(&self, datetime: &Timestamp) -> Result<()> {
        self.state()?.skips.insert(datetime.clone());
        Ok(())
    }

    fn insert_skip_history(&self, datetime: &Timestamp, user: &UserId) -> Result<SkipRecord> {
        let mut state = self.state()?;
        let record = state
            .skip_history
            .entry(datetime.clone())
            .or_insert_with(|| SkipRecord {
                id: Uuid::now_v7().to_string(),
                datetime: datetime.clone(),
                user: user.clone(),
                created_at: Utc::now().to_rfc3339(),
            });
        Ok(record.clone())
    }

    fn list_skips(&self) -> Result<Vec<Timestamp>> {
        Ok(self.state()?.skips.iter().cloned().collect())
    }
}

fn entry(location: &Location, events: &BTreeSet<Timestamp>) -> ScheduleEntry {
    ScheduleEntry {
        location: location.clone(),
        events: events.iter().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(s: &str) -> Location {
        Location::parse(s).unwrap()
    }

    fn user(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    #[test]
    fn user_is_in_at_most_one_list() {
        let s = MemoryStorage::new();
        assert!(s.add_user_to_location(&loc("hq"), &user("alice")).unwrap());
        assert!(!s.add_user_to_location(&loc("hq"), &user("alice")).unwrap());
        assert!(!s.add_user_to_location(&loc("berlin"), &user("alice")).unwrap());
        assert_eq!(s.location_of_user(&user("alice")).unwrap(), Some(loc("hq")));
        assert_eq!(s.state().unwrap().join_counts[&user("alice")], 1);
    }

    #[test]
    fn consumed_location_disappears_from_listing() {
        let s = MemoryStorage::new();
        s.append_schedule_event(&loc("hq"), &ts("2030-01-06T11:30")).unwrap();
        s.remove_event_from_all_schedules(&ts("2030-01-06T11:30")).unwrap();
        assert!(s.find_schedule(&loc("hq")).unwrap().is_none());
        assert!(s.list_schedules().unwrap().is_empty());
    }

    #[test]
    fn prune_counts_removed_events() {
        let s = MemoryStorage::new();
        s.append_schedule_event(&loc("hq"), &ts("2020-01-06T11:30")).unwrap();
        s.append_schedule_event(&loc("berlin"), &ts("2020-02-06T11:30")).unwrap();
        s.append_schedule_event(&loc("berlin"), &ts("2030-02-06T11:30")).unwrap();
        assert_eq!(s.prune_expired_events(&ts("2026-10-16T12:00")).unwrap(), 2);
        let all = s.list_schedules().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].location, loc("berlin"));
    }

    #[test]
    fn skip_history_first_writer_wins() {
        let s = MemoryStorage::new();
        let a = s.insert_skip_history(&ts("2030-12-24"), &user("alice")).unwrap();
        let b = s.insert_skip_history(&ts("2030-12-24"), &user("bob")).unwrap();
        assert_eq!(a, b);
        assert_eq!(b.user, user("alice"));
    }
}
