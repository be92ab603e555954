use std::sync::Arc;

use erna_core::{Location, UserId};
use erna_storage::Storage;
use tracing::{debug, info, instrument};

use crate::error::Result;

/// Who is waiting in which location.
///
/// Stateless apart from the shared store; every call is a direct
/// round-trip through [`Storage`].
pub struct LocationRegistry {
    storage: Arc<dyn Storage>,
}

impl LocationRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// True iff `user` has joined at least once, ever.
    pub fn is_member(&self, user: &UserId) -> Result<bool> {
        Ok(self.storage.has_user(user)?)
    }

    /// The location whose waiting list currently holds `user`.
    pub fn location_of(&self, user: &UserId) -> Result<Option<Location>> {
        Ok(self.storage.location_of_user(user)?)
    }

    /// Put `user` on `location`'s waiting list.
    ///
    /// Returns `false` and changes nothing when the user is already waiting,
    /// in this or any other location.
    #[instrument(skip(self), fields(location = %location, user = %user))]
    pub fn join(&self, location: &Location, user: &UserId) -> Result<bool> {
        if let Some(current) = self.storage.location_of_user(user)? {
            debug!(current = %current, "join rejected: already waiting");
            return Ok(false);
        }
        let joined = self.storage.add_user_to_location(location, user)?;
        if joined {
            info!("user joined waiting list");
        }
        Ok(joined)
    }

    /// Take `user` off whatever waiting list holds them. No-op if none does.
    #[instrument(skip(self), fields(user = %user))]
    pub fn leave(&self, user: &UserId) -> Result<()> {
        self.storage.remove_user_from_location(user)?;
        Ok(())
    }

    /// Delete the waiting-list entries for `locations` outright.
    #[instrument(skip(self), fields(count = locations.len()))]
    pub fn purge(&self, locations: &[Location]) -> Result<()> {
        if locations.is_empty() {
            return Ok(());
        }
        self.storage.delete_locations(locations)?;
        info!("waiting lists purged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erna_storage::{MemoryStorage, SqliteStorage};

    fn loc(s: &str) -> Location {
        Location::parse(s).unwrap()
    }

    fn user(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn backends() -> Vec<Arc<dyn Storage>> {
        let sqlite = SqliteStorage::open_in_memory().unwrap();
        sqlite.init().unwrap();
        vec![Arc::new(MemoryStorage::new()), Arc::new(sqlite)]
    }

    #[test]
    fn double_join_is_rejected_everywhere() {
        for storage in backends() {
            let registry = LocationRegistry::new(storage);
            assert!(registry.join(&loc("hq"), &user("alice")).unwrap());
            assert!(!registry.join(&loc("hq"), &user("alice")).unwrap());
            assert!(!registry.join(&loc("berlin"), &user("alice")).unwrap());
            assert_eq!(registry.location_of(&user("alice")).unwrap(), Some(loc("hq")));
        }
    }

    #[test]
    fn concurrent_joins_land_in_one_location() {
        for storage in backends() {
            let registry = LocationRegistry::new(storage);
            let alice = user("alice");

            let joined: Vec<(Location, bool)> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..8)
                    .map(|i| {
                        let registry = &registry;
                        let alice = &alice;
                        scope.spawn(move || {
                            let location = loc(&format!("office{i}"));
                            let ok = registry.join(&location, alice).unwrap();
                            (location, ok)
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let winners: Vec<&Location> =
                joined.iter().filter(|(_, ok)| *ok).map(|(l, _)| l).collect();
            assert_eq!(winners.len(), 1);
            assert_eq!(registry.location_of(&alice).unwrap().as_ref(), Some(winners[0]));
        }
    }

    #[test]
    fn membership_survives_leave_and_purge() {
        for storage in backends() {
            let registry = LocationRegistry::new(storage);
            assert!(!registry.is_member(&user("alice")).unwrap());
            registry.join(&loc("hq"), &user("alice")).unwrap();
            registry.leave(&user("alice")).unwrap();
            registry.purge(&[loc("hq")]).unwrap();
            assert!(registry.is_member(&user("alice")).unwrap());
            assert_eq!(registry.location_of(&user("alice")).unwrap(), None);
        }
    }

    #[test]
    fn leave_is_idempotent() {
        for storage in backends() {
            let registry = LocationRegistry::new(storage);
            registry.leave(&user("ghost")).unwrap();
            registry.join(&loc("hq"), &user("alice")).unwrap();
            registry.leave(&user("alice")).unwrap();
            registry.leave(&user("alice")).unwrap();
            assert_eq!(registry.location_of(&user("alice")).unwrap(), None);
            // Free to join again after leaving.
            assert!(registry.join(&loc("berlin"), &user("alice")).unwrap());
        }
    }

    #[test]
    fn purge_only_touches_named_locations() {
        for storage in backends() {
            let registry = LocationRegistry::new(storage);
            registry.join(&loc("hq"), &user("alice")).unwrap();
            registry.join(&loc("berlin"), &user("bob")).unwrap();
            registry.purge(&[loc("hq")]).unwrap();
            assert_eq!(registry.location_of(&user("alice")).unwrap(), None);
            assert_eq!(registry.location_of(&user("bob")).unwrap(), Some(loc("berlin")));
        }
    }
}
