use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use erna_core::{Location, UserId};
use erna_storage::Storage;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::shuffle::Shuffle;

/// One randomly formed group; at most `match_size` members.
pub type MatchGroup = Vec<UserId>;

/// Turns waiting lists into groups. Read-only: it never clears a list.
pub struct MatchEngine {
    storage: Arc<dyn Storage>,
    match_size: NonZeroUsize,
    shuffler: Box<dyn Shuffle>,
}

impl MatchEngine {
    pub fn new(
        storage: Arc<dyn Storage>,
        match_size: NonZeroUsize,
        shuffler: Box<dyn Shuffle>,
    ) -> Self {
        Self {
            storage,
            match_size,
            shuffler,
        }
    }

    /// Group the current waiting lists of `locations`.
    ///
    /// Each location is shuffled and chunked on its own; its last group may
    /// be short and is never merged with another location's leftovers.
    /// Groups come out in input-location order. A location listed twice is
    /// matched once; unknown or empty locations contribute nothing.
    #[instrument(skip(self), fields(count = locations.len(), size = self.match_size.get()))]
    pub fn match_locations(&self, locations: &[Location]) -> Result<Vec<MatchGroup>> {
        let mut seen = HashSet::with_capacity(locations.len());
        let unique: Vec<Location> = locations
            .iter()
            .filter(|l| seen.insert(*l))
            .cloned()
            .collect();

        let mut waiting = self.storage.find_users_by_locations(&unique)?;

        let mut groups = Vec::new();
        for location in &unique {
            let Some(mut users) = waiting.remove(location) else {
                debug!(location = %location, "no waiting list");
                continue;
            };
            self.shuffler.shuffle(&mut users);
            let before = groups.len();
            groups.extend(chunk(users, self.match_size));
            info!(location = %location, groups = groups.len() - before, "location matched");
        }
        Ok(groups)
    }
}

/// Split `users` into consecutive runs of `size`, keeping a short tail.
fn chunk(users: Vec<UserId>, size: NonZeroUsize) -> Vec<MatchGroup> {
    users.chunks(size.get()).map(<[UserId]>::to_vec).collect()
}
