//! `erna-matching`: waiting lists and the random grouping that drains them.
//!
//! [`LocationRegistry`] records who is waiting where; [`MatchEngine`]
//! shuffles each location's waiting list and cuts it into groups. The
//! engine never clears anything; callers purge through the registry once
//! they have delivered the groups.

pub mod engine;
pub mod error;
pub mod registry;
pub mod shuffle;

pub use engine::{MatchEngine, MatchGroup};
pub use error::{MatchError, Result};
pub use registry::LocationRegistry;
pub use shuffle::{IdentityShuffle, RandomShuffle, SeededShuffle, Shuffle};
