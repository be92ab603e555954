use erna_core::{Location, Timestamp};
use erna_matching::MatchGroup;
use serde::{Deserialize, Serialize};

/// What a round did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundOutcome {
    /// No scheduled event and not a recurring slot.
    Idle,
    /// Due locations existed but the day is skipped. Waiting lists are kept.
    Skipped,
    /// Groups in location order; the listed locations were purged.
    Matched { groups: Vec<MatchGroup> },
}

/// Result of firing one minute, forwarded to the delivery side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReport {
    pub at: Timestamp,
    /// Locations that had a scheduled event at `at` (consumed either way).
    pub scheduled: Vec<Location>,
    /// Every location the round covered: scheduled first, then recurring.
    pub locations: Vec<Location>,
    pub outcome: RoundOutcome,
}

impl RoundReport {
    pub fn is_idle(&self) -> bool {
        matches!(self.outcome, RoundOutcome::Idle)
    }

    pub fn group_count(&self) -> usize {
        match &self.outcome {
            RoundOutcome::Matched { groups } => groups.len(),
            _ => 0,
        }
    }
}
