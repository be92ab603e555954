use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use erna_core::config::{MatchingConfig, ZoneLocations};
use erna_core::{Location, Timestamp};
use erna_ledger::{ScheduleLedger, SkipLedger};
use erna_matching::{LocationRegistry, MatchEngine, Shuffle};
use erna_storage::Storage;
use tracing::{info, instrument};

use crate::calendar::MatchCalendar;
use crate::error::{Result, TriggerError};
use crate::types::{RoundOutcome, RoundReport};

/// Everything one firing needs, sharing a single store.
pub struct MatchRound {
    registry: LocationRegistry,
    engine: MatchEngine,
    schedule: ScheduleLedger,
    skips: SkipLedger,
    calendar: MatchCalendar,
    recurring: Vec<ZoneLocations>,
}

impl MatchRound {
    pub fn new(
        registry: LocationRegistry,
        engine: MatchEngine,
        schedule: ScheduleLedger,
        skips: SkipLedger,
        calendar: MatchCalendar,
        recurring: Vec<ZoneLocations>,
    ) -> Self {
        Self {
            registry,
            engine,
            schedule,
            skips,
            calendar,
            recurring,
        }
    }

    /// Wire every component onto `storage` from the `[matching]` section.
    ///
    /// Opening the schedule ledger prunes events already in the past.
    pub fn from_config(
        storage: Arc<dyn Storage>,
        config: &MatchingConfig,
        shuffler: Box<dyn Shuffle>,
    ) -> Result<Self> {
        let size = NonZeroUsize::new(config.size)
            .ok_or_else(|| TriggerError::Config("matching.size must be at least 1".to_string()))?;
        Ok(Self::new(
            LocationRegistry::new(Arc::clone(&storage)),
            MatchEngine::new(Arc::clone(&storage), size, shuffler),
            ScheduleLedger::open(Arc::clone(&storage))?,
            SkipLedger::new(storage),
            MatchCalendar::from_config(config),
            config.locations.clone(),
        ))
    }

    pub fn registry(&self) -> &LocationRegistry {
        &self.registry
    }

    pub fn schedule(&self) -> &ScheduleLedger {
        &self.schedule
    }

    pub fn skips(&self) -> &SkipLedger {
        &self.skips
    }

    /// Next recurring round covering `location`, if it is a recurring location.
    pub fn next_recurring(
        &self,
        location: &Location,
        after: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let zone = self
            .recurring
            .iter()
            .find(|zone| zone.locations.contains(location))?;
        self.calendar.next_slot(after, zone.tz)
    }

    /// Next recurring round in any zone.
    pub fn next_recurring_round(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.recurring
            .iter()
            .filter_map(|zone| self.calendar.next_slot(after, zone.tz))
            .min()
    }

    /// Run the round for the minute `at`.
    ///
    /// Scheduled events at `at` are consumed even when the day is skipped,
    /// so each fires at most once.
    #[instrument(skip(self), fields(at = %at))]
    pub fn fire(&self, at: &Timestamp) -> Result<RoundReport> {
        let scheduled = self.schedule.consume_due(at)?;

        let mut locations = scheduled.clone();
        for zone in &self.recurring {
            if !self.calendar.is_match_slot(at.to_datetime(), zone.tz) {
                continue;
            }
            for location in &zone.locations {
                if !locations.contains(location) {
                    locations.push(location.clone());
                }
            }
        }

        let outcome = if locations.is_empty() {
            RoundOutcome::Idle
        } else if self.skips.is_skipped(at)? {
            info!(count = locations.len(), "round skipped");
            RoundOutcome::Skipped
        } else {
            let groups = self.engine.match_locations(&locations)?;
            self.registry.purge(&locations)?;
            info!(count = locations.len(), groups = groups.len(), "round matched");
            RoundOutcome::Matched { groups }
        };

        Ok(RoundReport {
            at: at.clone(),
            scheduled,
            locations,
            outcome,
        })
    }
}
