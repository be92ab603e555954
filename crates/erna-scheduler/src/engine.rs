use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use erna_core::Timestamp;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::round::MatchRound;
use crate::types::RoundReport;

/// Longest gap the engine will replay after a stall, in minutes.
pub const MAX_CATCH_UP_MINUTES: i64 = 60;

/// Drives [`MatchRound`]s off a Tokio interval, once per wall-clock minute.
pub struct TriggerEngine {
    round: Arc<MatchRound>,
    poll: Duration,
    /// If set, every non-idle report is sent here for delivery.
    fired_tx: Option<mpsc::Sender<RoundReport>>,
    last_fired: Option<Timestamp>,
}

impl TriggerEngine {
    /// `poll` must be shorter than a minute or minutes will be replayed late.
    ///
    /// The sender is non-blocking (`try_send`); a full channel drops the
    /// report with a warning instead of stalling the loop.
    pub fn new(
        round: Arc<MatchRound>,
        poll: Duration,
        fired_tx: Option<mpsc::Sender<RoundReport>>,
    ) -> Self {
        Self {
            round,
            poll,
            fired_tx,
            last_fired: None,
        }
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// Returns `Err` only for fatal storage errors; anything else is logged
    /// and the loop carries on with the next minute.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(poll_secs = self.poll.as_secs(), "trigger engine started");
        if let Some(next) = self.round.next_recurring_round(chrono::Utc::now()) {
            info!(next = %next.to_rfc3339(), "next recurring round");
        }

        let mut interval = tokio::time::interval(self.poll);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick_at(&Timestamp::now()) {
                        if e.is_fatal() {
                            error!("trigger engine stopping: {e}");
                            return Err(e);
                        }
                        error!("trigger tick error: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("trigger engine shutting down");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Fire every minute after the last fired one, up to and including `now`.
    ///
    /// The first call fires only `now`. A minute is marked fired before its
    /// round runs, so a failed round is not retried.
    pub fn tick_at(&mut self, now: &Timestamp) -> Result<Vec<RoundReport>> {
        let mut reports = Vec::new();
        for minute in self.pending_minutes(now) {
            self.last_fired = Some(minute.clone());
            let report = self.round.fire(&minute)?;
            if !report.is_idle() {
                self.forward(&report);
                reports.push(report);
            }
        }
        Ok(reports)
    }

    fn pending_minutes(&self, now: &Timestamp) -> Vec<Timestamp> {
        let Some(last) = &self.last_fired else {
            return vec![now.clone()];
        };
        if now <= last {
            return Vec::new();
        }

        let end = now.to_datetime();
        let earliest = end - ChronoDuration::minutes(MAX_CATCH_UP_MINUTES - 1);
        let mut cursor = last.to_datetime() + ChronoDuration::minutes(1);
        if cursor < earliest {
            warn!(from = %last, to = %now, "trigger stalled; older minutes dropped");
            cursor = earliest;
        }

        let mut minutes = Vec::new();
        while cursor <= end {
            // Every minute between two valid timestamps is itself valid.
            if let Ok(minute) = Timestamp::from_datetime(cursor) {
                minutes.push(minute);
            }
            cursor += ChronoDuration::minutes(1);
        }
        minutes
    }

    fn forward(&self, report: &RoundReport) {
        if let Some(tx) = &self.fired_tx {
            if let Err(e) = tx.try_send(report.clone()) {
                warn!(at = %report.at, "round report not delivered: {e}");
            }
        }
    }
}
