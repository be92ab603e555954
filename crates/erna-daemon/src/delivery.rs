use erna_scheduler::{RoundOutcome, RoundReport};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Drain fired rounds and announce each one until the engine drops its sender.
pub async fn run(mut fired_rx: mpsc::Receiver<RoundReport>) {
    while let Some(report) = fired_rx.recv().await {
        announce(&report);
    }
    info!("delivery task finished");
}

/// Write the groups of one round to the log.
pub fn announce(report: &RoundReport) {
    match &report.outcome {
        RoundOutcome::Idle => {}
        RoundOutcome::Skipped => {
            warn!(at = %report.at, locations = %join(&report.locations), "round skipped");
        }
        RoundOutcome::Matched { groups } if groups.is_empty() => {
            info!(at = %report.at, locations = %join(&report.locations), "nobody waiting");
        }
        RoundOutcome::Matched { groups } => {
            for (n, group) in groups.iter().enumerate() {
                info!(at = %report.at, group = n + 1, members = %join(group), "group formed");
            }
        }
    }
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
