use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use erna_core::config::{ErnaConfig, StorageBackend};
use erna_core::Timestamp;
use erna_matching::RandomShuffle;
use erna_scheduler::{MatchRound, RoundReport, TriggerEngine};
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

mod cli;
mod delivery;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "erna=info,erna_scheduler=info,erna_matching=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // explicit flag > ERNA_CONFIG env > ~/.erna/erna.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("ERNA_CONFIG").ok());
    let config = load_config(config_path.as_deref())?;

    if config.database.backend == StorageBackend::Sqlite {
        ensure_parent_dir(&config.database.path);
    }
    let storage = erna_storage::open(&config.database).context("opening storage")?;
    let round = Arc::new(MatchRound::from_config(
        storage,
        &config.matching,
        Box::new(RandomShuffle),
    )?);

    match cli.cmd {
        Commands::Run => run(round, &config).await?,
        Commands::Join { location, user } => {
            let joined = round.registry().join(&location, &user)?;
            print(&json!({ "location": location, "user": user, "joined": joined }))?;
        }
        Commands::Leave { user } => {
            let previous = round.registry().location_of(&user)?;
            round.registry().leave(&user)?;
            print(&json!({ "user": user, "left": previous }))?;
        }
        Commands::Where { user } => {
            let location = round.registry().location_of(&user)?;
            print(&json!({ "user": user, "location": location }))?;
        }
        Commands::Schedule {
            location,
            datetime,
            user,
            title,
        } => {
            let record = round
                .schedule()
                .create_event(&user, &location, &datetime, &title)?;
            print(&record)?;
        }
        Commands::Next { location } => {
            let scheduled = round.schedule().next_due(&location)?;
            let recurring = round
                .next_recurring(&location, chrono::Utc::now())
                .and_then(|dt| Timestamp::from_datetime(dt).ok());
            print(&json!({ "location": location, "scheduled": scheduled, "recurring": recurring }))?;
        }
        Commands::Skip { date, user } => {
            let record = round.skips().create_skip(&user, &date)?;
            print(&record)?;
        }
        Commands::List => {
            let schedules = round.schedule().list_all()?;
            let skips = round.skips().list_skips()?;
            print(&json!({ "schedules": schedules, "skips": skips }))?;
        }
        Commands::Fire { at } => {
            let at = at.unwrap_or_else(Timestamp::now);
            let report: RoundReport = round.fire(&at)?;
            delivery::announce(&report);
            print(&report)?;
        }
    }
    Ok(())
}

/// Drive the trigger loop until Ctrl-C or a fatal storage error.
async fn run(round: Arc<MatchRound>, config: &ErnaConfig) -> anyhow::Result<()> {
    // Fired-round channel: TriggerEngine -> delivery task
    let (fired_tx, fired_rx) = tokio::sync::mpsc::channel::<RoundReport>(64);
    let delivery = tokio::spawn(delivery::run(fired_rx));

    let engine = TriggerEngine::new(
        round,
        Duration::from_secs(config.trigger.poll_secs),
        Some(fired_tx),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_task = tokio::spawn(engine.run(shutdown_rx));
    info!(
        day = ?config.matching.day,
        time = %config.matching.time,
        zones = config.matching.locations.len(),
        "erna running"
    );

    supervise(engine_task, delivery, shutdown_tx, tokio::signal::ctrl_c()).await
}

/// Wait for the engine to stop on its own or for `stop`, then let the
/// delivery task drain before reporting how the engine ended.
async fn supervise(
    mut engine_task: JoinHandle<erna_scheduler::Result<()>>,
    delivery: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    stop: impl Future<Output = std::io::Result<()>>,
) -> anyhow::Result<()> {
    let finished = tokio::select! {
        // The engine only returns on its own when the store is gone.
        finished = &mut engine_task => finished,
        signal = stop => {
            signal.context("listening for Ctrl-C")?;
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
            engine_task.await
        }
    };

    // The engine dropped its sender, so the delivery task drains and exits.
    delivery.await.context("delivery task panicked")?;
    finished.context("trigger engine panicked")??;
    Ok(())
}

/// A missing file means defaults; anything unreadable or invalid is fatal.
fn load_config(path: Option<&str>) -> anyhow::Result<ErnaConfig> {
    ErnaConfig::load(path).context("loading config")
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
