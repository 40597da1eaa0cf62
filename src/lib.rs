pub mod cli;
pub mod clock;
pub mod db;
pub mod error;
pub mod monitors;
pub mod settings;
pub mod timer;
pub mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use clock::SystemClock;
use db::Database;
use settings::SettingsStore;
use timer::TimerController;

pub use error::{TrackerError, TrackerResult};

/// Everything the presentation layer talks to, built once in `run`.
pub struct AppState {
    pub db: Database,
    pub timer: TimerController,
    pub settings: SettingsStore,
}

impl AppState {
    /// Open (or create) the store under `data_dir` and resume any slot left running.
    pub async fn open(data_dir: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db = Database::new(data_dir.join("time_tracking.db"))?;
        let timer = TimerController::new(db.clone(), Arc::new(SystemClock));
        let settings = SettingsStore::new(data_dir.join("settings.json"))?;

        if let Some(slot) = timer
            .recover_from_store()
            .await
            .context("failed to load the active time slot")?
        {
            info!(
                "Resuming time slot {} ('{}') left running since {}",
                slot.id, slot.task_name, slot.start_time
            );
        }

        Ok(Self {
            db,
            timer,
            settings,
        })
    }
}

pub async fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    utils::logging::init_logging(cli.verbose);

    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => cli::default_data_dir()?,
    };
    info!("Light Tracking using {}", data_dir.display());

    let state = AppState::open(&data_dir).await?;
    cli::dispatch(&state, cli).await
}
