pub mod actions;
pub mod analysis;
pub mod camera;
pub mod db;
pub mod flow;
pub mod haptics;
pub mod orchestrator;
pub mod readiness;
pub mod scheduler;
pub mod settings;
pub mod utils;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use tokio::sync::mpsc;

use actions::ActionCatalog;
use analysis::VisionAnalyzer;
use camera::CameraHub;
use db::Database;
use haptics::HapticDriver;
use orchestrator::{EngineEvent, SessionOrchestrator};
use settings::SettingsStore;

pub struct AppState {
    pub db: Database,
    pub settings: SettingsStore,
    pub catalog: ActionCatalog,
}

impl AppState {
    /// Wire the host's devices into a session orchestrator using the
    /// current settings.
    pub fn orchestrator(
        &self,
        camera: CameraHub,
        analyzer: Arc<dyn VisionAnalyzer>,
        haptics: Arc<dyn HapticDriver>,
    ) -> (SessionOrchestrator, mpsc::UnboundedReceiver<EngineEvent>) {
        SessionOrchestrator::new(
            camera,
            analyzer,
            haptics,
            self.db.clone(),
            self.catalog.clone(),
            self.settings.snapshot(),
        )
    }
}

/// Open settings and the session ledger under `data_dir` and finalize any
/// session that was still running when the process last exited.
pub async fn bootstrap(data_dir: &Path) -> Result<AppState> {
    utils::init_logging();
    info!("breathcam starting up...");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings = SettingsStore::new(data_dir.join("settings.json"))?;
    let database = Database::new(data_dir.join("breathcam.sqlite3"))?;

    for session in database.get_incomplete_sessions().await? {
        warn!(
            "Recovered incomplete session {}; marking as Interrupted",
            session.id
        );
        database
            .mark_session_interrupted(&session.id, Utc::now())
            .await?;
    }

    let catalog = ActionCatalog::builtin().context("built-in action catalog is invalid")?;
    info!("Loaded {} routines", catalog.len());

    Ok(AppState {
        db: database,
        settings,
        catalog,
    })
}
