use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod constants;
mod database;
mod detection;
mod exif_parser;
mod html_template;
mod image_processing;
mod location;
mod pagination;
mod processing;
mod server;
mod settings;

use database::Database;
use detection::CommandDetector;
use processing::UploadProcessor;
use server::{start_server, AppState};
use settings::Settings;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("nurdlemap=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    tracing::info!("NurdleMap v{} starting", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;

    if std::env::args().any(|arg| arg == "--init-config") {
        settings.save()?;
        tracing::info!("Wrote configuration to {}", Settings::config_path().display());
        return Ok(());
    }

    let db = Database::open(&settings.database_path)
        .with_context(|| "Failed to initialize database")?;
    tracing::info!(
        "Database {} holds {} processed images",
        settings.database_path.display(),
        db.count()?
    );

    let detector = CommandDetector::new(&settings.detector_command, settings.max_detections)?;
    tracing::info!(
        "Detector: {} (categories: {})",
        detector.command_line(),
        settings.categories.to_config_string()
    );

    let processor = UploadProcessor::new(
        db.clone(),
        Arc::new(detector),
        settings.categories.clone(),
        settings.upload_dir.clone(),
        settings.result_dir.clone(),
    );
    processor.ensure_directories()?;

    let app_state = AppState {
        db,
        processor: Arc::new(processor),
        settings: Arc::new(settings),
    };

    start_server(app_state).await?;

    Ok(())
}
