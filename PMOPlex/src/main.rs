use pmoconfig::Config;
use pmoplex::{LibraryService, PlexConfigExt, RefreshScheduler};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Console logging; `RUST_LOG` wins over `host.logger.min_level`
fn init_logging(config: &Config) {
    let level = config
        .get_log_min_level()
        .unwrap_or_else(|_| "info".to_string());

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // optional config directory as first argument
    let config_dir = std::env::args().nth(1).unwrap_or_default();
    let config = Config::load_config(&config_dir)?;
    init_logging(&config);

    info!("Starting PMOPlex {}", env!("CARGO_PKG_VERSION"));
    info!("Config directory: {}", config.dir().display());
    info!("Plex server: {}", config.get_plex_url()?);

    let service = Arc::new(LibraryService::from_config(&config)?);

    if service.warm_start() {
        info!("Serving persisted library data until the first refresh");
    }

    if let Some(file) = service.store().snapshot_file() {
        info!("Library data file: {}", file.path().display());
    }

    let scheduler = RefreshScheduler::from_config(service.clone(), &config)?;
    info!("Refreshing libraries every {:?}", scheduler.interval());
    let refresh = scheduler.spawn();

    info!("PMOPlex is ready!");
    info!("Press Ctrl+C to stop...");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
    }

    refresh.abort();
    info!("PMOPlex stopped");
    Ok(())
}
