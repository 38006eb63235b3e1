use std::process::ExitCode;

use tokio::sync::watch;
use tracing::{error, info};

use feedrelay::api::{ApiServer, AppState};
use feedrelay::{Collaborators, Config, Database, Pipeline};

#[tokio::main]
async fn main() -> ExitCode {
    let path = std::env::var("FEEDRELAY_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = match Config::load_with_env(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    if let Err(e) = feedrelay::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        feedrelay::logging::init_console_only(&config.logging);
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("feedrelay stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> feedrelay::Result<()> {
    info!("feedrelay {}", env!("CARGO_PKG_VERSION"));

    let db = Database::open(&config.database.path).await?;
    let collaborators = Collaborators::from_config(&config)?;
    let pipeline = Pipeline::new(&config, db, collaborators)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let api = if config.api.enabled {
        let server = ApiServer::new(&config.api, AppState::from_pipeline(&pipeline))?;
        let shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move { server.run(shutdown).await }))
    } else {
        None
    };

    let runner = pipeline.clone();
    let pipeline_task = tokio::spawn(async move { runner.run(shutdown_rx).await });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
    let _ = shutdown_tx.send(true);

    if let Some(api) = api {
        match api.await {
            Ok(result) => result?,
            Err(e) => error!("API task panicked: {}", e),
        }
    }
    match pipeline_task.await {
        Ok(result) => result?,
        Err(e) => error!("Pipeline task panicked: {}", e),
    }
    Ok(())
}
