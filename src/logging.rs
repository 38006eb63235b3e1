//! Tracing setup: stdout plus the configured log file, with per-component
//! level overrides from `[logging.components]`.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::Result;

/// Modules accepting a level override.
pub const COMPONENTS: &[&str] = &[
    "api", "article", "bus", "db", "delivery", "feed", "fetcher", "pipeline", "schedule",
];

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// `feedrelay::<component>=<level>`.
fn component_directive(component: &str, level: &str) -> Option<Directive> {
    let level = parse_level(level).as_str().to_lowercase();
    format!("feedrelay::{component}={level}").parse().ok()
}

/// `RUST_LOG`, then the base level, then the component overrides.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env().add_directive(parse_level(&config.level).into());
    // sqlx logs every statement at info
    if let Ok(quiet) = "sqlx=warn".parse() {
        filter = filter.add_directive(quiet);
    }
    for (component, level) in &config.components {
        if let Some(directive) = component_directive(component, level) {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Log to stdout and `config.file`. An empty `file` means console only.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if config.file.is_empty() {
        init_console_only(config);
        return Ok(());
    }

    if let Some(parent) = Path::new(&config.file).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let log_file = Arc::new(File::create(&config.file)?);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout.and(log_file))
                .with_ansi(false)
                .with_target(true),
        )
        .with(build_filter(config))
        .init();

    Ok(())
}

/// Log to stdout only. Used when the log file cannot be created.
pub fn init_console_only(config: &LoggingConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(true),
        )
        .with(build_filter(config))
        .init();
}
