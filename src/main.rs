use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use botkeeper_core::AppConfig;

mod app;
mod bots;
mod shutdown;

use app::Application;
use shutdown::ShutdownManager;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("botkeeper")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Self-hosted control plane for periodic background bots")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config/botkeeper.toml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .default_value("info"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("Log output format")
                .value_parser(["json", "pretty"])
                .default_value("pretty"),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config/botkeeper.toml");
    let log_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");
    let log_format = matches
        .get_one::<String>("log-format")
        .map(String::as_str)
        .unwrap_or("pretty");

    init_logging(log_level, log_format)?;

    info!("Starting botkeeper");
    info!("Configuration file: {config_path}");

    let config = AppConfig::load(Some(config_path))
        .with_context(|| format!("failed to load configuration from {config_path}"))?;

    let shutdown = ShutdownManager::new();
    let app = Application::new(config, shutdown.root_token())
        .await
        .context("failed to build the application")?;

    let app_handle = tokio::spawn(async move {
        if let Err(e) = app.run().await {
            error!("Application failed: {e}");
        }
    });

    shutdown.wait_for_signal().await;
    info!("Shutting down...");
    shutdown.trigger();

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Err(e)) => error!("Application task failed during shutdown: {e}"),
        Ok(Ok(())) => info!("Botkeeper stopped"),
        Err(_) => warn!("Shutdown timed out, exiting anyway"),
    }

    Ok(())
}

fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("failed to initialize json logging")?,
        _ => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("failed to initialize pretty logging")?,
    }

    Ok(())
}
