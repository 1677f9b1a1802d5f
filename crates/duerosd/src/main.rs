use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use duerosd::Config;
use duerosd::Engine;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Home-automation daemon for DuerOS smart-home appliances
#[derive(Parser, Debug)]
#[command(name = "duerosd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "duerosd.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon (default)
    Run,
    /// Check the configuration and the credentials of every DuerOS entry, then exit
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets())
        .init();

    tracing::info!("Loaded config from: {}", cli.config.display());

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Validate => validate(&config).await,
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("duerosd {} starting", env!("CARGO_PKG_VERSION"));

    let mut engine = Engine::new();
    engine.register_integrations_from_config(&config);
    let engine = Arc::new(engine);

    let engine_task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run().await }
    });

    let api = config.api.clone().map(|api| {
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let engine = engine.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = duerosd::api::serve(api.listen, api.port, engine, shutdown_rx).await {
                tracing::error!("HTTP API server failed: {}", e);
            }
        });
        (shutdown_tx, task)
    });

    tracing::info!("Press Ctrl+C to exit");
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }

    if let Some((shutdown_tx, task)) = api {
        let _ = shutdown_tx.send(());
        if let Err(e) = task.await {
            tracing::warn!("HTTP API task ended abnormally: {}", e);
        }
    }
    engine_task.abort();

    tracing::info!("duerosd shutdown complete");
    Ok(())
}

#[cfg(feature = "integration_dueros")]
async fn validate(config: &Config) -> anyhow::Result<()> {
    duerosd::validate_entries(config).await?;
    tracing::info!("Configuration is valid");
    Ok(())
}

#[cfg(not(feature = "integration_dueros"))]
async fn validate(_config: &Config) -> anyhow::Result<()> {
    tracing::info!("Configuration is valid");
    Ok(())
}
