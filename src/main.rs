//! Motion Notify CLI
//!
//! Windowed motion classification with debounced notifications.

use anyhow::Context;
use clap::{Parser, Subcommand};
use motion_notify::{
    config::Config,
    core::{DenseModel, Model, NotificationEvent},
    hub::BroadcastHub,
    notifier::{HttpDispatcher, LocalDispatcher},
    pipeline::Pipeline,
    server,
    source::InfluxWindowSource,
    VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "motion-notify")]
#[command(version = VERSION)]
#[command(about = "Windowed motion classification with debounced notifications", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the inference pipeline
    Run {
        /// Serve the broadcast hub from this process instead of posting to a remote one
        #[arg(long)]
        with_hub: bool,
    },

    /// Start only the broadcast hub
    Hub {
        /// Listen address (overrides the configuration)
        #[arg(long)]
        listen: Option<String>,
    },

    /// Send one event to the hub and report the outcome
    Notify {
        /// Event payload
        #[arg(default_value = "Move!")]
        message: String,
    },

    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { with_hub } => cmd_run(cli.config, with_hub).await,
        Commands::Hub { listen } => cmd_hub(cli.config, listen).await,
        Commands::Notify { message } => cmd_notify(cli.config, message).await,
        Commands::Config => cmd_config(cli.config),
    };

    if let Err(e) = result {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn cmd_run(config_path: Option<PathBuf>, with_hub: bool) -> anyhow::Result<()> {
    tracing::info!("Motion Notify v{VERSION} starting up");

    let config = load_config(config_path)?;

    let model = DenseModel::load(&config.model.path)
        .with_context(|| format!("Could not load model from {:?}", config.model.path))?;
    tracing::info!(
        "Model loaded: {} inputs, labels {:?}",
        model.input_len(),
        model.labels()
    );

    let source = InfluxWindowSource::new(config.source.clone())?;
    match source.test_connection().await {
        Ok(true) => tracing::info!("Window source reachable at {}", config.source.url),
        Ok(false) => tracing::warn!("Window source at {} failed its ping", config.source.url),
        Err(e) => tracing::warn!("{}; will keep retrying", e),
    }

    let shutdown = shutdown_signal()?;

    if with_hub {
        let hub = Arc::new(BroadcastHub::new(config.hub.send_timeout));
        let server = server::run(&config.hub, hub.clone())
            .await
            .with_context(|| format!("Could not bind hub on {}", config.hub.listen_addr))?;

        let dispatcher = Arc::new(LocalDispatcher::new(hub, config.notifier.timeout));
        let result = match Pipeline::new(source, model, dispatcher, &config) {
            Ok(pipeline) => pipeline.run(shutdown).await.map(|_| ()),
            Err(e) => Err(e),
        };

        server.shutdown().await;
        result?;
    } else {
        let dispatcher = Arc::new(HttpDispatcher::new(&config.notifier)?);
        match dispatcher.test_connection().await {
            Ok(true) => tracing::info!("Hub reachable at {}", config.notifier.hub_url),
            Ok(false) => tracing::warn!(
                "Hub at {} failed its health check",
                config.notifier.hub_url
            ),
            Err(e) => tracing::warn!("{}; notifications will be dropped until it is up", e),
        }

        Pipeline::new(source, model, dispatcher, &config)?
            .run(shutdown)
            .await?;
    }

    tracing::info!("Stopped");
    Ok(())
}

async fn cmd_hub(config_path: Option<PathBuf>, listen: Option<String>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(listen) = listen {
        config.hub.listen_addr = listen;
    }

    let mut shutdown = shutdown_signal()?;

    let hub = Arc::new(BroadcastHub::new(config.hub.send_timeout));
    let server = server::run(&config.hub, hub)
        .await
        .with_context(|| format!("Could not bind hub on {}", config.hub.listen_addr))?;

    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }

    server.shutdown().await;
    tracing::info!("Stopped");
    Ok(())
}

async fn cmd_notify(config_path: Option<PathBuf>, message: String) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let dispatcher = HttpDispatcher::new(&config.notifier)?;

    dispatcher
        .send(&NotificationEvent::new(message))
        .await
        .with_context(|| format!("Could not notify {}", dispatcher.notify_url()))?;

    println!("Notification delivered to {}", dispatcher.notify_url());
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(Config::config_path);
    let config = Config::load_from(&path)?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {path:?}");
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let path = path.unwrap_or_else(Config::config_path);
    let config = Config::load_from(&path)
        .with_context(|| format!("Could not load configuration from {path:?}"))?;
    config.validate()?;
    Ok(config)
}

/// Set up a Ctrl+C / SIGTERM handler feeding a shutdown channel.
fn shutdown_signal() -> anyhow::Result<watch::Receiver<bool>> {
    let (tx, rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        tracing::info!("Shutting down...");
        let _ = tx.send(true);
    })
    .context("Error setting Ctrl+C handler")?;
    Ok(rx)
}
