use std::path::PathBuf;

use anyhow::{Context as _, anyhow};
use clap::{Parser, Subcommand};
use log::{error, info};
use tokio::sync::mpsc;

mod beacon;
mod config;
mod manager;
mod messages;
mod mqtt;
mod notifier;
mod replay;

#[derive(Parser, Debug)]
#[command(version, about = "Shows how close a monitored beacon is")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Receive location events from MQTT and publish display updates back
    Mqtt,
    /// Read location events as JSON lines and print presenter commands
    Replay {
        /// Input file; stdin when omitted or `-`
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let args = Args::parse();
    let config = config::AppConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let identity = config.beacon.identity()?;

    match args.command {
        Command::Replay { input } => replay::run(identity, input.as_deref()).await,
        Command::Mqtt => {
            let mqtt_config = config
                .mqtt
                .ok_or_else(|| anyhow!("the mqtt command needs an [mqtt] config section"))?;
            run_mqtt(identity, &mqtt_config).await
        }
    }
}

async fn run_mqtt(
    identity: beacon::BeaconIdentity,
    mqtt_config: &config::MqttConfig,
) -> anyhow::Result<()> {
    info!("Watching beacon {}", identity);

    let (mqtt_client, mut eventloop) = mqtt::MqttClient::new(mqtt_config);
    mqtt_client.subscribe().await?;

    let (event_tx, event_rx) = mpsc::channel(16);
    let (command_tx, command_rx) = mpsc::channel(16);

    let listener = mqtt_client.clone();
    tokio::spawn(async move { listener.event_loop(&mut eventloop, event_tx).await });

    let presenter = mqtt_client.clone();
    let presenter_handle = tokio::spawn(async move { presenter.presenter_loop(command_rx).await });

    let core = manager::Manager::new(identity, event_rx, command_tx);
    tokio::select! {
        result = core.run_loop() => {
            if let Err(err) = result {
                error!("Session stopped: {}", err);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    // The session's sender is gone by now, so the presenter drains and exits.
    if let Err(err) = presenter_handle.await {
        error!("Presenter task failed: {:?}", err);
    }
    info!("Exiting manager event loop");

    mqtt_client.disconnect().await?;

    Ok(())
}
