//! radio-bridge - Main Entry Point
//!
//! Reads telemetry from the serial radio receiver and publishes it to MQTT
//! until SIGINT or SIGTERM, then drains the queue and exits. A second signal
//! during the drain exits immediately.

use clap::{Parser, Subcommand};
use radio_bridge::bridge::{BridgeRunner, RunnerSettings};
use radio_bridge::config::{BridgeConfig, ConfigOverrides};
use radio_bridge::error::BridgeError;
use radio_bridge::observability::{init_default_logging, MetricsCollector};
use radio_bridge::publisher::Publisher;
use radio_bridge::serial::SerialFrameSource;
use radio_bridge::transport::mqtt::{resolve_broker, MqttClient};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Serial radio telemetry to MQTT bridge
#[derive(Parser)]
#[command(name = "radio-bridge")]
#[command(about = "Bridge serial radio telemetry to an MQTT broker")]
#[command(
    after_help = "SIGINT or SIGTERM stops reading and drains queued events to the broker.\n\
                  A second signal during the drain exits immediately; queued events are lost."
)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serial device to read frames from
    #[arg(long, env = "BRIDGE_SERIAL_DEVICE", value_name = "PATH")]
    device: Option<PathBuf>,

    /// MQTT broker host name
    #[arg(long, env = "BRIDGE_MQTT_HOST")]
    mqtt_host: Option<String>,

    /// MQTT broker port
    #[arg(long, env = "BRIDGE_MQTT_PORT")]
    mqtt_port: Option<u16>,

    /// MQTT user name
    #[arg(long, env = "BRIDGE_MQTT_USER")]
    mqtt_user: Option<String>,

    /// MQTT password
    #[arg(long, env = "BRIDGE_MQTT_PASSWORD", hide_env_values = true)]
    mqtt_password: Option<String>,

    /// CA certificate file; enables TLS
    #[arg(long, env = "BRIDGE_MQTT_CA_CERTS", value_name = "FILE")]
    mqtt_ca_certs: Option<PathBuf>,

    /// Events buffered between the serial reader and the publisher
    #[arg(long)]
    queue_capacity: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge (default)
    Run,
    /// Validate configuration
    Config {
        /// Show the merged configuration
        #[arg(long)]
        show: bool,
    },
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            device: self.device.clone(),
            mqtt_host: self.mqtt_host.clone(),
            mqtt_port: self.mqtt_port,
            mqtt_user: self.mqtt_user.clone(),
            mqtt_password: self.mqtt_password.clone(),
            mqtt_ca_certs: self.mqtt_ca_certs.clone(),
            queue_capacity: self.queue_capacity,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting radio-bridge v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            process::exit(1);
        }
    };

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_bridge(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!(error = %e, "Bridge failed");
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(cli: &Cli) -> Result<BridgeConfig, BridgeError> {
    let mut config = match &cli.config {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            BridgeConfig::load_from_file(path)?
        }
        None => BridgeConfig::default(),
    };

    config.apply_overrides(cli.overrides());
    config.validate()?;
    Ok(config)
}

fn handle_config_command(config: &BridgeConfig, show: bool) -> Result<(), BridgeError> {
    info!("Configuration is valid");

    if show {
        let mut shown = config.clone();
        if shown.mqtt.password.is_some() {
            shown.mqtt.password = Some("***".to_string());
        }
        let rendered = toml::to_string_pretty(&shown)
            .map_err(|e| BridgeError::internal(format!("cannot render configuration: {e}")))?;
        println!("{rendered}");
    }
    Ok(())
}

async fn run_bridge(config: BridgeConfig) -> Result<(), BridgeError> {
    info!(
        device = %config.serial.device.display(),
        broker = %config.mqtt.host,
        port = config.mqtt.port,
        queue_capacity = config.pipeline.queue_capacity,
        "Bridge starting"
    );

    // An unresolvable broker will never come back on its own; fail now.
    let addrs = resolve_broker(&config.mqtt.host, config.mqtt.port)
        .await
        .map_err(|e| BridgeError::fatal_startup(e.to_string()))?;
    info!(addresses = ?addrs, "Broker address resolved");

    let metrics = Arc::new(MetricsCollector::new());
    let bridge = build_bridge(&config, metrics.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .map_err(|e| BridgeError::fatal_startup(format!("cannot install SIGINT handler: {e}")))?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(|e| BridgeError::fatal_startup(format!("cannot install SIGTERM handler: {e}")))?;

    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                _ = sigint.recv() => StopSignal::Interrupt,
                _ = sigterm.recv() => StopSignal::Terminate,
            };
            if signal_tx.send(received).is_err() {
                break;
            }
        }
    });
    tokio::spawn(async move {
        if let Some(signal) = escalate_signals(signal_rx, shutdown_tx).await {
            process::exit(signal.exit_code());
        }
    });

    let result = bridge.run(shutdown_rx).await;

    let snapshot = metrics.snapshot();
    match serde_json::to_string(&snapshot) {
        Ok(json) => info!(metrics = %json, "Final bridge metrics"),
        Err(e) => error!(error = %e, "Failed to serialize final metrics"),
    }

    let summary = result?;
    info!(
        reason = ?summary.stop_reason,
        published = summary.publish.published,
        "Bridge finished"
    );
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopSignal {
    Interrupt,
    Terminate,
}

impl StopSignal {
    fn name(self) -> &'static str {
        match self {
            StopSignal::Interrupt => "SIGINT",
            StopSignal::Terminate => "SIGTERM",
        }
    }

    /// Conventional 128 + signal number
    fn exit_code(self) -> i32 {
        match self {
            StopSignal::Interrupt => 130,
            StopSignal::Terminate => 143,
        }
    }
}

/// First signal requests a graceful drain; returns the second one, if any
async fn escalate_signals(
    mut signals: mpsc::UnboundedReceiver<StopSignal>,
    shutdown_tx: watch::Sender<bool>,
) -> Option<StopSignal> {
    let first = signals.recv().await?;
    info!(
        signal = first.name(),
        "Draining and shutting down, signal again to exit immediately"
    );
    let _ = shutdown_tx.send(true);

    let second = signals.recv().await?;
    warn!(
        signal = second.name(),
        "Second signal during drain, exiting without flushing the queue"
    );
    Some(second)
}

/// Wire the serial source, MQTT client and publisher into a runner
fn build_bridge(
    config: &BridgeConfig,
    metrics: Arc<MetricsCollector>,
) -> BridgeRunner<SerialFrameSource, MqttClient> {
    let source = SerialFrameSource::new(&config.serial, metrics.clone());
    let transport = MqttClient::new(config.mqtt.clone());
    let publisher = Publisher::from_config(transport, config, metrics.clone());

    BridgeRunner::new(
        source,
        publisher,
        RunnerSettings::from_config(config),
        metrics,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_signal_requests_drain() {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let escalation = tokio::spawn(escalate_signals(signal_rx, shutdown_tx));

        signal_tx.send(StopSignal::Terminate).unwrap();
        shutdown_rx.changed().await.unwrap();
        assert!(*shutdown_rx.borrow());

        // Without a second signal the drain runs to completion.
        drop(signal_tx);
        assert_eq!(escalation.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_second_signal_forces_exit() {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        signal_tx.send(StopSignal::Terminate).unwrap();
        signal_tx.send(StopSignal::Interrupt).unwrap();

        let second = escalate_signals(signal_rx, shutdown_tx).await;
        assert_eq!(second, Some(StopSignal::Interrupt));
        assert!(*shutdown_rx.borrow());
        assert_eq!(StopSignal::Interrupt.exit_code(), 130);
        assert_eq!(StopSignal::Terminate.exit_code(), 143);
    }

    #[test]
    fn test_help_mentions_forced_exit() {
        use clap::CommandFactory;
        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains("A second signal during the drain exits immediately"));
    }
}
