//! fleetbridge daemon entry point.

use clap::{Parser, Subcommand};
use fleetbridge::config::BridgeConfig;
use fleetbridge::gateway::CommandGateway;
use fleetbridge::health::HealthFlag;
use fleetbridge::liveness::LivenessTracker;
use fleetbridge::observability::{init_logging, logging, LogFormat};
use fleetbridge::protocol::TopicSchema;
use fleetbridge::reconcile::Reconciler;
use fleetbridge::routing::MessageDispatcher;
use fleetbridge::storage::{MemoryStore, Store};
use fleetbridge::transport::mqtt::ConnectionManager;
use fleetbridge::transport::CommandPublisher;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(
    name = "fleetbridge",
    version,
    about = "Resilient MQTT backend core for an embedded device fleet"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "FLEETBRIDGE_CONFIG", default_value = "fleetbridge.toml")]
    config: PathBuf,

    /// Log output format: json, pretty or compact
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    log_format: String,

    /// Log level: ERROR, WARN, INFO, DEBUG or TRACE
    #[arg(long, env = "LOG_LEVEL", default_value = "INFO")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bridge (default)
    Run,
    /// Print the resolved configuration as JSON and exit
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(
        logging::parse_level(&cli.log_level),
        LogFormat::parse(&cli.log_format),
    );

    let config = match BridgeConfig::load_from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %cli.config.display(), error = %e, "failed to load configuration");
            std::process::exit(2);
        }
    };

    match cli.command {
        Some(Command::Config) => {
            let rendered =
                serde_json::to_string_pretty(&config).expect("configuration serializes");
            println!("{rendered}");
        }
        Some(Command::Run) | None => run_bridge(config).await,
    }
}

async fn run_bridge(config: BridgeConfig) {
    let schema = TopicSchema::new(&config.mqtt.namespace);
    let subscriptions = if config.mqtt.subscriptions.is_empty() {
        schema.default_subscriptions()
    } else {
        config.mqtt.subscriptions.clone()
    };

    let (events_tx, events_rx) = mpsc::channel(256);
    let manager = Arc::new(ConnectionManager::new(
        config.mqtt.clone(),
        subscriptions,
        events_tx,
    ));
    let publisher: Arc<dyn CommandPublisher> = manager.clone();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let storage_health = Arc::new(HealthFlag::new("storage"));

    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        publisher.clone(),
        schema.clone(),
        storage_health.clone(),
    ));
    let liveness = Arc::new(LivenessTracker::new(
        store.clone(),
        reconciler,
        storage_health.clone(),
        config.liveness.clone(),
    ));
    let gateway = Arc::new(CommandGateway::new(
        store.clone(),
        publisher,
        schema.clone(),
        storage_health.clone(),
    ));
    let dispatcher = Arc::new(MessageDispatcher::new(
        schema,
        liveness.clone(),
        gateway,
        store,
        storage_health,
    ));

    let dispatch_handle = tokio::spawn(dispatcher.run(events_rx));
    let sweeper = liveness.spawn_sweeper();
    let supervisor = manager.spawn_supervisor();

    // The first attempt happens right away; afterwards the supervisor owns
    // the retry cadence. A dead broker at startup is not fatal.
    manager.connect().await;
    info!(
        broker = %config.mqtt.broker_url,
        namespace = %config.mqtt.namespace,
        "fleetbridge running"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");

    sweeper.abort();
    manager.shutdown().await;
    supervisor.abort();
    dispatch_handle.abort();
    info!("fleetbridge stopped");
}
