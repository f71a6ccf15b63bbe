use std::path::PathBuf;
use std::sync::Arc;

use clap::{Arg, Command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use band_daemon::config::{self, DriverType};
use band_daemon::dispatcher::CommandDispatcher;
use band_daemon::registry::SubscriptionRegistry;
use band_daemon::router::{self, ConnectionTable};
use band_daemon::rpc::RpcSessions;
use band_daemon::server::{self, AppState};
use band_device::{BandDriver, DeviceBridge, MockBandDriver, PhysicalBandDriver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "band_daemon=debug,band_device=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Mudra Band daemon starting...");

    let matches = Command::new("mudra_band_daemon")
        .about("Mudra Band signal multiplexing daemon")
        .arg(
            Arg::new("mock")
                .long("mock")
                .action(clap::ArgAction::SetTrue)
                .help("Use synthesized band telemetry instead of real hardware"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Path to the configuration file (default: ./config.json)"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .value_parser(clap::value_parser!(u16))
                .help("Override the listen port"),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));
    let mut config = config::load_config(&config_path)?;
    if matches.get_flag("mock") {
        config.driver_type = DriverType::Mock;
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.port = *port;
    }
    let config = Arc::new(config);

    // --- Driver + bridge ---
    let driver: Box<dyn BandDriver> = match config.driver_type {
        DriverType::Mock => {
            tracing::info!("using mock band driver");
            Box::new(MockBandDriver::new(config.band.clone())?)
        }
        DriverType::Physical => {
            tracing::info!("using physical band driver at {}", config.band_endpoint);
            Box::new(PhysicalBandDriver::new(config.band_endpoint.clone()))
        }
    };
    let (bridge, events_rx) = DeviceBridge::new(driver, config.device_event_capacity);
    bridge.start().await?;

    // --- Routing core ---
    let registry = Arc::new(SubscriptionRegistry::new());
    let connections = Arc::new(ConnectionTable::new());
    let dispatcher = Arc::new(CommandDispatcher::new(registry.clone(), bridge.clone()));
    let router_handle = tokio::spawn(router::run(
        events_rx,
        registry.clone(),
        connections.clone(),
    ));

    let state = AppState {
        dispatcher,
        connections,
        sessions: Arc::new(RpcSessions::new()),
        bridge: bridge.clone(),
        config: config.clone(),
    };

    let sweeper_handle = tokio::spawn(band_daemon::rpc::run_sweeper(state.clone()));

    // --- Server ---
    let addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let server_handle = tokio::spawn(server::run(state, listener, shutdown_rx));

    // --- Graceful shutdown ---
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, stopping services...");

    let _ = shutdown_tx.send(());
    bridge.stop().await;
    sweeper_handle.abort();
    router_handle.abort();
    if let Ok(result) = server_handle.await {
        result?;
    }
    tracing::info!("Mudra Band daemon stopped gracefully.");

    Ok(())
}
