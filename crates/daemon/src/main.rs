//! Logon broker daemon
//!
//! Serves the credential-entry component over a local IPC endpoint.

use clap::Parser;
use logonbroker_daemon::builtin::SessionLogPlugin;
use logonbroker_daemon::environment::DetachedEnvironment;
use logonbroker_daemon::{BrokerState, DaemonConfig, PluginRegistry, Service};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "logonbrokerd")]
#[command(about = "Logon broker daemon - plugin pipeline and session cache for the logon stack")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "logonbroker.toml")]
    config: PathBuf,

    /// IPC endpoint name
    #[arg(short, long)]
    pipe_name: Option<String>,

    /// Unix socket path
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Maximum concurrent clients
    #[arg(long)]
    max_clients: Option<usize>,

    /// Log the type of every received message
    #[arg(long)]
    trace_traffic: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("Logon broker daemon v{}", logonbroker_common::VERSION);

    let mut config = DaemonConfig::load(&cli.config)?;
    if let Some(pipe_name) = cli.pipe_name {
        config.ipc.pipe_name = pipe_name;
    }
    if let Some(socket) = cli.socket {
        config.ipc.socket_path = Some(socket);
    }
    if let Some(max_clients) = cli.max_clients {
        config.ipc.max_clients = max_clients;
    }
    if cli.trace_traffic {
        config.trace_message_traffic = true;
    }
    config.validate()?;

    let mut registry = PluginRegistry::new();
    registry.register_notify(Arc::new(SessionLogPlugin));
    registry.apply_order(&config.plugins.order);

    let state = BrokerState::new(config, registry, Arc::new(DetachedEnvironment));
    let mut service = Service::new(state);
    service.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    service.stop().await?;
    info!("Daemon shutdown complete");
    Ok(())
}
