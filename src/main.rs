//! livewire - command line client for the live-updates channel

use clap::{Parser, Subcommand};
use livewire::observability::{init_default_logging, lifecycle_span, DiagnosticsServer};
use livewire::{
    Callback, ClientConfig, ConnectionManager, ConnectionState, Disposer, LiveError, LiveResult,
    ManagerOptions, PushMessage, TokioScheduler, WebSocketTransport,
};
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn, Instrument};

/// Auto-reconnecting live-updates channel client
#[derive(Parser)]
#[command(name = "livewire")]
#[command(about = "Auto-reconnecting live-updates channel client")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "LIVEWIRE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print delivered messages as JSON lines
    Run {
        /// Only print messages of this type; repeatable
        #[arg(long = "type", value_name = "TYPE")]
        types: Vec<String>,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Print the channel URL derived from the configuration
    Endpoint,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting livewire v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { types } => {
            run_client(config, types)
                .instrument(lifecycle_span!(phase = "run"))
                .await
        }
        Commands::Config { show } => handle_config_command(config, show),
        Commands::Endpoint => print_endpoint(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(config_path: &Option<PathBuf>) -> LiveResult<ClientConfig> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(ClientConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["livewire.toml", "config/livewire.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(ClientConfig::load_from_file(&path)?);
                }
            }

            Err(LiveError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "No configuration file found. Provide one with -c/--config or create livewire.toml",
            )))
        }
    }
}

async fn run_client(config: ClientConfig, types: Vec<String>) -> LiveResult<()> {
    let url = config.channel_url()?;

    let manager = ConnectionManager::with_options(
        url,
        Arc::new(WebSocketTransport::current(config.connect_timeout())),
        Arc::new(TokioScheduler::current()),
        ManagerOptions {
            reconnect: config.reconnect.clone(),
            event_log_capacity: config.diagnostics.event_log_capacity,
        },
    );
    info!(client_id = %manager.id(), url = %manager.url(), "Client created");

    let mut disposers: Vec<Disposer> = Vec::new();
    disposers.push(manager.on_status_change(Callback::new(|state: &ConnectionState| {
        info!(state = %state, "Channel status");
    })));

    let print = Callback::new(|message: &PushMessage| {
        println!("{}", message.to_json());
    });
    if types.is_empty() {
        disposers.push(manager.on_message(print));
    } else {
        for message_type in &types {
            disposers.push(manager.subscribe(message_type.as_str(), print.clone()));
        }
    }

    if let Some(port) = config.diagnostics.port {
        match DiagnosticsServer::new(manager.clone(), port).start() {
            Ok(addr) => info!("Diagnostics available on http://{}", addr),
            Err(e) => warn!("Diagnostics server not started: {}", e),
        }
    }

    manager.connect();

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    manager.disconnect();
    for disposer in disposers {
        disposer.dispose();
    }

    let metrics = manager.metrics();
    info!(
        attempts = metrics.connection_attempts,
        delivered = metrics.messages_delivered,
        decode_errors = metrics.decode_errors,
        "Client stopped"
    );
    Ok(())
}

fn handle_config_command(config: ClientConfig, show: bool) -> LiveResult<()> {
    if show {
        let rendered = toml::to_string_pretty(&config)
            .map_err(|e| LiveError::internal(format!("failed to render configuration: {e}")))?;
        println!("Current configuration:");
        println!("{rendered}");
    }

    info!("Configuration validation complete");
    Ok(())
}

fn print_endpoint(config: &ClientConfig) -> LiveResult<()> {
    println!("{}", config.channel_url()?);
    Ok(())
}
