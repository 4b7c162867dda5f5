//! Mockup Server - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use mockup_server::{openapi, server, AppState, SimulatorConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mockup-server",
    about = "Configuration-driven HTTP service simulator - fixture routes, mock sessions and latency simulation",
    version
)]
struct Args {
    /// Path to configuration file (YAML or JSON)
    #[arg(short, long, default_value = "mockup-server.yaml")]
    config: PathBuf,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:3001")]
    listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let default_config = include_str!("../demos/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    // Load configuration
    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        SimulatorConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no services)");
        SimulatorConfig::default()
    };

    let overlay = match &config.openapi.overlay {
        Some(path) => {
            info!(path = ?path, "Loading OpenAPI overlay");
            Some(openapi::load_overlay(path)?)
        }
        None => None,
    };

    if args.validate {
        println!(
            "Configuration is valid ({} services, {} users)",
            config.services.len(),
            config.users.len()
        );
        return Ok(());
    }

    let state = AppState::with_overlay(config, overlay)?;

    let listener = TcpListener::bind(args.listen).await?;
    info!(address = %listener.local_addr()?, "Mock API server running");

    server::serve(listener, state, server::shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}
