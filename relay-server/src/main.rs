//! # Relay Server
//!
//! Entry point for the Relay WebSocket message hub.
//!
//! ```bash
//! # Run with default configuration
//! relay-server
//!
//! # Run with a configuration file
//! relay-server --config /etc/relay/relay.yaml
//!
//! # Run with environment variable overrides
//! RELAY_SERVER_PORT=9090 relay-server
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use clap::Parser;
use std::path::PathBuf;
use tracing::error;

use relay_server::{RelayServer, ServerConfig, init_logging};

/// Relay WebSocket message hub
#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "relay.yaml")]
    config: PathBuf,

    /// Override listener host
    #[arg(long, env = "RELAY_SERVER_HOST")]
    host: Option<String>,

    /// Override listener port
    #[arg(long, env = "RELAY_SERVER_PORT")]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if args.validate {
        println!("Configuration is valid");
        return;
    }

    init_logging(&config.logging);

    if let Err(e) = RelayServer::new(config).run().await {
        error!("server error: {}", e);
        std::process::exit(1);
    }
}

/// Loads configuration from file and applies overrides.
fn load_config(args: &Args) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = if args.config.exists() {
        ServerConfig::load(&args.config)?
    } else {
        eprintln!(
            "Configuration file not found: {}, using defaults",
            args.config.display()
        );
        ServerConfig::default()
    };

    if let Some(host) = &args.host {
        config.server.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.debug {
        config.logging.level = "debug".to_string();
    }

    Ok(config)
}
