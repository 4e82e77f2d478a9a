//! mapsync CLI
//!
//! Command-line entry point for mirroring upstream profiles.
//!
//! # Commands
//!
//! - `sync` - Run one incremental sync
//! - `serve` - Start the HTTP trigger endpoint
//! - `inspect` - Display store statistics and the stored cursor
//! - `hit` - Invoke a trigger endpoint repeatedly

mod commands;
mod env;

use clap::{Parser, Subcommand};
use env::EnvConfig;
use mapsync_sync_engine::CursorMode;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Incremental mirror of an upstream profile directory.
#[derive(Parser)]
#[command(name = "mapsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory (overrides STORE_PATH)
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Upstream base URL (overrides NODE_URL)
    #[arg(global = true, long)]
    node_url: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one incremental sync
    Sync {
        /// Cursor mode (sort-token, timestamp)
        #[arg(short, long)]
        mode: Option<CursorMode>,
    },

    /// Start the HTTP trigger endpoint
    Serve {
        /// Cursor mode (sort-token, timestamp)
        #[arg(short, long)]
        mode: Option<CursorMode>,

        /// Address to bind (overrides TRIGGER_ADDR)
        #[arg(short, long)]
        addr: Option<SocketAddr>,

        /// HTTP method that triggers a run (overrides TRIGGER_METHOD)
        #[arg(long)]
        method: Option<String>,

        /// Route that triggers a run (overrides TRIGGER_PATH)
        #[arg(long)]
        route: Option<String>,
    },

    /// Display store statistics and the stored cursor
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Invoke a trigger endpoint repeatedly
    Hit {
        /// Trigger URL
        #[arg(short, long, default_value = "http://localhost:3000/api")]
        url: String,

        /// Number of requests
        #[arg(short, long, default_value = "1")]
        count: u32,

        /// Bearer key (defaults to API_SECRET_KEY)
        #[arg(short, long)]
        key: Option<String>,

        /// HTTP method
        #[arg(long, default_value = "GET")]
        method: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = EnvConfig::from_env()?;
    if let Some(path) = cli.path {
        config.store_path = path;
    }
    if let Some(url) = cli.node_url {
        config.node_url = Some(url);
    }

    match cli.command {
        Commands::Sync { mode } => {
            if let Some(mode) = mode {
                config.sync_mode = mode;
            }
            commands::sync::run(&config)?;
        }
        Commands::Serve {
            mode,
            addr,
            method,
            route,
        } => {
            if let Some(mode) = mode {
                config.sync_mode = mode;
            }
            if let Some(addr) = addr {
                config.trigger_addr = addr;
            }
            if let Some(method) = method {
                config.trigger_method = method;
            }
            if let Some(route) = route {
                config.trigger_path = route;
            }
            commands::serve::run(&config)?;
        }
        Commands::Inspect { format } => {
            commands::inspect::run(&config.store_path, &format)?;
        }
        Commands::Hit {
            url,
            count,
            key,
            method,
        } => {
            let key = key.or(config.api_secret_key).unwrap_or_default();
            commands::hit::run(&url, count, &key, &method, config.fetch_timeout)?;
        }
        Commands::Version => {
            println!("mapsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("mapsync engine v{}", mapsync_sync_engine::VERSION);
        }
    }

    Ok(())
}
