//! Tollgate Web Server
//!
//! Session gate and API in front of a signed-token session registry.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tollgate_core::init_logging;
use tollgate_web::{TollgateServerBuilder, WebConfig};

/// Tollgate Web Server - signed bearer tokens with sliding expiration
#[derive(Parser)]
#[command(name = "tollgate")]
#[command(about = "Session gate and API for Tollgate")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Server port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable development mode
    #[arg(long)]
    dev: bool,

    /// Database URL for session storage
    #[arg(long)]
    database_url: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

/// File, then environment, then command line
fn load_config(args: Args) -> anyhow::Result<WebConfig> {
    let mut config = match &args.config {
        Some(path) => WebConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => WebConfig::default(),
    };

    config
        .apply_env()
        .context("Invalid environment configuration")?;

    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.dev {
        config.dev_mode = true;
    }
    if let Some(database_url) = args.database_url {
        config.database_url = Some(database_url);
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
        config
            .logging
            .filter_directives
            .retain(|directive| !directive.starts_with("tollgate_"));
    }

    Ok(config)
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match load_config(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("❌ Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    println!("🚀 Starting Tollgate Web Server");
    println!("📍 Server: http://{}", config.address());
    println!("🔧 Development mode: {}", config.dev_mode);

    // Invalid session settings stop us here, before anything binds
    let server = match TollgateServerBuilder::from_config(config).build().await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("❌ Failed to build server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.start().await {
        eprintln!("❌ Server failed: {}", e);
        std::process::exit(1);
    }
}
