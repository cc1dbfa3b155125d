//! shell-api - expose configured shell commands as HTTP endpoints

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shell_api::engine::EndpointTable;
use shell_api::server::{self, ApiState};

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "shell-api",
    about = "Serve configured shell commands over HTTP",
    version
)]
struct Cli {
    /// YAML file mapping URL paths to commands
    #[clap(long, short, env = "COMMAND_FILE", default_value = "config.yaml")]
    config: PathBuf,

    /// Port to listen on
    #[clap(long, short, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Address to bind
    #[clap(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Set log level (RUST_LOG takes precedence when set)
    #[clap(long, value_enum, default_value = "info")]
    log_level: LogLevel,
}

fn initialize_tracing(log_level: &LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(&cli.log_level);

    info!("Starting shell-api v{}", env!("CARGO_PKG_VERSION"));

    let endpoints = EndpointTable::load(&cli.config)
        .with_context(|| format!("Failed to load commands from {}", cli.config.display()))?;

    if endpoints.is_empty() {
        tracing::warn!("No endpoints configured in {}", cli.config.display());
    }

    let state = Arc::new(ApiState::new(endpoints));
    let addr = SocketAddr::new(cli.host, cli.port);

    server::serve(addr, state).await.context("Server failed")?;
    Ok(())
}
