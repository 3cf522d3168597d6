//! burrow-client - Burrow VPN client daemon.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use burrow_client::VpnClient;
use burrow_config::load_client_config;
use burrow_wireguard::LogLevel;

#[derive(Parser)]
#[command(name = "burrow-client")]
#[command(about = "Burrow VPN client")]
#[command(version)]
struct Cli {
    /// Path to the client config file
    #[arg(short, long, default_value = "client.toml")]
    config: PathBuf,
}

/// Maps the configured engine log level onto a tracing filter; RUST_LOG
/// overrides it when set.
fn init_tracing(level: LogLevel) {
    let directive = match level {
        LogLevel::Verbose => "debug",
        LogLevel::Error => "info",
        LogLevel::Silent => "error",
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = load_client_config(&cli.config)
        .map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?;
    cfg.validate()
        .map_err(|e| anyhow::anyhow!("config error: {e}"))?;

    init_tracing(cfg.log_level());
    info!(config = %cli.config.display(), "starting burrow-client");

    let mut client = VpnClient::new(cfg);
    client.connect().await?;

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");

    client.disconnect();
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
