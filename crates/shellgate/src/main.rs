//! # shellgate
//!
//! Shellgate broker binary — wires the SSH dialer and token provider into
//! the server and runs it until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use tracing_subscriber::EnvFilter;

use shellgate_server::auth::SharedTokenProvider;
use shellgate_server::config::ServerConfig;
use shellgate_server::server::ShellgateServer;
use shellgate_transport::russh_client::RusshDialer;

/// Shellgate session broker.
#[derive(Parser, Debug)]
#[command(name = "shellgate", about = "WebSocket to SSH session broker")]
struct Cli {
    /// Path to a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides config; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Shared bearer token clients must present at upgrade.
    #[arg(long, env = "SHELLGATE_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

/// Layer the configuration: defaults, then the JSON file, then
/// `SHELLGATE_`-prefixed environment variables, then CLI flags.
fn load_config(cli: &Cli) -> Result<ServerConfig> {
    let mut figment = Figment::from(Serialized::defaults(ServerConfig::default()));
    if let Some(path) = &cli.config {
        figment = figment.merge(Json::file(path));
    }
    let mut config: ServerConfig = figment
        .merge(Env::prefixed("SHELLGATE_"))
        .extract()
        .context("invalid configuration")?;

    if let Some(host) = &cli.host {
        config.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let Some(token) = cli.token.clone() else {
        bail!("no bearer token configured; pass --token or set SHELLGATE_TOKEN");
    };
    if token.is_empty() {
        bail!("the bearer token must not be empty");
    }

    let identity = Arc::new(SharedTokenProvider::new(token, "shared"));
    let dialer = Arc::new(RusshDialer::new());
    let server = ShellgateServer::new(config, identity, dialer);

    let (addr, handle) = server.listen().await.context("failed to bind")?;
    tracing::info!("shellgate listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down...");
    server
        .shutdown()
        .graceful_shutdown(server.registry(), None)
        .await;
    let _ = handle.await;

    tracing::info!("shutdown complete");
    Ok(())
}
