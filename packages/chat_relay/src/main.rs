use anyhow::{Context, Result};
use clap::Parser;
use figment::providers::Serialized;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use chatgpt_client::ChatGptClient;

mod config;
mod dispatch;
mod error;
mod handler;
mod metrics;
mod protocol;
mod server;
mod session;

#[cfg(test)]
mod test_helpers;

use crate::config::{DEFAULT_CONFIG_FILE, RelayConfig, load_config};
use crate::metrics::RelayMetrics;
use crate::server::{AppState, build_router};

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "WebSocket relay to the ChatGPT conversation backend")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port to listen on (overrides config and SERVER_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "chat_relay=debug,chatgpt_client=debug,tower_http=debug,info"
    } else {
        "chat_relay=info,chatgpt_client=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let mut figment = load_config(&cli.config);
    if let Some(host) = &cli.host {
        figment = figment.merge(Serialized::default("server.host", host));
    }
    if let Some(port) = cli.port {
        figment = figment.merge(Serialized::default("server.port", port));
    }
    let config = RelayConfig::from_figment(&figment)
        .inspect_err(|e| error!("Invalid configuration: {:#}", e))?;

    let client = ChatGptClient::authenticate(
        config.upstream.credentials.clone(),
        config.upstream.options.clone(),
    )
    .await
    .inspect_err(|e| error!(kind = e.error_kind(), "Upstream authentication failed: {}", e))
    .context("Upstream authentication failed")?;

    let metrics = Arc::new(RelayMetrics::new());
    let state = AppState::new(
        Arc::new(client),
        metrics.clone(),
        &config.server,
        config.upstream.call_timeout,
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    let actual_addr = listener.local_addr()?;
    info!("Chat relay listening on ws://{}", actual_addr);

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, closing connections...");
    };

    let server_result = server::serve(listener, app, shutdown_signal)
        .await
        .context("Server error");

    let snapshot = metrics.snapshot();
    info!(
        uptime_secs = snapshot.uptime_secs,
        connections = snapshot.connections.total,
        frames_received = snapshot.frames.received,
        frames_sent = snapshot.frames.sent,
        decode_errors = snapshot.errors.decode,
        upstream_errors = snapshot.errors.upstream,
        conversations_opened = snapshot.conversations_opened,
        "Relay stopped"
    );

    server_result
}
