//! Strictly Gomoku - match server binary.

#![warn(missing_docs)]

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use strictly_gomoku_server::{CentreHint, Cli, Command, MatchRegistry, ServerConfig, router};
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, host, port } => run_server(config, host, port).await,
        Command::DefaultConfig => {
            print!("{}", ServerConfig::default().to_toml()?);
            Ok(())
        }
    }
}

/// Run the match server
#[instrument]
async fn run_server(
    config: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = ServerConfig::load(config.as_deref())?;
    if let Some(host) = host {
        config = config.with_host(host);
    }
    if let Some(port) = port {
        config = config.with_port(port);
    }

    let mut registry = MatchRegistry::new(config.match_settings()?, *config.queue_capacity());
    if *config.offer_hints() {
        registry = registry.with_hints(Arc::new(CentreHint));
    }
    let app = router(registry);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        %addr,
        board_size = config.board_size(),
        win_length = config.win_length(),
        policy = %config.disconnect_policy(),
        "Strictly Gomoku listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}
