//! Multi-room WebSocket Chat Hub - Entry Point
//!
//! Starts the TCP listener and the hub actor, accepting connections.

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use room_hub::{handle_connection, Config, Hub};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=room_hub=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("room_hub=info")),
        )
        .init();

    let config = Config::parse();

    // Start TCP listener
    let listener = TcpListener::bind(&config.addr).await?;
    info!("Chat hub listening on {}", config.addr);

    // Create hub actor channel, seed rooms and start
    let (hub_tx, hub_rx) = mpsc::channel(config.command_buffer as usize);
    let hub = Hub::new(hub_rx, config.hub_options());
    config.seed(&hub);
    tokio::spawn(hub.run());

    info!(
        "Hub actor started (max saved messages: {}, page size: {})",
        config.max_saved_messages, config.max_returned_messages
    );

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let hub_tx = hub_tx.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, hub_tx).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
