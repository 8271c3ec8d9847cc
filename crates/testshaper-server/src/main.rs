//! TestShaper Security Server Entry Point

use testshaper_server::{Server, ServerConfig};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

/// `RUST_LOG` when set, otherwise the given level
fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

#[tokio::main]
async fn main() {
    // Initialize logging; the configured level replaces the fallback once loaded
    let (filter, filter_handle) = reload::Layer::new(env_filter("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    info!("TestShaper security server v{}", Server::version());

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = filter_handle.reload(env_filter(&config.log_level)) {
        warn!("Failed to apply log level '{}': {}", config.log_level, e);
    }

    // Create and start server
    let server = match Server::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.start().await {
        error!("Failed to start server: {}", e);
        std::process::exit(1);
    }

    // Wait for shutdown signal
    info!("Press Ctrl+C to stop the server");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    // Stop server
    if let Err(e) = server.stop().await {
        error!("Error during shutdown: {}", e);
    }

    info!("Goodbye!");
}
