//! DB Proxy - Main entry point.
//!
//! Boots the proxy from a JSON configuration file and serves the admin
//! listener until SIGINT or SIGTERM.

use clap::Parser;
use db_proxy::bootstrap::{BootstrapOrchestrator, Collaborators};
use db_proxy::config::Config;
use db_proxy::dialect::AdapterRegistry;
use db_proxy::transport::AdminHttpListener;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    info!(
        config = ?config.config_path,
        port = config.port,
        "Starting DB Proxy v{}",
        env!("CARGO_PKG_VERSION")
    );

    let raw = config.load_proxy_configuration()?;

    let registry = Arc::new(AdapterRegistry::with_builtin_dialects());
    let listener = Arc::new(AdminHttpListener::new(
        &config.host,
        config.shutdown_timeout_duration(),
    ));
    let orchestrator = BootstrapOrchestrator::new(
        Collaborators::standard(registry, listener),
        config.default_database_type,
    );

    if let Err(e) = orchestrator.init(raw, config.port).await {
        error!(stage = %e.stage(), error = %e, "Proxy error");
        if let Some(suggestion) = e.suggestion() {
            error!(suggestion = %suggestion, "Hint");
        }
        return Err(e.into());
    }

    info!("Proxy shutdown complete");
    Ok(())
}
