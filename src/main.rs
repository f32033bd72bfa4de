//! ==============================================================================
//! main.rs - relay entry point
//! ==============================================================================
//!
//! purpose:
//!     wires the pieces together and serves the relay:
//!     - load configuration (hub.toml or defaults)
//!     - install the tracing subscriber at the configured level
//!     - build the session registry and the axum router
//!     - listen until shutdown
//!
//! relationships:
//!     - uses: config.rs (hub.toml), api.rs (router), registry.rs (state)
//!
//! ==============================================================================

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ecg_relay::api;
use ecg_relay::config::HubConfig;
use ecg_relay::registry::DeviceRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration, then bring up logging at its level
    let config = HubConfig::load_or_default();
    init_tracing(&config.logging.level);
    config.log_summary();

    // step 2: the registry is the only shared state in the process
    let registry = DeviceRegistry::new(config.stale_after());

    // step 3: serve the relay API
    let app = api::router(registry);
    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "relay listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// RUST_LOG wins when set; otherwise the configured level applies.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
