//! `shipit` — shipping rate service entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline.
//! 3. Provision the shared key pair (environment, key file, or generate).
//! 4. Build the EasyPost rate provider.
//! 5. Build the Axum router and start the HTTP server.

mod config;
mod keys;
mod rates;
mod server;
mod telemetry;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tracing::info;

use config::Config;
use rates::EasyPostProvider;
use server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cfg.port,
        "shipit starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key material
    // -----------------------------------------------------------------------
    let key_material = keys::provision(&cfg)?;

    // -----------------------------------------------------------------------
    // 4. Rate provider
    // -----------------------------------------------------------------------
    let provider = EasyPostProvider::new(
        &cfg.easypost_base_url,
        &cfg.easypost_key,
        Duration::from_secs(cfg.upstream_timeout_secs),
    )?;

    // -----------------------------------------------------------------------
    // 5. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(key_material, Arc::new(provider));
    let router = server::router::build(state, Duration::from_secs(cfg.request_timeout_secs));

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}
