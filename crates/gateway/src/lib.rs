//! HTTP/WebSocket transport, CLI entry point, and process wiring
//! for the Conduit data-plane gateway — thin by design; the bulk of the
//! logic lives in the data plane assembled by `conduit-data` and the
//! protocol adapter crates.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]

pub mod config;
pub mod error;
pub mod http;
pub mod influx;
pub mod opt;
pub mod state;

use std::sync::Arc;

use conduit_common::{config::load_toml_value, logging::init_logging};
use serde::Deserialize;

use crate::{config::GatewayConfig, influx::InfluxClient, opt::Opt, state::AppState};

/// Loads configuration, starts every configured data module, and serves
/// the HTTP/WebSocket transport until shutdown.
pub async fn run(opt: Opt) -> anyhow::Result<()> {
    init_logging(opt.debug);

    let value = load_toml_value(&opt.config)?;
    let config = GatewayConfig::deserialize(value)
        .map_err(|err| anyhow::anyhow!("invalid configuration: {err}"))?;

    let host = config.host.clone();
    let port = config.port;
    let influx_db = config.influx_db.clone();

    let gateway = config.build()?;
    gateway.controller.start().await?;

    let state = AppState {
        controller: gateway.controller.clone(),
        resolver: gateway.resolver.clone(),
        renderer: gateway.renderer.clone(),
        influx: influx_db.map(|base_url| Arc::new(InfluxClient::new(base_url))),
    };

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    tracing::info!(host, port, "conduit gateway listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    gateway.controller.stop().await?;
    Ok(())
}
