//! `spendwise serve`: start the HTTP API.

use crate::runtime;
use anyhow::Context;
use spendwise_config::AppConfig;
use spendwise_gateway::GatewayState;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

pub async fn run(path: Option<&Path>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load_with(path).context("Failed to load config")?;
    if let Some(port) = port {
        config.gateway.port = port;
    }
    if config.users.is_empty() {
        warn!("No users configured; every authenticated route will answer 401");
    }

    let rt = runtime::build(&config).await?;
    runtime::spawn_event_logger(&rt.event_bus);

    println!("Spendwise API");
    println!("  Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("  Provider:  {} ({})", config.provider, config.model);
    println!("  Database:  {}", config.database.url);

    let state = Arc::new(GatewayState::new(
        &config,
        rt.stores.expenses.clone(),
        rt.controller.clone(),
    ));
    spendwise_gateway::serve(state, &config.gateway.host, config.gateway.port)
        .await
        .map_err(|e| anyhow::anyhow!(e))
}
