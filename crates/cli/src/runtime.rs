//! Wiring shared by `serve` and `ask`.

use anyhow::Context;
use spendwise_agent::TurnController;
use spendwise_config::AppConfig;
use spendwise_core::event::{DomainEvent, EventBus};
use spendwise_core::expense::{UserId, UserRecord};
use spendwise_store::Stores;
use spendwise_tools::ExpenseToolbox;
use std::sync::Arc;
use tracing::{debug, info};

pub struct Runtime {
    pub stores: Stores,
    pub controller: Arc<TurnController>,
    pub event_bus: Arc<EventBus>,
}

/// Open the stores, register configured users and build the controller.
pub async fn build(config: &AppConfig) -> anyhow::Result<Runtime> {
    let stores = spendwise_store::open(&config.database.url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))?;

    for user in &config.users {
        stores
            .expenses
            .register_user(&UserRecord {
                id: UserId(user.id),
                username: user.username.clone(),
            })
            .await
            .with_context(|| format!("Failed to register user {}", user.username))?;
    }
    info!(users = config.users.len(), "Registered configured users");

    let provider = spendwise_providers::build_from_config(config)
        .context("No usable provider; set an API key (e.g. GOOGLE_API_KEY)")?;
    let event_bus = Arc::new(EventBus::default());
    let controller = TurnController::from_config(
        config,
        provider,
        ExpenseToolbox::new(stores.expenses.clone()),
        stores.conversations.clone(),
        event_bus.clone(),
    );

    Ok(Runtime {
        stores,
        controller: Arc::new(controller),
        event_bus,
    })
}

/// Log domain events until the bus closes.
pub fn spawn_event_logger(event_bus: &EventBus) {
    let mut events = event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.as_ref() {
                DomainEvent::ToolExecuted {
                    tool_name,
                    success,
                    duration_ms,
                    ..
                } => debug!(tool = %tool_name, success, duration_ms, "Tool executed"),
                DomainEvent::ResponseGenerated {
                    thread_id,
                    model,
                    tokens_used,
                    ..
                } => debug!(thread_id = %thread_id, model = %model, tokens_used, "Model responded"),
                other => debug!(event = ?other, "Domain event"),
            }
        }
    });
}
