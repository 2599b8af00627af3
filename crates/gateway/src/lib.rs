//! HTTP API for Spendwise.
//!
//! - `GET /health`
//! - `POST /agents/query`, `GET /agents/thread`: the assistant
//! - `/expenses`, `/expenses/{id}`, `/expenses/category/{category}`: CRUD
//!
//! Everything but `/health` requires `Authorization: Bearer <token>`, where the
//! token is one of the configured users'.

pub mod agents;
pub mod auth;
pub mod error;
pub mod expenses;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    middleware,
    response::Json,
    routing::{get, post, put},
};
use serde::Serialize;
use spendwise_agent::TurnController;
use spendwise_config::AppConfig;
use spendwise_core::expense::{ExpenseStore, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub expenses: Arc<dyn ExpenseStore>,
    pub controller: Arc<TurnController>,
    pub body_limit: usize,
    tokens: HashMap<String, UserId>,
}

impl GatewayState {
    pub fn new(
        config: &AppConfig,
        expenses: Arc<dyn ExpenseStore>,
        controller: Arc<TurnController>,
    ) -> Self {
        let tokens = config
            .users
            .iter()
            .map(|u| (u.token.clone(), UserId(u.id)))
            .collect();
        Self {
            expenses,
            controller,
            body_limit: config.gateway.body_limit,
            tokens,
        }
    }

    pub fn user_for_token(&self, token: &str) -> Option<UserId> {
        self.tokens.get(token).copied()
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the router with every route and layer.
pub fn build_router(state: SharedState) -> Router {
    let body_limit = state.body_limit;

    let protected = Router::new()
        .route("/agents/query", post(agents::query_handler))
        .route("/agents/thread", get(agents::thread_handler))
        .route(
            "/expenses",
            get(expenses::list_handler).post(expenses::create_handler),
        )
        .route(
            "/expenses/{id}",
            put(expenses::update_handler).delete(expenses::delete_handler),
        )
        .route(
            "/expenses/category/{category}",
            get(expenses::list_category_handler)
                .put(expenses::update_category_handler)
                .delete(expenses::delete_category_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_caller,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .merge(protected)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Bind and serve until Ctrl-C.
pub async fn serve(
    state: SharedState,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Gateway listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
