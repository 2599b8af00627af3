//! The assistant endpoints.

use crate::SharedState;
use crate::auth::Caller;
use crate::error::ApiError;
use axum::extract::{Extension, Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spendwise_core::context::TurnContext;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub messages: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
    pub thread_id: String,
}

pub async fn query_handler(
    State(state): State<SharedState>,
    Extension(Caller(user)): Extension<Caller>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let ctx = TurnContext::for_caller(Some(user), payload.thread_id.as_deref());
    info!(
        user = %user,
        thread_id = %ctx.thread_id,
        message_len = payload.messages.len(),
        "Agent query received"
    );

    let outcome = state.controller.run(&ctx, &payload.messages).await?;
    Ok(Json(QueryResponse {
        response: outcome.reply,
        thread_id: outcome.thread_id.to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ThreadParams {
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageView {
    pub id: String,
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadView {
    pub thread_id: String,
    pub summary: String,
    pub messages: Vec<MessageView>,
}

/// Retained history and summary of one of the caller's threads.
pub async fn thread_handler(
    State(state): State<SharedState>,
    Extension(Caller(user)): Extension<Caller>,
    Query(params): Query<ThreadParams>,
) -> Result<Json<ThreadView>, ApiError> {
    let ctx = TurnContext::for_caller(Some(user), params.thread_id.as_deref());
    let thread = state.controller.conversations().load(&ctx.thread_id).await?;

    let messages = thread
        .retained()
        .map(|m| MessageView {
            id: m.id.clone(),
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
            tool_calls: m.tool_calls.iter().map(|c| c.name.clone()).collect(),
            timestamp: m.timestamp,
        })
        .collect();

    Ok(Json(ThreadView {
        thread_id: thread.id.to_string(),
        summary: thread.summary,
        messages,
    }))
}
