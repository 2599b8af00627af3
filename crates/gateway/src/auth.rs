//! Bearer-token authentication against the configured user table.

use crate::SharedState;
use crate::error::ApiError;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use spendwise_core::expense::UserId;
use tracing::warn;

/// The authenticated user, inserted into request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub UserId);

fn bearer(req: &Request) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Rejects requests without a known token with 401.
pub async fn require_caller(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(user) = bearer(&req).and_then(|token| state.user_for_token(token)) else {
        warn!(path = %req.uri().path(), "Unauthorized request");
        return Err(ApiError::unauthorized());
    };
    req.extensions_mut().insert(Caller(user));
    Ok(next.run(req).await)
}
