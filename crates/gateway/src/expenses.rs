//! Expense CRUD for the authenticated user.
//!
//! Per-id routes check ownership: a missing expense is 404, someone else's
//! is 403. Category routes match the category exactly, ignoring case.

use crate::SharedState;
use crate::auth::Caller;
use crate::error::ApiError;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use spendwise_core::expense::{Expense, ExpenseFilter, ExpensePatch, NewExpense, UserId};
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn list_handler(
    State(state): State<SharedState>,
    Extension(Caller(user)): Extension<Caller>,
) -> Result<Json<Vec<Expense>>, ApiError> {
    let expenses = state.expenses.list(user, &ExpenseFilter::default()).await?;
    Ok(Json(expenses))
}

pub async fn create_handler(
    State(state): State<SharedState>,
    Extension(Caller(user)): Extension<Caller>,
    Json(payload): Json<NewExpense>,
) -> Result<(StatusCode, Json<Expense>), ApiError> {
    let expense = state.expenses.create(user, payload).await?;
    info!(user = %user, expense_id = expense.id, "Expense created");
    Ok((StatusCode::CREATED, Json(expense)))
}

/// Load an expense and make sure the caller owns it.
async fn owned(state: &SharedState, user: UserId, id: i64, action: &str) -> Result<Expense, ApiError> {
    let expense = state
        .expenses
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Expense not found"))?;
    if expense.user_id != user {
        return Err(ApiError::forbidden(format!("Not authorized to {action} this expense")));
    }
    Ok(expense)
}

pub async fn update_handler(
    State(state): State<SharedState>,
    Extension(Caller(user)): Extension<Caller>,
    Path(id): Path<i64>,
    Json(patch): Json<ExpensePatch>,
) -> Result<Json<Expense>, ApiError> {
    owned(&state, user, id, "update").await?;
    let expense = state.expenses.update(id, &patch).await?;
    Ok(Json(expense))
}

pub async fn delete_handler(
    State(state): State<SharedState>,
    Extension(Caller(user)): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    owned(&state, user, id, "delete").await?;
    state.expenses.delete(id).await?;
    info!(user = %user, expense_id = id, "Expense deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_category_handler(
    State(state): State<SharedState>,
    Extension(Caller(user)): Extension<Caller>,
    Path(category): Path<String>,
) -> Result<Json<Vec<Expense>>, ApiError> {
    Ok(Json(state.expenses.list_by_category(user, &category).await?))
}

pub async fn update_category_handler(
    State(state): State<SharedState>,
    Extension(Caller(user)): Extension<Caller>,
    Path(category): Path<String>,
    Json(patch): Json<ExpensePatch>,
) -> Result<Json<Vec<Expense>>, ApiError> {
    let updated = state
        .expenses
        .update_by_category(user, &category, &patch)
        .await?;
    if updated.is_empty() {
        return Err(ApiError::not_found(format!(
            "No expenses found in category '{category}'."
        )));
    }
    Ok(Json(updated))
}

pub async fn delete_category_handler(
    State(state): State<SharedState>,
    Extension(Caller(user)): Extension<Caller>,
    Path(category): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = state.expenses.delete_by_category(user, &category).await?;
    if deleted == 0 {
        return Err(ApiError::not_found(format!(
            "No expenses found in category '{category}'."
        )));
    }
    Ok(Json(MessageResponse {
        message: format!("Deleted {deleted} expenses in category '{category}'."),
    }))
}
