//! `delete_expenses`: remove every caller expense in one category.

use crate::{Outcome, Reply, ensure_user, store_error_message};
use serde::Deserialize;
use serde_json::json;
use spendwise_core::expense::{ExpenseStore, UserId};
use tracing::info;

pub(crate) const DESCRIPTION: &str = "Delete all of the user's expenses in a category. \
The category must match exactly, ignoring case.";

#[derive(Debug, Deserialize)]
pub struct DeleteExpensesArgs {
    pub category: String,
}

pub(crate) fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "category": {
                "type": "string",
                "description": "Category whose expenses should be deleted"
            }
        },
        "required": ["category"]
    })
}

pub(crate) async fn run(store: &dyn ExpenseStore, user: UserId, args: DeleteExpensesArgs) -> Outcome {
    let category = args.category.trim();
    if category.is_empty() {
        return Err("A category is required.".into());
    }

    ensure_user(store, user).await?;

    let deleted = store
        .delete_by_category(user, category)
        .await
        .map_err(|e| store_error_message(&e))?;
    if deleted == 0 {
        return Err(format!("No expenses found in category '{category}'."));
    }

    info!(user = %user, category, deleted, "Expenses deleted");
    Ok(Reply::with_data(
        format!("Deleted {deleted} expenses in category '{category}'."),
        json!({ "deleted": deleted }),
    ))
}
