//! `create_expense`: record a new expense for the caller, dated now.

use crate::{Outcome, Reply, ensure_user, lenient_amount, non_blank, store_error_message};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use spendwise_core::expense::{ExpenseStore, NewExpense, UserId};
use tracing::info;

pub(crate) const DESCRIPTION: &str = "Create a new expense for the user with an amount, a category \
and an optional short description. The expense is dated now.";

#[derive(Debug, Deserialize)]
pub struct CreateExpenseArgs {
    #[serde(deserialize_with = "lenient_amount")]
    pub amount: Option<f64>,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub(crate) fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "amount": {
                "type": "number",
                "description": "The monetary amount of the expense"
            },
            "category": {
                "type": "string",
                "description": "Category for the expense, e.g. 'Food'"
            },
            "description": {
                "type": "string",
                "description": "Optional brief description"
            }
        },
        "required": ["amount", "category"]
    })
}

pub(crate) async fn run(
    store: &dyn ExpenseStore,
    user: UserId,
    args: CreateExpenseArgs,
    now: DateTime<Utc>,
) -> Outcome {
    let amount = args
        .amount
        .ok_or_else(|| "Invalid arguments for create_expense: amount is required".to_string())?;
    let expense = NewExpense {
        amount,
        category: args.category.trim().to_string(),
        description: non_blank(args.description).unwrap_or_default(),
        date: now,
    };
    expense.validate().map_err(|e| store_error_message(&e))?;

    ensure_user(store, user).await?;

    let created = store
        .create(user, expense)
        .await
        .map_err(|e| store_error_message(&e))?;
    info!(user = %user, id = created.id, category = %created.category, "Expense created");

    Ok(Reply::with_data("Expense stored successfully.", json!(created)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExpenseToolbox;
    use crate::test_support::*;
    use chrono::TimeZone;
    use spendwise_core::expense::ExpenseFilter;
    use spendwise_core::tool::ToolCall;

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "c".into(),
            name: "create_expense".into(),
            arguments: args,
        }
    }

    #[tokio::test]
    async fn creates_and_then_lists() {
        let store = seeded_store().await;
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let toolbox = ExpenseToolbox::new(store.clone()).with_fixed_now(now);

        let result = toolbox
            .dispatch(
                Some(ALICE),
                &call(json!({"amount": 50, "category": "Food", "description": "Groceries"})),
            )
            .await;
        assert!(result.success);
        assert_eq!(result.output, "Expense stored successfully.");
        let data = result.data.unwrap();
        assert_eq!(data["amount"], 50.0);
        assert_eq!(data["user_id"], 1);

        let listed = toolbox
            .dispatch(
                Some(ALICE),
                &ToolCall {
                    id: "q".into(),
                    name: "get_expenses".into(),
                    arguments: json!({"category": "Food"}),
                },
            )
            .await;
        let expenses = listed.data.unwrap()["expenses"].as_array().unwrap().clone();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0]["description"], "Groceries");
        assert!(listed.output.ends_with("Total: $50.00"));

        let stored = store.list(ALICE, &ExpenseFilter::default()).await.unwrap();
        assert_eq!(stored[0].date, now);
    }

    #[tokio::test]
    async fn description_is_optional() {
        let toolbox = ExpenseToolbox::new(seeded_store().await);
        let result = toolbox
            .dispatch(Some(BOB), &call(json!({"amount": "12.75", "category": "Coffee"})))
            .await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["description"], "");
    }

    #[tokio::test]
    async fn blank_category_is_rejected() {
        let store = seeded_store().await;
        let toolbox = ExpenseToolbox::new(store.clone());
        let result = toolbox
            .dispatch(Some(ALICE), &call(json!({"amount": 5, "category": "   "})))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("category"));
        assert!(store.list(ALICE, &ExpenseFilter::default()).await.unwrap().is_empty());
    }
}
