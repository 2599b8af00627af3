//! `update_expenses`: patch every caller expense in one category.

use crate::{Outcome, Reply, dates, ensure_user, lenient_amount, non_blank, store_error_message};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use spendwise_core::expense::{ExpensePatch, ExpenseStore, UserId};
use tracing::info;

pub(crate) const DESCRIPTION: &str = "Update all of the user's expenses in a category. Only the \
supplied fields change: description, amount and date (natural language allowed). The category must \
match exactly, ignoring case. Check the expenses with get_expenses first.";

#[derive(Debug, Deserialize)]
pub struct UpdateExpensesArgs {
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
}

pub(crate) fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "category": {
                "type": "string",
                "description": "Category whose expenses should be updated"
            },
            "description": {
                "type": "string",
                "description": "New description"
            },
            "amount": {
                "type": "number",
                "description": "New amount"
            },
            "date": {
                "type": "string",
                "description": "New date, e.g. 'yesterday' or '2024-01-15'"
            }
        },
        "required": ["category"]
    })
}

pub(crate) async fn run(
    store: &dyn ExpenseStore,
    user: UserId,
    args: UpdateExpensesArgs,
    now: DateTime<Utc>,
) -> Outcome {
    let category = args.category.trim().to_string();
    if category.is_empty() {
        return Err("A category is required.".into());
    }

    let date = match non_blank(args.date) {
        None => None,
        Some(text) => Some(
            dates::parse(&text, now)
                .ok_or_else(|| format!("Unable to parse the date '{text}'."))?
                .start_bound(),
        ),
    };

    let patch = ExpensePatch {
        description: non_blank(args.description),
        amount: args.amount,
        category: None,
        date,
    };
    if patch.is_empty() {
        return Err("Nothing to update. Provide a new description, amount or date.".into());
    }
    patch.validate().map_err(|e| store_error_message(&e))?;

    ensure_user(store, user).await?;

    let updated = store
        .update_by_category(user, &category, &patch)
        .await
        .map_err(|e| store_error_message(&e))?;
    if updated.is_empty() {
        return Err(format!("No expenses found in category '{category}'."));
    }

    info!(user = %user, category = %category, updated = updated.len(), "Expenses updated");
    Ok(Reply::with_data(
        format!("Updated {} expenses in category '{category}'.", updated.len()),
        json!(updated),
    ))
}

#[cfg(test)]
mod tests {
    use crate::ExpenseToolbox;
    use crate::test_support::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use spendwise_core::expense::ExpenseFilter;
    use spendwise_core::tool::ToolCall;

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "u".into(),
            name: "update_expenses".into(),
            arguments: args,
        }
    }

    #[tokio::test]
    async fn amount_only_update_keeps_other_fields() {
        let store = seeded_store().await;
        add(&store, ALICE, 10.0, "Travel", "Bus", "2024-01-01T08:00:00Z").await;
        add(&store, ALICE, 20.0, "Travel", "Train", "2024-01-02T08:00:00Z").await;
        add(&store, BOB, 30.0, "Travel", "Plane", "2024-01-03T08:00:00Z").await;
        let before = store.list(ALICE, &ExpenseFilter::default()).await.unwrap();

        let toolbox = ExpenseToolbox::new(store.clone());
        let result = toolbox
            .dispatch(Some(ALICE), &call(json!({"category": "travel", "amount": 200})))
            .await;
        assert!(result.success);
        assert_eq!(result.output, "Updated 2 expenses in category 'travel'.");

        let after = store.list(ALICE, &ExpenseFilter::default()).await.unwrap();
        for (old, new) in before.iter().zip(&after) {
            assert_eq!(new.amount, 200.0);
            assert_eq!(new.description, old.description);
            assert_eq!(new.date, old.date);
            assert_eq!(new.category, old.category);
        }
        assert_eq!(store.list(BOB, &ExpenseFilter::default()).await.unwrap()[0].amount, 30.0);
    }

    #[tokio::test]
    async fn natural_language_date() {
        let store = seeded_store().await;
        add(&store, ALICE, 10.0, "Food", "Lunch", "2024-01-01T08:00:00Z").await;
        let now = Utc.with_ymd_and_hms(2024, 3, 13, 15, 0, 0).unwrap();
        let toolbox = ExpenseToolbox::new(store.clone()).with_fixed_now(now);

        let result = toolbox
            .dispatch(Some(ALICE), &call(json!({"category": "Food", "date": "yesterday"})))
            .await;
        assert!(result.success);
        let after = store.list(ALICE, &ExpenseFilter::default()).await.unwrap();
        assert_eq!(after[0].date, Utc.with_ymd_and_hms(2024, 3, 12, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn failures_are_structured() {
        let store = seeded_store().await;
        add(&store, ALICE, 10.0, "Food", "Lunch", "2024-01-01T08:00:00Z").await;
        let toolbox = ExpenseToolbox::new(store);

        let bad_date = toolbox
            .dispatch(Some(ALICE), &call(json!({"category": "Food", "date": "the other day"})))
            .await;
        assert!(!bad_date.success);
        assert_eq!(bad_date.output, "Unable to parse the date 'the other day'.");

        let nothing = toolbox.dispatch(Some(ALICE), &call(json!({"category": "Food"}))).await;
        assert!(!nothing.success);
        assert!(nothing.output.starts_with("Nothing to update"));

        let missing = toolbox
            .dispatch(Some(ALICE), &call(json!({"category": "Rent", "amount": 5})))
            .await;
        assert!(!missing.success);
        assert_eq!(missing.output, "No expenses found in category 'Rent'.");
    }

    #[tokio::test]
    async fn rejected_write_leaves_every_row_untouched() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let sqlite = spendwise_store::SqliteStore::from_pool(pool.clone()).await.unwrap();
        let store: std::sync::Arc<dyn spendwise_core::expense::ExpenseStore> =
            std::sync::Arc::new(sqlite);
        store
            .register_user(&spendwise_core::expense::UserRecord {
                id: ALICE,
                username: "alice".into(),
            })
            .await
            .unwrap();
        add(&store, ALICE, 10.0, "Travel", "Bus", "2024-01-01T08:00:00Z").await;
        add(&store, ALICE, 20.0, "Travel", "Train", "2024-01-02T08:00:00Z").await;
        sqlx::query(
            "CREATE TRIGGER train_is_fixed BEFORE UPDATE ON expenses WHEN OLD.description = 'Train'
             BEGIN SELECT RAISE(ABORT, 'train fares are fixed'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let toolbox = ExpenseToolbox::new(store.clone());
        let result = toolbox
            .dispatch(Some(ALICE), &call(json!({"category": "Travel", "amount": 99})))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("train fares are fixed"));

        let amounts: Vec<f64> = store
            .list(ALICE, &ExpenseFilter::default())
            .await
            .unwrap()
            .iter()
            .map(|e| e.amount)
            .collect();
        assert_eq!(amounts, vec![10.0, 20.0]);
    }
}
