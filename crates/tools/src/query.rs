//! `get_expenses`: list the caller's expenses with optional filters.

use crate::{Outcome, Reply, dates, ensure_user, non_blank, store_error_message};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use spendwise_core::expense::{ExpenseFilter, ExpenseStore, UserId};
use tracing::debug;

pub(crate) const DESCRIPTION: &str = "Retrieve the user's expenses, optionally filtered by category, \
date range and a keyword in the description, together with the total amount. Dates may be written \
in natural language such as '1 January', 'last week' or '2024-01-31'.";

pub(crate) const NOTHING_FOUND: &str = "No expenses found with the specified criteria.";

#[derive(Debug, Default, Deserialize)]
pub struct GetExpensesArgs {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub description_keyword: Option<String>,
}

pub(crate) fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "category": {
                "type": "string",
                "description": "Category to filter by (partial, case-insensitive), e.g. 'Travel'"
            },
            "start_date": {
                "type": "string",
                "description": "Earliest date to include, e.g. '1 January'"
            },
            "end_date": {
                "type": "string",
                "description": "Latest date to include, e.g. '25 January'"
            },
            "description_keyword": {
                "type": "string",
                "description": "Keyword that must appear in the description"
            }
        }
    })
}

fn bound(
    raw: Option<String>,
    label: &str,
    now: DateTime<Utc>,
) -> Result<Option<dates::ParsedDate>, String> {
    match non_blank(raw) {
        None => Ok(None),
        Some(text) => dates::parse(&text, now).map(Some).ok_or_else(|| {
            format!("Error: Unable to parse the {label} date '{text}'. Please use a valid date format.")
        }),
    }
}

pub(crate) async fn run(
    store: &dyn ExpenseStore,
    user: UserId,
    args: GetExpensesArgs,
    now: DateTime<Utc>,
) -> Outcome {
    let start = bound(args.start_date, "start", now)?;
    let end = bound(args.end_date, "end", now)?;

    let from = start.map(|d| d.start_bound());
    let to = end.map(|d| d.end_bound());
    if let (Some(from), Some(to)) = (from, to)
        && from > to
    {
        return Err("Error: Start date cannot be after end date.".into());
    }

    ensure_user(store, user).await?;

    let category = non_blank(args.category);
    let filter = ExpenseFilter {
        category_contains: category.clone(),
        description_contains: non_blank(args.description_keyword),
        from,
        to,
    };
    debug!(user = %user, ?filter, "Querying expenses");

    let expenses = store
        .list(user, &filter)
        .await
        .map_err(|e| format!("Error retrieving expenses: {}", store_error_message(&e)))?;

    if expenses.is_empty() {
        return Ok(Reply::with_data(
            NOTHING_FOUND,
            json!({ "expenses": [], "total": 0.0 }),
        ));
    }

    let total: f64 = expenses.iter().map(|e| e.amount).sum();
    let lines: Vec<String> = expenses.iter().map(|e| e.summary_line()).collect();
    let header = match &category {
        Some(c) => format!("Here are your expenses for \"{c}\":"),
        None => "Here are your expenses:".to_string(),
    };
    let message = format!("{header}\n{}\n\nTotal: ${total:.2}", lines.join("\n"));

    Ok(Reply::with_data(
        message,
        json!({ "expenses": expenses, "total": total }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExpenseToolbox;
    use crate::test_support::*;
    use chrono::TimeZone;
    use spendwise_core::tool::ToolCall;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 13, 15, 30, 0).unwrap()
    }

    async fn seeded_toolbox() -> ExpenseToolbox {
        let store = seeded_store().await;
        add(&store, ALICE, 50.0, "Food", "Groceries", "2024-01-05T09:00:00Z").await;
        add(&store, ALICE, 12.5, "Fast Food", "Burger lunch", "2024-01-20T12:00:00Z").await;
        add(&store, ALICE, 200.0, "Travel", "Flight to NYC", "2024-02-10T08:00:00Z").await;
        add(&store, BOB, 99.0, "Food", "Bob's groceries", "2024-01-06T09:00:00Z").await;
        ExpenseToolbox::new(store).with_fixed_now(now())
    }

    async fn get(toolbox: &ExpenseToolbox, args: serde_json::Value) -> spendwise_core::ToolResult {
        toolbox
            .dispatch(
                Some(ALICE),
                &ToolCall {
                    id: "c".into(),
                    name: "get_expenses".into(),
                    arguments: args,
                },
            )
            .await
    }

    #[tokio::test]
    async fn category_filter_is_case_insensitive_substring_and_scoped() {
        let toolbox = seeded_toolbox().await;
        let result = get(&toolbox, json!({"category": "food"})).await;
        assert!(result.success);
        assert!(result.output.starts_with("Here are your expenses for \"food\":"));
        let data = result.data.unwrap();
        let expenses = data["expenses"].as_array().unwrap();
        assert_eq!(expenses.len(), 2);
        assert!(expenses.iter().all(|e| e["user_id"] == 1));
        assert_eq!(data["total"], 62.5);
        assert!(result.output.ends_with("Total: $62.50"));
    }

    #[tokio::test]
    async fn lines_follow_the_listing_format() {
        let toolbox = seeded_toolbox().await;
        let result = get(&toolbox, json!({"category": "Travel"})).await;
        assert!(result.output.contains(
            "| Description: Flight to NYC | Amount: $200.00 | Category: Travel | User ID: 1 | Date: 2024-02-10"
        ));
    }

    #[tokio::test]
    async fn date_only_end_bound_includes_the_whole_day() {
        let toolbox = seeded_toolbox().await;
        let result = get(
            &toolbox,
            json!({"start_date": "1 January 2024", "end_date": "January 20, 2024"}),
        )
        .await;
        let data = result.data.unwrap();
        assert_eq!(data["expenses"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn description_keyword_filters() {
        let toolbox = seeded_toolbox().await;
        let result = get(&toolbox, json!({"description_keyword": "LUNCH"})).await;
        assert_eq!(result.data.unwrap()["expenses"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn start_after_end_is_rejected() {
        let toolbox = seeded_toolbox().await;
        let result = get(&toolbox, json!({"start_date": "2024-02-01", "end_date": "2024-01-01"})).await;
        assert!(!result.success);
        assert_eq!(result.output, "Error: Start date cannot be after end date.");
    }

    #[tokio::test]
    async fn unparseable_dates_are_named() {
        let toolbox = seeded_toolbox().await;
        let result = get(&toolbox, json!({"start_date": "whenever"})).await;
        assert!(!result.success);
        assert_eq!(
            result.output,
            "Error: Unable to parse the start date 'whenever'. Please use a valid date format."
        );
        let result = get(&toolbox, json!({"end_date": "someday"})).await;
        assert!(result.output.contains("end date 'someday'"));
    }

    #[tokio::test]
    async fn huge_relative_offsets_fail_as_unparseable() {
        let toolbox = seeded_toolbox().await;
        let result = get(&toolbox, json!({"start_date": "4000000000 days ago"})).await;
        assert!(!result.success);
        assert_eq!(
            result.output,
            "Error: Unable to parse the start date '4000000000 days ago'. Please use a valid date format."
        );
    }

    #[tokio::test]
    async fn empty_result_message() {
        let toolbox = seeded_toolbox().await;
        let result = get(&toolbox, json!({"category": "Rent"})).await;
        assert!(result.success);
        assert_eq!(result.output, NOTHING_FOUND);
    }

    #[tokio::test]
    async fn no_filters_lists_everything_for_the_caller() {
        let toolbox = seeded_toolbox().await;
        let result = get(&toolbox, json!({})).await;
        assert!(result.output.starts_with("Here are your expenses:"));
        assert_eq!(result.data.unwrap()["expenses"].as_array().unwrap().len(), 3);
    }
}
