//! Expense tools for the Spendwise assistant.
//!
//! The assistant can call four tools:
//! - `get_expenses`: filtered listing with a total
//! - `create_expense`: record a new expense dated now
//! - `update_expenses`: patch every expense in a category
//! - `delete_expenses`: remove every expense in a category
//!
//! [`ExpenseTool`] maps tool names to their schemas; [`ExpenseToolbox`]
//! decodes arguments into typed structs and runs them for an explicit caller.
//! Dispatch never fails: problems come back as failure [`ToolResult`]s that
//! the model can read.

pub mod create;
pub mod dates;
pub mod delete;
pub mod query;
pub mod update;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use spendwise_core::error::StoreError;
use spendwise_core::expense::{ExpenseStore, UserId};
use spendwise_core::provider::ToolDefinition;
use spendwise_core::tool::{ToolCall, ToolResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub use create::CreateExpenseArgs;
pub use delete::DeleteExpensesArgs;
pub use query::GetExpensesArgs;
pub use update::UpdateExpensesArgs;

/// Message returned when a tool runs without an authenticated caller.
pub const MISSING_IDENTITY: &str = "User ID is missing.";

/// Message returned when the caller is not a known user.
pub const UNKNOWN_USER: &str = "User not found.";

/// The tools the assistant may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpenseTool {
    GetExpenses,
    CreateExpense,
    UpdateExpenses,
    DeleteExpenses,
}

impl ExpenseTool {
    pub const ALL: [ExpenseTool; 4] = [
        ExpenseTool::GetExpenses,
        ExpenseTool::CreateExpense,
        ExpenseTool::UpdateExpenses,
        ExpenseTool::DeleteExpenses,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExpenseTool::GetExpenses => "get_expenses",
            ExpenseTool::CreateExpense => "create_expense",
            ExpenseTool::UpdateExpenses => "update_expenses",
            ExpenseTool::DeleteExpenses => "delete_expenses",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            ExpenseTool::GetExpenses => query::DESCRIPTION,
            ExpenseTool::CreateExpense => create::DESCRIPTION,
            ExpenseTool::UpdateExpenses => update::DESCRIPTION,
            ExpenseTool::DeleteExpenses => delete::DESCRIPTION,
        }
    }

    /// JSON Schema for the tool's arguments.
    pub fn parameters_schema(self) -> serde_json::Value {
        match self {
            ExpenseTool::GetExpenses => query::schema(),
            ExpenseTool::CreateExpense => create::schema(),
            ExpenseTool::UpdateExpenses => update::schema(),
            ExpenseTool::DeleteExpenses => delete::schema(),
        }
    }

    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// What a tool hands back on success: text for the model plus optional data.
#[derive(Debug)]
pub struct Reply {
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl Reply {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Tool outcome; `Err` holds the message sent back as a failure result.
pub type Outcome = Result<Reply, String>;

/// Runs expense tools against a store on behalf of an explicit caller.
#[derive(Clone)]
pub struct ExpenseToolbox {
    store: Arc<dyn ExpenseStore>,
    fixed_now: Option<DateTime<Utc>>,
}

impl ExpenseToolbox {
    pub fn new(store: Arc<dyn ExpenseStore>) -> Self {
        Self {
            store,
            fixed_now: None,
        }
    }

    /// Pin the clock used for relative dates and new expense timestamps.
    pub fn with_fixed_now(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    pub fn store(&self) -> &Arc<dyn ExpenseStore> {
        &self.store
    }

    fn now(&self) -> DateTime<Utc> {
        self.fixed_now.unwrap_or_else(Utc::now)
    }

    /// Definitions for every tool, in a stable order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        ExpenseTool::ALL.into_iter().map(ExpenseTool::definition).collect()
    }

    /// Execute one call. Always yields a result carrying the call's id.
    pub async fn dispatch(&self, caller: Option<UserId>, call: &ToolCall) -> ToolResult {
        let started = Instant::now();
        let outcome = self.run(caller, call).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(reply) => {
                debug!(tool = %call.name, elapsed_ms, "Tool succeeded");
                let result = ToolResult::success(&call.id, reply.message);
                match reply.data {
                    Some(data) => result.with_data(data),
                    None => result,
                }
            }
            Err(message) => {
                warn!(tool = %call.name, elapsed_ms, error = %message, "Tool failed");
                ToolResult::failure(&call.id, message)
            }
        }
    }

    async fn run(&self, caller: Option<UserId>, call: &ToolCall) -> Outcome {
        let tool = ExpenseTool::from_name(&call.name)
            .ok_or_else(|| format!("Unknown tool '{}'.", call.name))?;
        let Some(user) = caller else {
            return Err(MISSING_IDENTITY.to_string());
        };

        let store = self.store.as_ref();
        let now = self.now();
        match tool {
            ExpenseTool::GetExpenses => query::run(store, user, decode(tool, call)?, now).await,
            ExpenseTool::CreateExpense => create::run(store, user, decode(tool, call)?, now).await,
            ExpenseTool::UpdateExpenses => update::run(store, user, decode(tool, call)?, now).await,
            ExpenseTool::DeleteExpenses => delete::run(store, user, decode(tool, call)?).await,
        }
    }
}

fn decode<T: DeserializeOwned>(tool: ExpenseTool, call: &ToolCall) -> Result<T, String> {
    let arguments = match &call.arguments {
        serde_json::Value::Null => serde_json::json!({}),
        other => other.clone(),
    };
    serde_json::from_value(arguments)
        .map_err(|e| format!("Invalid arguments for {}: {e}", tool.name()))
}

/// Fails with [`UNKNOWN_USER`] unless the store knows `user`.
pub(crate) async fn ensure_user(store: &dyn ExpenseStore, user: UserId) -> Result<(), String> {
    match store.user_exists(user).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(UNKNOWN_USER.to_string()),
        Err(e) => Err(store_error_message(&e)),
    }
}

pub(crate) fn store_error_message(err: &StoreError) -> String {
    match err {
        StoreError::UnknownUser(_) => UNKNOWN_USER.to_string(),
        StoreError::Invalid(reason) => format!("Invalid expense: {reason}."),
        other => other.to_string(),
    }
}

/// Accepts `50`, `50.5` or `"50.50"` / `"$50"`; models are not consistent.
pub(crate) fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => {
            let cleaned: String = s.trim().trim_start_matches('$').replace(',', "");
            cleaned
                .parse::<f64>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("'{s}' is not a number")))
        }
    }
}

/// Treats blank strings as absent.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
pub(crate) mod test_support {
    use spendwise_core::expense::{ExpenseStore, NewExpense, UserId, UserRecord};
    use spendwise_store::InMemoryStore;
    use std::sync::Arc;

    pub const ALICE: UserId = UserId(1);
    pub const BOB: UserId = UserId(2);

    pub async fn seeded_store() -> Arc<dyn ExpenseStore> {
        let store: Arc<dyn ExpenseStore> = Arc::new(InMemoryStore::new());
        for (id, name) in [(ALICE, "alice"), (BOB, "bob")] {
            store
                .register_user(&UserRecord { id, username: name.into() })
                .await
                .unwrap();
        }
        store
    }

    pub async fn add(
        store: &Arc<dyn ExpenseStore>,
        user: UserId,
        amount: f64,
        category: &str,
        description: &str,
        date: &str,
    ) {
        let date = chrono::DateTime::parse_from_rfc3339(date).unwrap().to_utc();
        store
            .create(
                user,
                NewExpense {
                    amount,
                    category: category.into(),
                    description: description.into(),
                    date,
                },
            )
            .await
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use serde_json::json;

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments,
        }
    }

    #[test]
    fn names_round_trip() {
        for tool in ExpenseTool::ALL {
            assert_eq!(ExpenseTool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(ExpenseTool::from_name("shell"), None);
    }

    #[test]
    fn schemas_are_objects_with_required_fields() {
        let create = ExpenseTool::CreateExpense.parameters_schema();
        assert_eq!(create["type"], "object");
        assert_eq!(create["required"], json!(["amount", "category"]));
        let delete = ExpenseTool::DeleteExpenses.parameters_schema();
        assert_eq!(delete["required"], json!(["category"]));
        let query = ExpenseTool::GetExpenses.parameters_schema();
        assert!(query["properties"]["description_keyword"].is_object());
    }

    #[tokio::test]
    async fn definitions_cover_all_tools() {
        let toolbox = ExpenseToolbox::new(seeded_store().await);
        let names: Vec<_> = toolbox.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec!["get_expenses", "create_expense", "update_expenses", "delete_expenses"]
        );
    }

    #[tokio::test]
    async fn missing_identity_is_structured_error() {
        let toolbox = ExpenseToolbox::new(seeded_store().await);
        for tool in ExpenseTool::ALL {
            let result = toolbox
                .dispatch(None, &call(tool.name(), json!({"category": "Food", "amount": 1})))
                .await;
            assert!(!result.success);
            assert_eq!(result.output, MISSING_IDENTITY);
            assert_eq!(result.call_id, "call_1");
        }
    }

    #[tokio::test]
    async fn unknown_user_is_reported() {
        let toolbox = ExpenseToolbox::new(seeded_store().await);
        let result = toolbox
            .dispatch(Some(UserId(404)), &call("delete_expenses", json!({"category": "Food"})))
            .await;
        assert!(!result.success);
        assert_eq!(result.output, UNKNOWN_USER);
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_arguments_are_failures() {
        let toolbox = ExpenseToolbox::new(seeded_store().await);
        let unknown = toolbox.dispatch(Some(ALICE), &call("rm_rf", json!({}))).await;
        assert!(!unknown.success);
        assert!(unknown.output.contains("rm_rf"));

        let bad = toolbox
            .dispatch(Some(ALICE), &call("create_expense", json!({"category": "Food"})))
            .await;
        assert!(!bad.success);
        assert!(bad.output.starts_with("Invalid arguments for create_expense"));

        let garbage = toolbox
            .dispatch(Some(ALICE), &call("get_expenses", json!("{not json")))
            .await;
        assert!(!garbage.success);
    }

    #[test]
    fn lenient_amount_accepts_strings() {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(default, deserialize_with = "lenient_amount")]
            amount: Option<f64>,
        }
        let p: Probe = serde_json::from_value(json!({"amount": "$1,250.50"})).unwrap();
        assert_eq!(p.amount, Some(1250.5));
        let p: Probe = serde_json::from_value(json!({"amount": 7})).unwrap();
        assert_eq!(p.amount, Some(7.0));
        let p: Probe = serde_json::from_value(json!({})).unwrap();
        assert_eq!(p.amount, None);
        assert!(serde_json::from_value::<Probe>(json!({"amount": "lots"})).is_err());
    }
}
