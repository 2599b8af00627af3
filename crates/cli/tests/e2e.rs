//! End-to-end tests: config file → SQLite store → turn controller → HTTP API,
//! with a scripted model in place of the hosted provider.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use spendwise_agent::TurnController;
use spendwise_config::AppConfig;
use spendwise_core::error::ProviderError;
use spendwise_core::event::EventBus;
use spendwise_core::expense::{Expense, UserId, UserRecord};
use spendwise_core::message::{Message, MessageToolCall, Role};
use spendwise_core::provider::{Provider, ProviderRequest, ProviderResponse};
use spendwise_core::thread::ThreadId;
use spendwise_gateway::GatewayState;
use spendwise_store::Stores;
use spendwise_tools::ExpenseToolbox;
use tower::ServiceExt;

// ── Scripted provider ────────────────────────────────────────────────────

struct ScriptedProvider {
    script: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(script: Vec<ProviderResponse>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 500,
                message: "script exhausted".into(),
            })
    }
}

fn text(content: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(content),
        usage: None,
        model: "scripted".into(),
    }
}

fn tool(name: &str, args: Value) -> ProviderResponse {
    let mut message = Message::assistant("");
    message.tool_calls = vec![MessageToolCall {
        id: format!("call_{name}"),
        name: name.into(),
        arguments: args.to_string(),
    }];
    ProviderResponse {
        message,
        usage: None,
        model: "scripted".into(),
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

fn write_config(dir: &tempfile::TempDir) -> AppConfig {
    let db = dir.path().join("spendwise.db");
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!(
            r#"
provider = "gemini"
model = "gemini-1.5-flash"
api_key = "test-key"

[database]
url = "sqlite://{}"

[[users]]
id = 1
username = "alice"
token = "alice-token"

[[users]]
id = 2
username = "bob"
token = "bob-token"
"#,
            db.display()
        ),
    )
    .unwrap();
    AppConfig::load_from(&path).unwrap()
}

async fn open_stores(config: &AppConfig) -> Stores {
    let stores = spendwise_store::open(&config.database.url).await.unwrap();
    for user in &config.users {
        stores
            .expenses
            .register_user(&UserRecord {
                id: UserId(user.id),
                username: user.username.clone(),
            })
            .await
            .unwrap();
    }
    stores
}

fn app(config: &AppConfig, stores: &Stores, provider: Arc<ScriptedProvider>) -> Router {
    let controller = TurnController::from_config(
        config,
        provider,
        ExpenseToolbox::new(stores.expenses.clone()),
        stores.conversations.clone(),
        Arc::new(EventBus::default()),
    );
    spendwise_gateway::build_router(Arc::new(GatewayState::new(
        config,
        stores.expenses.clone(),
        Arc::new(controller),
    )))
}

async fn call(app: &Router, method: &str, uri: &str, token: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"));
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_assistant_records_queries_and_summarizes() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir);
    let stores = open_stores(&config).await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool(
            "create_expense",
            json!({"amount": "50", "category": "Food", "description": "Groceries"}),
        ),
        text("Expense for groceries costing $50 has been added successfully."),
        tool("get_expenses", json!({"category": "food"})),
        text("You spent $50.00 on food."),
        text("Alice logged $50 of groceries and asked about food spending."),
    ]));
    let app = app(&config, &stores, provider.clone());

    let (status, body) = call(
        &app,
        "POST",
        "/agents/query",
        "alice-token",
        Some(json!({"messages": "Create an expense for groceries costing $50."})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["response"],
        "Expense for groceries costing $50 has been added successfully."
    );
    assert_eq!(body["thread_id"], "user-1");

    let (_, body) = call(&app, "GET", "/expenses", "alice-token", None).await;
    let expenses: Vec<Expense> = serde_json::from_value(body).unwrap();
    assert_eq!(expenses.len(), 1);
    assert_eq!(expenses[0].amount, 50.0);
    assert_eq!(expenses[0].category, "Food");
    assert_eq!(expenses[0].user_id, UserId(1));

    let (_, body) = call(&app, "GET", "/expenses", "bob-token", None).await;
    assert_eq!(body, json!([]));

    let (status, body) = call(
        &app,
        "POST",
        "/agents/query",
        "alice-token",
        Some(json!({"messages": "How much did I spend on food?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "You spent $50.00 on food.");

    // The query tool's result reached the model.
    let requests = provider.requests();
    let tool_result = requests[3].messages.last().unwrap();
    assert_eq!(tool_result.role, Role::Tool);
    assert!(tool_result.content.contains("Total: $50.00"));

    // Eight retained messages triggered a compaction without tools.
    assert_eq!(requests.len(), 5);
    assert!(requests[4].tools.is_empty());

    let (_, thread) = call(&app, "GET", "/agents/thread", "alice-token", None).await;
    assert_eq!(
        thread["summary"],
        "Alice logged $50 of groceries and asked about food spending."
    );
    let retained = thread["messages"].as_array().unwrap();
    assert_eq!(retained.len(), 2);
    assert_eq!(retained[1]["content"], "You spent $50.00 on food.");
}

#[tokio::test]
async fn e2e_thread_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir);

    {
        let stores = open_stores(&config).await;
        let provider = Arc::new(ScriptedProvider::new(vec![text("Noted.")]));
        let app = app(&config, &stores, provider);
        let (status, _) = call(
            &app,
            "POST",
            "/agents/query",
            "bob-token",
            Some(json!({"messages": "Remember I'm saving for a bike", "thread_id": "goals"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let stores = open_stores(&config).await;
    let thread = stores
        .conversations
        .load(&ThreadId::new("user-2/goals"))
        .await
        .unwrap();
    let contents: Vec<_> = thread.retained().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["Remember I'm saving for a bike", "Noted."]);

    // The next turn sends the persisted history back to the model.
    let provider = Arc::new(ScriptedProvider::new(vec![text("Still saving!")]));
    let app = app(&config, &stores, provider.clone());
    call(
        &app,
        "POST",
        "/agents/query",
        "bob-token",
        Some(json!({"messages": "What am I saving for?", "thread_id": "goals"})),
    )
    .await;
    let sent = &provider.requests()[0].messages;
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[1].content, "Remember I'm saving for a bike");
}

#[tokio::test]
async fn e2e_tools_reject_unknown_categories_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir);
    let stores = open_stores(&config).await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool("delete_expenses", json!({"category": "Travel"})),
        text("You have no Travel expenses to delete."),
    ]));
    let app = app(&config, &stores, provider.clone());

    call(
        &app,
        "POST",
        "/expenses",
        "alice-token",
        Some(json!({"amount": 12.0, "category": "Food"})),
    )
    .await;
    let (status, _) = call(
        &app,
        "POST",
        "/agents/query",
        "alice-token",
        Some(json!({"messages": "Delete all my travel expenses"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let tool_result = provider.requests()[1].messages.last().unwrap().clone();
    let envelope: Value = serde_json::from_str(&tool_result.content).unwrap();
    assert_eq!(envelope["status"], "error");
    assert_eq!(envelope["message"], "No expenses found in category 'Travel'.");

    let (_, body) = call(&app, "GET", "/expenses", "alice-token", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[test]
fn e2e_default_config_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, AppConfig::default_toml()).unwrap();
    let config = AppConfig::load_from(&path).unwrap();
    assert_eq!(config.provider, "gemini");
    assert_eq!(config.assistant.summary_threshold, 6);
    assert_eq!(config.users.len(), 1);
}
