//! Tool call and result value types.
//!
//! The tool layer is total: every call yields a [`ToolResult`], success or
//! failure, which is relayed to the model as a tool message.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Build a call from the string-encoded arguments carried on an assistant
    /// message. Undecodable argument text becomes `Value::String` so the
    /// dispatcher can report it as invalid arguments.
    pub fn from_message_call(call: &crate::message::MessageToolCall) -> Self {
        let arguments = if call.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&call.arguments)
                .unwrap_or_else(|_| serde_json::Value::String(call.arguments.clone()))
        };
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        }
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// Human-readable message
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failure(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn status(&self) -> &'static str {
        if self.success { "success" } else { "error" }
    }

    /// The `{"status", "message", "data"?}` envelope sent back to the model.
    pub fn to_content(&self) -> String {
        let mut body = json!({
            "status": self.status(),
            "message": self.output,
        });
        if let Some(data) = &self.data {
            body["data"] = data.clone();
        }
        body.to_string()
    }
}
