//! # Spendwise Core
//!
//! Domain types, traits, and error definitions for the Spendwise expense
//! assistant. Every collaborator (model provider, expense store, conversation
//! store) is a trait here; implementations live in their own crates.

pub mod context;
pub mod error;
pub mod event;
pub mod expense;
pub mod message;
pub mod provider;
pub mod thread;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use context::TurnContext;
pub use error::{ProviderError, StoreError};
pub use event::{DomainEvent, EventBus};
pub use expense::{Expense, ExpenseFilter, ExpensePatch, ExpenseStore, NewExpense, UserId, UserRecord};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use thread::{ConversationStore, Thread, ThreadId};
pub use tool::{ToolCall, ToolResult};
