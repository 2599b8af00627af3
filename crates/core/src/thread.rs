//! Conversation threads and the conversation store trait.

use crate::error::StoreError;
use crate::expense::UserId;
use crate::message::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque thread identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the thread for a caller. Every user gets their own namespace;
    /// a requested thread name is scoped under it.
    pub fn for_user(user: Option<UserId>, requested: Option<&str>) -> Self {
        let base = match user {
            Some(id) => format!("user-{id}"),
            None => "anonymous".to_string(),
        };
        match requested.map(str::trim).filter(|t| !t.is_empty()) {
            Some(name) => Self(format!("{base}/{name}")),
            None => Self(base),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted conversation: the full message log plus the running summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub messages: Vec<Message>,
    /// Empty until the first compaction.
    #[serde(default)]
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn new(id: ThreadId) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: Vec::new(),
            summary: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Messages that have not been pruned, in log order.
    pub fn retained(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| !m.pruned)
    }

    pub fn retained_count(&self) -> usize {
        self.retained().count()
    }
}

/// Persistence for conversation threads.
///
/// Individual calls are atomic. Nothing locks a thread across calls, so two
/// turns on the same thread interleave their appends.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    fn name(&self) -> &str;

    /// Load a thread, or an empty one if it has never been written.
    async fn load(&self, id: &ThreadId) -> Result<Thread, StoreError>;

    /// Append messages to the end of the log, creating the thread if needed.
    async fn append(&self, id: &ThreadId, messages: &[Message]) -> Result<(), StoreError>;

    /// Tombstone the given message ids. Unknown ids are ignored.
    async fn prune(&self, id: &ThreadId, message_ids: &[String]) -> Result<(), StoreError>;

    /// Overwrite the running summary.
    async fn set_summary(&self, id: &ThreadId, summary: &str) -> Result<(), StoreError>;

    /// Replace the summary and tombstone `message_ids` as one change. On error
    /// neither is applied.
    async fn compact(
        &self,
        id: &ThreadId,
        summary: &str,
        message_ids: &[String],
    ) -> Result<(), StoreError>;
}
