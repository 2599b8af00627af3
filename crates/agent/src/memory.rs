//! When and how a thread's history is compacted into its running summary.

use spendwise_config::AssistantConfig;
use spendwise_core::message::{Message, Role};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPolicy {
    /// Compact once retained history grows past this many messages.
    pub summary_threshold: usize,
    /// How many of the newest messages survive a compaction.
    pub retained_tail: usize,
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            summary_threshold: 6,
            retained_tail: 2,
        }
    }
}

impl From<&AssistantConfig> for MemoryPolicy {
    fn from(config: &AssistantConfig) -> Self {
        Self {
            summary_threshold: config.summary_threshold,
            retained_tail: config.retained_tail,
        }
    }
}

impl MemoryPolicy {
    pub fn should_summarize(&self, retained: usize) -> bool {
        retained > self.summary_threshold
    }

    /// Ids of the retained messages to tombstone: everything but the tail.
    pub fn prune_ids(&self, retained: &[Message]) -> Vec<String> {
        let cut = retained.len().saturating_sub(self.retained_tail);
        retained[..cut].iter().map(|m| m.id.clone()).collect()
    }
}

/// History as it can be sent to a model.
///
/// Compaction may tombstone the assistant message that requested a tool
/// while keeping its result. A tool result is only sent after the assistant
/// call it answers.
pub fn sendable_history<'a>(messages: impl IntoIterator<Item = &'a Message>) -> Vec<Message> {
    let mut requested = HashSet::new();
    let mut sendable = Vec::new();
    for message in messages {
        if message.role == Role::Tool {
            let answered = message
                .tool_call_id
                .as_deref()
                .is_some_and(|id| requested.contains(id));
            if !answered {
                continue;
            }
        }
        requested.extend(message.tool_calls.iter().map(|c| c.id.as_str()));
        sendable.push(message.clone());
    }
    sendable
}

/// The instruction appended after the history for a compaction call.
pub fn summary_instruction(existing: &str) -> String {
    if existing.is_empty() {
        "Create a summary of the conversation above:".to_string()
    } else {
        format!(
            "This is summary of the conversation to date: {existing}\n\n\
             Extend the summary by taking into account the new messages above:"
        )
    }
}
