//! Per-request execution context.

use crate::expense::UserId;
use crate::thread::ThreadId;

/// Everything a turn needs to know about who is asking.
///
/// Built once per inbound request and passed by reference into the turn
/// controller and every tool call. Dropped when the request ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnContext {
    pub caller: Option<UserId>,
    pub thread_id: ThreadId,
}

impl TurnContext {
    pub fn new(caller: Option<UserId>, thread_id: ThreadId) -> Self {
        Self { caller, thread_id }
    }

    /// Context for `caller` on their default or named thread.
    pub fn for_caller(caller: Option<UserId>, thread: Option<&str>) -> Self {
        Self {
            caller,
            thread_id: ThreadId::for_user(caller, thread),
        }
    }
}
