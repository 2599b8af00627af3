//! The Spendwise turn controller.
//!
//! One turn takes a user message through the [`TurnState`] machine:
//!
//! 1. **Assistant**: send the persona, running summary and retained history
//!    to the model with the four expense tools bound
//! 2. **ToolDispatch**: run every requested call for the turn's caller and
//!    feed the results back to the model
//! 3. **Summarize**: once history outgrows the [`MemoryPolicy`], fold it into
//!    the summary and prune all but the newest messages
//!
//! The caller's identity travels in the [`TurnContext`] passed to
//! [`TurnController::run`]; nothing about it outlives the call.
//!
//! [`TurnContext`]: spendwise_core::TurnContext

pub mod error;
pub mod memory;
pub mod prompt;
pub mod state;
pub mod turn;

#[cfg(test)]
mod test_helpers;

pub use error::AgentError;
pub use memory::MemoryPolicy;
pub use state::{Signal, TurnState, next_state};
pub use turn::{TurnController, TurnOutcome};
