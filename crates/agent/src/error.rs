//! Turn-level errors.

use crate::state::{Signal, TurnState};
use spendwise_core::error::{ProviderError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Model call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Conversation store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Exceeded {0} model round-trips in one turn")]
    IterationLimit(usize),

    /// History was saved but could not be compacted; the old summary stands.
    #[error("Summarization failed: {0}")]
    Summarization(ProviderError),

    #[error("No transition from {state:?} on {signal:?}")]
    InvalidTransition { state: TurnState, signal: Signal },

    #[error("Query is empty")]
    EmptyQuery,
}
