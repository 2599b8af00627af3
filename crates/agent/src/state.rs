//! Turn state machine.
//!
//! ```text
//! Start ──▶ Assistant ──(tool calls)──▶ ToolDispatch ──▶ Assistant
//!               │
//!               ├──(retained > threshold)──▶ Summarize ──▶ End
//!               └──────────────────────────────────────────▶ End
//! ```
//!
//! [`next_state`] is pure so every edge can be checked without a model.

use crate::memory::MemoryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Start,
    Assistant,
    ToolDispatch,
    Summarize,
    End,
}

/// What just happened in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The turn has its user message.
    Begin,
    /// The model answered.
    Replied {
        requested_tools: bool,
        /// Retained messages including the reply.
        retained: usize,
    },
    /// Every requested tool call has a result.
    ToolsDone,
    /// The summary was written and old messages pruned.
    Summarized,
}

pub fn next_state(state: TurnState, signal: Signal, policy: &MemoryPolicy) -> Option<TurnState> {
    match (state, signal) {
        (TurnState::Start, Signal::Begin) => Some(TurnState::Assistant),
        (
            TurnState::Assistant,
            Signal::Replied {
                requested_tools,
                retained,
            },
        ) => Some(if requested_tools {
            TurnState::ToolDispatch
        } else if policy.should_summarize(retained) {
            TurnState::Summarize
        } else {
            TurnState::End
        }),
        (TurnState::ToolDispatch, Signal::ToolsDone) => Some(TurnState::Assistant),
        (TurnState::Summarize, Signal::Summarized) => Some(TurnState::End),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATES: [TurnState; 5] = [
        TurnState::Start,
        TurnState::Assistant,
        TurnState::ToolDispatch,
        TurnState::Summarize,
        TurnState::End,
    ];

    fn replied(requested_tools: bool, retained: usize) -> Signal {
        Signal::Replied {
            requested_tools,
            retained,
        }
    }

    fn signals() -> Vec<Signal> {
        vec![
            Signal::Begin,
            replied(false, 1),
            replied(true, 1),
            replied(false, 7),
            Signal::ToolsDone,
            Signal::Summarized,
        ]
    }

    #[test]
    fn legal_edges() {
        let p = MemoryPolicy::default();
        assert_eq!(next_state(TurnState::Start, Signal::Begin, &p), Some(TurnState::Assistant));
        assert_eq!(
            next_state(TurnState::Assistant, replied(true, 3), &p),
            Some(TurnState::ToolDispatch)
        );
        assert_eq!(
            next_state(TurnState::Assistant, replied(false, 3), &p),
            Some(TurnState::End)
        );
        assert_eq!(
            next_state(TurnState::Assistant, replied(false, 7), &p),
            Some(TurnState::Summarize)
        );
        assert_eq!(
            next_state(TurnState::ToolDispatch, Signal::ToolsDone, &p),
            Some(TurnState::Assistant)
        );
        assert_eq!(
            next_state(TurnState::Summarize, Signal::Summarized, &p),
            Some(TurnState::End)
        );
    }

    #[test]
    fn tool_calls_win_over_summarization() {
        let p = MemoryPolicy::default();
        assert_eq!(
            next_state(TurnState::Assistant, replied(true, 50), &p),
            Some(TurnState::ToolDispatch)
        );
    }

    #[test]
    fn threshold_is_exclusive() {
        let p = MemoryPolicy::default();
        assert_eq!(next_state(TurnState::Assistant, replied(false, 6), &p), Some(TurnState::End));
        let tight = MemoryPolicy {
            summary_threshold: 2,
            retained_tail: 1,
        };
        assert_eq!(
            next_state(TurnState::Assistant, replied(false, 3), &tight),
            Some(TurnState::Summarize)
        );
    }

    #[test]
    fn every_other_pair_is_rejected() {
        let p = MemoryPolicy::default();
        let legal = |s: TurnState, sig: Signal| {
            matches!(
                (s, sig),
                (TurnState::Start, Signal::Begin)
                    | (TurnState::Assistant, Signal::Replied { .. })
                    | (TurnState::ToolDispatch, Signal::ToolsDone)
                    | (TurnState::Summarize, Signal::Summarized)
            )
        };
        for state in STATES {
            for signal in signals() {
                let next = next_state(state, signal, &p);
                assert_eq!(next.is_some(), legal(state, signal), "{state:?} on {signal:?}");
            }
        }
    }

    #[test]
    fn end_is_terminal() {
        let p = MemoryPolicy::default();
        assert!(signals().into_iter().all(|s| next_state(TurnState::End, s, &p).is_none()));
    }
}
