//! Runs one conversational turn against a thread.

use crate::error::AgentError;
use crate::memory::{MemoryPolicy, sendable_history, summary_instruction};
use crate::prompt::{PERSONA, system_prompt};
use crate::state::{Signal, TurnState, next_state};
use chrono::Utc;
use spendwise_config::AppConfig;
use spendwise_core::context::TurnContext;
use spendwise_core::event::{DomainEvent, EventBus};
use spendwise_core::message::{Message, Role};
use spendwise_core::provider::{Provider, ProviderRequest, ProviderResponse};
use spendwise_core::thread::{ConversationStore, ThreadId};
use spendwise_core::tool::ToolCall;
use spendwise_tools::ExpenseToolbox;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives the assistant through the turn state machine.
pub struct TurnController {
    provider: Arc<dyn Provider>,
    toolbox: ExpenseToolbox,
    conversations: Arc<dyn ConversationStore>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    persona: String,
    policy: MemoryPolicy,
    /// Model round-trips allowed per turn
    max_iterations: usize,
    event_bus: Arc<EventBus>,
}

/// What a finished turn hands back to the caller.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub thread_id: ThreadId,
    pub tool_calls: usize,
    pub summarized: bool,
}

/// Working state for one turn. `pending` holds this turn's messages until
/// they are committed to the conversation store.
struct Turn {
    history: Vec<Message>,
    summary: String,
    pending: Vec<Message>,
    iterations: usize,
    tool_calls: usize,
    committed: bool,
    summarized: bool,
}

impl Turn {
    fn retained(&self) -> usize {
        self.history.len() + self.pending.len()
    }
}

impl TurnController {
    pub fn new(
        provider: Arc<dyn Provider>,
        toolbox: ExpenseToolbox,
        conversations: Arc<dyn ConversationStore>,
        model: impl Into<String>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            toolbox,
            conversations,
            model: model.into(),
            temperature: 0.3,
            max_tokens: None,
            persona: PERSONA.to_string(),
            policy: MemoryPolicy::default(),
            max_iterations: 25,
            event_bus,
        }
    }

    /// Controller with model, sampling and memory settings taken from config.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        toolbox: ExpenseToolbox,
        conversations: Arc<dyn ConversationStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let mut controller = Self::new(provider, toolbox, conversations, &config.model, event_bus)
            .with_temperature(config.temperature)
            .with_policy(MemoryPolicy::from(&config.assistant))
            .with_max_iterations(config.assistant.max_tool_iterations);
        controller.max_tokens = config.max_tokens;
        if let Some(persona) = &config.assistant.persona {
            controller.persona = persona.clone();
        }
        controller
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn with_policy(mut self, policy: MemoryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn policy(&self) -> MemoryPolicy {
        self.policy
    }

    pub fn conversations(&self) -> &Arc<dyn ConversationStore> {
        &self.conversations
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Process one user message on the context's thread.
    ///
    /// A failed model call commits nothing to the thread. Tool effects on the
    /// expense store are kept either way.
    pub async fn run(&self, ctx: &TurnContext, text: &str) -> Result<TurnOutcome, AgentError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AgentError::EmptyQuery);
        }

        let thread = self.conversations.load(&ctx.thread_id).await?;
        info!(
            thread_id = %ctx.thread_id,
            caller = ?ctx.caller,
            retained = thread.retained_count(),
            "Starting turn"
        );
        self.event_bus.publish(DomainEvent::QueryReceived {
            thread_id: ctx.thread_id.to_string(),
            user_id: ctx.caller.map(|u| u.0),
            content_preview: text.chars().take(80).collect(),
            timestamp: Utc::now(),
        });

        let mut turn = Turn {
            history: thread.retained().cloned().collect(),
            summary: thread.summary,
            pending: vec![Message::user(text)],
            iterations: 0,
            tool_calls: 0,
            committed: false,
            summarized: false,
        };

        if let Err(e) = self.drive(ctx, &mut turn).await {
            warn!(thread_id = %ctx.thread_id, error = %e, "Turn failed");
            self.event_bus.publish(DomainEvent::ErrorOccurred {
                context: format!("turn on {}", ctx.thread_id),
                error_message: e.to_string(),
                timestamp: Utc::now(),
            });
            return Err(e);
        }

        if !turn.committed {
            self.commit(ctx, &mut turn).await?;
        }

        let reply = turn
            .pending
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        info!(
            thread_id = %ctx.thread_id,
            iterations = turn.iterations,
            tool_calls = turn.tool_calls,
            summarized = turn.summarized,
            "Turn complete"
        );

        Ok(TurnOutcome {
            reply,
            thread_id: ctx.thread_id.clone(),
            tool_calls: turn.tool_calls,
            summarized: turn.summarized,
        })
    }

    async fn drive(&self, ctx: &TurnContext, turn: &mut Turn) -> Result<(), AgentError> {
        let mut state = TurnState::Start;
        loop {
            let signal = match state {
                TurnState::Start => Signal::Begin,
                TurnState::Assistant => self.call_model(ctx, turn).await?,
                TurnState::ToolDispatch => self.run_tools(ctx, turn).await,
                TurnState::Summarize => self.summarize(ctx, turn).await?,
                TurnState::End => return Ok(()),
            };
            let next = next_state(state, signal, &self.policy)
                .ok_or(AgentError::InvalidTransition { state, signal })?;
            debug!(thread_id = %ctx.thread_id, from = ?state, to = ?next, "Turn transition");
            state = next;
        }
    }

    async fn call_model(&self, ctx: &TurnContext, turn: &mut Turn) -> Result<Signal, AgentError> {
        turn.iterations += 1;
        if turn.iterations > self.max_iterations {
            warn!(
                thread_id = %ctx.thread_id,
                max = self.max_iterations,
                "Max tool iterations reached"
            );
            return Err(AgentError::IterationLimit(self.max_iterations));
        }

        let mut messages = Vec::with_capacity(turn.retained() + 1);
        messages.push(Message::system(system_prompt(&self.persona, &turn.summary)));
        messages.extend(sendable_history(turn.history.iter().chain(&turn.pending)));

        let response = self
            .provider
            .complete(ProviderRequest {
                model: self.model.clone(),
                messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: self.toolbox.definitions(),
            })
            .await?;
        self.record_usage(ctx, &response);

        let requested_tools = response.message.requests_tools();
        debug!(
            thread_id = %ctx.thread_id,
            iteration = turn.iterations,
            tool_calls = response.message.tool_calls.len(),
            "Model replied"
        );
        turn.pending.push(response.message);

        Ok(Signal::Replied {
            requested_tools,
            retained: turn.retained(),
        })
    }

    async fn run_tools(&self, ctx: &TurnContext, turn: &mut Turn) -> Signal {
        let calls = turn
            .pending
            .last()
            .map(|m| m.tool_calls.clone())
            .unwrap_or_default();

        for requested in &calls {
            let call = ToolCall::from_message_call(requested);
            let started = Instant::now();
            let result = self.toolbox.dispatch(ctx.caller, &call).await;

            self.event_bus.publish(DomainEvent::ToolExecuted {
                tool_name: call.name.clone(),
                success: result.success,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });
            turn.pending
                .push(Message::tool_result(&requested.id, result.to_content()));
            turn.tool_calls += 1;
        }

        Signal::ToolsDone
    }

    /// Commit the turn, then fold the retained history into the summary.
    ///
    /// The summary call carries no tools. If it fails the uncompacted history
    /// is already saved and the previous summary is left in place.
    async fn summarize(&self, ctx: &TurnContext, turn: &mut Turn) -> Result<Signal, AgentError> {
        self.commit(ctx, turn).await?;

        let retained: Vec<Message> = turn.history.iter().chain(&turn.pending).cloned().collect();
        let mut messages = sendable_history(&retained);
        messages.push(Message::user(summary_instruction(&turn.summary)));

        let response = self
            .provider
            .complete(ProviderRequest {
                model: self.model.clone(),
                messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: Vec::new(),
            })
            .await
            .map_err(AgentError::Summarization)?;
        self.record_usage(ctx, &response);

        let summary = response.message.content;
        let pruned = self.policy.prune_ids(&retained);
        self.conversations
            .compact(&ctx.thread_id, &summary, &pruned)
            .await?;

        info!(thread_id = %ctx.thread_id, pruned = pruned.len(), "Conversation summarized");
        self.event_bus.publish(DomainEvent::ConversationSummarized {
            thread_id: ctx.thread_id.to_string(),
            pruned: pruned.len(),
            timestamp: Utc::now(),
        });

        turn.summary = summary;
        turn.summarized = true;
        Ok(Signal::Summarized)
    }

    async fn commit(&self, ctx: &TurnContext, turn: &mut Turn) -> Result<(), AgentError> {
        self.conversations
            .append(&ctx.thread_id, &turn.pending)
            .await?;
        turn.committed = true;
        Ok(())
    }

    fn record_usage(&self, ctx: &TurnContext, response: &ProviderResponse) {
        if let Some(usage) = &response.usage {
            self.event_bus.publish(DomainEvent::ResponseGenerated {
                thread_id: ctx.thread_id.to_string(),
                model: response.model.clone(),
                tokens_used: usage.total_tokens,
                timestamp: Utc::now(),
            });
        }
    }
}
