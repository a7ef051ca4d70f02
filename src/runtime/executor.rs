//! Turn executor: alternates model steps and tool steps until the model
//! answers without tool calls

use super::dispatcher::ToolDispatcher;
use super::error::TurnError;
use super::normalizer::{EventNormalizer, StreamEvent};
use super::traits::LlmClient;
use crate::conversation::{ConversationStore, Message, Role};
use crate::llm::{LlmError, LlmRequest, SystemContent};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const MAX_TOKENS: u32 = 8192;

/// What a completed turn did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnSummary {
    pub model_steps: usize,
    pub tool_results: usize,
}

pub struct TurnExecutor<L: LlmClient + ?Sized> {
    llm: Arc<L>,
    dispatcher: ToolDispatcher,
    system_prompt: String,
    events: mpsc::Sender<StreamEvent>,
}

impl<L: LlmClient + ?Sized> TurnExecutor<L> {
    pub fn new(
        llm: Arc<L>,
        dispatcher: ToolDispatcher,
        system_prompt: String,
        events: mpsc::Sender<StreamEvent>,
    ) -> Self {
        Self {
            llm,
            dispatcher,
            system_prompt,
            events,
        }
    }

    /// Run one turn against `store`, which already holds the user's line.
    ///
    /// Provider failures and protocol violations propagate; nothing is
    /// retried here.
    pub async fn run_turn(
        &self,
        store: &mut ConversationStore,
        cancel: &CancellationToken,
    ) -> Result<TurnSummary, TurnError> {
        let mut normalizer = EventNormalizer::new(self.events.clone());
        let mut summary = TurnSummary::default();

        loop {
            if cancel.is_cancelled() {
                return Err(TurnError::Interrupted);
            }

            // Model step
            let request = self.build_request(store);
            let message = self.model_step(&request, &mut normalizer, store, cancel).await?;
            summary.model_steps += 1;

            let has_tool_calls = message.has_tool_calls();
            store.add_message(message);
            if !has_tool_calls {
                tracing::info!(
                    model_steps = summary.model_steps,
                    tool_results = summary.tool_results,
                    "Turn completed"
                );
                return Ok(summary);
            }

            // Tool step
            if cancel.is_cancelled() {
                return Err(TurnError::Interrupted);
            }
            let results = self.dispatcher.dispatch(store.last_mut(), cancel).await?;
            summary.tool_results += results.len();
            store.add_messages(results);
        }
    }

    /// Repair, read and filter the history into a provider request.
    fn build_request(&self, store: &mut ConversationStore) -> LlmRequest {
        let repaired = store.repair_dangling_tool_calls();
        if repaired > 0 {
            tracing::info!(repaired, "Cleared unanswered tool calls before model step");
        }

        let history = store.get_messages();
        let total = history.len();
        let messages: Vec<Message> = history
            .into_iter()
            .filter(belongs_in_payload)
            .collect();
        if messages.is_empty() {
            tracing::warn!(total, "Every message was filtered out of the provider payload");
        }

        LlmRequest {
            system: vec![SystemContent::cached(self.system_prompt.clone())],
            messages,
            tools: self.dispatcher.registry().definitions(),
            max_tokens: Some(MAX_TOKENS),
        }
    }

    async fn model_step(
        &self,
        request: &LlmRequest,
        normalizer: &mut EventNormalizer,
        store: &mut ConversationStore,
        cancel: &CancellationToken,
    ) -> Result<Message, TurnError> {
        let mut stream = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TurnError::Interrupted),
            opened = self.llm.stream(request) => opened?,
        };

        loop {
            let step = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TurnError::Interrupted),
                step = stream.next() => step,
            };
            let Some(step) = step else {
                return Err(LlmError::stream("Model stream ended before the step completed").into());
            };

            if let Some(message) = normalizer.observe(step?, store).await {
                return Ok(message);
            }
            if cancel.is_cancelled() {
                return Err(TurnError::Interrupted);
            }
        }
    }
}

/// Tool results stay even when empty: silent commands still answer their
/// call, and a `tool_use` without its result is rejected by providers.
fn belongs_in_payload(message: &Message) -> bool {
    message.role == Role::Tool || message.has_tool_calls() || !message.content.is_blank()
}
