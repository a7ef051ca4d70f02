//! Maps raw model step notifications onto the session event protocol

use crate::conversation::{ConversationStore, Message, ToolCall};
use crate::llm::RawStep;
use serde::Serialize;
use tokio::sync::mpsc;

/// Events observed by the front end. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental answer text
    TextDelta { content: String },
    /// The step's full final text
    Text { content: String },
    ToolStart { tool: ToolRef },
    ToolInputDelta {
        content: String,
        #[serde(rename = "toolId")]
        tool_id: String,
    },
    /// A fully parsed proposed call
    ToolCall { tool: ToolCall },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolRef {
    pub name: String,
    pub id: String,
}

/// Feeds deltas into the store buffers and re-emits events in arrival order.
pub struct EventNormalizer {
    events: mpsc::Sender<StreamEvent>,
    current_tool_id: Option<String>,
}

impl EventNormalizer {
    pub fn new(events: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            events,
            current_tool_id: None,
        }
    }

    /// Observe one raw step.
    ///
    /// Returns the authoritative `ai` message once the step completes. The
    /// store buffers are cleared at that point, not finalized, because the
    /// caller appends that message directly.
    pub async fn observe(&mut self, step: RawStep, store: &mut ConversationStore) -> Option<Message> {
        match step {
            RawStep::TextDelta(content) => {
                store.add_text_delta(&content);
                self.emit(StreamEvent::TextDelta { content }).await;
                None
            }
            RawStep::ToolUseStart { id, name } => {
                self.current_tool_id = Some(id.clone());
                self.emit(StreamEvent::ToolStart {
                    tool: ToolRef { name, id },
                })
                .await;
                None
            }
            RawStep::ToolInputDelta(content) => {
                store.add_tool_call_delta(&content);
                let tool_id = self.current_tool_id.clone().unwrap_or_default();
                self.emit(StreamEvent::ToolInputDelta { content, tool_id }).await;
                None
            }
            RawStep::Completed(response) => {
                let text = response.text();
                let message = response.into_message();

                if !text.is_empty() {
                    self.emit(StreamEvent::Text { content: text }).await;
                }
                for call in &message.tool_calls {
                    self.emit(StreamEvent::ToolCall { tool: call.clone() }).await;
                }

                store.clear_buffers();
                self.current_tool_id = None;
                Some(message)
            }
        }
    }

    async fn emit(&self, event: StreamEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }
}
