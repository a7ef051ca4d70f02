//! In-memory conversation history with streaming buffers

use super::message::{new_message_id, Message, Role};
use std::collections::HashSet;

/// Prefix of the synthetic message materialized from a half-streamed tool call
pub const INTERRUPTED_TOOL_CALL_TAG: &str = "[interrupted tool call]";

/// Ordered, deduplicated message history of one session.
///
/// Owned by exactly one turn at a time, so no interior locking.
#[derive(Debug, Default, Clone)]
pub struct ConversationStore {
    messages: Vec<Message>,
    seen_ids: HashSet<String>,
    response_buffer: String,
    tool_call_buffer: String,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message unless its id was already seen.
    ///
    /// A message without an id gets a fresh one. Returns whether the message
    /// was inserted.
    pub fn add_message(&mut self, mut message: Message) -> bool {
        if message.id.is_empty() {
            message.id = new_message_id();
        }
        if !self.seen_ids.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn add_messages(&mut self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.add_message(message);
        }
    }

    pub fn add_text_delta(&mut self, delta: &str) {
        self.response_buffer.push_str(delta);
    }

    pub fn add_tool_call_delta(&mut self, delta: &str) {
        self.tool_call_buffer.push_str(delta);
    }

    /// Materialize any buffered content as trailing messages.
    ///
    /// Response text is committed before tool-call text; each buffer is
    /// committed and cleared on its own.
    pub fn finalize_buffers(&mut self) {
        let response = std::mem::take(&mut self.response_buffer);
        let response = response.trim();
        if !response.is_empty() {
            self.add_message(Message::ai(response));
        }

        let tool_call = std::mem::take(&mut self.tool_call_buffer);
        let tool_call = tool_call.trim();
        if !tool_call.is_empty() {
            tracing::debug!(bytes = tool_call.len(), "Materializing interrupted tool call");
            self.add_message(Message::ai(format!("{INTERRUPTED_TOOL_CALL_TAG} {tool_call}")));
        }
    }

    /// Discard buffered content. Used once the authoritative message for a
    /// step has been appended.
    pub fn clear_buffers(&mut self) {
        self.response_buffer.clear();
        self.tool_call_buffer.clear();
    }

    /// Snapshot of the history, finalizing buffers first.
    pub fn get_messages(&mut self) -> Vec<Message> {
        self.finalize_buffers();
        self.messages.clone()
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.seen_ids.clear();
        self.clear_buffers();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_mut(&mut self) -> Option<&mut Message> {
        self.messages.last_mut()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn response_buffer(&self) -> &str {
        &self.response_buffer
    }

    pub fn tool_call_buffer(&self) -> &str {
        &self.tool_call_buffer
    }

    /// Clear tool calls that were never answered.
    ///
    /// An `ai` message whose calls are not all followed by a `tool` message
    /// with the matching id loses its `tool_calls` and every non-text part.
    /// This covers an interrupted trailing message as well as one that a
    /// later human message has already been appended after. Returns the
    /// number of repaired messages.
    pub fn repair_dangling_tool_calls(&mut self) -> usize {
        let mut answered: HashSet<&str> = HashSet::new();
        let mut dangling = Vec::new();

        for (index, message) in self.messages.iter().enumerate().rev() {
            match message.role {
                Role::Tool => {
                    if let Some(id) = message.tool_call_id.as_deref() {
                        answered.insert(id);
                    }
                }
                Role::Ai if message.has_tool_calls() => {
                    let complete = message
                        .tool_calls
                        .iter()
                        .all(|call| answered.contains(call.id.as_str()));
                    if !complete {
                        dangling.push(index);
                    }
                }
                Role::Ai | Role::Human => {}
            }
        }

        for &index in &dangling {
            let message = &mut self.messages[index];
            tracing::info!(
                message_id = %message.id,
                calls = message.tool_calls.len(),
                "Repairing unanswered tool calls"
            );
            message.tool_calls.clear();
            message.content.strip_non_text();
        }

        dangling.len()
    }
}
