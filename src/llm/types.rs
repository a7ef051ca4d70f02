//! Common types for LLM interactions

use crate::conversation::{ContentPart, Message, MessageContent, ToolCall};
use serde_json::Value;

/// LLM request
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: Vec<SystemContent>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
}

/// System prompt content
#[derive(Debug, Clone)]
pub struct SystemContent {
    pub text: String,
    pub cache: bool,
}

impl SystemContent {
    #[allow(dead_code)] // Constructor for API completeness
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cache: false,
        }
    }

    pub fn cached(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cache: true,
        }
    }
}

/// Tool definition
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// LLM response
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: Vec<ContentPart>,
    pub end_turn: bool,
    pub usage: Usage,
}

impl LlmResponse {
    /// Extract all tool use requests from the response
    pub fn tool_uses(&self) -> Vec<(&str, &str, &Value)> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }

    /// Get text content from the response
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Convert into the `ai` message appended to the history.
    ///
    /// Text is trimmed. With tool uses the content keeps the structured
    /// parts next to `tool_calls`; a non-object input becomes empty args.
    pub fn into_message(self) -> Message {
        let text = self.text().trim().to_string();
        let tool_calls: Vec<ToolCall> = self
            .tool_uses()
            .into_iter()
            .map(|(id, name, input)| {
                ToolCall::new(id, name, input.as_object().cloned().unwrap_or_default())
            })
            .collect();

        if tool_calls.is_empty() {
            return Message::ai(text);
        }

        let mut parts = Vec::with_capacity(self.content.len());
        if !text.is_empty() {
            parts.push(ContentPart::text(text));
        }
        parts.extend(
            self.content
                .into_iter()
                .filter(|part| matches!(part, ContentPart::ToolUse { .. })),
        );
        Message::ai_with_tool_calls(MessageContent::Parts(parts), tool_calls)
    }
}

/// Usage statistics
#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

/// Raw notification from a streaming model step.
///
/// Provider-specific wire events are mapped onto this before they reach the
/// runtime.
#[derive(Debug, Clone)]
pub enum RawStep {
    TextDelta(String),
    ToolUseStart { id: String, name: String },
    /// Partial JSON arguments of the most recently started tool use
    ToolInputDelta(String),
    Completed(LlmResponse),
}
