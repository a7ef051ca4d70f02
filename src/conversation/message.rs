//! Message types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Ai => "ai",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed part of a structured message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        media_type: String,
        data: String,
    },
    /// Structured twin of an entry in `Message::tool_calls`
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    Other {
        data: Value,
    },
}

impl ContentPart {
    pub fn text(s: impl Into<String>) -> Self {
        ContentPart::Text { text: s.into() }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ContentPart::Text { .. })
    }
}

/// Message body: plain text or an ordered sequence of parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

impl MessageContent {
    /// Concatenated text of the body, ignoring non-text parts
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// True when there is nothing but whitespace to show a model.
    pub fn is_blank(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.trim().is_empty(),
            MessageContent::Parts(parts) => parts.iter().all(|part| match part {
                ContentPart::Text { text } => text.trim().is_empty(),
                _ => false,
            }),
        }
    }

    pub fn has_non_text_parts(&self) -> bool {
        match self {
            MessageContent::Text(_) => false,
            MessageContent::Parts(parts) => parts.iter().any(|part| !part.is_text()),
        }
    }

    /// Drop image, tool-use and other non-text parts in place.
    pub fn strip_non_text(&mut self) {
        if let MessageContent::Parts(parts) = self {
            parts.retain(ContentPart::is_text);
        }
    }

    /// Rewrite the input of the `ToolUse` part with the given id.
    ///
    /// Returns false when no such part exists.
    pub fn set_tool_use_input(&mut self, tool_use_id: &str, new_input: Value) -> bool {
        let MessageContent::Parts(parts) = self else {
            return false;
        };
        for part in parts.iter_mut() {
            if let ContentPart::ToolUse { id, input, .. } = part {
                if id == tool_use_id {
                    *input = new_input;
                    return true;
                }
            }
        }
        false
    }
}

/// A call proposed by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// One conversational artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Empty until the store assigns one
    #[serde(default)]
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    /// Only on `ai` messages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Only on `tool` messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Message {
    fn new(role: Role, content: MessageContent) -> Self {
        Self {
            id: new_message_id(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
        }
    }

    pub fn human(text: impl Into<String>) -> Self {
        Self::new(Role::Human, MessageContent::Text(text.into()))
    }

    pub fn ai(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Ai, content.into())
    }

    pub fn ai_with_tool_calls(content: impl Into<MessageContent>, tool_calls: Vec<ToolCall>) -> Self {
        let mut message = Self::new(Role::Ai, content.into());
        message.tool_calls = tool_calls;
        message
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        content: impl Into<MessageContent>,
        is_error: bool,
    ) -> Self {
        let mut message = Self::new(Role::Tool, content.into());
        message.tool_call_id = Some(tool_call_id.into());
        message.is_error = is_error;
        message
    }

    /// Drop the id so the store assigns a fresh one on insert.
    #[must_use]
    pub fn without_id(mut self) -> Self {
        self.id.clear();
        self
    }

    pub fn text(&self) -> String {
        self.content.text()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

pub(super) fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
