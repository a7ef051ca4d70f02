//! Canonical conversation state
//!
//! The message model shared by the runtime, the model providers and the
//! session front end, plus the in-memory store that owns the history of a
//! single session.

mod message;
mod store;

#[cfg(test)]
mod proptests;

pub use message::{ContentPart, Message, MessageContent, Role, ToolCall};
pub use store::{ConversationStore, INTERRUPTED_TOOL_CALL_TAG};
