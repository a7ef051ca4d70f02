//! Turn-level errors

use crate::conversation::Role;
use crate::llm::LlmError;

/// Why a turn stopped before the model produced a final answer
#[derive(Debug, Clone, thiserror::Error)]
pub enum TurnError {
    /// Cooperative cancellation; never reported as a failure
    #[error("turn interrupted")]
    Interrupted,
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
}

impl TurnError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, TurnError::Interrupted)
    }
}

/// Caller broke the dispatch contract. Fatal for the turn.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("tool dispatch requested on an empty conversation")]
    NoMessage,
    #[error("tool dispatch requested on a {role} message")]
    NotAiMessage { role: Role },
    #[error("tool call to `{tool}` has no id")]
    MissingToolCallId { tool: String },
}
