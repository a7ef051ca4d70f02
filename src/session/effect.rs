//! Effects produced by session transitions

use super::event::SessionOutput;

/// Side effects to be executed by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append `line` as a human message and run a turn. With `reconnect`,
    /// provider and tool connections are re-established first.
    StartTurn { line: String, reconnect: bool },

    /// Trigger the in-flight turn's cancellation token
    CancelTurn,

    /// Deliver `InterruptWindowElapsed { generation }` after the window
    ArmInterruptReset { generation: u64 },

    /// Convert partial streamed content into durable messages
    FinalizeBuffers,

    Notify(SessionOutput),

    /// Stop the in-flight turn, flush the conversation and exit
    Shutdown,
}

impl Effect {
    pub fn start_turn(line: impl Into<String>, reconnect: bool) -> Self {
        Effect::StartTurn {
            line: line.into(),
            reconnect,
        }
    }

    pub fn notify_error(message: impl Into<String>) -> Self {
        Effect::Notify(SessionOutput::Error(message.into()))
    }
}
