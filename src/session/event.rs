//! Events driving the session, and the session's own inputs and outputs

use crate::runtime::StreamEvent;

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    // Front-end events
    LineReceived { line: String },
    CancelSignal,
    InputClosed,

    // Turn outcomes
    TurnCompleted,
    TurnInterrupted,
    TurnFailed { message: String },

    /// The re-arm timer armed under `generation` fired
    InterruptWindowElapsed { generation: u64 },
}

/// What the front end sends to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    Line(String),
    /// Ctrl+C
    Interrupt,
    /// End of input. Dropping every sender means the same.
    Eof,
}

/// What the controller broadcasts to the front end
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutput {
    Stream(StreamEvent),
    TurnStarted { line: String },
    TurnCompleted,
    Interrupted,
    Notice(String),
    Error(String),
    Shutdown,
}
