//! Session state

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Processing,
    Interrupted,
    /// Terminal; no further transitions
    ShuttingDown,
}

/// Everything the interrupt protocol needs to decide what happens next.
///
/// `is_processing` tracks the turn the user is waiting on; it drops as soon
/// as the turn is cancelled. `turn_in_flight` stays set until the turn task
/// has actually handed the conversation back, so a new turn never starts
/// while a cancelled one is still unwinding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub phase: Phase,
    /// Cancellation signals since the counter was last reset
    pub interrupt_count: u8,
    /// Latched until the next turn completes without interruption
    pub is_interrupted: bool,
    /// Connections must be re-established before the next turn
    pub was_interrupted: bool,
    pub input_queue: VecDeque<String>,
    pub is_processing: bool,
    pub turn_in_flight: bool,
    /// Stdin reached EOF
    pub input_closed: bool,
    /// Identifies the most recently armed reset timer
    pub timer_generation: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// No turn is running or unwinding
    pub fn is_idle(&self) -> bool {
        !self.is_processing && !self.turn_in_flight
    }

    pub fn is_shutting_down(&self) -> bool {
        self.phase == Phase::ShuttingDown
    }
}
