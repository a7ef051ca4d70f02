//! Pure state transition function
//!
//! Given the same state and event, `transition` always returns the same new
//! state and effects. Timers, cancellation tokens and the conversation are
//! touched only by the controller executing those effects.

use super::effect::Effect;
use super::event::{SessionEvent, SessionOutput};
use super::state::{Phase, SessionState};

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Pure transition function. Total: every event is valid in every state.
pub fn transition(state: &SessionState, event: SessionEvent) -> TransitionResult {
    // ShuttingDown is absorbing
    if state.is_shutting_down() {
        return TransitionResult::new(state.clone());
    }

    let mut next = state.clone();
    let result = match event {
        SessionEvent::LineReceived { line } => {
            next.input_queue.push_back(line);
            TransitionResult::new(next)
        }

        SessionEvent::CancelSignal => return cancel_signal(next),

        SessionEvent::InputClosed => {
            next.input_closed = true;
            TransitionResult::new(next)
        }

        SessionEvent::TurnCompleted if state.is_processing => {
            next.turn_in_flight = false;
            next.is_processing = false;
            next.interrupt_count = 0;
            next.is_interrupted = false;
            next.was_interrupted = false;
            next.phase = Phase::Idle;
            TransitionResult::new(next).with_effect(Effect::Notify(SessionOutput::TurnCompleted))
        }

        // A turn that finished after the user already cancelled it is
        // handled like an interrupted one
        SessionEvent::TurnCompleted | SessionEvent::TurnInterrupted => turn_interrupted(next),

        SessionEvent::TurnFailed { message } => {
            next.turn_in_flight = false;
            next.is_processing = false;
            next.phase = if next.is_interrupted {
                Phase::Interrupted
            } else {
                Phase::Idle
            };
            TransitionResult::new(next)
                .with_effect(Effect::FinalizeBuffers)
                .with_effect(Effect::notify_error(message))
        }

        // Only the counter resets; the interrupted flags stay latched
        SessionEvent::InterruptWindowElapsed { generation } => {
            if generation == next.timer_generation {
                next.interrupt_count = 0;
            }
            TransitionResult::new(next)
        }
    };

    schedule(result)
}

fn cancel_signal(mut next: SessionState) -> TransitionResult {
    next.interrupt_count = next.interrupt_count.saturating_add(1);

    match next.interrupt_count {
        1 => {
            let mut effects = Vec::new();
            if next.is_processing {
                effects.push(Effect::CancelTurn);
                next.is_interrupted = true;
                next.was_interrupted = true;
                next.phase = Phase::Interrupted;
            }
            next.input_queue.clear();
            next.is_processing = false;
            next.timer_generation += 1;
            effects.push(Effect::ArmInterruptReset {
                generation: next.timer_generation,
            });
            effects.push(Effect::Notify(SessionOutput::Interrupted));
            TransitionResult::new(next).with_effects(effects)
        }
        // Second signal inside the window: counted, nothing else
        2 => TransitionResult::new(next),
        _ => {
            next.phase = Phase::ShuttingDown;
            next.input_queue.clear();
            let cancel = next.turn_in_flight.then_some(Effect::CancelTurn);
            TransitionResult::new(next)
                .with_effects(cancel)
                .with_effect(Effect::Shutdown)
        }
    }
}

fn turn_interrupted(mut next: SessionState) -> TransitionResult {
    next.turn_in_flight = false;
    next.is_processing = false;
    next.phase = Phase::Interrupted;

    // The turn stopped on its own (e.g. a tool raised the interrupt)
    let unprompted = !next.is_interrupted;
    next.is_interrupted = true;
    next.was_interrupted = true;

    let result = TransitionResult::new(next).with_effect(Effect::FinalizeBuffers);
    if unprompted {
        result.with_effect(Effect::Notify(SessionOutput::Interrupted))
    } else {
        result
    }
}

/// Start the next queued line once no turn is running, or shut down once
/// input is closed and nothing is left to do.
fn schedule(result: TransitionResult) -> TransitionResult {
    let TransitionResult {
        new_state: mut next,
        effects,
    } = result;

    if !next.is_idle() {
        return TransitionResult::new(next).with_effects(effects);
    }

    if let Some(line) = next.input_queue.pop_front() {
        let reconnect = next.was_interrupted;
        next.was_interrupted = false;
        next.is_processing = true;
        next.turn_in_flight = true;
        next.phase = Phase::Processing;
        return TransitionResult::new(next)
            .with_effects(effects)
            .with_effect(Effect::start_turn(line, reconnect));
    }

    if next.input_closed {
        next.phase = Phase::ShuttingDown;
        return TransitionResult::new(next)
            .with_effects(effects)
            .with_effect(Effect::Shutdown);
    }

    TransitionResult::new(next).with_effects(effects)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> SessionEvent {
        SessionEvent::LineReceived {
            line: text.to_string(),
        }
    }

    /// State with a turn for "first" running
    fn processing() -> SessionState {
        transition(&SessionState::new(), line("first")).new_state
    }

    #[test]
    fn test_line_starts_turn_when_idle() {
        let result = transition(&SessionState::new(), line("hello"));

        assert_eq!(result.new_state.phase, Phase::Processing);
        assert!(result.new_state.is_processing);
        assert!(result.new_state.turn_in_flight);
        assert!(result.new_state.input_queue.is_empty());
        assert_eq!(result.effects, vec![Effect::start_turn("hello", false)]);
    }

    #[test]
    fn test_line_queued_while_processing() {
        let result = transition(&processing(), line("second"));

        assert!(result.effects.is_empty());
        assert_eq!(result.new_state.input_queue, ["second"]);
    }

    #[test]
    fn test_completion_drains_queue_one_line_at_a_time() {
        let mut state = processing();
        state = transition(&state, line("second")).new_state;
        state = transition(&state, line("third")).new_state;

        let result = transition(&state, SessionEvent::TurnCompleted);
        assert_eq!(
            result.effects,
            vec![
                Effect::Notify(SessionOutput::TurnCompleted),
                Effect::start_turn("second", false),
            ]
        );
        assert_eq!(result.new_state.input_queue, ["third"]);
        assert_eq!(result.new_state.phase, Phase::Processing);
    }

    #[test]
    fn test_completion_returns_to_idle() {
        let result = transition(&processing(), SessionEvent::TurnCompleted);

        assert_eq!(result.new_state.phase, Phase::Idle);
        assert!(result.new_state.is_idle());
        assert_eq!(result.new_state.interrupt_count, 0);
    }

    #[test]
    fn test_first_cancel_interrupts_turn() {
        let mut state = processing();
        state = transition(&state, line("queued")).new_state;

        let result = transition(&state, SessionEvent::CancelSignal);
        let next = &result.new_state;

        assert_eq!(next.phase, Phase::Interrupted);
        assert_eq!(next.interrupt_count, 1);
        assert!(next.is_interrupted);
        assert!(next.was_interrupted);
        assert!(!next.is_processing);
        assert!(next.turn_in_flight, "turn is still unwinding");
        assert!(next.input_queue.is_empty());
        assert_eq!(
            result.effects,
            vec![
                Effect::CancelTurn,
                Effect::ArmInterruptReset { generation: 1 },
                Effect::Notify(SessionOutput::Interrupted),
            ]
        );
    }

    #[test]
    fn test_second_cancel_is_noop() {
        let first = transition(&processing(), SessionEvent::CancelSignal).new_state;
        let result = transition(&first, SessionEvent::CancelSignal);

        assert!(result.effects.is_empty());
        assert_eq!(result.new_state.interrupt_count, 2);
        assert_eq!(result.new_state.phase, Phase::Interrupted);
    }

    #[test]
    fn test_third_cancel_shuts_down() {
        let mut state = processing();
        state = transition(&state, SessionEvent::CancelSignal).new_state;
        state = transition(&state, SessionEvent::CancelSignal).new_state;

        let result = transition(&state, SessionEvent::CancelSignal);
        assert_eq!(result.new_state.phase, Phase::ShuttingDown);
        assert_eq!(result.effects, vec![Effect::CancelTurn, Effect::Shutdown]);
    }

    #[test]
    fn test_shutting_down_is_absorbing() {
        let mut state = SessionState::new();
        for _ in 0..3 {
            state = transition(&state, SessionEvent::CancelSignal).new_state;
        }
        assert!(state.is_shutting_down());

        for event in [line("late"), SessionEvent::TurnCompleted, SessionEvent::CancelSignal] {
            let result = transition(&state, event);
            assert!(result.effects.is_empty());
            assert_eq!(result.new_state, state);
        }
    }

    #[test]
    fn test_cancel_while_idle_only_counts() {
        let result = transition(&SessionState::new(), SessionEvent::CancelSignal);

        assert_eq!(result.new_state.phase, Phase::Idle);
        assert_eq!(result.new_state.interrupt_count, 1);
        assert!(!result.new_state.was_interrupted);
        assert!(!result.effects.contains(&Effect::CancelTurn));
    }

    #[test]
    fn test_window_elapsed_resets_counter_only() {
        let state = transition(&processing(), SessionEvent::CancelSignal).new_state;

        let result = transition(&state, SessionEvent::InterruptWindowElapsed { generation: 1 });
        assert_eq!(result.new_state.interrupt_count, 0);
        assert!(result.new_state.is_interrupted);
        assert!(result.new_state.was_interrupted);
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let mut state = transition(&processing(), SessionEvent::CancelSignal).new_state;
        state = transition(&state, SessionEvent::InterruptWindowElapsed { generation: 1 }).new_state;
        state = transition(&state, SessionEvent::CancelSignal).new_state;
        assert_eq!(state.timer_generation, 2);

        let result = transition(&state, SessionEvent::InterruptWindowElapsed { generation: 1 });
        assert_eq!(result.new_state.interrupt_count, 1);
    }

    #[test]
    fn test_lines_wait_for_cancelled_turn_to_unwind() {
        let mut state = transition(&processing(), SessionEvent::CancelSignal).new_state;

        let result = transition(&state, line("next"));
        assert!(result.effects.is_empty(), "must not start while unwinding");
        state = result.new_state;

        let result = transition(&state, SessionEvent::TurnInterrupted);
        assert_eq!(
            result.effects,
            vec![Effect::FinalizeBuffers, Effect::start_turn("next", true)]
        );
        assert!(!result.new_state.was_interrupted);
        assert!(result.new_state.is_interrupted, "latched until a clean completion");
    }

    #[test]
    fn test_clean_completion_clears_latch() {
        let mut state = transition(&processing(), SessionEvent::CancelSignal).new_state;
        state = transition(&state, SessionEvent::TurnInterrupted).new_state;
        state = transition(&state, line("retry")).new_state;
        assert!(state.is_interrupted);

        let result = transition(&state, SessionEvent::TurnCompleted);
        assert!(!result.new_state.is_interrupted);
        assert_eq!(result.new_state.phase, Phase::Idle);
    }

    #[test]
    fn test_completion_racing_cancel_counts_as_interrupted() {
        let state = transition(&processing(), SessionEvent::CancelSignal).new_state;

        let result = transition(&state, SessionEvent::TurnCompleted);
        assert_eq!(result.new_state.phase, Phase::Interrupted);
        assert!(result.new_state.was_interrupted);
        assert_eq!(result.effects, vec![Effect::FinalizeBuffers]);
    }

    #[test]
    fn test_unprompted_interrupt_notifies() {
        let result = transition(&processing(), SessionEvent::TurnInterrupted);

        assert!(result.new_state.was_interrupted);
        assert_eq!(
            result.effects,
            vec![
                Effect::FinalizeBuffers,
                Effect::Notify(SessionOutput::Interrupted)
            ]
        );
    }

    #[test]
    fn test_failure_returns_to_idle() {
        let result = transition(
            &processing(),
            SessionEvent::TurnFailed {
                message: "Rate limited".to_string(),
            },
        );

        assert_eq!(result.new_state.phase, Phase::Idle);
        assert!(result.new_state.is_idle());
        assert_eq!(
            result.effects,
            vec![Effect::FinalizeBuffers, Effect::notify_error("Rate limited")]
        );
    }

    #[test]
    fn test_eof_drains_queue_then_shuts_down() {
        let mut state = processing();
        state = transition(&state, line("second")).new_state;
        state = transition(&state, SessionEvent::InputClosed).new_state;
        assert_eq!(state.phase, Phase::Processing);

        let result = transition(&state, SessionEvent::TurnCompleted);
        assert!(matches!(result.effects.last(), Some(Effect::StartTurn { .. })));

        let result = transition(&result.new_state, SessionEvent::TurnCompleted);
        assert_eq!(result.new_state.phase, Phase::ShuttingDown);
        assert_eq!(result.effects.last(), Some(&Effect::Shutdown));
    }

    #[test]
    fn test_eof_when_idle_shuts_down() {
        let result = transition(&SessionState::new(), SessionEvent::InputClosed);
        assert_eq!(result.effects, vec![Effect::Shutdown]);
    }
}
