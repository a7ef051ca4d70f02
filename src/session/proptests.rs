//! Property-based tests for the session state machine
//!
//! A small simulated controller feeds turn outcomes back into `transition`
//! only while it has a turn running, the way the real controller does.

use super::effect::Effect;
use super::event::SessionEvent;
use super::state::{Phase, SessionState};
use super::transition::transition;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Line,
    Cancel,
    Close,
    /// Fire the latest armed timer, or a stale one
    Timer { stale: bool },
    Completed,
    Interrupted,
    Failed,
}

/// Stand-in for the controller's effect runner
#[derive(Default)]
struct Harness {
    state: SessionState,
    turn_running: bool,
    lines_sent: usize,
    started: Vec<usize>,
    shutdowns: usize,
}

impl Harness {
    fn apply(&mut self, event: SessionEvent) {
        let result = transition(&self.state, event);
        self.state = result.new_state;
        for effect in result.effects {
            match effect {
                Effect::StartTurn { line, .. } => {
                    assert!(!self.turn_running, "second turn started while one is running");
                    self.turn_running = true;
                    self.started.push(line.parse().unwrap());
                }
                Effect::Shutdown => self.shutdowns += 1,
                _ => {}
            }
        }
    }

    fn step(&mut self, op: &Op) {
        match op {
            Op::Line => {
                let line = self.lines_sent.to_string();
                self.lines_sent += 1;
                self.apply(SessionEvent::LineReceived { line });
            }
            Op::Cancel => self.apply(SessionEvent::CancelSignal),
            Op::Close => {
                if !self.state.input_closed {
                    self.apply(SessionEvent::InputClosed);
                }
            }
            Op::Timer { stale } => {
                let generation = if *stale {
                    self.state.timer_generation.wrapping_sub(1)
                } else {
                    self.state.timer_generation
                };
                self.apply(SessionEvent::InterruptWindowElapsed { generation });
            }
            Op::Completed | Op::Interrupted | Op::Failed if self.turn_running => {
                self.turn_running = false;
                self.apply(match op {
                    Op::Completed => SessionEvent::TurnCompleted,
                    Op::Interrupted => SessionEvent::TurnInterrupted,
                    _ => SessionEvent::TurnFailed {
                        message: "boom".to_string(),
                    },
                });
            }
            _ => {}
        }
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Line),
        2 => Just(Op::Cancel),
        1 => Just(Op::Close),
        1 => any::<bool>().prop_map(|stale| Op::Timer { stale }),
        3 => Just(Op::Completed),
        1 => Just(Op::Interrupted),
        1 => Just(Op::Failed),
    ]
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(arb_op(), 0..40)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// At most one turn is ever in flight, and the state agrees with the
    /// controller about whether one is
    #[test]
    fn prop_single_turn_in_flight(ops in arb_ops()) {
        let mut harness = Harness::default();
        for op in &ops {
            harness.step(op);
            if !harness.state.is_shutting_down() {
                prop_assert_eq!(harness.state.turn_in_flight, harness.turn_running);
            }
            prop_assert!(!harness.state.is_processing || harness.state.turn_in_flight);
        }
    }

    /// Lines start in the order they were received; cancellation may drop
    /// some, never reorder them
    #[test]
    fn prop_queue_is_fifo(ops in arb_ops()) {
        let mut harness = Harness::default();
        for op in &ops {
            harness.step(op);
        }
        prop_assert!(harness.started.windows(2).all(|w| w[0] < w[1]));
    }

    /// Three signals with no timer in between always shut the session down
    #[test]
    fn prop_third_signal_shuts_down(ops in arb_ops()) {
        let mut harness = Harness::default();
        for op in &ops {
            harness.step(op);
        }
        for _ in 0..3 {
            harness.step(&Op::Cancel);
        }
        prop_assert_eq!(harness.state.phase, Phase::ShuttingDown);
        prop_assert_eq!(harness.shutdowns, 1);
    }

    /// Shutdown is emitted at most once, and nothing starts after it
    #[test]
    fn prop_nothing_after_shutdown(ops in arb_ops()) {
        let mut harness = Harness::default();
        let mut started_at_shutdown = None;
        for op in &ops {
            harness.step(op);
            if harness.state.is_shutting_down() && started_at_shutdown.is_none() {
                started_at_shutdown = Some(harness.started.len());
            }
        }
        prop_assert!(harness.shutdowns <= 1);
        if let Some(count) = started_at_shutdown {
            prop_assert_eq!(harness.started.len(), count);
        }
    }

    /// The counter never exceeds three: the third signal is terminal
    #[test]
    fn prop_interrupt_count_bounded(ops in arb_ops()) {
        let mut harness = Harness::default();
        for op in &ops {
            harness.step(op);
            prop_assert!(harness.state.interrupt_count <= 3);
        }
    }

    /// Once input is closed and no turn runs, the session has shut down
    #[test]
    fn prop_eof_eventually_shuts_down(ops in arb_ops()) {
        let mut harness = Harness::default();
        for op in &ops {
            harness.step(op);
        }
        harness.step(&Op::Close);
        while harness.turn_running {
            harness.step(&Op::Completed);
        }
        prop_assert!(harness.state.is_shutting_down());
    }
}
