//! Interactive session: input queueing and the three-stage interrupt protocol
//!
//! Implements the Elm Architecture pattern: `transition` is pure, and the
//! controller executes the effects it returns.

mod controller;
mod effect;
mod event;
mod state;
mod terminal;
mod transition;

#[cfg(test)]
mod proptests;

pub use controller::{SessionController, SessionOptions};
pub use terminal::run_terminal;
