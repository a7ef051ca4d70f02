//! Runtime for executing turns
//!
//! A turn alternates model steps and tool steps against the session's
//! `ConversationStore`, emitting `StreamEvent`s as the model output arrives.

mod dispatcher;
mod error;
mod executor;
mod normalizer;
mod traits;

#[cfg(test)]
pub mod testing;

pub use dispatcher::ToolDispatcher;
pub use error::TurnError;
pub use executor::{TurnExecutor, TurnSummary};
pub use normalizer::StreamEvent;
pub use traits::{LlmClient, RegistryLlmClient};
