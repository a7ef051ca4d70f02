//! Agent session - interactive, tool-using LLM session in the terminal
//!
//! Streams model output as it arrives, lets the model call tools mid-turn,
//! and survives the user cancelling a turn with Ctrl+C.

mod config;
mod conversation;
mod llm;
mod runtime;
mod session;
mod system_prompt;
mod tools;

use config::SessionConfig;
use llm::ModelRegistry;
use runtime::RegistryLlmClient;
use session::{SessionController, SessionOptions};
use std::process::ExitCode;
use std::sync::Arc;
use system_prompt::PromptService;
use tools::{RemoteToolService, ToolRegistry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("agent-session: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Session terminated with an error");
            eprintln!("agent-session: {e}");
            ExitCode::FAILURE
        }
    }
}

/// JSON logs on stderr; stdout carries the transcript
fn init_tracing() -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_session=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = SessionConfig::from_env();

    let registry = ModelRegistry::new(&config.llm);
    if registry.has_models() {
        tracing::info!(
            models = ?registry.available_models(),
            default = %registry.default_model_id(),
            "LLM registry initialized"
        );
    } else {
        tracing::warn!("No LLM API keys configured. Set ANTHROPIC_API_KEY or LLM_GATEWAY.");
    }
    let llm = Arc::new(RegistryLlmClient::new(registry, config.streaming));

    let remote = config
        .remote_tools
        .as_deref()
        .map(RemoteToolService::new)
        .transpose()?;
    let tools = ToolRegistry::connect(ToolRegistry::local_tools(), remote).await;
    tracing::info!(tools = ?tools.names(), "Tool registry initialized");

    let controller = SessionController::new(
        llm,
        tools,
        PromptService::new(config.prompt_path),
        SessionOptions {
            working_dir: config.working_dir,
            interrupt_window: config.interrupt_window,
            event_buffer: config.event_buffer,
        },
    );

    session::run_terminal(controller).await?;
    Ok(())
}
