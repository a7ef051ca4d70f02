//! Session configuration from environment variables

use crate::llm::LlmConfig;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_INTERRUPT_WINDOW_MS: u64 = 1000;
const DEFAULT_EVENT_BUFFER: usize = 128;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub llm: LlmConfig,
    /// Use the provider's streaming endpoint
    pub streaming: bool,
    pub working_dir: PathBuf,
    /// Base URL of the remote tool service
    pub remote_tools: Option<String>,
    /// System prompt template
    pub prompt_path: Option<PathBuf>,
    pub interrupt_window: Duration,
    pub event_buffer: usize,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let streaming = non_empty("AGENT_SESSION_STREAMING")
            .is_none_or(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"));

        let working_dir = non_empty("AGENT_SESSION_WORKDIR")
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let interrupt_window_ms = non_empty("AGENT_SESSION_INTERRUPT_WINDOW_MS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_INTERRUPT_WINDOW_MS);

        let event_buffer = non_empty("AGENT_SESSION_EVENT_BUFFER")
            .and_then(|v| v.trim().parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(DEFAULT_EVENT_BUFFER);

        Self {
            llm: LlmConfig {
                anthropic_api_key: non_empty("ANTHROPIC_API_KEY"),
                openai_api_key: non_empty("OPENAI_API_KEY"),
                gateway: non_empty("LLM_GATEWAY"),
                default_model: non_empty("DEFAULT_MODEL"),
            },
            streaming,
            working_dir,
            remote_tools: non_empty("AGENT_SESSION_REMOTE_TOOLS"),
            prompt_path: non_empty("AGENT_SESSION_PROMPT").map(PathBuf::from),
            interrupt_window: Duration::from_millis(interrupt_window_ms),
            event_buffer,
        }
    }
}
