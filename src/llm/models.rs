//! Centralized model definitions for all LLM providers

use super::anthropic::AnthropicModel;
use super::openai::OpenAIModel;
use super::{AnthropicService, LlmService, OpenAIService};
use std::sync::Arc;

/// LLM provider enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Anthropic,
    OpenAI,
}

impl Provider {
    /// Get the display name for this provider
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Anthropic => "Anthropic",
            Provider::OpenAI => "OpenAI",
        }
    }

    /// Parse a provider name as typed on the command line
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Some(Provider::Anthropic),
            "openai" | "gpt" => Some(Provider::OpenAI),
            _ => None,
        }
    }
}

/// Model definition with metadata
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// User-facing model ID (e.g., "claude-4.5-opus")
    pub id: &'static str,
    pub provider: Provider,
    pub description: &'static str,
    pub context_window: usize,
    /// Factory function to create the service
    pub factory: fn(&str, Option<&str>) -> Result<Arc<dyn LlmService>, String>,
}

fn anthropic(api_key: &str, model: AnthropicModel, gateway: Option<&str>) -> Result<Arc<dyn LlmService>, String> {
    // Accept any non-empty key (including "implicit" for gateway mode)
    if api_key.is_empty() {
        return Err(format!("{} requires ANTHROPIC_API_KEY or gateway", model.model_id()));
    }
    AnthropicService::new(api_key.to_string(), model, gateway)
        .map(|service| Arc::new(service) as Arc<dyn LlmService>)
        .map_err(|e| e.message)
}

fn openai(api_key: &str, model: OpenAIModel, gateway: Option<&str>) -> Result<Arc<dyn LlmService>, String> {
    if api_key.is_empty() {
        return Err(format!("{} requires OPENAI_API_KEY or gateway", model.api_name()));
    }
    OpenAIService::new(api_key.to_string(), model, gateway)
        .map(|service| Arc::new(service) as Arc<dyn LlmService>)
        .map_err(|e| e.message)
}

/// Get all available model definitions
pub fn all_models() -> &'static [ModelDef] {
    &[
        ModelDef {
            id: "claude-4.5-opus",
            provider: Provider::Anthropic,
            description: "Claude Opus 4.5 (most capable, slower)",
            context_window: 200_000,
            factory: |key, gw| anthropic(key, AnthropicModel::Claude45Opus, gw),
        },
        ModelDef {
            id: "claude-4.5-sonnet",
            provider: Provider::Anthropic,
            description: "Claude Sonnet 4.5 (balanced performance)",
            context_window: 200_000,
            factory: |key, gw| anthropic(key, AnthropicModel::Claude45Sonnet, gw),
        },
        ModelDef {
            id: "claude-4.5-haiku",
            provider: Provider::Anthropic,
            description: "Claude Haiku 4.5 (fast, efficient)",
            context_window: 200_000,
            factory: |key, gw| anthropic(key, AnthropicModel::Claude45Haiku, gw),
        },
        ModelDef {
            id: "gpt-4o",
            provider: Provider::OpenAI,
            description: "GPT-4o (balanced, multimodal)",
            context_window: 128_000,
            factory: |key, gw| openai(key, OpenAIModel::GPT4o, gw),
        },
        ModelDef {
            id: "gpt-4o-mini",
            provider: Provider::OpenAI,
            description: "GPT-4o mini (fast, cheap)",
            context_window: 128_000,
            factory: |key, gw| openai(key, OpenAIModel::GPT4oMini, gw),
        },
        ModelDef {
            id: "gpt-5.1",
            provider: Provider::OpenAI,
            description: "GPT-5.1 (reasoning)",
            context_window: 400_000,
            factory: |key, gw| openai(key, OpenAIModel::GPT51, gw),
        },
    ]
}
