//! Model client seam for the turn executor
//!
//! The executor only sees `LlmClient`, so tests can drive it with scripted
//! step sequences.

use crate::llm::{single_step, LlmError, LlmRequest, LlmResponse, LlmService, LlmStream, ModelInfo, ModelRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Client for making LLM requests
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One-shot invocation
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Raw step notifications for one model step
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError>;

    /// Id of the model requests currently go to
    async fn model_id(&self) -> String;

    /// Point subsequent requests at another model. Returns the resolved id.
    async fn switch_model(&self, query: &str) -> Result<String, LlmError>;

    /// Re-establish provider connections
    async fn reconnect(&self) -> Result<(), LlmError>;

    async fn available_models(&self) -> Vec<ModelInfo>;
}

struct ClientState {
    registry: Arc<ModelRegistry>,
    model_id: String,
}

/// Adapter to use `ModelRegistry` as `LlmClient`
pub struct RegistryLlmClient {
    state: RwLock<ClientState>,
    streaming: bool,
}

impl RegistryLlmClient {
    pub fn new(registry: ModelRegistry, streaming: bool) -> Self {
        let model_id = registry.default_model_id().to_string();
        Self {
            state: RwLock::new(ClientState {
                registry: Arc::new(registry),
                model_id,
            }),
            streaming,
        }
    }

    async fn service(&self) -> Result<Arc<dyn LlmService>, LlmError> {
        let state = self.state.read().await;
        state
            .registry
            .get(&state.model_id)
            .or_else(|| state.registry.default())
            .ok_or_else(|| {
                LlmError::auth("No LLM available: set ANTHROPIC_API_KEY, OPENAI_API_KEY or LLM_GATEWAY")
            })
    }
}

#[async_trait]
impl LlmClient for RegistryLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.service().await?.complete(request).await
    }

    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        let service = self.service().await?;
        if self.streaming {
            service.stream(request).await
        } else {
            Ok(single_step(service.complete(request).await?))
        }
    }

    async fn model_id(&self) -> String {
        self.state.read().await.model_id.clone()
    }

    async fn switch_model(&self, query: &str) -> Result<String, LlmError> {
        let mut state = self.state.write().await;
        let model_id = state.registry.resolve(query).ok_or_else(|| {
            LlmError::invalid_request(format!(
                "Unknown model or provider `{query}`. Available: {}",
                state.registry.available_models().join(", ")
            ))
        })?;
        tracing::info!(from = %state.model_id, to = %model_id, "Switching model");
        state.model_id.clone_from(&model_id);
        Ok(model_id)
    }

    async fn reconnect(&self) -> Result<(), LlmError> {
        let mut state = self.state.write().await;
        let rebuilt = state.registry.rebuild();
        if !rebuilt.has_models() {
            return Err(LlmError::auth("No models available after reconnect"));
        }
        state.registry = Arc::new(rebuilt);
        tracing::info!(model = %state.model_id, "Provider connections re-established");
        Ok(())
    }

    async fn available_models(&self) -> Vec<ModelInfo> {
        self.state.read().await.registry.available_model_info()
    }
}
