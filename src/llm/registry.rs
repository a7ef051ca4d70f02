//! Model registry for managing available LLM providers

use super::{all_models, LlmService, LoggingService, ModelDef, Provider};
use std::collections::HashMap;
use std::sync::Arc;

const PREFERRED_DEFAULT: &str = "claude-4.5-sonnet";

/// Configuration for LLM providers
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    /// Gateway base URL; the gateway handles credentials
    pub gateway: Option<String>,
    /// Default model ID
    pub default_model: Option<String>,
}

/// Metadata shown by `/models`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub description: String,
    pub context_window: usize,
}

/// Registry of available LLM models
pub struct ModelRegistry {
    config: LlmConfig,
    services: HashMap<String, Arc<dyn LlmService>>,
    default_model: String,
}

impl ModelRegistry {
    pub fn new(config: &LlmConfig) -> Self {
        let mut services: HashMap<String, Arc<dyn LlmService>> = HashMap::new();

        for model_def in all_models() {
            if let Some(service) = Self::try_create_model(model_def, config) {
                services.insert(model_def.id.to_string(), service);
            }
        }

        let default_model = config
            .default_model
            .clone()
            .or_else(|| {
                if services.contains_key(PREFERRED_DEFAULT) {
                    Some(PREFERRED_DEFAULT.to_string())
                } else {
                    let mut ids: Vec<_> = services.keys().cloned().collect();
                    ids.sort();
                    ids.into_iter().next()
                }
            })
            .unwrap_or_else(|| PREFERRED_DEFAULT.to_string());

        Self {
            config: config.clone(),
            services,
            default_model,
        }
    }

    /// Registry built from explicit services, for tests and embedding
    #[cfg(test)]
    pub fn from_services(services: Vec<Arc<dyn LlmService>>) -> Self {
        let default_model = services
            .first()
            .map_or_else(|| PREFERRED_DEFAULT.to_string(), |s| s.model_id().to_string());
        Self {
            config: LlmConfig::default(),
            services: services
                .into_iter()
                .map(|s| (s.model_id().to_string(), s))
                .collect(),
            default_model,
        }
    }

    /// Build every service again from the original configuration.
    ///
    /// Fresh services mean fresh HTTP clients and connection pools.
    pub fn rebuild(&self) -> Self {
        Self::new(&self.config)
    }

    /// Try to create a model service, validating prerequisites
    fn try_create_model(model_def: &ModelDef, config: &LlmConfig) -> Option<Arc<dyn LlmService>> {
        // In gateway mode the gateway handles authentication
        let api_key = if config.gateway.is_some() {
            "implicit".to_string()
        } else {
            match model_def.provider {
                Provider::Anthropic => config.anthropic_api_key.as_ref()?,
                Provider::OpenAI => config.openai_api_key.as_ref()?,
            }
            .clone()
        };

        match (model_def.factory)(&api_key, config.gateway.as_deref()) {
            Ok(service) => Some(Arc::new(LoggingService::new(service))),
            Err(e) => {
                tracing::debug!(model = model_def.id, error = %e, "Model unavailable");
                None
            }
        }
    }

    /// Get a model by ID
    pub fn get(&self, model_id: &str) -> Option<Arc<dyn LlmService>> {
        self.services.get(model_id).cloned()
    }

    /// Get the default model
    pub fn default(&self) -> Option<Arc<dyn LlmService>> {
        self.get(&self.default_model)
    }

    pub fn default_model_id(&self) -> &str {
        &self.default_model
    }

    /// List all available model IDs
    pub fn available_models(&self) -> Vec<String> {
        let mut models: Vec<_> = self.services.keys().cloned().collect();
        models.sort();
        models
    }

    /// Detailed information about available models, in catalog order
    pub fn available_model_info(&self) -> Vec<ModelInfo> {
        let catalog = all_models()
            .iter()
            .filter(|def| self.services.contains_key(def.id))
            .map(|def| ModelInfo {
                id: def.id.to_string(),
                provider: def.provider.display_name().to_string(),
                description: def.description.to_string(),
                context_window: def.context_window,
            });

        // Services registered outside the catalog
        let extra = self
            .available_models()
            .into_iter()
            .filter(|id| all_models().iter().all(|def| def.id != id))
            .filter_map(|id| {
                let service = self.get(&id)?;
                Some(ModelInfo {
                    provider: "custom".to_string(),
                    description: String::new(),
                    context_window: service.context_window(),
                    id,
                })
            });

        catalog.chain(extra).collect()
    }

    pub fn has_models(&self) -> bool {
        !self.services.is_empty()
    }

    /// Resolve a `/switch` argument to a model id.
    ///
    /// Accepts an exact model id or a provider name; a provider resolves to
    /// the default model when it belongs to that provider, otherwise to the
    /// provider's first available model in catalog order.
    pub fn resolve(&self, query: &str) -> Option<String> {
        let query = query.trim();
        if self.services.contains_key(query) {
            return Some(query.to_string());
        }

        let provider = Provider::parse(query)?;
        let candidates: Vec<&ModelDef> = all_models()
            .iter()
            .filter(|def| def.provider == provider && self.services.contains_key(def.id))
            .collect();

        candidates
            .iter()
            .find(|def| def.id == self.default_model)
            .or_else(|| candidates.first())
            .map(|def| def.id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_api_keys_no_models() {
        let registry = ModelRegistry::new(&LlmConfig::default());
        assert!(registry.available_models().is_empty());
        assert!(!registry.has_models());
        assert!(registry.default().is_none());
    }

    #[test]
    fn test_anthropic_key_only_anthropic_models() {
        let config = LlmConfig {
            anthropic_api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config);

        let models = registry.available_models();
        assert!(!models.is_empty());
        for model_id in &models {
            assert!(model_id.contains("claude"), "Expected claude model, got {model_id}");
        }
    }

    #[test]
    fn test_gateway_enables_all_models() {
        let config = LlmConfig {
            gateway: Some("https://example.com".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config);
        assert!(registry.get("claude-4.5-sonnet").is_some());
        assert!(registry.get("gpt-4o").is_some());
    }

    #[test]
    fn test_default_model_selection() {
        let config = LlmConfig {
            anthropic_api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config);
        assert_eq!(registry.default_model_id(), "claude-4.5-sonnet");
    }

    #[test]
    fn test_custom_default_model() {
        let config = LlmConfig {
            anthropic_api_key: Some("test-key".to_string()),
            default_model: Some("claude-4.5-opus".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config);
        assert_eq!(registry.default_model_id(), "claude-4.5-opus");
    }

    #[test]
    fn test_openai_only_default_falls_back() {
        let config = LlmConfig {
            openai_api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config);
        assert_eq!(registry.default_model_id(), "gpt-4o");
    }

    #[test]
    fn test_resolve_model_or_provider() {
        let config = LlmConfig {
            gateway: Some("https://example.com".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config);

        assert_eq!(registry.resolve("gpt-4o-mini").as_deref(), Some("gpt-4o-mini"));
        assert_eq!(registry.resolve("anthropic").as_deref(), Some("claude-4.5-sonnet"));
        assert_eq!(registry.resolve("openai").as_deref(), Some("gpt-4o"));
        assert_eq!(registry.resolve("gemini"), None);
        assert_eq!(registry.resolve("claude-2"), None);
    }

    #[test]
    fn test_model_info_metadata() {
        let config = LlmConfig {
            anthropic_api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config);

        let infos = registry.available_model_info();
        assert_eq!(infos.len(), 3);
        let opus = infos.iter().find(|m| m.id == "claude-4.5-opus").unwrap();
        assert_eq!(opus.provider, "Anthropic");
        assert!(opus.description.contains("most capable"));
        assert_eq!(opus.context_window, 200_000);
    }

    #[test]
    fn test_rebuild_keeps_configuration() {
        let config = LlmConfig {
            anthropic_api_key: Some("test-key".to_string()),
            default_model: Some("claude-4.5-haiku".to_string()),
            ..Default::default()
        };
        let rebuilt = ModelRegistry::new(&config).rebuild();
        assert_eq!(rebuilt.default_model_id(), "claude-4.5-haiku");
        assert_eq!(rebuilt.available_models().len(), 3);
    }
}
