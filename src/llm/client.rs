//! Language model gateway abstraction
//!
//! Every stage of the research pipeline talks to the model through the
//! [`LLMClient`] trait: a single `complete` call that takes the task prompt and
//! a role context (the system prompt describing who is speaking). Retries and
//! cancellation are layered on top by [`crate::llm::retry::RetryPolicy`], so
//! implementations only classify their failures into the error taxonomy.

use crate::types::{AppError, Result};
use crate::utils::toml_config::{OpenRouterConfig, Secrets};
use async_trait::async_trait;
use std::sync::Arc;

/// Generic LLM client trait for provider abstraction
///
/// Implementations must report failures as one of `RateLimited`,
/// `Authentication`, `Timeout` or `Unavailable` (or `Network`/`EmptyResult`
/// for transport and empty-body failures) so callers can decide whether to retry.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion for `prompt`, speaking in the role described by `role_context`
    async fn complete(&self, prompt: &str, role_context: &str) -> Result<String>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Provider selection for runtime construction
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenRouter, or any other OpenAI-compatible chat completions endpoint
    OpenRouter {
        api_key: String,
        base_url: String,
        model: String,
        timeout_secs: f64,
    },
}

impl Provider {
    /// Build the provider from configuration and environment secrets
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `OPENROUTER_API_KEY` is not set.
    pub fn from_config(config: &OpenRouterConfig, secrets: &Secrets) -> Result<Self> {
        let api_key = secrets.openrouter_api_key.clone().ok_or_else(|| {
            AppError::Configuration(
                "OPENROUTER_API_KEY is required. Please set it in your .env file or environment."
                    .to_string(),
            )
        })?;

        Ok(Provider::OpenRouter {
            api_key,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            timeout_secs: config.timeout,
        })
    }

    /// Create a client instance for this provider
    pub fn create_client(&self) -> Result<Arc<dyn LLMClient>> {
        match self {
            Provider::OpenRouter {
                api_key,
                base_url,
                model,
                timeout_secs,
            } => Ok(Arc::new(super::openrouter::OpenRouterClient::new(
                api_key.clone(),
                base_url.clone(),
                model.clone(),
                *timeout_secs,
            )?)),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenRouter { .. } => "OpenRouter",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_requires_api_key() {
        let config = OpenRouterConfig::default();
        let result = Provider::from_config(&config, &Secrets::default());

        let err = result.expect_err("missing key must be rejected");
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(err.to_string().contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn test_provider_from_config() {
        let config = OpenRouterConfig::default();
        let secrets = Secrets {
            openrouter_api_key: Some("sk-or-test".to_string()),
            tavily_api_key: None,
        };

        let provider = Provider::from_config(&config, &secrets).unwrap();
        assert_eq!(provider.name(), "OpenRouter");
        match provider {
            Provider::OpenRouter { model, base_url, .. } => {
                assert_eq!(model, config.model);
                assert_eq!(base_url, config.base_url);
            }
        }
    }
}
