//! LLM integration for the social messaging agent.
//!
//! The pipeline only depends on the [`LlmProvider`] trait. The shipped
//! backend is [`OpenAiCompatibleProvider`], which speaks the chat
//! completions wire format used by OpenAI and most gateways.

pub mod costs;
mod openai;
pub mod provider;

pub use openai::OpenAiCompatibleProvider;
pub use provider::*;

use std::sync::Arc;
use std::time::Duration;

use crate::error::LlmError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub base_url: String,
    pub model: String,
    /// Upper bound on a single HTTP exchange.
    pub http_timeout: Duration,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiCompatibleProvider::new(
        config.api_key.clone(),
        &config.base_url,
        &config.model,
        config.http_timeout,
    )?;
    tracing::info!(base_url = %config.base_url, "Using chat completions provider (model: {})", config.model);
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_constructs_without_network() {
        let config = LlmConfig {
            api_key: secrecy::SecretString::from("sk-test"),
            base_url: "https://api.openai.com/v1/".to_string(),
            model: "gpt-4o-mini".to_string(),
            http_timeout: Duration::from_secs(5),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "gpt-4o-mini");
    }
}
