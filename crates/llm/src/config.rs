use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vigil_common::{Result, VigilError};

use crate::anthropic::AnthropicClient;
use crate::client::{LlmClient, LlmRequest, LlmResponse};
use crate::openai::{OpenAiClient, OLLAMA_BASE_URL};
use crate::retry::{RetryConfig, RetryingClient};

/// Connection settings for the generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "openai", "anthropic" or "ollama"
    #[serde(alias = "provider_type")]
    pub provider: String,
    /// Model used when a request does not name one
    pub default_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Alternate endpoint (OpenAI-compatible servers, proxies)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    pub timeout_ms: u64,
    pub max_concurrent_requests: usize,
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            default_model: "gpt-4o-mini".to_string(),
            api_key: None,
            api_url: None,
            timeout_ms: 60_000,
            max_concurrent_requests: 4,
            retry: RetryConfig::default(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether the provider refuses requests without a credential.
    pub fn requires_api_key(&self) -> bool {
        matches!(self.provider.as_str(), "openai" | "anthropic")
    }

    /// Environment variable consulted when no key is configured.
    pub fn api_key_env_var(&self) -> Option<&'static str> {
        match self.provider.as_str() {
            "openai" => Some("OPENAI_API_KEY"),
            "anthropic" => Some("ANTHROPIC_API_KEY"),
            _ => None,
        }
    }

    /// Resolve the API key from config, then from `lookup` (normally the
    /// process environment).
    pub fn resolve_api_key_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ref key) = self.api_key {
            if !key.trim().is_empty() {
                return Some(key.clone());
            }
        }
        self.api_key_env_var()
            .and_then(lookup)
            .filter(|key| !key.trim().is_empty())
    }

    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }
}

pub struct SemaphoredClient {
    inner: Arc<dyn LlmClient>,
    semaphore: Arc<tokio::sync::Semaphore>,
}

impl SemaphoredClient {
    pub fn new(inner: Arc<dyn LlmClient>, max_concurrent: usize) -> Self {
        Self {
            inner,
            semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent.max(1))),
        }
    }
}

#[async_trait]
impl LlmClient for SemaphoredClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| VigilError::Llm(format!("Semaphore acquire failed: {e}")))?;
        self.inner.complete(request).await
    }
}

/// Build the provider client stack: provider -> retry -> concurrency limit.
///
/// Expects the API key to be resolved already; a provider that needs one
/// fails here with a configuration error rather than at the first request.
pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty());

    let base_client: Box<dyn LlmClient> = match config.provider.as_str() {
        "openai" => {
            let api_key = api_key.ok_or_else(|| {
                VigilError::Config(
                    "OpenAI requires an API key (set OPENAI_API_KEY or pass --api-key)"
                        .to_string(),
                )
            })?;
            Box::new(
                OpenAiClient::new(
                    config.api_url.clone(),
                    config.default_model.clone(),
                    Some(api_key),
                )
                .with_timeout(config.timeout()),
            )
        }
        "ollama" => Box::new(
            OpenAiClient::new(
                config
                    .api_url
                    .clone()
                    .or_else(|| Some(OLLAMA_BASE_URL.to_string())),
                config.default_model.clone(),
                api_key,
            )
            .with_timeout(config.timeout()),
        ),
        "anthropic" => {
            let api_key = api_key.ok_or_else(|| {
                VigilError::Config(
                    "Anthropic requires an API key (set ANTHROPIC_API_KEY or pass --api-key)"
                        .to_string(),
                )
            })?;
            let mut client = AnthropicClient::new(config.default_model.clone(), api_key)
                .with_timeout(config.timeout());
            if let Some(ref url) = config.api_url {
                client = client.with_base_url(url.clone());
            }
            Box::new(client)
        }
        other => {
            return Err(VigilError::Config(format!("Unknown LLM provider: {other}")));
        }
    };

    let retrying: Box<dyn LlmClient> =
        Box::new(RetryingClient::new(base_client, config.retry.clone()));

    let semaphored = SemaphoredClient::new(Arc::from(retrying), config.max_concurrent_requests);

    Ok(Arc::new(semaphored))
}
