pub mod anthropic;
pub mod client;
pub mod config;
pub mod gateway;
pub mod openai;
pub mod retry;

pub use anthropic::AnthropicClient;
pub use client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, Role};
pub use config::{build_llm_client, LlmConfig, SemaphoredClient};
pub use gateway::{GenerationService, LlmGateway};
pub use openai::OpenAiClient;
pub use retry::{RetryConfig, RetryingClient};
