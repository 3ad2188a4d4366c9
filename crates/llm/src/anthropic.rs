use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vigil_common::{Result, VigilError};

use crate::client::{LlmClient, LlmRequest, LlmResponse, Role};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The messages API requires a budget on every call.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Body of `POST /v1/messages`, borrowing from the [`LlmRequest`].
#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    messages: Vec<TextTurn<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct TextTurn<'a> {
    role: &'static str,
    content: [TextBlock<'a>; 1],
}

#[derive(Serialize)]
struct TextBlock<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Deserialize)]
struct MessagesReply {
    content: Vec<ReplyBlock>,
    model: String,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ReplyBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

pub struct AnthropicClient {
    base_url: String,
    model: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(model: String, api_key: String) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
            api_key,
            http_client: reqwest::Client::new(),
        }
    }

    /// Point the client at an alternate endpoint (proxy, gateway).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        if !base_url.trim().is_empty() {
            self.base_url = base_url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn build_body<'a>(&'a self, request: &'a LlmRequest) -> MessagesBody<'a> {
        // No system role in the messages list; such turns join the top-level field.
        let (system_turns, turns): (Vec<_>, Vec<_>) = request
            .messages
            .iter()
            .partition(|msg| msg.role == Role::System);

        let system: Vec<&str> = request
            .system_prompt
            .as_deref()
            .into_iter()
            .chain(system_turns.iter().map(|msg| msg.content.as_str()))
            .collect();

        MessagesBody {
            model: request.model.as_deref().unwrap_or(&self.model),
            messages: turns
                .into_iter()
                .map(|msg| TextTurn {
                    role: msg.role.as_str(),
                    content: [TextBlock {
                        kind: "text",
                        text: &msg.content,
                    }],
                })
                .collect(),
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            temperature: request.temperature,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }
}

/// Concatenate the text blocks, skipping tool and other block kinds.
fn reply_text(blocks: Vec<ReplyBlock>) -> String {
    blocks
        .into_iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text)
        .collect()
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.build_body(&request))
            .send()
            .await
            .map_err(|e| VigilError::Llm(format!("Anthropic request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(|v| format!(", Retry-After: {v}"))
                .unwrap_or_default();
            let body_text = response.text().await.unwrap_or_default();
            return Err(VigilError::Llm(format!(
                "Anthropic API error {status}: {body_text}{retry_after}"
            )));
        }

        let reply: MessagesReply = response
            .json()
            .await
            .map_err(|e| VigilError::Llm(format!("Failed to parse Anthropic response: {e}")))?;

        Ok(LlmResponse {
            content: reply_text(reply.content),
            model: reply.model,
            stop_reason: reply.stop_reason,
        })
    }
}
