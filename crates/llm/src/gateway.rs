//! The single call contract the pipeline sees.
//!
//! Everything behind [`GenerationService::generate`] may fail (timeouts,
//! connection errors, rate limits, malformed upstream bodies). None of that
//! crosses this boundary as an error: callers receive `None` and degrade.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::client::{ChatMessage, LlmClient, LlmRequest, Role};

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Produce a reply for `messages`, or `None` when no text could be obtained.
    async fn generate(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Option<String>;
}

#[async_trait]
impl<T: GenerationService + ?Sized> GenerationService for Arc<T> {
    async fn generate(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Option<String> {
        (**self)
            .generate(model, messages, temperature, max_tokens)
            .await
    }
}

/// [`GenerationService`] over an [`LlmClient`] stack, bounded by a timeout.
pub struct LlmGateway {
    client: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl LlmGateway {
    pub fn new(client: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn build_request(
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> LlmRequest {
        // Leading system turns become the request's system prompt.
        let mut system_parts = Vec::new();
        let mut rest = Vec::with_capacity(messages.len());
        for msg in messages {
            if msg.role == Role::System && rest.is_empty() {
                system_parts.push(msg.content);
            } else {
                rest.push(msg);
            }
        }

        LlmRequest {
            model: Some(model.to_string()),
            system_prompt: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            messages: rest,
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
        }
    }
}

#[async_trait]
impl GenerationService for LlmGateway {
    async fn generate(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Option<String> {
        let request = Self::build_request(model, messages, temperature, max_tokens);

        let outcome = tokio::time::timeout(self.timeout, self.client.complete(request)).await;
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(model = %model, error = %e, "Generation call failed");
                return None;
            }
            Err(_) => {
                warn!(
                    model = %model,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Generation call timed out"
                );
                return None;
            }
        };

        let text = response.content.trim();
        if text.is_empty() {
            warn!(model = %model, "Generation call returned no text");
            return None;
        }

        debug!(
            model = %response.model,
            reply_len = text.len(),
            stop_reason = ?response.stop_reason,
            "Generation call completed"
        );
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LlmResponse;
    use std::sync::Mutex;
    use vigil_common::{Result, VigilError};

    enum Behavior {
        Reply(&'static str),
        Fail,
        Hang,
    }

    struct StubClient {
        behavior: Behavior,
        seen: Mutex<Vec<LlmRequest>>,
    }

    impl StubClient {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for StubClient {
        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
            self.seen.lock().unwrap().push(request);
            match self.behavior {
                Behavior::Reply(text) => Ok(LlmResponse::text("stub", text)),
                Behavior::Fail => Err(VigilError::Llm("API error 401 Unauthorized".to_string())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(VigilError::Llm("unreachable".to_string()))
                }
            }
        }
    }

    fn messages() -> Vec<ChatMessage> {
        vec![
            ChatMessage::new(Role::System, "You review code."),
            ChatMessage::new(Role::User, "Review this."),
        ]
    }

    #[tokio::test]
    async fn returns_trimmed_reply() {
        let client = StubClient::new(Behavior::Reply("  looks fine \n"));
        let gateway = LlmGateway::new(client.clone(), Duration::from_secs(5));

        let reply = gateway.generate("model-a", messages(), 0.3, 512).await;
        assert_eq!(reply.as_deref(), Some("looks fine"));

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].model.as_deref(), Some("model-a"));
        assert_eq!(seen[0].system_prompt.as_deref(), Some("You review code."));
        assert_eq!(seen[0].messages.len(), 1);
        assert_eq!(seen[0].temperature, Some(0.3));
        assert_eq!(seen[0].max_tokens, Some(512));
    }

    #[tokio::test]
    async fn error_becomes_none() {
        let gateway = LlmGateway::new(StubClient::new(Behavior::Fail), Duration::from_secs(5));
        assert!(gateway.generate("m", messages(), 0.5, 256).await.is_none());
    }

    #[tokio::test]
    async fn blank_reply_becomes_none() {
        let gateway =
            LlmGateway::new(StubClient::new(Behavior::Reply("   ")), Duration::from_secs(5));
        assert!(gateway.generate("m", messages(), 0.5, 256).await.is_none());
    }

    #[tokio::test]
    async fn timeout_becomes_none() {
        let gateway =
            LlmGateway::new(StubClient::new(Behavior::Hang), Duration::from_millis(20));
        assert!(gateway.generate("m", messages(), 0.5, 256).await.is_none());
    }
}
