//! A role's conversation with the generation service.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use vigil_common::{CallOptions, Conversant, ConversationState};
use vigil_llm::{ChatMessage, GenerationService, Role};

/// Fallback system prompt for a channel built without one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Model, system prompt and history of one role instance.
///
/// Every call sends the system prompt, the recorded history and the new user
/// turn. Only exchanges that produced a reply are recorded.
pub struct RoleChannel {
    model: String,
    system_prompt: String,
    service: Arc<dyn GenerationService>,
    state: ConversationState,
}

impl RoleChannel {
    pub fn new(
        service: Arc<dyn GenerationService>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            model: model.into(),
            system_prompt: if system_prompt.trim().is_empty() {
                DEFAULT_SYSTEM_PROMPT.to_string()
            } else {
                system_prompt
            },
            service,
            state: ConversationState::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    fn build_messages(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.state.len() + 2);
        messages.push(ChatMessage::new(Role::System, self.system_prompt.clone()));
        messages.extend(self.state.turns().iter().map(ChatMessage::from));
        messages.push(ChatMessage::new(Role::User, prompt));
        messages
    }
}

#[async_trait]
impl Conversant for RoleChannel {
    fn reset_state(&mut self) {
        self.state.reset();
    }

    async fn converse(&mut self, prompt: &str, options: &CallOptions) -> Option<String> {
        let messages = self.build_messages(prompt);
        debug!(
            model = %self.model,
            history = self.state.len(),
            prompt_len = prompt.len(),
            "Sending prompt"
        );

        let reply = self
            .service
            .generate(&self.model, messages, options.temperature, options.max_tokens)
            .await?;

        self.state.record_exchange(prompt, reply.clone());
        Some(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replies with a fixed answer (or nothing) and records every call.
    struct EchoService {
        reply: Option<&'static str>,
        calls: Mutex<Vec<(String, Vec<ChatMessage>, f32, u32)>>,
    }

    impl EchoService {
        fn new(reply: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenerationService for EchoService {
        async fn generate(
            &self,
            model: &str,
            messages: Vec<ChatMessage>,
            temperature: f32,
            max_tokens: u32,
        ) -> Option<String> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), messages, temperature, max_tokens));
            self.reply.map(str::to_string)
        }
    }

    #[tokio::test]
    async fn test_history_accumulates_and_is_sent() {
        let service = EchoService::new(Some("ack"));
        let mut channel = RoleChannel::new(service.clone(), "model-x", "Be terse.");

        let opts = CallOptions::new(0.2, 100);
        assert_eq!(channel.converse("first", &opts).await.as_deref(), Some("ack"));
        assert_eq!(channel.converse("second", &opts).await.as_deref(), Some("ack"));
        assert_eq!(channel.state().len(), 4);

        let calls = service.calls.lock().unwrap();
        let (model, messages, temperature, max_tokens) = &calls[1];
        assert_eq!(model, "model-x");
        assert_eq!(*temperature, 0.2);
        assert_eq!(*max_tokens, 100);
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(messages[0].content, "Be terse.");
        assert_eq!(messages[3].content, "second");
    }

    #[tokio::test]
    async fn test_failed_call_not_recorded() {
        let service = EchoService::new(None);
        let mut channel = RoleChannel::new(service, "m", "sys");

        assert!(channel.converse("hello", &CallOptions::default()).await.is_none());
        assert!(channel.state().is_empty());
    }

    #[tokio::test]
    async fn test_reset_clears_history() {
        let service = EchoService::new(Some("ok"));
        let mut channel = RoleChannel::new(service.clone(), "m", "sys");

        channel.converse("one", &CallOptions::default()).await;
        channel.reset_state();
        channel.converse("two", &CallOptions::default()).await;

        let calls = service.calls.lock().unwrap();
        assert_eq!(calls[1].1.len(), 2);
    }

    #[test]
    fn test_blank_system_prompt_uses_default() {
        let channel = RoleChannel::new(EchoService::new(None), "m", "  ");
        assert_eq!(channel.system_prompt(), DEFAULT_SYSTEM_PROMPT);
    }
}
