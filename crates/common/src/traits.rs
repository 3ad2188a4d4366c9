//! The capability every pipeline role is built on.
//!
//! Roles compose this capability with their own stage function instead of
//! sharing a base type. `converse` takes `&mut self`, so the conversation
//! state behind it can only ever be driven by one run at a time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Sampling options for a single outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CallOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CallOptions {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            max_tokens: 2048,
        }
    }
}

/// A role that holds a conversation with the generation service.
#[async_trait]
pub trait Conversant: Send {
    /// Forget every previous turn.
    fn reset_state(&mut self);

    /// Send one prompt. `None` when the service produced no text.
    async fn converse(&mut self, prompt: &str, options: &CallOptions) -> Option<String>;
}
