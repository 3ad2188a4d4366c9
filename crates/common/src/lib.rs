//! Common types and traits shared across vigil crates.
//!
//! This crate provides the data model that flows through one review run
//! (artifact, sub-tasks, findings), the per-role conversation state, and the
//! capability trait every role is built on.

pub mod error;
pub mod message;
pub mod task;
pub mod traits;

pub use error::{Result, VigilError};
pub use message::{ConversationState, MessageRole, Turn};
pub use task::{Artifact, Finding, SubTask};
pub use traits::{CallOptions, Conversant};
