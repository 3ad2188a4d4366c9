//! Error types for vigil.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VigilError {
    /// Missing credential or unusable settings. Raised before any network call.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider-level failure. Never leaves the llm crate; the gateway turns it into `None`.
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run timed out after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, VigilError>;
