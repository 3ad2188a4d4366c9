//! Work units that flow through one review run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Label used wherever an artifact has no identifier.
pub const UNKNOWN_SOURCE: &str = "N/A";

/// The input under review. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Raw text of the artifact
    pub content: String,

    /// Path or other identifier of the artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl Artifact {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            identifier: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Identifier for display, `N/A` when absent or blank.
    pub fn source_label(&self) -> &str {
        match self.identifier.as_deref() {
            Some(id) if !id.trim().is_empty() => id,
            _ => UNKNOWN_SOURCE,
        }
    }
}

/// One decomposed unit of work. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    /// Text the worker analyzes
    pub payload: String,

    /// What the worker should concentrate on
    pub focus: String,

    /// Categories of problems to look for, in priority order
    #[serde(default)]
    pub target_categories: Vec<String>,

    /// Raw decomposition reply the task was cut from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_context: Option<String>,
}

impl SubTask {
    pub fn new(payload: impl Into<String>, focus: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            focus: focus.into(),
            target_categories: Vec::new(),
            origin_context: None,
        }
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_origin_context(mut self, context: impl Into<String>) -> Self {
        self.origin_context = Some(context.into());
        self
    }
}

/// One worker's report for one sub-task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Finding(String);

impl Finding {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
