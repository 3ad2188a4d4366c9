//! The final review report and the aggregate it is built from.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vigil_common::{Finding, Result};

pub const REPORT_TITLE: &str = "Vigil Code Review Report";

/// Conclusion shown until synthesis replaces it.
pub const PLACEHOLDER_CONCLUSION: &str =
    "(The final conclusion is derived from all of the material above.)";

/// Recommendations when none could be synthesized.
pub const DEFAULT_RECOMMENDATIONS: &str = "none determined";

pub const AGGREGATE_HEADER: &str = "-- Worker Findings --";
pub const AGGREGATE_FOOTER: &str = "-- End of Worker Findings --";
/// Prefix of each numbered entry in the aggregate.
pub const FINDING_HEADING: &str = "Finding from worker";

/// Join findings in dispatch order, each numbered and delimited.
pub fn aggregate_findings(findings: &[Finding]) -> String {
    let mut out = format!("\n\n{AGGREGATE_HEADER}\n");
    for (i, finding) in findings.iter().enumerate() {
        out.push_str(&format!("\n{FINDING_HEADING} {}:\n{finding}\n", i + 1));
    }
    out.push_str(&format!("\n{AGGREGATE_FOOTER}\n"));
    out
}

/// A report field that may arrive as prose or as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    List(Vec<String>),
}

impl Content {
    pub fn text(s: impl Into<String>) -> Self {
        Content::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(s) => s.trim().is_empty(),
            Content::List(items) => items.is_empty(),
        }
    }

    /// Lift a decoded JSON value. `None` for null.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Content::Text(s.clone())),
            Value::Array(items) => Some(Content::List(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            )),
            other => Some(Content::Text(other.to_string())),
        }
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Text(s) => f.write_str(s),
            Content::List(items) => f.write_str(&items.join("\n")),
        }
    }
}

/// Outcome of one run. Immutable once returned.
///
/// A set `error` marks a failed run; the other fields are then best effort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub source_identifier: String,
    pub coordinator_analysis: String,
    pub findings_summary: String,
    pub validation_feedback: String,
    pub conclusion: Content,
    pub recommendations: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Report {
    /// Report with every stage output filled and synthesis still pending.
    pub fn draft(
        source_identifier: impl Into<String>,
        coordinator_analysis: impl Into<String>,
        findings_summary: impl Into<String>,
        validation_feedback: impl Into<String>,
    ) -> Self {
        Self {
            title: REPORT_TITLE.to_string(),
            source_identifier: source_identifier.into(),
            coordinator_analysis: coordinator_analysis.into(),
            findings_summary: findings_summary.into(),
            validation_feedback: validation_feedback.into(),
            conclusion: Content::text(PLACEHOLDER_CONCLUSION),
            recommendations: Content::text(DEFAULT_RECOMMENDATIONS),
            error: None,
        }
    }

    pub fn failed(source_identifier: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            title: REPORT_TITLE.to_string(),
            source_identifier: source_identifier.into(),
            coordinator_analysis: String::new(),
            findings_summary: String::new(),
            validation_feedback: String::new(),
            conclusion: Content::text(""),
            recommendations: Content::List(Vec::new()),
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
