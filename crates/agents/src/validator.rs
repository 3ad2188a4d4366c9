//! Validator role: critique of the aggregated findings.

use tracing::{info, warn};
use vigil_common::{Artifact, CallOptions, Conversant};

/// Feedback reported when the generation service produced nothing.
pub const VALIDATOR_FAILURE_FEEDBACK: &str =
    "The validator could not obtain feedback from the generation service.";

pub const VALIDATOR_CALL_OPTIONS: CallOptions = CallOptions {
    temperature: 0.3,
    max_tokens: 2048,
};

const VALIDATION_REQUEST: &str = "Re-examine and validate the following review findings and the reasoning behind them.";

pub struct Validator {
    channel: Box<dyn Conversant>,
    options: CallOptions,
}

impl Validator {
    pub fn new(channel: impl Conversant + 'static) -> Self {
        Self {
            channel: Box::new(channel),
            options: VALIDATOR_CALL_OPTIONS,
        }
    }

    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// One call, one piece of feedback. Falls back to a fixed sentinel.
    pub async fn review(
        &mut self,
        decomposition: &str,
        aggregate_findings: &str,
        artifact: &Artifact,
    ) -> String {
        self.channel.reset_state();

        info!(source = %artifact.source_label(), "Validating aggregated findings");
        let prompt = build_prompt(decomposition, aggregate_findings, artifact);

        match self.channel.converse(&prompt, &self.options).await {
            Some(reply) if !reply.trim().is_empty() => reply,
            _ => {
                warn!("Validator produced no feedback, using sentinel");
                VALIDATOR_FAILURE_FEEDBACK.to_string()
            }
        }
    }
}

pub fn build_prompt(decomposition: &str, aggregate_findings: &str, artifact: &Artifact) -> String {
    format!(
        "{VALIDATION_REQUEST}\n\n\
         1. The lead's preliminary analysis and decomposition:\n{decomposition}\n\n\
         2. The combined reviewer findings:\n{aggregate_findings}\n\n\
         3. The original code (source: {source}):\n```\n{code}\n```\n\n\
         Assess the material above critically and point out:\n\
         - Findings that are likely false positives, with your reasons\n\
         - Vulnerabilities the reviewers may have missed (false negatives), paying special \
         attention to problems that only arise when separately reviewed parts interact\n\
         - Whether the reviewers' reasoning is sound, consistent and sufficient\n\
         - Whether the decomposition covered the code adequately\n\
         - Whether the risk assessment of each finding is accurate\n\
         Keep your feedback specific and actionable.",
        source = artifact.source_label(),
        code = artifact.content,
    )
}
