//! Report Synthesizer: folds every stage output into the final [`Report`].

use tracing::{debug, info, warn};
use vigil_common::{Artifact, CallOptions, Conversant};

use crate::parser::{parse, ExpectedShape, FieldSpec, Parsed};
use crate::report::{Content, Report};

pub const SYNTHESIS_CALL_OPTIONS: CallOptions = CallOptions {
    temperature: 0.6,
    max_tokens: 2048,
};

/// Prefix of the conclusion when the reply could not be parsed.
pub const RAW_OUTPUT_PREFIX: &str = "Raw model output (could not parse JSON): ";

/// Object shape requested from the synthesis call.
pub const SYNTHESIS_SHAPE: ExpectedShape = ExpectedShape::Object {
    fields: &[
        FieldSpec {
            name: "conclusion",
            aliases: &["final_conclusion", "summary"],
        },
        FieldSpec {
            name: "recommendations",
            aliases: &["recommendation", "suggestions"],
        },
    ],
};

pub struct Synthesizer {
    channel: Box<dyn Conversant>,
    options: CallOptions,
}

impl Synthesizer {
    pub fn new(channel: impl Conversant + 'static) -> Self {
        Self {
            channel: Box::new(channel),
            options: SYNTHESIS_CALL_OPTIONS,
        }
    }

    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the draft report, then refine conclusion and recommendations
    /// with one generation call. Generated text is never discarded: an
    /// unparsable reply becomes the conclusion.
    pub async fn finalize(
        &mut self,
        artifact: &Artifact,
        decomposition: &str,
        aggregate_findings: &str,
        validation_feedback: &str,
    ) -> Report {
        self.channel.reset_state();

        let mut report = Report::draft(
            artifact.source_label(),
            decomposition,
            aggregate_findings,
            validation_feedback,
        );

        info!(source = %report.source_identifier, "Synthesizing final conclusion");
        let prompt = build_prompt(artifact, decomposition, aggregate_findings, validation_feedback);

        let reply = match self.channel.converse(&prompt, &self.options).await {
            Some(reply) if !reply.trim().is_empty() => reply,
            _ => {
                warn!("Synthesis produced no output, keeping placeholder conclusion");
                return report;
            }
        };
        debug!(reply_len = reply.len(), "Synthesis reply received");

        match parse(&reply, &SYNTHESIS_SHAPE) {
            Parsed::Structured(value) => {
                if let Some(conclusion) = Content::from_value(&value["conclusion"]) {
                    report.conclusion = conclusion;
                }
                if let Some(recommendations) = Content::from_value(&value["recommendations"]) {
                    report.recommendations = recommendations;
                }
            }
            Parsed::Fallback(raw) => {
                warn!("Synthesis reply was not structured, embedding raw output");
                report.conclusion = Content::Text(format!("{RAW_OUTPUT_PREFIX}{raw}"));
            }
        }

        report
    }
}

pub fn build_prompt(
    artifact: &Artifact,
    decomposition: &str,
    aggregate_findings: &str,
    validation_feedback: &str,
) -> String {
    format!(
        "Based on the output of every stage of this review, write a final summary and concrete remediation advice.\n\
         Source: {source}\n\
         Your preliminary analysis and decomposition:\n{decomposition}\n\n\
         Combined worker findings:\n{aggregate_findings}\n\n\
         Validator feedback:\n{validation_feedback}\n\n\
         Provide a 'conclusion' summarizing the overall security posture and main risks, \
         then a 'recommendations' list with specific, actionable fixes for each key finding. \
         Answer with a JSON object holding exactly two keys: conclusion (string) and \
         recommendations (list of strings).",
        source = artifact.source_label(),
    )
}
