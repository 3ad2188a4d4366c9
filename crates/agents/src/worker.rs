//! Worker role: one finding per sub-task.

use std::fmt::Write as _;

use tracing::{info, warn};
use vigil_common::{CallOptions, Conversant, Finding, SubTask};

/// Finding reported when the generation service produced nothing.
pub const WORKER_FAILURE_FINDING: &str =
    "The worker could not obtain a review from the generation service. This is usually a network or service-side error.";

/// Sampling used for sub-task analysis.
pub const WORKER_CALL_OPTIONS: CallOptions = CallOptions {
    temperature: 0.4,
    max_tokens: 2048,
};

/// Run-wide context handed to every worker invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerContext {
    /// Where the reviewed text came from
    pub source_hint: Option<String>,
}

impl WorkerContext {
    pub fn new(source_hint: Option<String>) -> Self {
        Self { source_hint }
    }
}

pub struct Worker {
    channel: Box<dyn Conversant>,
    options: CallOptions,
}

impl Worker {
    pub fn new(channel: impl Conversant + 'static) -> Self {
        Self {
            channel: Box::new(channel),
            options: WORKER_CALL_OPTIONS,
        }
    }

    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// Review one sub-task. Never returns an empty finding.
    ///
    /// History is cleared first so nothing leaks between sub-tasks.
    pub async fn process(&mut self, task: &SubTask, context: &WorkerContext) -> Finding {
        self.channel.reset_state();

        info!(focus = %task.focus, "Worker analyzing sub-task");
        let prompt = build_prompt(task, context);

        match self.channel.converse(&prompt, &self.options).await {
            Some(reply) if !reply.trim().is_empty() => Finding::new(reply),
            _ => {
                warn!(focus = %task.focus, "Worker produced no finding, using sentinel");
                Finding::new(WORKER_FAILURE_FINDING)
            }
        }
    }
}

/// Sections in fixed order: source, focus, categories, upstream analysis,
/// payload. Blank sources drop their section.
pub fn build_prompt(task: &SubTask, context: &WorkerContext) -> String {
    let mut prompt = String::new();

    if let Some(source) = context.source_hint.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = writeln!(prompt, "Source of the snippet: {source}");
    }
    if !task.focus.trim().is_empty() {
        let _ = writeln!(prompt, "Review focus: {}", task.focus);
    }
    let categories: Vec<&str> = task
        .target_categories
        .iter()
        .map(String::as_str)
        .filter(|c| !c.trim().is_empty())
        .collect();
    if !categories.is_empty() {
        let _ = writeln!(prompt, "Pay particular attention to: {}", categories.join(", "));
    }
    if let Some(origin) = task.origin_context.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = writeln!(prompt, "Lead's preliminary analysis:\n{origin}");
    }
    if !task.payload.trim().is_empty() {
        let _ = write!(
            prompt,
            "\nReview the following code carefully:\n```\n{}\n```\n",
            task.payload
        );
    }

    prompt.push_str(
        "Report every potential vulnerability with its type, location (line numbers where \
         possible), trigger conditions, impact and how it could be exploited. If you find \
         nothing significant, say so explicitly and briefly explain why.",
    );
    prompt
}
