//! The review pipeline state machine.
//!
//! ```text
//! DECOMPOSE ─▶ DISPATCH ─▶ AGGREGATE ─▶ VALIDATE ─▶ SYNTHESIZE ─▶ DONE
//!     │                                                          ▲
//!     └──────────────────── no decomposition ───────────────────┘ (error report)
//! ```
//!
//! Every stage that talks to the generation service is a suspension point
//! raced against the run's cancellation token. Missing replies degrade to
//! stage defaults; only an unusable decomposition, cancellation, or the run
//! timeout end the run with an error report.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_agents::parser::{parse, ExpectedShape, UNPARSED_CATEGORY};
use vigil_agents::prompts::{
    COORDINATOR_SYSTEM_PROMPT, VALIDATOR_SYSTEM_PROMPT, WORKER_SYSTEM_PROMPT,
};
use vigil_agents::{
    aggregate_findings, Report, RoleChannel, Synthesizer, Validator, Worker, WorkerContext,
};
use vigil_common::{Artifact, CallOptions, Conversant, Result, SubTask, VigilError};
use vigil_llm::GenerationService;

use crate::config::ReviewConfig;
use crate::dispatch::WorkerPool;

/// Error carried by the report when decomposition yields nothing.
pub const DECOMPOSITION_FAILED: &str =
    "The coordinator could not obtain an initial analysis from the generation service.";

/// Focus of the single sub-task used when decomposition proposed none.
pub const GENERIC_FOCUS: &str =
    "The decomposition proposed no usable sub-tasks. Review the entire code for potential vulnerabilities.";

/// Focus used when the decomposition reply could not be parsed at all.
pub const UNPARSED_FOCUS: &str =
    "The decomposition could not be parsed. Review the entire code, paying attention to every potential vulnerability.";

/// Focus for a record that names no focus of its own.
pub const MISSING_FOCUS: &str = "No focus was given. Review the supplied snippet in full.";

pub const ALL_CATEGORIES: [&str; 2] = ["All common vulnerability classes", "Logic errors"];
pub const DEFAULT_CATEGORIES: [&str; 1] = ["General Security Review"];

/// Decomposition replies are lists of sub-task records, possibly wrapped.
pub const DECOMPOSITION_SHAPE: ExpectedShape = ExpectedShape::List {
    wrapper_keys: &["sub_tasks", "subtasks", "tasks"],
};

const PAYLOAD_KEYS: &[&str] = &["code_snippet", "payload", "snippet"];
const FOCUS_KEYS: &[&str] = &["focus", "task_focus"];
const CATEGORY_KEYS: &[&str] = &["target_vulnerabilities", "target_categories", "categories"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decompose,
    Dispatch,
    Aggregate,
    Validate,
    Synthesize,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Decompose => "DECOMPOSE",
            Stage::Dispatch => "DISPATCH",
            Stage::Aggregate => "AGGREGATE",
            Stage::Validate => "VALIDATE",
            Stage::Synthesize => "SYNTHESIZE",
            Stage::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Drives one review run at a time. `run` takes `&mut self`, so every role's
/// conversation state belongs to a single run.
pub struct Coordinator {
    channel: Box<dyn Conversant>,
    options: CallOptions,
    pool: WorkerPool,
    validator: Validator,
    synthesizer: Synthesizer,
    run_timeout: Option<Duration>,
    stage: Stage,
}

impl Coordinator {
    pub fn new(
        channel: impl Conversant + 'static,
        pool: WorkerPool,
        validator: Validator,
        synthesizer: Synthesizer,
    ) -> Self {
        Self {
            channel: Box::new(channel),
            options: CallOptions::new(0.5, 3072),
            pool,
            validator,
            synthesizer,
            run_timeout: None,
            stage: Stage::Done,
        }
    }

    /// Wire every role to `service` with the models and sampling in `config`.
    pub fn from_config(config: &ReviewConfig, service: Arc<dyn GenerationService>) -> Result<Self> {
        config.validate()?;

        let workers: Vec<Worker> = (0..config.worker_pool_size)
            .map(|_| {
                Worker::new(RoleChannel::new(
                    service.clone(),
                    config.worker_model(),
                    WORKER_SYSTEM_PROMPT,
                ))
                .with_options(config.worker.call_options())
            })
            .collect();

        let validator = Validator::new(RoleChannel::new(
            service.clone(),
            config.validator_model(),
            VALIDATOR_SYSTEM_PROMPT,
        ))
        .with_options(config.validator.call_options());

        let synthesizer = Synthesizer::new(RoleChannel::new(
            service.clone(),
            config.synthesis_model(),
            COORDINATOR_SYSTEM_PROMPT,
        ))
        .with_options(config.synthesis.call_options());

        let channel = RoleChannel::new(service, config.coordinator_model(), COORDINATOR_SYSTEM_PROMPT);

        let mut coordinator =
            Self::new(channel, WorkerPool::new(workers)?, validator, synthesizer)
                .with_options(config.coordinator.call_options());
        coordinator.run_timeout = config.run_timeout();
        Ok(coordinator)
    }

    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Last stage entered. `Done` between runs.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    /// Review `artifact`. Always returns a report; failures are carried in
    /// its `error` field.
    pub async fn run(&mut self, artifact: &Artifact, cancel: &CancellationToken) -> Report {
        let started = Instant::now();
        let source = artifact.source_label().to_string();
        let token = cancel.child_token();

        info!(source = %source, "Starting review run");

        let run_timeout = self.run_timeout;
        let outcome = match run_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.execute(artifact, &token)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        token.cancel();
                        Err(VigilError::Timeout(limit.as_millis() as u64))
                    }
                }
            }
            None => self.execute(artifact, &token).await,
        };
        self.transition(Stage::Done);

        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(report) => {
                if report.is_failed() {
                    warn!(source = %source, duration_ms, "Review run failed");
                } else {
                    info!(source = %source, duration_ms, "Review run completed");
                }
                report
            }
            Err(e) => {
                warn!(source = %source, duration_ms, error = %e, "Review run aborted");
                Report::failed(source, e.to_string())
            }
        }
    }

    async fn execute(&mut self, artifact: &Artifact, cancel: &CancellationToken) -> Result<Report> {
        self.transition(Stage::Decompose);
        self.channel.reset_state();
        let prompt = decomposition_prompt(artifact);
        let reply = until_cancelled(cancel, self.channel.converse(&prompt, &self.options)).await?;
        let decomposition = match reply {
            Some(reply) if !reply.trim().is_empty() => reply,
            _ => {
                warn!("Decomposition produced no output");
                return Ok(Report::failed(artifact.source_label(), DECOMPOSITION_FAILED));
            }
        };
        debug!(
            preview = %decomposition.chars().take(200).collect::<String>(),
            "Decomposition reply"
        );
        let tasks = plan_sub_tasks(&decomposition, artifact);

        self.transition(Stage::Dispatch);
        let context = WorkerContext::new(artifact.identifier.clone());
        let findings = self.pool.dispatch(&tasks, &context, cancel).await?;

        self.transition(Stage::Aggregate);
        let aggregate = aggregate_findings(&findings);

        self.transition(Stage::Validate);
        let feedback = until_cancelled(
            cancel,
            self.validator.review(&decomposition, &aggregate, artifact),
        )
        .await?;

        self.transition(Stage::Synthesize);
        let report = until_cancelled(
            cancel,
            self.synthesizer
                .finalize(artifact, &decomposition, &aggregate, &feedback),
        )
        .await?;

        info!(
            sub_tasks = tasks.len(),
            workers = self.pool.size(),
            "Review stages complete"
        );
        Ok(report)
    }

    fn transition(&mut self, next: Stage) {
        debug!(from = %self.stage, to = %next, "Stage transition");
        if next != Stage::Done {
            info!(stage = %next, "Entering stage");
        }
        self.stage = next;
    }
}

/// Race `fut` against `cancel`.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(VigilError::Cancelled),
        out = fut => Ok(out),
    }
}

pub fn decomposition_prompt(artifact: &Artifact) -> String {
    let location = artifact.identifier.as_deref().unwrap_or("an unknown file");
    format!(
        "Analyze the following code from '{location}'.\n\
         First give an overview of its core functionality.\n\
         Then identify the key regions or functions that need a detailed security review and explain why.\n\
         Finally split the review into 1 to 3 concrete sub-tasks, giving for each the code it covers \
         and the vulnerability classes the reviewer should focus on.\n\
         Return the sub-tasks as a JSON list; each entry has 'code_snippet' (string, the relevant code), \
         'focus' (string, what to review) and 'target_vulnerabilities' (list of strings, e.g. \
         ['Buffer Overflow', 'SQL Injection']).\n\
         The code:\n```\n{code}\n```",
        code = artifact.content,
    )
}

/// Turn a decomposition reply into sub-tasks. Never returns an empty list:
/// with nothing usable, one sub-task covers the whole artifact. Every
/// sub-task carries the full reply as its origin context.
pub fn plan_sub_tasks(decomposition: &str, artifact: &Artifact) -> Vec<SubTask> {
    let mut tasks: Vec<SubTask> = parse(decomposition, &DECOMPOSITION_SHAPE)
        .into_records()
        .iter()
        .filter_map(|record| sub_task_from_record(record, artifact))
        .collect();

    if tasks.is_empty() {
        warn!("Decomposition yielded no sub-tasks, reviewing the whole artifact");
        tasks.push(SubTask::new(&artifact.content, GENERIC_FOCUS).with_categories(ALL_CATEGORIES));
    }

    info!(count = tasks.len(), "Planned sub-tasks");
    tasks
        .into_iter()
        .map(|task| task.with_origin_context(decomposition))
        .collect()
}

fn sub_task_from_record(record: &Value, artifact: &Artifact) -> Option<SubTask> {
    match record {
        Value::String(focus) if !focus.trim().is_empty() => Some(
            SubTask::new(&artifact.content, focus.as_str()).with_categories(DEFAULT_CATEGORIES),
        ),
        Value::Object(map) => {
            if map.get("category").and_then(Value::as_str) == Some(UNPARSED_CATEGORY) {
                return Some(
                    SubTask::new(&artifact.content, UNPARSED_FOCUS).with_categories(ALL_CATEGORIES),
                );
            }

            let first_text = |keys: &[&str]| {
                keys.iter()
                    .filter_map(|k| map.get(*k).and_then(Value::as_str))
                    .find(|s| !s.trim().is_empty())
                    .map(str::to_string)
            };

            let payload = first_text(PAYLOAD_KEYS).unwrap_or_else(|| artifact.content.clone());
            let focus = first_text(FOCUS_KEYS).unwrap_or_else(|| MISSING_FOCUS.to_string());

            let mut categories: Vec<String> = CATEGORY_KEYS
                .iter()
                .find_map(|k| map.get(*k))
                .map(categories_from_value)
                .unwrap_or_default();
            if categories.is_empty() {
                categories = DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect();
            }

            Some(SubTask::new(payload, focus).with_categories(categories))
        }
        other => {
            debug!(record = %other, "Skipping unusable decomposition record");
            None
        }
    }
}

fn categories_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
