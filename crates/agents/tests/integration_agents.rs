//! Integration tests for the roles wired to a real RoleChannel.
//!
//! The generation service is a hand-written double; no network access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use vigil_agents::prompts::{VALIDATOR_SYSTEM_PROMPT, WORKER_SYSTEM_PROMPT};
use vigil_agents::render::NO_RECOMMENDATIONS;
use vigil_agents::{
    aggregate_findings, render_markdown, Content, RoleChannel, Synthesizer, Validator, Worker,
    WorkerContext,
};
use vigil_common::{Artifact, SubTask};
use vigil_llm::{ChatMessage, GenerationService, Role};

/// Pops replies in order and records what it was sent.
struct QueueService {
    replies: Mutex<Vec<Option<String>>>,
    sent: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl QueueService {
    fn new(replies: &[Option<&str>]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.map(str::to_string)).collect()),
            sent: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl GenerationService for QueueService {
    async fn generate(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Option<String> {
        self.sent.lock().unwrap().push((model.to_string(), messages));
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            None
        } else {
            replies.remove(0)
        }
    }
}

#[tokio::test]
async fn test_worker_sends_system_prompt_and_fresh_history() {
    let service = QueueService::new(&[Some("first finding"), Some("second finding")]);
    let mut worker = Worker::new(RoleChannel::new(service.clone(), "worker-m", WORKER_SYSTEM_PROMPT));
    let context = WorkerContext::new(Some("calc.py".into()));

    let a = worker.process(&SubTask::new("a / b", "divisor"), &context).await;
    let b = worker.process(&SubTask::new("c * d", "overflow"), &context).await;
    assert_eq!(a.as_str(), "first finding");
    assert_eq!(b.as_str(), "second finding");

    let sent = service.sent.lock().unwrap();
    for (model, messages) in sent.iter() {
        assert_eq!(model, "worker-m");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, WORKER_SYSTEM_PROMPT);
    }
    assert!(sent[1].1[1].content.contains("Review focus: overflow"));
}

#[tokio::test]
async fn test_full_role_chain_renders_report() {
    let service = QueueService::new(&[
        Some("Division by zero when b == 0."),
        Some("No false positives. The finding is accurate."),
        Some("{\"summary\": \"One division by zero.\", \"recommendation\": []}"),
    ]);
    let artifact = Artifact::new("def f(a, b):\n    return a / b").with_identifier("calc.py");

    let mut worker = Worker::new(RoleChannel::new(service.clone(), "w", WORKER_SYSTEM_PROMPT));
    let mut validator =
        Validator::new(RoleChannel::new(service.clone(), "v", VALIDATOR_SYSTEM_PROMPT));
    let mut synthesizer = Synthesizer::new(RoleChannel::new(service.clone(), "s", "lead"));

    let finding = worker
        .process(
            &SubTask::new("return a / b", "divisor"),
            &WorkerContext::new(artifact.identifier.clone()),
        )
        .await;
    let aggregate = aggregate_findings(&[finding]);
    let feedback = validator.review("one task", &aggregate, &artifact).await;
    let report = synthesizer
        .finalize(&artifact, "one task", &aggregate, &feedback)
        .await;

    assert_eq!(report.conclusion, Content::text("One division by zero."));
    assert_eq!(report.recommendations, Content::List(Vec::new()));

    let md = render_markdown(&report);
    assert!(md.starts_with("# Vigil Code Review Report"));
    assert!(md.contains("**Source:** `calc.py`"));
    assert!(md.contains("Division by zero when b == 0."));
    assert!(md.contains("No false positives."));
    assert!(md.contains(NO_RECOMMENDATIONS));
}
