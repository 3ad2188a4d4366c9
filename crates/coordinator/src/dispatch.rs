//! Fan-out of sub-tasks to a pool of workers.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use vigil_agents::worker::WORKER_FAILURE_FINDING;
use vigil_agents::{Worker, WorkerContext};
use vigil_common::{Finding, Result, SubTask, VigilError};

/// Workers shared by the dispatch stage.
///
/// Sub-task `i` goes to worker `i % size`. Each worker sits behind its own
/// lock, so a worker handles one sub-task at a time and its conversation
/// state is never interleaved. With a single worker dispatch is serialized.
pub struct WorkerPool {
    workers: Vec<Arc<Mutex<Worker>>>,
}

impl WorkerPool {
    pub fn new(workers: Vec<Worker>) -> Result<Self> {
        if workers.is_empty() {
            return Err(VigilError::Config(
                "worker pool needs at least one worker".to_string(),
            ));
        }
        Ok(Self {
            workers: workers
                .into_iter()
                .map(|w| Arc::new(Mutex::new(w)))
                .collect(),
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Run every sub-task and return the findings in submission order,
    /// whatever order they complete in.
    ///
    /// A fired `cancel` token aborts all in-flight work and discards the
    /// findings gathered so far.
    pub async fn dispatch(
        &self,
        tasks: &[SubTask],
        context: &WorkerContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<Finding>> {
        info!(
            tasks = tasks.len(),
            workers = self.size(),
            "Dispatching sub-tasks"
        );

        // Dropping the set aborts whatever is still running.
        let mut set = JoinSet::new();
        for (index, task) in tasks.iter().enumerate() {
            let worker = self.workers[index % self.workers.len()].clone();
            let task = task.clone();
            let context = context.clone();
            let cancel = cancel.clone();

            set.spawn(async move {
                let finding = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    finding = async {
                        let mut worker = worker.lock().await;
                        worker.process(&task, &context).await
                    } => Some(finding),
                };
                (index, finding)
            });
        }

        let mut slots: Vec<Option<Finding>> = vec![None; tasks.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Some(finding))) => {
                    debug!(index, finding_len = finding.as_str().len(), "Sub-task finished");
                    slots[index] = Some(finding);
                }
                Ok((_, None)) => {
                    set.abort_all();
                    return Err(VigilError::Cancelled);
                }
                Err(e) if e.is_cancelled() => {
                    return Err(VigilError::Cancelled);
                }
                Err(e) => {
                    // A panicking worker degrades like one that got no reply;
                    // its slot is filled with the sentinel below.
                    error!(error = %e, "Worker task failed");
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(VigilError::Cancelled);
        }

        Ok(slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Finding::new(WORKER_FAILURE_FINDING)))
            .collect())
    }
}
