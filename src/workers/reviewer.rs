use serde_json::json;
use tracing::{debug, warn};

use super::{PhaseWorker, snapshot};
use crate::errors::{ProviderError, WorkerError};
use crate::phase::{ApprovalKind, WorkflowPhase};
use crate::provider::ProviderRegistry;
use crate::retry::RetryPolicy;
use crate::state::{PipelineState, VideoTaskStatus};

const NAME: &str = "Reviewer";

/// Polls submitted video tasks.
///
/// All tasks successful (or none submitted) completes the pipeline. All tasks
/// failed is reported as an error, which the resume planner re-enters at video
/// generation. Anything in between pauses on `video_status`.
pub struct Reviewer {
    providers: ProviderRegistry,
    retry: RetryPolicy,
}

impl Reviewer {
    pub fn new(providers: ProviderRegistry, retry: RetryPolicy) -> Self {
        Self { providers, retry }
    }

    fn poll_tasks(&self, state: &mut PipelineState) -> Result<(), WorkerError> {
        for (shot_id, task) in state.video_tasks.iter_mut() {
            if task.status.is_terminal() {
                continue;
            }
            let provider = self.providers.get(&task.platform)?;
            match self.retry.call("poll", || provider.poll(&task.task_id)) {
                Ok(report) => {
                    debug!(shot_id = %shot_id, status = report.status.as_str(), "Polled video task");
                    task.status = report.status;
                    task.video_url = report.video_url.or(task.video_url.take());
                    task.error = report.error;
                }
                Err(ProviderError::TaskNotFound(id)) => {
                    task.status = VideoTaskStatus::Failed;
                    task.error = Some(format!("Task {} not found", id));
                }
                Err(e) => {
                    warn!(shot_id = %shot_id, error = %e, "Could not poll video task");
                }
            }
        }
        Ok(())
    }

    fn review(&self, mut state: PipelineState) -> Result<PipelineState, WorkerError> {
        self.poll_tasks(&mut state)?;

        let total = state.video_tasks.len();
        let completed = state
            .video_tasks
            .values()
            .filter(|t| t.is_successful())
            .count();
        let in_flight = state
            .video_tasks
            .values()
            .filter(|t| !t.status.is_terminal())
            .count();
        let failed: Vec<String> = state
            .video_tasks
            .iter()
            .filter(|(_, t)| t.status.is_terminal() && !t.is_successful())
            .map(|(id, _)| id.clone())
            .collect();

        if completed == total {
            state.complete();
            state.log(NAME, format!("All {} videos completed", total));
        } else if failed.len() == total {
            state.fail(format!(
                "Video generation failed for all {} shots: {}",
                total,
                failed.join(", ")
            ));
        } else {
            let data = json!({
                "tasks": snapshot(&state.video_tasks)?,
                "completed": completed,
                "failed": failed.len(),
                "in_flight": in_flight,
            });
            state.request_approval(ApprovalKind::VideoStatus, data);
            state.log(
                NAME,
                format!(
                    "{} of {} videos completed, {} failed, {} still generating",
                    completed,
                    total,
                    failed.len(),
                    in_flight
                ),
            );
        }
        Ok(state)
    }
}

impl PhaseWorker for Reviewer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, mut state: PipelineState) -> Result<PipelineState, WorkerError> {
        state.current_agent = NAME.to_string();
        match state.phase {
            WorkflowPhase::Review => self.review(state),
            other => Err(WorkerError::UnexpectedPhase {
                worker: NAME,
                phase: other.to_string(),
            }),
        }
    }
}
