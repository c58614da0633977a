use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use super::content::PromptGenerator;
use super::{PhaseWorker, generation_failed, snapshot};
use crate::errors::WorkerError;
use crate::phase::{ApprovalKind, WorkflowPhase};
use crate::provider::{ProviderRegistry, SubmitRequest};
use crate::retry::RetryPolicy;
use crate::state::{PipelineState, VideoTask};

const NAME: &str = "VideoProducer";
const DEFAULT_SHOT_SECONDS: u32 = 5;

/// Turns the storyboard into provider prompts and submits them.
///
/// Submission is idempotent across re-entries: a shot already accepted by the
/// same platform for the same prompt is not submitted again.
pub struct VideoProducer {
    prompts: Arc<dyn PromptGenerator>,
    providers: ProviderRegistry,
    retry: RetryPolicy,
}

impl VideoProducer {
    pub fn new(
        prompts: Arc<dyn PromptGenerator>,
        providers: ProviderRegistry,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            prompts,
            providers,
            retry,
        }
    }

    fn generate_prompts(&self, mut state: PipelineState) -> Result<PipelineState, WorkerError> {
        if state.storyboard.is_empty() {
            return Err(WorkerError::MissingInput("storyboard"));
        }
        state.log(NAME, "Generating video prompts...");

        let mut prompts = BTreeMap::new();
        for shot in &state.storyboard {
            let prompt = self
                .prompts
                .prompt(&state.request, shot, &state.characters)
                .map_err(|e| generation_failed(&format!("generate prompt for {}", shot.shot_id()), e))?;
            prompts.insert(shot.shot_id(), prompt);
        }

        let platform = state.request.target_platform.clone();
        let data = json!({
            "prompts": snapshot(&prompts)?,
            "platform": platform,
        });
        let count = prompts.len();
        state.video_prompts = prompts;
        state.phase = WorkflowPhase::VideoGeneration;
        state.request_approval(ApprovalKind::VideoPrompts, data);
        state.log(NAME, format!("Generated {} video prompts for {}", count, platform));
        Ok(state)
    }

    fn submit_videos(&self, mut state: PipelineState) -> Result<PipelineState, WorkerError> {
        if state.video_prompts.is_empty() {
            return Err(WorkerError::MissingInput("video_prompts"));
        }
        let platform = state.request.target_platform.clone();
        let provider = self.providers.get(&platform)?;
        state.log(NAME, format!("Submitting videos to {}...", platform));

        let mut tasks = std::mem::take(&mut state.video_tasks);
        tasks.retain(|shot_id, _| state.video_prompts.contains_key(shot_id));

        let mut submitted = 0usize;
        let mut failure = None;
        for (shot_id, prompt) in &state.video_prompts {
            if let Some(existing) = tasks.get(shot_id) {
                if existing.platform == platform
                    && existing.prompt == *prompt
                    && !existing.status.is_failure()
                {
                    continue;
                }
            }

            let duration = state
                .storyboard
                .iter()
                .find(|shot| shot.shot_id() == *shot_id)
                .map(|shot| shot.duration)
                .unwrap_or(DEFAULT_SHOT_SECONDS);
            let request = SubmitRequest {
                shot_id: shot_id.clone(),
                prompt: prompt.clone(),
                duration,
            };

            match self.retry.call("submit", || provider.submit(&request)) {
                Ok(task_id) => {
                    info!(shot_id = %shot_id, task_id = %task_id, "Video task submitted");
                    tasks.insert(shot_id.clone(), VideoTask::submitted(task_id, &platform, prompt));
                    submitted += 1;
                }
                Err(e) => {
                    warn!(shot_id = %shot_id, error = %e, "Video submission failed");
                    failure = Some(format!(
                        "Failed to submit video generation for {}: {}",
                        shot_id, e
                    ));
                    break;
                }
            }
        }

        // Tasks accepted before a failure stay in state.
        state.video_tasks = tasks;
        if let Some(message) = failure {
            state.fail(message);
            return Ok(state);
        }

        let data = json!({ "tasks": snapshot(&state.video_tasks)? });
        let total = state.video_tasks.len();
        state.phase = WorkflowPhase::Review;
        state.request_approval(ApprovalKind::VideoTasks, data);
        state.log(
            NAME,
            format!("Submitted {} video tasks ({} total)", submitted, total),
        );
        Ok(state)
    }
}

impl PhaseWorker for VideoProducer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, mut state: PipelineState) -> Result<PipelineState, WorkerError> {
        state.current_agent = NAME.to_string();
        match state.phase {
            WorkflowPhase::VideoPrompts => self.generate_prompts(state),
            WorkflowPhase::VideoGeneration => self.submit_videos(state),
            other => Err(WorkerError::UnexpectedPhase {
                worker: NAME,
                phase: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::phase::InteractionMode;
    use crate::state::{Shot, UserRequest, VideoTaskStatus};
    use crate::workers::testing::{FakeProvider, ScriptedPrompts};

    fn producer(provider: Arc<FakeProvider>) -> VideoProducer {
        VideoProducer::new(
            Arc::new(ScriptedPrompts),
            ProviderRegistry::new().with(provider),
            RetryPolicy::none(),
        )
    }

    fn with_storyboard() -> PipelineState {
        let mut state = PipelineState::new(UserRequest::new("idea"), InteractionMode::Interactive);
        state.phase = WorkflowPhase::VideoPrompts;
        for n in 1..=3 {
            state.storyboard.push(Shot {
                episode_number: 1,
                shot_number: n,
                description: format!("shot {}", n),
                duration: 4,
                ..Default::default()
            });
        }
        state
    }

    fn with_prompts(provider: &Arc<FakeProvider>) -> PipelineState {
        let mut state = producer(provider.clone()).run(with_storyboard()).unwrap();
        state.clear_approval();
        state
    }

    #[test]
    fn test_prompts_keyed_by_shot_id() {
        let provider = Arc::new(FakeProvider::new("kling"));
        let state = producer(provider).run(with_storyboard()).unwrap();
        assert_eq!(state.phase, WorkflowPhase::VideoGeneration);
        assert_eq!(state.approval_type, Some(ApprovalKind::VideoPrompts));
        let keys: Vec<&String> = state.video_prompts.keys().collect();
        assert_eq!(keys, vec!["ep1_shot1", "ep1_shot2", "ep1_shot3"]);
        assert_eq!(state.approval_data.as_ref().unwrap()["platform"], "kling");
    }

    #[test]
    fn test_submits_every_prompt() {
        let provider = Arc::new(FakeProvider::new("kling"));
        let state = producer(provider.clone())
            .run(with_prompts(&provider))
            .unwrap();
        assert_eq!(state.phase, WorkflowPhase::Review);
        assert_eq!(state.approval_type, Some(ApprovalKind::VideoTasks));
        assert_eq!(state.video_tasks.len(), 3);
        assert_eq!(provider.submissions(), 3);
        assert!(
            state
                .video_tasks
                .values()
                .all(|t| t.status == VideoTaskStatus::Submitted)
        );
    }

    #[test]
    fn test_failure_keeps_partial_tasks() {
        let provider = Arc::new(FakeProvider::new("kling"));
        let state = with_prompts(&provider);
        provider.fail_submit_on("ep1_shot2", ProviderError::Api {
            status: 400,
            message: "content filter".into(),
        });

        let state = producer(provider.clone()).run(state).unwrap();
        assert_eq!(state.phase, WorkflowPhase::Error);
        assert!(state.error.as_deref().unwrap().contains("ep1_shot2"));
        assert_eq!(state.video_tasks.len(), 1);
        assert!(state.video_tasks.contains_key("ep1_shot1"));
    }

    #[test]
    fn test_reentry_skips_accepted_shots() {
        let provider = Arc::new(FakeProvider::new("kling"));
        let mut state = with_prompts(&provider);
        state.video_tasks.insert(
            "ep1_shot1".into(),
            VideoTask::submitted("task-existing".into(), "kling", &state.video_prompts["ep1_shot1"]),
        );
        let mut failed = VideoTask::submitted("task-bad".into(), "kling", &state.video_prompts["ep1_shot2"]);
        failed.status = VideoTaskStatus::Failed;
        state.video_tasks.insert("ep1_shot2".into(), failed);

        let state = producer(provider.clone()).run(state).unwrap();
        assert_eq!(provider.submissions(), 2);
        assert_eq!(state.video_tasks["ep1_shot1"].task_id, "task-existing");
        assert_ne!(state.video_tasks["ep1_shot2"].task_id, "task-bad");
    }

    #[test]
    fn test_changed_prompt_is_resubmitted() {
        let provider = Arc::new(FakeProvider::new("kling"));
        let mut state = with_prompts(&provider);
        state.video_tasks.insert(
            "ep1_shot1".into(),
            VideoTask::submitted("task-old".into(), "kling", "an older prompt"),
        );
        let state = producer(provider.clone()).run(state).unwrap();
        assert_eq!(provider.submissions(), 3);
        assert_ne!(state.video_tasks["ep1_shot1"].task_id, "task-old");
    }

    #[test]
    fn test_unknown_platform_is_an_error() {
        let provider = Arc::new(FakeProvider::new("kling"));
        let mut state = with_prompts(&provider);
        state.request.target_platform = "sora".into();
        let err = producer(provider).run(state).unwrap_err();
        assert!(matches!(err, WorkerError::UnknownPlatform(_)));
    }
}
