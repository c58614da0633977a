use tracing::{debug, info, warn};

use super::router::{Route, route};
use crate::phase::InteractionMode;
use crate::state::PipelineState;
use crate::workers::{PhaseWorker, Workers};

pub const DEFAULT_MAX_ITERATIONS: u32 = 32;

pub const NOT_CONVERGED: &str = "workflow did not converge";

/// Drives the worker / router loop for one state.
pub struct Runner {
    workers: Workers,
    max_iterations: u32,
}

impl Runner {
    pub fn new(workers: Workers) -> Self {
        Self {
            workers,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run workers until the state pauses, finishes, fails or the iteration
    /// cap is reached. On return exactly one of `pending_approval`, `error`
    /// or a completed phase holds.
    pub fn run_until_checkpoint(&self, mut state: PipelineState) -> PipelineState {
        for iteration in 1..=self.max_iterations {
            match route(&state) {
                Route::Terminate => return state,
                Route::Pause => {
                    if !auto_clears(&state) {
                        return state;
                    }
                    info!(
                        approval = ?state.approval_type,
                        phase = %state.phase,
                        "Auto-approving in autonomous mode"
                    );
                    state.clear_approval();
                }
                Route::Run(kind) => {
                    debug!(worker = kind.as_str(), phase = %state.phase, iteration, "Running worker");
                    state = self.step(self.workers.get(kind), state);
                }
            }
        }

        let settled = match route(&state) {
            Route::Terminate => true,
            Route::Pause => !auto_clears(&state),
            Route::Run(_) => false,
        };
        if !settled {
            warn!(
                phase = %state.phase,
                max_iterations = self.max_iterations,
                "Iteration cap reached"
            );
            state.fail(NOT_CONVERGED);
        }
        state
    }

    /// One worker call. Failures are recorded on the input state.
    fn step(&self, worker: &dyn PhaseWorker, state: PipelineState) -> PipelineState {
        let before = state.clone();
        match worker.run(state) {
            Ok(mut next) => {
                // A null payload persists as no payload.
                next.approval_data.take_if(|data| data.is_null());
                if next.phase < before.phase {
                    let message = format!(
                        "{} moved phase backwards from {} to {}",
                        worker.name(),
                        before.phase,
                        next.phase
                    );
                    let mut failed = before;
                    failed.fail(message);
                    return failed;
                }
                if let Some(violation) = next.invariant_violation() {
                    let mut failed = next;
                    failed.fail(format!("{} left an invalid state: {}", worker.name(), violation));
                    return failed;
                }
                if let Some(err) = &next.error {
                    warn!(worker = worker.name(), error = %err, "Worker reported failure");
                }
                next
            }
            Err(e) => {
                warn!(worker = worker.name(), error = %e, "Worker failed");
                let mut failed = before;
                failed.fail(e.to_string());
                failed
            }
        }
    }
}

fn auto_clears(state: &PipelineState) -> bool {
    state.mode == InteractionMode::Autonomous
        && state.approval_type.is_some_and(|kind| kind.auto_clears())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::WorkerError;
    use crate::phase::{ApprovalKind, WorkflowPhase};
    use crate::provider::{ProviderRegistry, TaskReport};
    use crate::retry::RetryPolicy;
    use crate::state::UserRequest;
    use crate::workers::testing::{
        FailingStory, FakeProvider, ScriptedPrompts, ScriptedStory, ScriptedStoryboard,
    };
    use std::sync::Arc;

    fn standard(provider: Arc<FakeProvider>) -> Workers {
        Workers::standard(
            Arc::new(ScriptedStory),
            Arc::new(ScriptedStoryboard),
            Arc::new(ScriptedPrompts),
            ProviderRegistry::new().with(provider),
            RetryPolicy::none(),
        )
    }

    fn fresh(mode: InteractionMode) -> PipelineState {
        PipelineState::new(UserRequest::new("A robot learns to paint"), mode)
    }

    /// A worker that returns its input untouched.
    struct Stuck;

    impl PhaseWorker for Stuck {
        fn name(&self) -> &'static str {
            "Stuck"
        }

        fn run(&self, state: PipelineState) -> Result<PipelineState, WorkerError> {
            Ok(state)
        }
    }

    struct Regress;

    impl PhaseWorker for Regress {
        fn name(&self) -> &'static str {
            "Regress"
        }

        fn run(&self, mut state: PipelineState) -> Result<PipelineState, WorkerError> {
            state.phase = WorkflowPhase::Init;
            Ok(state)
        }
    }

    struct PauseWithoutKind;

    impl PhaseWorker for PauseWithoutKind {
        fn name(&self) -> &'static str {
            "PauseWithoutKind"
        }

        fn run(&self, mut state: PipelineState) -> Result<PipelineState, WorkerError> {
            state.pending_approval = true;
            Ok(state)
        }
    }

    struct PauseWithNullData;

    impl PhaseWorker for PauseWithNullData {
        fn name(&self) -> &'static str {
            "PauseWithNullData"
        }

        fn run(&self, mut state: PipelineState) -> Result<PipelineState, WorkerError> {
            state.pending_approval = true;
            state.approval_type = Some(ApprovalKind::StoryOutline);
            state.approval_data = Some(serde_json::Value::Null);
            Ok(state)
        }
    }

    fn with_story_writer(worker: Box<dyn PhaseWorker>) -> Workers {
        Workers::new(
            worker,
            Box::new(Stuck),
            Box::new(Stuck),
            Box::new(Stuck),
        )
    }

    fn assert_single_checkpoint_flag(state: &PipelineState) {
        let flags = [
            state.pending_approval,
            state.error.is_some(),
            state.phase == WorkflowPhase::Completed,
        ];
        assert_eq!(flags.iter().filter(|f| **f).count(), 1, "{:?}", flags);
    }

    #[test]
    fn test_interactive_pauses_after_outline() {
        let runner = Runner::new(standard(Arc::new(FakeProvider::new("kling"))));
        let state = runner.run_until_checkpoint(fresh(InteractionMode::Interactive));
        assert_eq!(state.phase, WorkflowPhase::StoryOutline);
        assert_eq!(state.approval_type, Some(ApprovalKind::StoryOutline));
        assert_single_checkpoint_flag(&state);
    }

    #[test]
    fn test_autonomous_runs_to_video_status() {
        let provider = Arc::new(FakeProvider::new("kling"));
        let runner = Runner::new(standard(provider.clone()));
        let state = runner.run_until_checkpoint(fresh(InteractionMode::Autonomous));
        assert_eq!(state.phase, WorkflowPhase::Review);
        assert_eq!(state.approval_type, Some(ApprovalKind::VideoStatus));
        assert_eq!(provider.submissions(), 2);
        assert_single_checkpoint_flag(&state);
    }

    #[test]
    fn test_autonomous_completes_when_videos_are_ready() {
        let provider = Arc::new(FakeProvider::new("kling"));
        for id in 1..=2 {
            provider.set_report(
                &format!("kling-task-{}", id),
                TaskReport::completed(format!("https://cdn/{}.mp4", id)),
            );
        }
        let runner = Runner::new(standard(provider));
        let state = runner.run_until_checkpoint(fresh(InteractionMode::Autonomous));
        assert_eq!(state.phase, WorkflowPhase::Completed);
        assert_single_checkpoint_flag(&state);
    }

    #[test]
    fn test_worker_error_is_recorded_on_input_state() {
        let workers = Workers::standard(
            Arc::new(FailingStory),
            Arc::new(ScriptedStoryboard),
            Arc::new(ScriptedPrompts),
            ProviderRegistry::new(),
            RetryPolicy::none(),
        );
        let state = Runner::new(workers).run_until_checkpoint(fresh(InteractionMode::Interactive));
        assert_eq!(state.phase, WorkflowPhase::Error);
        assert!(state.error.as_deref().unwrap().contains("model quota exhausted"));
        assert!(state.messages.is_empty());
        assert_single_checkpoint_flag(&state);
    }

    #[test]
    fn test_iteration_cap_reports_non_convergence() {
        let runner = Runner::new(with_story_writer(Box::new(Stuck))).with_max_iterations(5);
        let state = runner.run_until_checkpoint(fresh(InteractionMode::Interactive));
        assert_eq!(state.phase, WorkflowPhase::Error);
        assert_eq!(state.error.as_deref(), Some(NOT_CONVERGED));
    }

    #[test]
    fn test_phase_regression_is_a_failure() {
        let mut state = fresh(InteractionMode::Interactive);
        state.phase = WorkflowPhase::CharacterDesign;
        let state = Runner::new(with_story_writer(Box::new(Regress))).run_until_checkpoint(state);
        assert_eq!(state.phase, WorkflowPhase::Error);
        assert!(state.error.unwrap().contains("backwards"));
    }

    #[test]
    fn test_pause_without_kind_is_a_failure() {
        let state = Runner::new(with_story_writer(Box::new(PauseWithoutKind)))
            .run_until_checkpoint(fresh(InteractionMode::Interactive));
        assert_eq!(state.phase, WorkflowPhase::Error);
        assert!(!state.pending_approval);
        assert!(state.error.unwrap().contains("approval type"));
    }

    #[test]
    fn test_null_approval_data_is_dropped() {
        let state = Runner::new(with_story_writer(Box::new(PauseWithNullData)))
            .run_until_checkpoint(fresh(InteractionMode::Interactive));
        assert!(state.pending_approval);
        assert_eq!(state.approval_type, Some(ApprovalKind::StoryOutline));
        assert!(state.approval_data.is_none());

        let raw = crate::store::encode_state(&state).unwrap();
        assert_eq!(crate::store::decode_state(&raw).unwrap(), state);
    }

    #[test]
    fn test_terminal_state_is_returned_untouched() {
        let mut state = fresh(InteractionMode::Interactive);
        state.complete();
        let runner = Runner::new(with_story_writer(Box::new(Stuck)));
        assert_eq!(runner.run_until_checkpoint(state.clone()), state);
    }
}
