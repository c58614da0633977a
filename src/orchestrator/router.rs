use crate::phase::WorkflowPhase;
use crate::state::PipelineState;
use crate::workers::WorkerKind;

/// What the run loop does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Run(WorkerKind),
    Pause,
    Terminate,
}

/// Map a state to its next step. Error beats a pending approval, which
/// beats phase dispatch.
pub fn route(state: &PipelineState) -> Route {
    if state.error.is_some() {
        return Route::Terminate;
    }
    if state.pending_approval {
        return Route::Pause;
    }
    match state.phase {
        WorkflowPhase::Init
        | WorkflowPhase::StoryOutline
        | WorkflowPhase::CharacterDesign
        | WorkflowPhase::EpisodeWriting => Route::Run(WorkerKind::StoryWriter),
        WorkflowPhase::Storyboard => Route::Run(WorkerKind::Director),
        WorkflowPhase::VideoPrompts | WorkflowPhase::VideoGeneration => {
            Route::Run(WorkerKind::VideoProducer)
        }
        WorkflowPhase::Review => Route::Run(WorkerKind::Reviewer),
        WorkflowPhase::Completed | WorkflowPhase::Error => Route::Terminate,
    }
}
