use crate::phase::WorkflowPhase;
use crate::state::PipelineState;

/// Phase to re-enter for a failed state, inferred from its latest artifact.
pub fn resume_phase(state: &PipelineState) -> WorkflowPhase {
    if !state.video_prompts.is_empty() {
        WorkflowPhase::VideoGeneration
    } else if !state.storyboard.is_empty() {
        WorkflowPhase::VideoPrompts
    } else if !state.episodes.is_empty() {
        WorkflowPhase::Storyboard
    } else if !state.characters.is_empty() {
        WorkflowPhase::CharacterDesign
    } else if state.story_outline.is_some() {
        WorkflowPhase::StoryOutline
    } else {
        WorkflowPhase::Init
    }
}

/// Clear the failure and position the state at its re-entry phase.
pub fn plan_resume(mut state: PipelineState) -> PipelineState {
    state.phase = resume_phase(&state);
    state.error = None;
    state.clear_approval();
    state.retry_count += 1;
    state
}
