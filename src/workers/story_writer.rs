use std::sync::Arc;

use serde_json::json;
use tracing::info;

use super::content::StoryGenerator;
use super::{PhaseWorker, generation_failed, snapshot};
use crate::errors::WorkerError;
use crate::phase::{ApprovalKind, WorkflowPhase};
use crate::state::PipelineState;

const NAME: &str = "StoryWriter";

/// Outline, characters and episodes.
///
/// Phases handled:
/// - `Init` writes the outline and pauses on `story_outline`
/// - `StoryOutline` designs characters and pauses on `characters`
/// - `CharacterDesign` writes every episode and pauses on `episodes`
/// - `EpisodeWriting` hands the approved episodes to the director
pub struct StoryWriter {
    generator: Arc<dyn StoryGenerator>,
}

impl StoryWriter {
    pub fn new(generator: Arc<dyn StoryGenerator>) -> Self {
        Self { generator }
    }

    fn write_outline(&self, mut state: PipelineState) -> Result<PipelineState, WorkerError> {
        state.log(NAME, "Generating story outline...");
        let outline = self
            .generator
            .outline(&state.request)
            .map_err(|e| generation_failed("generate story outline", e))?;

        state.project_name = if outline.title.trim().is_empty() {
            let idea: String = state.request.idea.chars().take(20).collect();
            format!("Project_{}", idea)
        } else {
            outline.title.clone()
        };

        let data = snapshot(&outline)?;
        state.story_outline = Some(outline);
        state.phase = WorkflowPhase::StoryOutline;
        state.request_approval(ApprovalKind::StoryOutline, data);
        let message = format!("Story outline generated: {}", state.project_name);
        state.log(NAME, message);
        info!(project = %state.project_name, "Story outline ready for approval");
        Ok(state)
    }

    fn design_characters(&self, mut state: PipelineState) -> Result<PipelineState, WorkerError> {
        state.log(NAME, "Designing characters...");
        let outline = state
            .story_outline
            .as_ref()
            .ok_or(WorkerError::MissingInput("story_outline"))?;

        let characters = self
            .generator
            .characters(&state.request, outline)
            .map_err(|e| generation_failed("design characters", e))?;
        if characters.is_empty() {
            return Err(WorkerError::Generation(
                "Failed to design characters: no characters returned".to_string(),
            ));
        }

        let data = json!({ "characters": snapshot(&characters)? });
        let count = characters.len();
        state.characters = characters;
        state.phase = WorkflowPhase::CharacterDesign;
        state.request_approval(ApprovalKind::Characters, data);
        state.log(NAME, format!("Designed {} characters", count));
        Ok(state)
    }

    fn write_episodes(&self, mut state: PipelineState) -> Result<PipelineState, WorkerError> {
        let outline = state
            .story_outline
            .as_ref()
            .ok_or(WorkerError::MissingInput("story_outline"))?;

        let total = state.request.num_episodes.max(1);
        let mut episodes = Vec::with_capacity(total as usize);
        for number in 1..=total {
            let mut episode = self
                .generator
                .episode(&state.request, outline, &state.characters, number)
                .map_err(|e| generation_failed(&format!("write episode {}", number), e))?;
            episode.episode_number = number;
            episodes.push(episode);
        }

        let data = json!({ "episodes": snapshot(&episodes)? });
        state.episodes = episodes;
        state.phase = WorkflowPhase::EpisodeWriting;
        state.request_approval(ApprovalKind::Episodes, data);
        state.log(NAME, format!("Wrote {} episodes", total));
        Ok(state)
    }

    fn hand_off(&self, mut state: PipelineState) -> Result<PipelineState, WorkerError> {
        if state.episodes.is_empty() {
            return Err(WorkerError::MissingInput("episodes"));
        }
        state.phase = WorkflowPhase::Storyboard;
        state.log(NAME, "Episodes approved, handing off to the director");
        Ok(state)
    }
}

impl PhaseWorker for StoryWriter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, mut state: PipelineState) -> Result<PipelineState, WorkerError> {
        state.current_agent = NAME.to_string();
        match state.phase {
            WorkflowPhase::Init => self.write_outline(state),
            WorkflowPhase::StoryOutline => self.design_characters(state),
            WorkflowPhase::CharacterDesign => self.write_episodes(state),
            WorkflowPhase::EpisodeWriting => self.hand_off(state),
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
    use crate::phase::InteractionMode;
    use crate::state::UserRequest;
    use crate::workers::testing::{FailingStory, ScriptedStory};

    fn writer() -> StoryWriter {
        StoryWriter::new(Arc::new(ScriptedStory))
    }

    fn fresh() -> PipelineState {
        PipelineState::new(
            UserRequest::new("A robot learns to paint").with_episodes(2),
            InteractionMode::Interactive,
        )
    }

    #[test]
    fn test_init_writes_outline_and_pauses() {
        let state = writer().run(fresh()).unwrap();
        assert_eq!(state.phase, WorkflowPhase::StoryOutline);
        assert_eq!(state.approval_type, Some(ApprovalKind::StoryOutline));
        assert_eq!(state.project_name, "Brushstrokes");
        assert_eq!(state.current_agent, NAME);
        assert!(state.story_outline.is_some());
    }

    #[test]
    fn test_full_story_sequence() {
        let w = writer();
        let mut state = w.run(fresh()).unwrap();
        state.clear_approval();
        state = w.run(state).unwrap();
        assert_eq!(state.phase, WorkflowPhase::CharacterDesign);
        assert_eq!(state.approval_type, Some(ApprovalKind::Characters));
        assert_eq!(state.characters.len(), 2);

        state.clear_approval();
        state = w.run(state).unwrap();
        assert_eq!(state.phase, WorkflowPhase::EpisodeWriting);
        assert_eq!(state.approval_type, Some(ApprovalKind::Episodes));
        let numbers: Vec<u32> = state.episodes.iter().map(|e| e.episode_number).collect();
        assert_eq!(numbers, vec![1, 2]);

        state.clear_approval();
        state = w.run(state).unwrap();
        assert_eq!(state.phase, WorkflowPhase::Storyboard);
        assert!(!state.pending_approval);
    }

    #[test]
    fn test_characters_without_outline_is_missing_input() {
        let mut state = fresh();
        state.phase = WorkflowPhase::StoryOutline;
        let err = writer().run(state).unwrap_err();
        assert!(matches!(err, WorkerError::MissingInput("story_outline")));
    }

    #[test]
    fn test_generator_failure_is_reported_with_context() {
        let err = StoryWriter::new(Arc::new(FailingStory))
            .run(fresh())
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to generate story outline"));
    }

    #[test]
    fn test_blank_title_falls_back_to_idea() {
        let mut outline_state = fresh();
        outline_state.request.idea = "A very long idea about robots and paint".into();
        let state = StoryWriter::new(Arc::new(crate::workers::testing::UntitledStory))
            .run(outline_state)
            .unwrap();
        assert_eq!(state.project_name, "Project_A very long idea abo");
    }

    #[test]
    fn test_rejects_foreign_phase() {
        let mut state = fresh();
        state.phase = WorkflowPhase::Review;
        assert!(matches!(
            writer().run(state),
            Err(WorkerError::UnexpectedPhase { worker: NAME, .. })
        ));
    }
}
