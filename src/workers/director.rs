use std::sync::Arc;

use serde_json::json;

use super::content::StoryboardGenerator;
use super::{PhaseWorker, generation_failed, snapshot};
use crate::errors::WorkerError;
use crate::phase::{ApprovalKind, WorkflowPhase};
use crate::state::PipelineState;

const NAME: &str = "Director";

/// Breaks every episode into shots and pauses on `storyboard`.
pub struct Director {
    generator: Arc<dyn StoryboardGenerator>,
}

impl Director {
    pub fn new(generator: Arc<dyn StoryboardGenerator>) -> Self {
        Self { generator }
    }

    fn create_storyboard(&self, mut state: PipelineState) -> Result<PipelineState, WorkerError> {
        if state.episodes.is_empty() {
            return Err(WorkerError::MissingInput("episodes"));
        }
        state.log(NAME, "Creating storyboard...");

        let mut storyboard = Vec::new();
        for episode in &state.episodes {
            let shots = self
                .generator
                .shots(&state.request, episode, &state.characters)
                .map_err(|e| {
                    generation_failed(
                        &format!("create storyboard for episode {}", episode.episode_number),
                        e,
                    )
                })?;
            for (index, mut shot) in shots.into_iter().enumerate() {
                shot.episode_number = episode.episode_number;
                if shot.shot_number == 0 {
                    shot.shot_number = index as u32 + 1;
                }
                storyboard.push(shot);
            }
        }
        if storyboard.is_empty() {
            return Err(WorkerError::Generation(
                "Failed to create storyboard: no shots returned".to_string(),
            ));
        }

        let total = storyboard.len();
        let data = json!({
            "shots": snapshot(&storyboard)?,
            "total_shots": total,
        });
        state.storyboard = storyboard;
        state.phase = WorkflowPhase::VideoPrompts;
        state.request_approval(ApprovalKind::Storyboard, data);
        state.log(NAME, format!("Storyboard created with {} shots", total));
        Ok(state)
    }
}

impl PhaseWorker for Director {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, mut state: PipelineState) -> Result<PipelineState, WorkerError> {
        state.current_agent = NAME.to_string();
        match state.phase {
            WorkflowPhase::Storyboard => self.create_storyboard(state),
            other => Err(WorkerError::UnexpectedPhase {
                worker: NAME,
                phase: other.to_string(),
            }),
        }
    }
}
