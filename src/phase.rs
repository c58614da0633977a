//! Pipeline vocabulary for the storyforge orchestrator.
//!
//! This module provides:
//! - `WorkflowPhase`, the ordered set of pipeline phases
//! - `InteractionMode`, whether approval gates pause or auto-clear
//! - `ApprovalKind`, the tag naming which artifact awaits approval

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stage of the pipeline.
///
/// Variants are declared in happy-path order, so the derived `Ord` matches
/// the order in which a successful run visits them. `Error` sorts last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    #[default]
    Init,
    StoryOutline,
    CharacterDesign,
    EpisodeWriting,
    Storyboard,
    VideoPrompts,
    VideoGeneration,
    Review,
    Completed,
    Error,
}

impl WorkflowPhase {
    /// Every phase in declaration order.
    pub const ALL: [WorkflowPhase; 10] = [
        Self::Init,
        Self::StoryOutline,
        Self::CharacterDesign,
        Self::EpisodeWriting,
        Self::Storyboard,
        Self::VideoPrompts,
        Self::VideoGeneration,
        Self::Review,
        Self::Completed,
        Self::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::StoryOutline => "story_outline",
            Self::CharacterDesign => "character_design",
            Self::EpisodeWriting => "episode_writing",
            Self::Storyboard => "storyboard",
            Self::VideoPrompts => "video_prompts",
            Self::VideoGeneration => "video_generation",
            Self::Review => "review",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// `Completed` and `Error` end the phase loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| format!("Invalid workflow phase: {}", s))
    }
}

/// How approval gates behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    /// Pause at every approval gate
    #[default]
    Interactive,
    /// Clear approval gates automatically
    Autonomous,
}

impl InteractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Autonomous => "autonomous",
        }
    }
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "interactive" => Ok(Self::Interactive),
            "autonomous" => Ok(Self::Autonomous),
            _ => Err(format!(
                "Invalid interaction mode '{}'. Valid values: interactive, autonomous",
                s
            )),
        }
    }
}

/// Which artifact a paused pipeline is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    StoryOutline,
    Characters,
    Episodes,
    Storyboard,
    VideoPrompts,
    VideoTasks,
    /// Review is waiting on providers, not on a human decision.
    VideoStatus,
}

impl ApprovalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StoryOutline => "story_outline",
            Self::Characters => "characters",
            Self::Episodes => "episodes",
            Self::Storyboard => "storyboard",
            Self::VideoPrompts => "video_prompts",
            Self::VideoTasks => "video_tasks",
            Self::VideoStatus => "video_status",
        }
    }

    /// Whether autonomous mode may clear this gate without a caller.
    pub fn auto_clears(&self) -> bool {
        !matches!(self, Self::VideoStatus)
    }
}

impl fmt::Display for ApprovalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
