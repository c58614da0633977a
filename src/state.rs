//! The pipeline state threaded through every phase worker.
//!
//! `PipelineState` is the unit of persistence: workers receive it by value,
//! return a replacement, and the orchestrator snapshots it at every pause.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::phase::{ApprovalKind, InteractionMode, WorkflowPhase};

/// Creation parameters for a pipeline run. Never mutated after `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRequest {
    pub idea: String,
    #[serde(default = "default_genre")]
    pub genre: String,
    #[serde(default)]
    pub style: String,
    #[serde(default = "default_num_episodes")]
    pub num_episodes: u32,
    /// Seconds per episode
    #[serde(default = "default_episode_duration")]
    pub episode_duration: u32,
    #[serde(default = "default_num_characters")]
    pub num_characters: u32,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default = "default_target_platform")]
    pub target_platform: String,
}

fn default_genre() -> String {
    "drama".to_string()
}

fn default_num_episodes() -> u32 {
    1
}

fn default_episode_duration() -> u32 {
    60
}

fn default_num_characters() -> u32 {
    3
}

fn default_target_platform() -> String {
    "kling".to_string()
}

impl UserRequest {
    pub fn new(idea: impl Into<String>) -> Self {
        Self {
            idea: idea.into(),
            genre: default_genre(),
            style: String::new(),
            num_episodes: default_num_episodes(),
            episode_duration: default_episode_duration(),
            num_characters: default_num_characters(),
            target_audience: String::new(),
            target_platform: default_target_platform(),
        }
    }

    pub fn with_episodes(mut self, num_episodes: u32) -> Self {
        self.num_episodes = num_episodes;
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.target_platform = platform.into();
        self
    }

    /// Short free-text description stored on the session row.
    pub fn summary(&self) -> String {
        const MAX_CHARS: usize = 200;
        if self.idea.chars().count() <= MAX_CHARS {
            self.idea.clone()
        } else {
            let truncated: String = self.idea.chars().take(MAX_CHARS).collect();
            format!("{}…", truncated)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeOutline {
    pub episode_number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub outline: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryOutline {
    pub title: String,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub premise: String,
    #[serde(default)]
    pub episodes: Vec<EpisodeOutline>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub appearance: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub background: String,
    /// English description handed to video models
    #[serde(default)]
    pub visual_description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub scene_number: u32,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dialogue: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub episode_number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub script: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub episode_number: u32,
    pub shot_number: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub visual_description: String,
    /// Seconds
    #[serde(default = "default_shot_duration")]
    pub duration: u32,
    #[serde(default = "default_camera_movement")]
    pub camera_movement: String,
    #[serde(default)]
    pub characters: Vec<String>,
}

fn default_shot_duration() -> u32 {
    3
}

fn default_camera_movement() -> String {
    "static".to_string()
}

impl Shot {
    /// Key used in `video_prompts` and `video_tasks`.
    pub fn shot_id(&self) -> String {
        format!("ep{}_shot{}", self.episode_number, self.shot_number)
    }
}

/// Lifecycle of one provider-side video generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoTaskStatus {
    /// Accepted by the provider, not yet polled
    Submitted,
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl VideoTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoTask {
    pub task_id: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub prompt: String,
    pub status: VideoTaskStatus,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl VideoTask {
    pub fn submitted(task_id: String, platform: &str, prompt: &str) -> Self {
        Self {
            task_id,
            platform: platform.to_string(),
            prompt: prompt.to_string(),
            status: VideoTaskStatus::Submitted,
            video_url: None,
            error: None,
        }
    }

    /// A completed task only counts once the provider handed back a URL.
    pub fn is_successful(&self) -> bool {
        self.status == VideoTaskStatus::Completed && self.video_url.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub agent: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Shared state for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub request: UserRequest,
    #[serde(default)]
    pub phase: WorkflowPhase,
    #[serde(default)]
    pub mode: InteractionMode,
    /// Name of the last worker that ran
    #[serde(default)]
    pub current_agent: String,
    #[serde(default)]
    pub project_name: String,

    #[serde(default)]
    pub story_outline: Option<StoryOutline>,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
    #[serde(default)]
    pub storyboard: Vec<Shot>,
    #[serde(default)]
    pub video_prompts: BTreeMap<String, String>,
    #[serde(default)]
    pub video_tasks: BTreeMap<String, VideoTask>,

    #[serde(default)]
    pub messages: Vec<AgentMessage>,

    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default)]
    pub pending_approval: bool,
    #[serde(default)]
    pub approval_type: Option<ApprovalKind>,
    #[serde(default)]
    pub approval_data: Option<Value>,
}

impl PipelineState {
    pub fn new(request: UserRequest, mode: InteractionMode) -> Self {
        Self {
            request,
            phase: WorkflowPhase::Init,
            mode,
            current_agent: String::new(),
            project_name: String::new(),
            story_outline: None,
            characters: Vec::new(),
            episodes: Vec::new(),
            storyboard: Vec::new(),
            video_prompts: BTreeMap::new(),
            video_tasks: BTreeMap::new(),
            messages: Vec::new(),
            error: None,
            retry_count: 0,
            pending_approval: false,
            approval_type: None,
            approval_data: None,
        }
    }

    /// Raise an approval gate. A `Value::Null` snapshot is stored as absent
    /// so the persisted form stays a faithful round trip.
    pub fn request_approval(&mut self, kind: ApprovalKind, data: Value) {
        self.pending_approval = true;
        self.approval_type = Some(kind);
        self.approval_data = if data.is_null() { None } else { Some(data) };
    }

    pub fn clear_approval(&mut self) {
        self.pending_approval = false;
        self.approval_type = None;
        self.approval_data = None;
    }

    /// Move to `Error`, recording `message`.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.error = Some(if message.trim().is_empty() {
            "unknown error".to_string()
        } else {
            message
        });
        self.phase = WorkflowPhase::Error;
        self.clear_approval();
    }

    pub fn complete(&mut self) {
        self.phase = WorkflowPhase::Completed;
        self.error = None;
        self.clear_approval();
    }

    pub fn log(&mut self, agent: &str, content: impl Into<String>) {
        self.messages.push(AgentMessage {
            agent: agent.to_string(),
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn is_completed(&self) -> bool {
        self.phase == WorkflowPhase::Completed
    }

    /// Describe the first broken state invariant, if any.
    pub fn invariant_violation(&self) -> Option<&'static str> {
        if self.pending_approval && self.approval_type.is_none() {
            return Some("pending approval without an approval type");
        }
        if self.pending_approval && self.error.is_some() {
            return Some("pending approval while an error is set");
        }
        if self.phase == WorkflowPhase::Error && self.error.is_none() {
            return Some("error phase without an error message");
        }
        if self.phase == WorkflowPhase::Error && self.pending_approval {
            return Some("error phase with a pending approval");
        }
        if self.phase == WorkflowPhase::Completed && self.error.is_some() {
            return Some("completed phase with an error");
        }
        None
    }

    pub fn summary(&self) -> StateSummary {
        StateSummary {
            phase: self.phase,
            project_name: self.project_name.clone(),
            pending_approval: self.pending_approval,
            approval_type: self.approval_type,
            error: self.error.clone(),
            retry_count: self.retry_count,
            num_characters: self.characters.len(),
            num_episodes: self.episodes.len(),
            num_shots: self.storyboard.len(),
            num_prompts: self.video_prompts.len(),
            num_video_tasks: self.video_tasks.len(),
        }
    }
}

/// Compact view of a state, used for checkpoint summaries and listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSummary {
    pub phase: WorkflowPhase,
    pub project_name: String,
    pub pending_approval: bool,
    pub approval_type: Option<ApprovalKind>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub num_characters: usize,
    pub num_episodes: usize,
    pub num_shots: usize,
    pub num_prompts: usize,
    pub num_video_tasks: usize,
}
