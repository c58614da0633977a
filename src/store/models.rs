use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::phase::{InteractionMode, WorkflowPhase};
use crate::state::PipelineState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Derive the lifecycle status from the embedded state.
    ///
    /// Precedence: error, completion, pending approval, otherwise running.
    pub fn from_state(state: &PipelineState) -> Self {
        if state.error.is_some() {
            Self::Failed
        } else if state.phase == WorkflowPhase::Completed {
            Self::Completed
        } else if state.pending_approval {
            Self::Paused
        } else {
            Self::Running
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid session status: {}", s)),
        }
    }
}

/// Why a checkpoint was written.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepLabel {
    Start,
    Continue,
    Resume,
    ResumeFromError,
    Rejected,
}

impl StepLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Continue => "continue",
            Self::Resume => "resume",
            Self::ResumeFromError => "resume_from_error",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for StepLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "continue" => Ok(Self::Continue),
            "resume" => Ok(Self::Resume),
            "resume_from_error" => Ok(Self::ResumeFromError),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid step label: {}", s)),
        }
    }
}

/// One pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_id: String,
    pub description: String,
    pub mode: InteractionMode,
    pub current_phase: WorkflowPhase,
    pub status: SessionStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only record of one orchestrator pause.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub id: i64,
    pub session_id: String,
    pub step: StepLabel,
    pub phase: WorkflowPhase,
    pub input_summary: Value,
    pub output_summary: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session: Session,
    pub checkpoints: Vec<Checkpoint>,
}
