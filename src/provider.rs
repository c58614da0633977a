//! Submit / poll contract for video generation providers.
//!
//! Provider clients live outside this crate. The video producer and reviewer
//! resolve them by platform name through a `ProviderRegistry`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{ProviderError, WorkerError};
use crate::state::VideoTaskStatus;

/// Platforms the pipeline knows by name.
pub const KNOWN_PLATFORMS: [&str; 4] = ["kling", "hailuo", "jimeng", "tongyi"];

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    pub shot_id: String,
    pub prompt: String,
    /// Seconds
    pub duration: u32,
}

/// Provider-side view of a task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub status: VideoTaskStatus,
    pub video_url: Option<String>,
    pub error: Option<String>,
}

impl TaskReport {
    pub fn pending() -> Self {
        Self {
            status: VideoTaskStatus::Pending,
            video_url: None,
            error: None,
        }
    }

    pub fn completed(url: impl Into<String>) -> Self {
        Self {
            status: VideoTaskStatus::Completed,
            video_url: Some(url.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: VideoTaskStatus::Failed,
            video_url: None,
            error: Some(error.into()),
        }
    }
}

pub trait VideoProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Submit a generation request, returning the provider's task id.
    fn submit(&self, request: &SubmitRequest) -> Result<String, ProviderError>;

    fn poll(&self, task_id: &str) -> Result<TaskReport, ProviderError>;
}

/// Providers keyed by lower-case platform name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn VideoProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under its own name, replacing any earlier entry.
    pub fn register(&mut self, provider: Arc<dyn VideoProvider>) {
        self.providers
            .insert(provider.name().to_lowercase(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn VideoProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, platform: &str) -> Result<Arc<dyn VideoProvider>, WorkerError> {
        self.providers
            .get(&platform.to_lowercase())
            .cloned()
            .ok_or_else(|| WorkerError::UnknownPlatform(platform.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
