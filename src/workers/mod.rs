//! Phase workers.
//!
//! Each worker takes the pipeline state by value and returns its replacement.
//! A worker commits its artifact and advances the phase in the same update.

pub mod content;
pub mod director;
pub mod reviewer;
pub mod story_writer;
pub mod video_producer;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

pub use content::{PromptGenerator, StoryGenerator, StoryboardGenerator};
pub use director::Director;
pub use reviewer::Reviewer;
pub use story_writer::StoryWriter;
pub use video_producer::VideoProducer;

use crate::errors::WorkerError;
use crate::provider::ProviderRegistry;
use crate::retry::RetryPolicy;
use crate::state::PipelineState;

pub trait PhaseWorker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Expected domain failures may be recorded on the returned state; an
    /// `Err` is recorded by the caller and the input state is kept.
    fn run(&self, state: PipelineState) -> Result<PipelineState, WorkerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    StoryWriter,
    Director,
    VideoProducer,
    Reviewer,
}

impl WorkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StoryWriter => "story_writer",
            Self::Director => "director",
            Self::VideoProducer => "video_producer",
            Self::Reviewer => "reviewer",
        }
    }
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One worker per `WorkerKind`.
pub struct Workers {
    story_writer: Box<dyn PhaseWorker>,
    director: Box<dyn PhaseWorker>,
    video_producer: Box<dyn PhaseWorker>,
    reviewer: Box<dyn PhaseWorker>,
}

impl Workers {
    pub fn new(
        story_writer: Box<dyn PhaseWorker>,
        director: Box<dyn PhaseWorker>,
        video_producer: Box<dyn PhaseWorker>,
        reviewer: Box<dyn PhaseWorker>,
    ) -> Self {
        Self {
            story_writer,
            director,
            video_producer,
            reviewer,
        }
    }

    /// The standard worker set over the given generators and providers.
    pub fn standard(
        story: Arc<dyn StoryGenerator>,
        storyboard: Arc<dyn StoryboardGenerator>,
        prompts: Arc<dyn PromptGenerator>,
        providers: ProviderRegistry,
        retry: RetryPolicy,
    ) -> Self {
        Self::new(
            Box::new(StoryWriter::new(story)),
            Box::new(Director::new(storyboard)),
            Box::new(VideoProducer::new(prompts, providers.clone(), retry)),
            Box::new(Reviewer::new(providers, retry)),
        )
    }

    pub fn get(&self, kind: WorkerKind) -> &dyn PhaseWorker {
        match kind {
            WorkerKind::StoryWriter => self.story_writer.as_ref(),
            WorkerKind::Director => self.director.as_ref(),
            WorkerKind::VideoProducer => self.video_producer.as_ref(),
            WorkerKind::Reviewer => self.reviewer.as_ref(),
        }
    }
}

pub(crate) fn generation_failed(action: &str, err: anyhow::Error) -> WorkerError {
    WorkerError::Generation(format!("Failed to {}: {:#}", action, err))
}

/// Approval snapshot of an artifact.
pub(crate) fn snapshot<T: Serialize + ?Sized>(value: &T) -> Result<Value, WorkerError> {
    serde_json::to_value(value).map_err(|e| WorkerError::Other(e.into()))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic generators and an in-memory provider for unit tests.

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::bail;

    use super::*;
    use crate::errors::ProviderError;
    use crate::provider::{SubmitRequest, TaskReport, VideoProvider};
    use crate::state::{Character, Episode, Shot, StoryOutline, UserRequest};

    pub struct ScriptedStory;

    impl StoryGenerator for ScriptedStory {
        fn outline(&self, _request: &UserRequest) -> anyhow::Result<StoryOutline> {
            Ok(StoryOutline {
                title: "Brushstrokes".into(),
                synopsis: "A maintenance robot discovers painting.".into(),
                ..Default::default()
            })
        }

        fn characters(
            &self,
            _request: &UserRequest,
            _outline: &StoryOutline,
        ) -> anyhow::Result<Vec<Character>> {
            Ok(vec![
                Character {
                    name: "Pip".into(),
                    role: "protagonist".into(),
                    ..Default::default()
                },
                Character {
                    name: "Mara".into(),
                    role: "mentor".into(),
                    ..Default::default()
                },
            ])
        }

        fn episode(
            &self,
            _request: &UserRequest,
            _outline: &StoryOutline,
            _characters: &[Character],
            episode_number: u32,
        ) -> anyhow::Result<Episode> {
            Ok(Episode {
                episode_number,
                title: format!("Episode {}", episode_number),
                ..Default::default()
            })
        }
    }

    pub struct UntitledStory;

    impl StoryGenerator for UntitledStory {
        fn outline(&self, _request: &UserRequest) -> anyhow::Result<StoryOutline> {
            Ok(StoryOutline::default())
        }

        fn characters(
            &self,
            request: &UserRequest,
            outline: &StoryOutline,
        ) -> anyhow::Result<Vec<Character>> {
            ScriptedStory.characters(request, outline)
        }

        fn episode(
            &self,
            request: &UserRequest,
            outline: &StoryOutline,
            characters: &[Character],
            episode_number: u32,
        ) -> anyhow::Result<Episode> {
            ScriptedStory.episode(request, outline, characters, episode_number)
        }
    }

    pub struct FailingStory;

    impl StoryGenerator for FailingStory {
        fn outline(&self, _request: &UserRequest) -> anyhow::Result<StoryOutline> {
            bail!("model quota exhausted")
        }

        fn characters(
            &self,
            _request: &UserRequest,
            _outline: &StoryOutline,
        ) -> anyhow::Result<Vec<Character>> {
            bail!("model quota exhausted")
        }

        fn episode(
            &self,
            _request: &UserRequest,
            _outline: &StoryOutline,
            _characters: &[Character],
            _episode_number: u32,
        ) -> anyhow::Result<Episode> {
            bail!("model quota exhausted")
        }
    }

    /// Two shots per episode.
    pub struct ScriptedStoryboard;

    impl StoryboardGenerator for ScriptedStoryboard {
        fn shots(
            &self,
            _request: &UserRequest,
            episode: &Episode,
            _characters: &[Character],
        ) -> anyhow::Result<Vec<Shot>> {
            Ok((1..=2)
                .map(|n| Shot {
                    episode_number: episode.episode_number,
                    shot_number: n,
                    description: format!("{} shot {}", episode.title, n),
                    duration: 5,
                    ..Default::default()
                })
                .collect())
        }
    }

    pub struct ScriptedPrompts;

    impl PromptGenerator for ScriptedPrompts {
        fn prompt(
            &self,
            _request: &UserRequest,
            shot: &Shot,
            _characters: &[Character],
        ) -> anyhow::Result<String> {
            Ok(format!("cinematic, {}", shot.description))
        }
    }

    /// In-memory provider. Unknown task ids poll as pending.
    pub struct FakeProvider {
        name: &'static str,
        next_id: AtomicUsize,
        submissions: AtomicUsize,
        polls: AtomicUsize,
        submit_failures: Mutex<HashMap<String, ProviderError>>,
        reports: Mutex<HashMap<String, TaskReport>>,
    }

    impl FakeProvider {
        pub fn new(name: &'static str) -> Self {
            Self {
                name,
                next_id: AtomicUsize::new(1),
                submissions: AtomicUsize::new(0),
                polls: AtomicUsize::new(0),
                submit_failures: Mutex::new(HashMap::new()),
                reports: Mutex::new(HashMap::new()),
            }
        }

        pub fn fail_submit_on(&self, shot_id: &str, err: ProviderError) {
            self.submit_failures
                .lock()
                .unwrap()
                .insert(shot_id.to_string(), err);
        }

        pub fn set_report(&self, task_id: &str, report: TaskReport) {
            self.reports
                .lock()
                .unwrap()
                .insert(task_id.to_string(), report);
        }

        pub fn submissions(&self) -> usize {
            self.submissions.load(Ordering::SeqCst)
        }

        pub fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    impl VideoProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn submit(&self, request: &SubmitRequest) -> Result<String, ProviderError> {
            if let Some(err) = self.submit_failures.lock().unwrap().remove(&request.shot_id) {
                return Err(err);
            }
            self.submissions.fetch_add(1, Ordering::SeqCst);
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{}-task-{}", self.name, id))
        }

        fn poll(&self, task_id: &str) -> Result<TaskReport, ProviderError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .reports
                .lock()
                .unwrap()
                .get(task_id)
                .cloned()
                .unwrap_or_else(TaskReport::pending))
        }
    }
}
