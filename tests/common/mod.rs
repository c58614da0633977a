//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use storyforge::errors::ProviderError;
use storyforge::orchestrator::{Orchestrator, SessionLocks};
use storyforge::provider::{ProviderRegistry, SubmitRequest, TaskReport, VideoProvider};
use storyforge::retry::RetryPolicy;
use storyforge::state::{Character, Episode, Shot, StoryOutline, UserRequest};
use storyforge::store::SessionStore;
use storyforge::workers::{PromptGenerator, StoryGenerator, StoryboardGenerator, Workers};

pub const IDEA: &str = "A robot learns to paint";

pub struct Story;

impl StoryGenerator for Story {
    fn outline(&self, request: &UserRequest) -> anyhow::Result<StoryOutline> {
        Ok(StoryOutline {
            title: "The Painting Machine".into(),
            synopsis: request.idea.clone(),
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
                name: "Unit 7".into(),
                role: "protagonist".into(),
                ..Default::default()
            },
            Character {
                name: "Ines".into(),
                role: "gallery owner".into(),
                ..Default::default()
            },
        ])
    }

    fn episode(
        &self,
        _request: &UserRequest,
        outline: &StoryOutline,
        _characters: &[Character],
        episode_number: u32,
    ) -> anyhow::Result<Episode> {
        Ok(Episode {
            episode_number,
            title: format!("{}: part {}", outline.title, episode_number),
            ..Default::default()
        })
    }
}

/// Two shots per episode.
pub struct Storyboard;

impl StoryboardGenerator for Storyboard {
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

pub struct Prompts;

impl PromptGenerator for Prompts {
    fn prompt(
        &self,
        _request: &UserRequest,
        shot: &Shot,
        _characters: &[Character],
    ) -> anyhow::Result<String> {
        Ok(format!("cinematic, soft light, {}", shot.description))
    }
}

/// In-memory video provider. Task ids are `<name>-task-<n>`, counted from 1;
/// tasks without a scripted report poll as pending.
pub struct FakeProvider {
    name: &'static str,
    next_id: AtomicUsize,
    submitted: Mutex<Vec<String>>,
    submit_failures: Mutex<HashMap<String, ProviderError>>,
    reports: Mutex<HashMap<String, TaskReport>>,
}

impl FakeProvider {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            next_id: AtomicUsize::new(1),
            submitted: Mutex::new(Vec::new()),
            submit_failures: Mutex::new(HashMap::new()),
            reports: Mutex::new(HashMap::new()),
        })
    }

    /// The next submission of `shot_id` fails with `err`.
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

    pub fn complete_all(&self, count: usize) {
        for n in 1..=count {
            let task_id = format!("{}-task-{}", self.name, n);
            let url = format!("https://cdn.test/{}.mp4", task_id);
            self.set_report(&task_id, TaskReport::completed(url));
        }
    }

    /// Shot ids accepted so far, in submission order.
    pub fn submitted_shots(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
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
        self.submitted.lock().unwrap().push(request.shot_id.clone());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}-task-{}", self.name, id))
    }

    fn poll(&self, task_id: &str) -> Result<TaskReport, ProviderError> {
        Ok(self
            .reports
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .unwrap_or_else(TaskReport::pending))
    }
}

pub fn workers(provider: Arc<FakeProvider>) -> Workers {
    Workers::standard(
        Arc::new(Story),
        Arc::new(Storyboard),
        Arc::new(Prompts),
        ProviderRegistry::new().with(provider),
        RetryPolicy::none(),
    )
}

pub fn orchestrator(provider: Arc<FakeProvider>) -> Orchestrator {
    Orchestrator::new(SessionStore::open_in_memory().unwrap(), workers(provider))
}

/// An orchestrator over an on-disk store with file-backed session locks.
pub fn orchestrator_at(dir: &Path, provider: Arc<FakeProvider>) -> Orchestrator {
    let store = SessionStore::open(&dir.join("sessions.db")).unwrap();
    Orchestrator::new(store, workers(provider))
        .with_locks(SessionLocks::with_lock_dir(dir.join("locks")))
}

pub fn request() -> UserRequest {
    UserRequest::new(IDEA)
}
