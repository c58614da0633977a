//! Content generation seams.
//!
//! The workers own sequencing and state bookkeeping; the text itself comes
//! from these generators, which callers back with whatever model client
//! they use.

use crate::state::{Character, Episode, Shot, StoryOutline, UserRequest};

pub trait StoryGenerator: Send + Sync {
    fn outline(&self, request: &UserRequest) -> anyhow::Result<StoryOutline>;

    fn characters(
        &self,
        request: &UserRequest,
        outline: &StoryOutline,
    ) -> anyhow::Result<Vec<Character>>;

    /// Write episode `episode_number` (1-based).
    fn episode(
        &self,
        request: &UserRequest,
        outline: &StoryOutline,
        characters: &[Character],
        episode_number: u32,
    ) -> anyhow::Result<Episode>;
}

pub trait StoryboardGenerator: Send + Sync {
    fn shots(
        &self,
        request: &UserRequest,
        episode: &Episode,
        characters: &[Character],
    ) -> anyhow::Result<Vec<Shot>>;
}

pub trait PromptGenerator: Send + Sync {
    /// Text prompt for one shot, in the target platform's preferred form.
    fn prompt(
        &self,
        request: &UserRequest,
        shot: &Shot,
        characters: &[Character],
    ) -> anyhow::Result<String>;
}
