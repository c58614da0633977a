//! Resumable story-to-video pipeline orchestration.
//!
//! A session moves a [`PipelineState`](state::PipelineState) through fixed
//! phases (outline, characters, episodes, storyboard, prompts, video
//! generation, review). Workers produce the artifacts for each phase, the
//! [`Orchestrator`](orchestrator::Orchestrator) routes between them and pauses
//! at human approval gates, and every pause is checkpointed to SQLite so a run
//! can be continued from another process.

pub mod config;
pub mod errors;
pub mod orchestrator;
pub mod phase;
pub mod provider;
pub mod retry;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod workers;
