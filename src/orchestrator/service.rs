use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, info_span};

use super::locks::SessionLocks;
use super::resume::plan_resume;
use super::runner::Runner;
use crate::errors::{StoreError, WorkflowError};
use crate::phase::InteractionMode;
use crate::state::{PipelineState, UserRequest};
use crate::store::{Session, SessionInfo, SessionStatus, SessionStore, StepLabel};
use crate::workers::Workers;

type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub session_id: String,
    pub state: PipelineState,
}

#[derive(Debug, Clone)]
pub struct ResumeOutcome {
    pub state: PipelineState,
    pub resumed_from_error: bool,
}

/// Caller-facing pipeline operations.
///
/// Owns the store, the run loop and the session locks. Every operation
/// reloads from the store, so it works the same on a cold start. Each
/// operation that runs workers ends with one checkpoint, committed together
/// with the state in a single transaction.
pub struct Orchestrator {
    store: SessionStore,
    runner: Runner,
    locks: SessionLocks,
}

impl Orchestrator {
    pub fn new(store: SessionStore, workers: Workers) -> Self {
        Self {
            store,
            runner: Runner::new(workers),
            locks: SessionLocks::new(),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.runner = self.runner.with_max_iterations(max_iterations);
        self
    }

    pub fn with_locks(mut self, locks: SessionLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Create a session and run it to its first checkpoint.
    pub fn start(&self, request: UserRequest, mode: InteractionMode) -> Result<StartOutcome> {
        let session = self.store.create_session(&request.summary(), mode)?;
        let session_id = session.session_id;
        let _span = info_span!("session", session_id = %session_id).entered();
        let _guard = self.locks.acquire(&session_id)?;

        let input = json!({
            "idea": request.idea,
            "mode": mode.as_str(),
            "target_platform": request.target_platform,
        });
        let state = PipelineState::new(request, mode);
        // Persist before running so a crash mid-start can be resumed.
        self.store.save_state(&session_id, &state)?;
        info!(mode = mode.as_str(), "Pipeline started");

        let state = self.runner.run_until_checkpoint(state);
        self.commit(&session_id, &state, StepLabel::Start, &input)?;
        Ok(StartOutcome { session_id, state })
    }

    /// Re-enter a session.
    ///
    /// A failed session is repositioned by the resume planner and run. A
    /// session interrupted mid-run is run from its stored phase. A paused
    /// session is returned as is.
    pub fn resume(&self, session_id: &str) -> Result<ResumeOutcome> {
        self.store.get_session(session_id)?;
        let _span = info_span!("session", session_id = %session_id).entered();
        let _guard = self.locks.acquire(session_id)?;
        let state = self.store.load_state(session_id)?;

        if state.is_completed() {
            return Err(WorkflowError::AlreadyCompleted {
                session_id: session_id.to_string(),
            });
        }

        if let Some(error) = state.error.clone() {
            let input = json!({
                "error": error,
                "phase": state.phase,
                "retry_count": state.retry_count,
            });
            let planned = plan_resume(state);
            info!(
                phase = %planned.phase,
                retry_count = planned.retry_count,
                "Resuming failed session"
            );
            let state = self.runner.run_until_checkpoint(planned);
            self.commit(session_id, &state, StepLabel::ResumeFromError, &input)?;
            return Ok(ResumeOutcome {
                state,
                resumed_from_error: true,
            });
        }

        if state.pending_approval {
            return Ok(ResumeOutcome {
                state,
                resumed_from_error: false,
            });
        }

        let input = json!({ "phase": state.phase });
        info!(phase = %state.phase, "Resuming interrupted session");
        let state = self.runner.run_until_checkpoint(state);
        self.commit(session_id, &state, StepLabel::Resume, &input)?;
        Ok(ResumeOutcome {
            state,
            resumed_from_error: false,
        })
    }

    /// Answer the pending approval gate.
    ///
    /// Approval clears the gate and runs to the next checkpoint. Rejection
    /// fails the session without running any worker.
    pub fn approve_and_continue(
        &self,
        session_id: &str,
        approved: bool,
        feedback: Option<&str>,
    ) -> Result<PipelineState> {
        self.store.get_session(session_id)?;
        let _span = info_span!("session", session_id = %session_id).entered();
        let _guard = self.locks.acquire(session_id)?;
        let mut state = self.store.load_state(session_id)?;

        if !state.pending_approval {
            return Err(WorkflowError::InvalidState(format!(
                "Session {} is not awaiting approval (phase {})",
                session_id, state.phase
            )));
        }
        let kind = state.approval_type.ok_or_else(|| {
            WorkflowError::InvalidState(format!(
                "Session {} is paused without an approval type",
                session_id
            ))
        })?;
        let feedback = feedback.map(str::trim).filter(|f| !f.is_empty());
        let input = json!({
            "approved": approved,
            "approval_type": kind,
            "feedback": feedback,
        });

        if approved {
            info!(approval = kind.as_str(), "Approved");
            state.clear_approval();
            let state = self.runner.run_until_checkpoint(state);
            self.commit(session_id, &state, StepLabel::Continue, &input)?;
            Ok(state)
        } else {
            let message = match feedback {
                Some(feedback) => format!("rejected: {}: {}", kind, feedback),
                None => format!("rejected: {}", kind),
            };
            info!(approval = kind.as_str(), "Rejected");
            state.fail(message);
            self.commit(session_id, &state, StepLabel::Rejected, &input)?;
            Ok(state)
        }
    }

    pub fn get_state(&self, session_id: &str) -> Result<PipelineState> {
        Ok(self.store.load_state(session_id)?)
    }

    pub fn session_info(&self, session_id: &str) -> Result<SessionInfo> {
        let session = self.store.get_session(session_id)?;
        let checkpoints = self.store.list_checkpoints(session_id)?;
        Ok(SessionInfo {
            session,
            checkpoints,
        })
    }

    pub fn list_sessions(
        &self,
        status: Option<SessionStatus>,
        limit: usize,
    ) -> Result<Vec<Session>> {
        Ok(self.store.list_sessions(status, limit)?)
    }

    /// Delete a session, its checkpoints and its lock file. Fails with
    /// `SessionBusy` while another caller is driving it.
    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        self.store.get_session(session_id)?;
        let guard = self.locks.acquire(session_id)?;
        self.store.delete_session(session_id)?;
        guard.remove_lock_file()?;
        info!(session_id, "Session deleted");
        Ok(())
    }

    fn commit(
        &self,
        session_id: &str,
        state: &PipelineState,
        step: StepLabel,
        input: &Value,
    ) -> Result<()> {
        let output = to_summary(&state.summary())?;
        self.store
            .commit_checkpoint(session_id, state, step, input, &output)?;
        info!(
            step = step.as_str(),
            phase = %state.phase,
            status = SessionStatus::from_state(state).as_str(),
            "Checkpoint committed"
        );
        Ok(())
    }
}

fn to_summary<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| StoreError::from(e).into())
}
