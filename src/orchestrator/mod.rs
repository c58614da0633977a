pub mod locks;
pub mod resume;
pub mod router;
pub mod runner;
pub mod service;

pub use locks::{SessionGuard, SessionLocks};
pub use resume::{plan_resume, resume_phase};
pub use router::{Route, route};
pub use runner::{DEFAULT_MAX_ITERATIONS, NOT_CONVERGED, Runner};
pub use service::{Orchestrator, ResumeOutcome, StartOutcome};
