//! Session and checkpoint persistence.

pub mod codec;
pub mod db;
pub mod models;

pub use codec::{CURRENT_SCHEMA_VERSION, decode_state, encode_state};
pub use db::SessionStore;
pub use models::{Checkpoint, Session, SessionInfo, SessionStatus, StepLabel};
