//! CLI command implementations.
//!
//! | Module     | Commands handled                                   |
//! |------------|-----------------------------------------------------|
//! | `sessions` | `Sessions`, `Show`, `State`, `Checkpoints`, `Delete` |
//! | `config`   | `Config`                                           |

pub mod config;
pub mod sessions;

pub use config::cmd_config;
pub use sessions::{cmd_checkpoints, cmd_delete, cmd_sessions, cmd_show, cmd_state};
