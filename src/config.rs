//! Layered configuration for storyforge.
//!
//! Settings are read from `<data_dir>/storyforge.toml`, then overridden by
//! environment variables, then by CLI flags. Every field has a default, so a
//! missing file is the same as an empty one.
//!
//! # Configuration File Format
//!
//! ```toml
//! [storage]
//! db_file = "sessions.db"
//! lock_dir = "locks"
//!
//! [workflow]
//! max_iterations = 32
//! default_mode = "interactive"
//!
//! [retry]
//! max_attempts = 3
//! delay_ms = 2000
//!
//! [request]
//! genre = "drama"
//! num_episodes = 1
//! episode_duration = 60
//! num_characters = 3
//! target_platform = "kling"
//!
//! [logging]
//! filter = "storyforge=info"
//! json = false
//! dir = "logs"
//! ```
//!
//! # Environment
//!
//! - `STORYFORGE_HOME` replaces the data directory
//! - `STORYFORGE_DB` replaces the database path
//! - `STORYFORGE_MAX_ITERATIONS` replaces `workflow.max_iterations`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::orchestrator::{Orchestrator, SessionLocks};
use crate::phase::InteractionMode;
use crate::provider::KNOWN_PLATFORMS;
use crate::retry::RetryPolicy;
use crate::state::UserRequest;
use crate::store::SessionStore;
use crate::workers::Workers;

pub const CONFIG_FILE: &str = "storyforge.toml";

pub const ENV_HOME: &str = "STORYFORGE_HOME";
pub const ENV_DB: &str = "STORYFORGE_DB";
pub const ENV_MAX_ITERATIONS: &str = "STORYFORGE_MAX_ITERATIONS";

/// Where sessions and lock files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    /// SQLite file, relative to the data directory unless absolute
    #[serde(default = "default_db_file")]
    pub db_file: PathBuf,
    /// Directory for cross-process session lock files
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,
}

fn default_db_file() -> PathBuf {
    PathBuf::from("sessions.db")
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from("locks")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_file: default_db_file(),
            lock_dir: default_lock_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSection {
    /// Worker invocations allowed per run before giving up
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub default_mode: InteractionMode,
}

fn default_max_iterations() -> u32 {
    crate::orchestrator::DEFAULT_MAX_ITERATIONS
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            default_mode: InteractionMode::default(),
        }
    }
}

/// Retry of transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    2000
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms))
    }
}

/// Defaults applied to new requests. Missing keys fall back to the
/// [`UserRequest`] defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestSection {
    pub genre: String,
    pub num_episodes: u32,
    pub episode_duration: u32,
    pub num_characters: u32,
    pub target_platform: String,
}

impl Default for RequestSection {
    fn default() -> Self {
        let request = UserRequest::new("");
        Self {
            genre: request.genre,
            num_episodes: request.num_episodes,
            episode_duration: request.episode_duration,
            num_characters: request.num_characters,
            target_platform: request.target_platform,
        }
    }
}

impl RequestSection {
    /// A request for `idea` carrying these defaults.
    pub fn request(&self, idea: impl Into<String>) -> UserRequest {
        UserRequest {
            genre: self.genre.clone(),
            num_episodes: self.num_episodes,
            episode_duration: self.episode_duration,
            num_characters: self.num_characters,
            target_platform: self.target_platform.clone(),
            ..UserRequest::new(idea)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `EnvFilter` directive used when `STORYFORGE_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
    /// Daily-rolling log files, relative to the data directory unless absolute
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_filter() -> String {
    "storyforge=info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
            dir: None,
        }
    }
}

/// The complete storyforge.toml configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoryforgeToml {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub workflow: WorkflowSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub request: RequestSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl StoryforgeToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse storyforge.toml")
    }

    /// Load `<data_dir>/storyforge.toml`, or defaults when it doesn't exist.
    pub fn load_or_default(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize storyforge.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.workflow.max_iterations == 0 {
            warnings.push(
                "workflow.max_iterations is 0: every run will stop before the first worker"
                    .to_string(),
            );
        }
        if self.retry.max_attempts == 0 {
            warnings.push("retry.max_attempts is 0: treated as a single attempt".to_string());
        }
        if self.request.num_episodes == 0 {
            warnings.push("request.num_episodes is 0: treated as 1".to_string());
        }
        let platform = self.request.target_platform.to_lowercase();
        if !KNOWN_PLATFORMS.contains(&platform.as_str()) {
            warnings.push(format!(
                "Unknown target_platform '{}'. Known platforms: {}",
                self.request.target_platform,
                KNOWN_PLATFORMS.join(", ")
            ));
        }
        if self.logging.filter.trim().is_empty() {
            warnings.push("logging.filter is empty".to_string());
        }

        warnings
    }
}

/// Resolved configuration.
///
/// It merges settings from:
/// 1. storyforge.toml
/// 2. Environment variables
/// 3. CLI arguments
#[derive(Debug, Clone)]
pub struct StoryforgeConfig {
    pub data_dir: PathBuf,
    pub toml: StoryforgeToml,
    /// CLI override: debug-level logging
    pub verbose: bool,
}

impl StoryforgeConfig {
    /// Load configuration for `data_dir`, falling back to `STORYFORGE_HOME`
    /// and then to the platform data directory.
    pub fn new(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => Self::default_data_dir()?,
        };
        let toml = StoryforgeToml::load_or_default(&data_dir)?;
        Ok(Self {
            data_dir,
            toml,
            verbose: false,
        })
    }

    /// Create StoryforgeConfig with CLI overrides.
    pub fn with_cli_args(data_dir: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let mut config = Self::new(data_dir)?;
        config.verbose = verbose;
        Ok(config)
    }

    pub fn default_data_dir() -> Result<PathBuf> {
        if let Some(home) = env_value(ENV_HOME) {
            return Ok(PathBuf::from(home));
        }
        dirs::data_dir()
            .map(|dir| dir.join("storyforge"))
            .context("Could not determine a data directory; set STORYFORGE_HOME")
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    /// Database path (env → file → default).
    pub fn db_path(&self) -> PathBuf {
        match env_value(ENV_DB) {
            Some(path) => PathBuf::from(path),
            None => self.resolve(&self.toml.storage.db_file),
        }
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.resolve(&self.toml.storage.lock_dir)
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.toml.logging.dir.as_deref().map(|dir| self.resolve(dir))
    }

    /// Iteration cap (env → file → default).
    pub fn max_iterations(&self) -> u32 {
        match env_value(ENV_MAX_ITERATIONS) {
            Some(raw) => match raw.parse() {
                Ok(value) => value,
                Err(_) => {
                    warn!(value = %raw, "Ignoring invalid {}", ENV_MAX_ITERATIONS);
                    self.toml.workflow.max_iterations
                }
            },
            None => self.toml.workflow.max_iterations,
        }
    }

    pub fn default_mode(&self) -> InteractionMode {
        self.toml.workflow.default_mode
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.toml.retry.policy()
    }

    pub fn new_request(&self, idea: impl Into<String>) -> UserRequest {
        self.toml.request.request(idea)
    }

    /// Default log filter (CLI verbose → file).
    pub fn log_filter(&self) -> String {
        if self.verbose {
            "storyforge=debug".to_string()
        } else {
            self.toml.logging.filter.clone()
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        if let Some(raw) = env_value(ENV_MAX_ITERATIONS) {
            if raw.parse::<u32>().is_err() {
                warnings.push(format!("{}='{}' is not a number", ENV_MAX_ITERATIONS, raw));
            }
        }
        warnings
    }

    /// Open the session store, creating its parent directory.
    pub fn open_store(&self) -> Result<SessionStore> {
        let path = self.db_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        SessionStore::open(&path)
            .with_context(|| format!("Failed to open session store: {}", path.display()))
    }

    pub fn session_locks(&self) -> SessionLocks {
        SessionLocks::with_lock_dir(self.lock_dir())
    }

    /// An orchestrator over the configured store, locks and iteration cap.
    pub fn orchestrator(&self, workers: Workers) -> Result<Orchestrator> {
        Ok(Orchestrator::new(self.open_store()?, workers)
            .with_max_iterations(self.max_iterations())
            .with_locks(self.session_locks()))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
