//! Tracing subscriber setup.
//!
//! `STORYFORGE_LOG` takes an `EnvFilter` directive and wins over the
//! configured filter. Console output goes to stderr so command output on
//! stdout stays machine-readable.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::StoryforgeConfig;

pub const ENV_LOG: &str = "STORYFORGE_LOG";

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub filter: String,
    pub json: bool,
    /// Also write daily-rolling files here
    pub dir: Option<PathBuf>,
}

impl LogSettings {
    pub fn from_config(config: &StoryforgeConfig) -> Self {
        Self {
            filter: config.log_filter(),
            json: config.toml.logging.json,
            dir: config.log_dir(),
        }
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_from_env(ENV_LOG)
            .or_else(|_| EnvFilter::try_new(&self.filter))
            .with_context(|| format!("Invalid log filter '{}'", self.filter))
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the process.
pub fn init_tracing(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let console = if settings.json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file, guard) = match &settings.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "storyforge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(settings.env_filter()?)
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
