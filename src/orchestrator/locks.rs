//! Single-writer enforcement per session.
//!
//! In-process callers are serialised through a shared set of held ids. When a
//! lock directory is configured, an advisory exclusive lock on
//! `<lock_dir>/<session_id>.lock` also keeps other processes out.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fs2::FileExt;
use tracing::debug;

use crate::errors::WorkflowError;

#[derive(Debug, Clone, Default)]
pub struct SessionLocks {
    held: Arc<Mutex<HashSet<String>>>,
    lock_dir: Option<PathBuf>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_dir(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            held: Arc::default(),
            lock_dir: Some(lock_dir.into()),
        }
    }

    /// Take the session, failing fast with `SessionBusy` when another caller
    /// holds it.
    pub fn acquire(&self, session_id: &str) -> Result<SessionGuard, WorkflowError> {
        {
            let mut held = self
                .held
                .lock()
                .map_err(|_| WorkflowError::InvalidState("session lock table poisoned".into()))?;
            if !held.insert(session_id.to_string()) {
                return Err(busy(session_id));
            }
        }

        let mut guard = SessionGuard {
            held: Arc::clone(&self.held),
            session_id: session_id.to_string(),
            path: None,
            _file: None,
        };
        if let Some(dir) = &self.lock_dir {
            // An error here drops the guard, which releases the in-process entry.
            let path = dir.join(format!("{}.lock", session_id));
            guard._file = Some(lock_file(dir, &path, session_id)?);
            guard.path = Some(path);
        }
        Ok(guard)
    }
}

fn busy(session_id: &str) -> WorkflowError {
    WorkflowError::SessionBusy {
        session_id: session_id.to_string(),
    }
}

fn lock_file(dir: &Path, path: &Path, session_id: &str) -> Result<File, WorkflowError> {
    fs::create_dir_all(dir).map_err(|source| WorkflowError::Lock {
        path: dir.to_path_buf(),
        source,
    })?;
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|source| WorkflowError::Lock {
            path: path.to_path_buf(),
            source,
        })?;

    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {
            debug!(path = %path.display(), "Acquired session lock file");
            Ok(file)
        }
        Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
            Err(busy(session_id))
        }
        Err(source) => Err(WorkflowError::Lock {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Holds a session until dropped.
#[derive(Debug)]
pub struct SessionGuard {
    held: Arc<Mutex<HashSet<String>>>,
    session_id: String,
    path: Option<PathBuf>,
    _file: Option<File>,
}

impl SessionGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Remove the session's lock file while still holding it. Used when the
    /// session itself is deleted.
    pub fn remove_lock_file(&self) -> Result<(), WorkflowError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed session lock file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WorkflowError::Lock {
                path: path.clone(),
                source,
            }),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.session_id);
        }
        // The file lock is released when `_file` closes.
    }
}
